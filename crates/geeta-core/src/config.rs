use crate::prompt::PromptTemplate;
use crate::provider::Provider;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Service configuration. File values are overridden by environment variables.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: Option<String>,
    pub ollama_base_url: Option<String>,
    pub vector_url: Option<String>,
    pub vector_token: Option<String>,
    pub top_k: Option<usize>,
    pub temperature: Option<f32>,
    pub bind_addr: Option<String>,
    pub prompt_template_path: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    pub server_url: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::OpenRouter.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Load `.env` files, the JSON config file (if any), then environment overrides.
    pub fn load() -> Result<Self> {
        // dotenvy never overwrites, so the more specific file goes first
        dotenvy::from_filename(".env.local").ok();
        dotenvy::dotenv().ok();

        let mut config = match Self::get_config_path() {
            Ok(path) => Self::load_from(&path)?,
            Err(_) => Self::new(),
        };
        config.apply_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("GEETA_PROVIDER") {
            self.provider = Some(v);
        }
        if let Some(v) = var("GEETA_MODEL") {
            self.model = Some(v);
        }
        if let Some(v) = var("OPENROUTER_API_KEY") {
            self.openrouter_api_key = Some(v);
        }
        if let Some(v) = var("OPENROUTER_BASE_URL") {
            self.openrouter_base_url = Some(v);
        }
        if let Some(v) = var("OLLAMA_BASE_URL") {
            self.ollama_base_url = Some(v);
        }
        if let Some(v) = var("UPSTASH_VECTOR_REST_URL") {
            self.vector_url = Some(v);
        }
        if let Some(v) = var("UPSTASH_VECTOR_REST_TOKEN") {
            self.vector_token = Some(v);
        }
        if let Some(v) = var("GEETA_TOP_K") {
            self.top_k = Some(v.trim().parse().with_context(|| format!("GEETA_TOP_K is not a number: {}", v))?);
        }
        if let Some(v) = var("GEETA_TEMPERATURE") {
            self.temperature = Some(
                v.trim()
                    .parse()
                    .with_context(|| format!("GEETA_TEMPERATURE is not a number: {}", v))?,
            );
        }
        if let Some(v) = var("GEETA_BIND_ADDR") {
            self.bind_addr = Some(v);
        }
        if let Some(v) = var("GEETA_PROMPT_TEMPLATE") {
            self.prompt_template_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("GEETA_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = Some(
                v.trim()
                    .parse()
                    .with_context(|| format!("GEETA_REQUEST_TIMEOUT_SECS is not a number: {}", v))?,
            );
        }
        if let Some(v) = var("GEETA_SERVER_URL") {
            self.server_url = Some(v);
        }
        Ok(())
    }

    pub fn provider(&self) -> Result<Provider> {
        match self.provider.as_deref() {
            None => Ok(Provider::OpenRouter),
            Some(name) => Ok(name.parse()?),
        }
    }

    pub fn model(&self) -> Result<String> {
        match &self.model {
            Some(model) => Ok(model.clone()),
            None => Ok(self.provider()?.default_model().to_string()),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(crate::retriever::DEFAULT_TOP_K).max(1)
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(crate::ai::DEFAULT_TEMPERATURE)
    }

    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    pub fn server_url(&self) -> &str {
        self.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    pub fn openrouter_base_url(&self) -> &str {
        self.openrouter_base_url.as_deref().unwrap_or(DEFAULT_OPENROUTER_BASE_URL)
    }

    pub fn ollama_base_url(&self) -> &str {
        self.ollama_base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_BASE_URL)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Upstash REST URL and token; both are required to serve requests.
    pub fn vector_credentials(&self) -> Result<(&str, &str)> {
        let url = self
            .vector_url
            .as_deref()
            .ok_or_else(|| anyhow!("UPSTASH_VECTOR_REST_URL is not set"))?;
        let token = self
            .vector_token
            .as_deref()
            .ok_or_else(|| anyhow!("UPSTASH_VECTOR_REST_TOKEN is not set"))?;
        Ok((url, token))
    }

    pub fn openrouter_api_key(&self) -> Result<&str> {
        self.openrouter_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENROUTER_API_KEY is not set"))
    }

    /// The grounding template: the configured file, or the built-in GeetaGPT template.
    pub fn prompt_template(&self) -> Result<PromptTemplate> {
        match &self.prompt_template_path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read prompt template {:?}", path))?;
                Ok(PromptTemplate::new(text)?)
            }
            None => Ok(PromptTemplate::default()),
        }
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("geetagpt").join("config.json"))
    }
}
