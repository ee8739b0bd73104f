//! Grounding prompt composition
//!
//! Retrieved passages are joined into one context block and substituted into
//! the system template. The template is built once at startup and shared
//! read-only between requests.

use crate::error::{ChatError, ChatResult};
use crate::retriever::Passage;

/// Separator between passages in the context block
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// The single placeholder a template must contain
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Exact sentence the model must answer with when the context is silent
pub const FALLBACK_ANSWER: &str =
    "The Bhagavad Gita does not explicitly address this in the provided text.";

pub const DEFAULT_SYSTEM_TEMPLATE: &str = r#"You are GeetaGPT, a spiritual AI assistant grounded strictly in the Bhagavad Gita.
Your mission is to answer questions using ONLY the following context from the Bhagavad Gita.

Context:
{context}

STRICT RULES:
1. Answer strictly based on the provided context.
2. If the answer is not in the context, YOU MUST SAY EXACTLY: "The Bhagavad Gita does not explicitly address this in the provided text."
3. Do not use outside knowledge or make assumptions.
4. Do not hallucinate verses or meanings.
5. Maintain a calm, respectful, and spiritual tone.
6. Start your answer by citing the Chapter and Verse numbers if available in the context (e.g., "In Chapter 2, Verse 47...").
7. Ensure your answer is concise and directly addresses the user's question."#;

/// A user question. Never empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub fn parse(text: &str) -> ChatResult<Self> {
        if text.trim().is_empty() {
            return Err(ChatError::invalid_input("Message is required"));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The composed system turn for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    system: String,
}

impl Prompt {
    pub fn system(&self) -> &str {
        &self.system
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_SYSTEM_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Accepts only templates with exactly one `{context}` placeholder.
    pub fn new(text: impl Into<String>) -> ChatResult<Self> {
        let text = text.into();
        match text.matches(CONTEXT_PLACEHOLDER).count() {
            1 => Ok(Self { text }),
            0 => Err(ChatError::config("prompt template has no {context} placeholder")),
            n => Err(ChatError::config(format!(
                "prompt template has {} {{context}} placeholders, expected one",
                n
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Fill the template with the passages, most relevant first.
    ///
    /// No passages means no grounding, which is reported as
    /// [`ChatError::NoContextFound`] instead of producing a prompt.
    pub fn compose(&self, passages: &[Passage]) -> ChatResult<Prompt> {
        let context = join_context(passages);
        if context.is_empty() {
            return Err(ChatError::NoContextFound);
        }

        Ok(Prompt {
            system: self.text.replacen(CONTEXT_PLACEHOLDER, &context, 1),
        })
    }
}

fn join_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_rejects_blank() {
        assert!(matches!(Query::parse(""), Err(ChatError::InvalidInput(_))));
        assert!(matches!(Query::parse(" \n\t"), Err(ChatError::InvalidInput(_))));
        assert_eq!(Query::parse(" duty ").unwrap().as_str(), " duty ");
    }

    #[test]
    fn test_default_template_has_one_placeholder() {
        assert!(PromptTemplate::new(DEFAULT_SYSTEM_TEMPLATE).is_ok());
        assert!(DEFAULT_SYSTEM_TEMPLATE.contains(FALLBACK_ANSWER));
    }

    #[test]
    fn test_template_placeholder_count_is_checked() {
        assert!(matches!(PromptTemplate::new("no slot"), Err(ChatError::Config(_))));
        assert!(matches!(
            PromptTemplate::new("{context} and {context}"),
            Err(ChatError::Config(_))
        ));
    }

    #[test]
    fn test_compose_joins_with_separator_in_order() {
        let template = PromptTemplate::new("Context:\n{context}\nEnd").unwrap();
        let passages = vec![
            Passage::new("Chapter 2, Verse 47: act without attachment", 0.9),
            Passage::new("Chapter 2, Verse 47: duty is yours", 0.8),
        ];

        let prompt = template.compose(&passages).unwrap();
        assert_eq!(
            prompt.system(),
            "Context:\nChapter 2, Verse 47: act without attachment\n\n---\n\nChapter 2, Verse 47: duty is yours\nEnd"
        );
    }

    #[test]
    fn test_compose_keeps_duplicates() {
        let template = PromptTemplate::new("{context}").unwrap();
        let passages = vec![Passage::new("same", 0.5), Passage::new("same", 0.5)];
        assert_eq!(template.compose(&passages).unwrap().system(), "same\n\n---\n\nsame");
    }

    #[test]
    fn test_compose_without_passages_is_no_context() {
        let template = PromptTemplate::default();
        assert_eq!(template.compose(&[]), Err(ChatError::NoContextFound));
    }

    #[test]
    fn test_context_braces_are_not_reinterpreted() {
        let template = PromptTemplate::new("A {context} B").unwrap();
        let passages = vec![Passage::new("literal {context} inside", 1.0)];
        assert_eq!(template.compose(&passages).unwrap().system(), "A literal {context} inside B");
    }
}
