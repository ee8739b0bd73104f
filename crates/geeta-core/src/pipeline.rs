//! Retrieve → compose → complete
//!
//! The pipeline holds only immutable, shared parts, so concurrent requests
//! never touch each other's state.

use crate::ai::{completion_from_config, ChunkStream, CompletionService};
use crate::config::Config;
use crate::error::{ChatError, ChatResult};
use crate::prompt::{PromptTemplate, Query};
use crate::retriever::{Retriever, UpstashRetriever, DEFAULT_TOP_K};
use futures_util::{stream, Stream, StreamExt};
use std::sync::Arc;

#[derive(Clone)]
pub struct ChatPipeline {
    retriever: Arc<dyn Retriever>,
    completion: Arc<dyn CompletionService>,
    template: Arc<PromptTemplate>,
    top_k: usize,
}

/// A started answer: the first fragment has already arrived.
pub struct Answer {
    first: String,
    rest: ChunkStream,
}

impl Answer {
    /// All fragments in arrival order, starting with the first.
    pub fn into_chunks(self) -> impl Stream<Item = ChatResult<String>> + Send + Unpin + 'static {
        stream::once(futures_util::future::ready(Ok(self.first))).chain(self.rest)
    }
}

impl ChatPipeline {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        completion: Arc<dyn CompletionService>,
        template: PromptTemplate,
    ) -> Self {
        Self {
            retriever,
            completion,
            template: Arc::new(template),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let (url, token) = config.vector_credentials()?;
        let retriever = UpstashRetriever::new(url, token).with_timeout(config.request_timeout());
        let completion = completion_from_config(config)?;

        Ok(Self::new(Arc::new(retriever), completion, config.prompt_template()?)
            .with_top_k(config.top_k()))
    }

    /// Answer one message.
    ///
    /// Returns only once the completion has produced its first fragment, so
    /// every failure up to that point is still reportable as an error status.
    /// A completion that ends without any fragment is `CompletionUnavailable`.
    pub async fn answer(&self, message: &str) -> ChatResult<Answer> {
        let query = Query::parse(message)?;

        let passages = self.retriever.retrieve(query.as_str(), self.top_k).await?;
        let prompt = self.template.compose(&passages)?;
        tracing::info!(passages = passages.len(), "context retrieved");

        let mut rest = self.completion.complete(&prompt, &query).await?;
        match rest.next().await {
            Some(Ok(first)) => Ok(Answer { first, rest }),
            Some(Err(e)) => Err(e),
            None => Err(ChatError::completion("completion produced no content")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{Prompt, CONTEXT_SEPARATOR, FALLBACK_ANSWER};
    use crate::retriever::Passage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubRetriever {
        result: ChatResult<Vec<Passage>>,
    }

    #[async_trait]
    impl Retriever for StubRetriever {
        async fn retrieve(&self, _query: &str, _top_k: usize) -> ChatResult<Vec<Passage>> {
            self.result.clone()
        }
    }

    /// Replays fixed items and records the turns it was given.
    struct StubCompletion {
        items: Vec<ChatResult<String>>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl StubCompletion {
        fn new(items: Vec<ChatResult<String>>) -> Self {
            Self {
                items,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionService for StubCompletion {
        async fn complete(&self, prompt: &Prompt, query: &Query) -> ChatResult<ChunkStream> {
            self.seen
                .lock()
                .unwrap()
                .push((prompt.system().to_string(), query.as_str().to_string()));
            Ok(ChunkStream::from_items(self.items.clone()))
        }
    }

    fn pipeline(
        passages: ChatResult<Vec<Passage>>,
        completion: Arc<StubCompletion>,
    ) -> ChatPipeline {
        ChatPipeline::new(
            Arc::new(StubRetriever { result: passages }),
            completion,
            PromptTemplate::default(),
        )
    }

    async fn collect(answer: Answer) -> Vec<ChatResult<String>> {
        answer.into_chunks().collect().await
    }

    #[tokio::test]
    async fn test_blank_message_never_reaches_retrieval() {
        let completion = Arc::new(StubCompletion::new(vec![Ok("x".into())]));
        let pipeline = pipeline(Err(ChatError::retrieval("must not be called")), completion);
        assert!(matches!(pipeline.answer("   ").await, Err(ChatError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_no_passages_is_no_context() {
        let completion = Arc::new(StubCompletion::new(vec![Ok("x".into())]));
        let pipeline = pipeline(Ok(vec![]), completion.clone());

        assert!(matches!(pipeline.answer("duty").await, Err(ChatError::NoContextFound)));
        assert!(completion.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_failure_propagates() {
        let completion = Arc::new(StubCompletion::new(vec![Ok("x".into())]));
        let pipeline = pipeline(Err(ChatError::retrieval("503")), completion);
        assert!(matches!(
            pipeline.answer("duty").await,
            Err(ChatError::RetrievalUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_completion_is_unavailable() {
        let completion = Arc::new(StubCompletion::new(vec![]));
        let pipeline = pipeline(Ok(vec![Passage::new("text", 0.9)]), completion);
        assert!(matches!(
            pipeline.answer("duty").await,
            Err(ChatError::CompletionUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_error_before_first_fragment() {
        let completion = Arc::new(StubCompletion::new(vec![Err(ChatError::completion("reset"))]));
        let pipeline = pipeline(Ok(vec![Passage::new("text", 0.9)]), completion);
        assert!(matches!(
            pipeline.answer("duty").await,
            Err(ChatError::CompletionUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_mid_stream_error_follows_sent_fragments() {
        let completion = Arc::new(StubCompletion::new(vec![
            Ok("a".into()),
            Ok("b".into()),
            Err(ChatError::completion("reset")),
        ]));
        let pipeline = pipeline(Ok(vec![Passage::new("text", 0.9)]), completion);

        let items = collect(pipeline.answer("duty").await.unwrap()).await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Ok("a".to_string()));
        assert_eq!(items[1], Ok("b".to_string()));
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn test_chapter_two_duty_scenario() {
        let passages = vec![
            Passage::new("Chapter 2, Verse 47: You have a right to perform your prescribed duty.", 0.92),
            Passage::new("Chapter 2, Verse 47: never consider yourself the cause of the results.", 0.88),
        ];
        let completion = Arc::new(StubCompletion::new(vec![
            Ok("In Chapter 2, Verse 47, ".into()),
            Ok("Krishna teaches that one has a right to action alone.".into()),
        ]));
        let pipeline = pipeline(Ok(passages.clone()), completion.clone());

        let answer = pipeline.answer("What does Chapter 2 say about duty?").await.unwrap();
        let text: String = collect(answer).await.into_iter().map(Result::unwrap).collect();
        assert!(text.starts_with("In Chapter 2, Verse 47"));

        let seen = completion.seen.lock().unwrap();
        let (system, user) = &seen[0];
        let joined = format!("{}{}{}", passages[0].text, CONTEXT_SEPARATOR, passages[1].text);
        assert!(system.contains(&joined));
        assert_eq!(user, "What does Chapter 2 say about duty?");
    }

    #[tokio::test]
    async fn test_unrelated_context_uses_fallback() {
        let completion = Arc::new(StubCompletion::new(vec![Ok(FALLBACK_ANSWER.into())]));
        let pipeline = pipeline(
            Ok(vec![Passage::new("Chapter 6, Verse 5: Elevate yourself through the mind.", 0.2)]),
            completion,
        );

        let answer = pipeline.answer("What is the capital of France?").await.unwrap();
        let text: String = collect(answer).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(text, FALLBACK_ANSWER);
    }
}
