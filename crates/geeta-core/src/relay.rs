//! Fragment-to-bytes forwarding
//!
//! The relay holds no state beyond its source: each request gets its own
//! instance and nothing is buffered past the fragment in flight.

use crate::error::{ChatError, ChatResult};
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use thiserror::Error;

/// Terminal failure of a relayed stream.
///
/// Surfacing this to the HTTP body aborts the chunked response, so the
/// consumer sees a truncated transfer instead of a clean end.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("stream aborted: {0}")]
    Aborted(#[from] ChatError),
}

/// Forward fragments as UTF-8 bytes in arrival order.
///
/// Ends when the source ends. A source error is yielded once and nothing is
/// read from the source after it.
pub fn relay<S>(chunks: S) -> impl Stream<Item = Result<Bytes, RelayError>> + Send + 'static
where
    S: Stream<Item = ChatResult<String>> + Send + Unpin + 'static,
{
    stream::unfold(Some(chunks), |state| async move {
        let mut chunks = state?;
        match chunks.next().await {
            Some(Ok(text)) => Some((Ok(Bytes::from(text)), Some(chunks))),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "aborting relayed stream");
                Some((Err(RelayError::from(err)), None))
            }
            None => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ChunkStream;

    #[tokio::test]
    async fn test_relays_in_order_and_ends_cleanly() {
        let source = ChunkStream::from_items(vec![
            Ok("In Chapter 2, ".to_string()),
            Ok("Verse 47".to_string()),
            Ok(" सत्य".to_string()),
        ]);

        let out: Vec<_> = relay(source).collect().await;
        let bytes: Vec<u8> = out
            .into_iter()
            .flat_map(|item| item.unwrap().to_vec())
            .collect();
        assert_eq!(String::from_utf8(bytes).unwrap(), "In Chapter 2, Verse 47 सत्य");
    }

    #[tokio::test]
    async fn test_error_after_fragments_terminates() {
        let source = ChunkStream::from_items(vec![
            Ok("one".to_string()),
            Ok("two".to_string()),
            Err(ChatError::completion("upstream reset")),
            Ok("never".to_string()),
        ]);

        let out: Vec<_> = relay(source).collect().await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap(), &Bytes::from("one"));
        assert_eq!(out[1].as_ref().unwrap(), &Bytes::from("two"));
        assert!(matches!(
            out[2],
            Err(RelayError::Aborted(ChatError::CompletionUnavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_error_with_no_fragments() {
        let source = ChunkStream::from_items(vec![Err(ChatError::completion("refused"))]);
        let out: Vec<_> = relay(source).collect().await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }

    #[tokio::test]
    async fn test_forwards_without_waiting_for_the_end() {
        let (tx, source) = ChunkStream::channel(4);
        let mut relayed = Box::pin(relay(source));

        tx.send(Ok("first".to_string())).await.unwrap();
        let first = relayed.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from("first"));

        drop(tx);
        assert!(relayed.next().await.is_none());
    }
}
