//! Streaming Support
//!
//! Streaming-capable adapters return a [`TextStream`]: a finite,
//! single-consumption sequence of text chunks decoded from the provider's
//! SSE response. Dropping the stream aborts the underlying body read, which
//! is the only cancellation hook the contract offers.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::Stream;
use futures_util::StreamExt;

use crate::error::RouterError;

/// Lazily-produced sequence of text chunks. Back-pressure is applied
/// naturally by the consumer's read rate.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, RouterError>> + Send>>;

/// Decode an SSE response body into text chunks.
///
/// `extract` maps one parsed event payload to its text delta; events that
/// map to `None` (control frames, empty deltas) are skipped. The OpenAI-style
/// `[DONE]` sentinel terminates the stream.
pub fn sse_text_stream<F>(response: reqwest::Response, extract: F) -> TextStream
where
    F: Fn(&serde_json::Value) -> Option<String> + Send + 'static,
{
    let mut events = response.bytes_stream().eventsource();

    Box::pin(async_stream::stream! {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if event.data.trim() == "[DONE]" {
                        break;
                    }
                    match serde_json::from_str::<serde_json::Value>(&event.data) {
                        Ok(value) => {
                            if let Some(chunk) = extract(&value) {
                                if !chunk.is_empty() {
                                    yield Ok(chunk);
                                }
                            }
                        }
                        Err(err) => yield Err(RouterError::Json(err.to_string())),
                    }
                }
                Err(err) => {
                    yield Err(RouterError::Transport(err.to_string()));
                    break;
                }
            }
        }
    })
}
