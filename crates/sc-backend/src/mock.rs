//! Mock connector for testing and offline use.
//!
//! Serves scripted responses as raw SSE bytes in the chat-completion chunk
//! format, so everything above the socket (parser, transport, mapper) runs
//! for real.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::future::BoxFuture;
use sc_protocol::StreamError;
use serde_json::json;
use tokio::time::sleep;

use crate::connector::{ByteStream, Connector};

/// One scripted step of a mock response body.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A chunk whose first choice carries `content`.
    Text { content: String },
    /// A chunk whose first choice carries a finish reason.
    Finish { reason: String },
    /// A frame with an arbitrary payload.
    Raw { data: String },
    /// A frame with an `event:` type line ahead of its payload.
    Event { event_type: String, data: String },
    /// The `[DONE]` sentinel frame.
    Done,
    /// Fail the body read.
    Error { error: StreamError },
    /// Delay before the next step.
    Delay { ms: u64 },
    /// Stop sending without closing the connection.
    Hang,
}

/// Configuration for a mock response body.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Steps to serve, in order.
    pub responses: Vec<MockResponse>,
    /// Optional delay between each step (ms).
    pub chunk_delay_ms: Option<u64>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(mut self, responses: Vec<MockResponse>) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_chunk_delay(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = Some(ms);
        self
    }
}

/// Render a content chunk the way an OpenAI-compatible server does.
pub fn content_frame(content: &str) -> String {
    let chunk = json!({
        "id": "chatcmpl-mock",
        "model": "mock",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    });
    format!("data: {chunk}\n\n")
}

/// Render a chunk that ends generation with `reason`.
pub fn finish_frame(reason: &str) -> String {
    let chunk = json!({
        "id": "chatcmpl-mock",
        "model": "mock",
        "choices": [{"index": 0, "delta": {}, "finish_reason": reason}]
    });
    format!("data: {chunk}\n\n")
}

/// [`Connector`] serving a [`MockConfig`] for every request.
#[derive(Debug, Default)]
pub struct MockConnector {
    config: MockConfig,
    failure: Option<StreamError>,
    opens: AtomicUsize,
    served: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// A connector whose every `open` fails with `error`.
    pub fn failing(error: StreamError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Number of connections opened.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of body chunks handed to readers across all connections.
    pub fn chunks_served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// Number of response bodies dropped, i.e. connections closed.
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Connector for MockConnector {
    fn open(&self, _request: reqwest::Request) -> BoxFuture<'static, Result<ByteStream, StreamError>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.failure.clone() {
            return Box::pin(async move { Err(error) });
        }

        let config = self.config.clone();
        let served = Arc::clone(&self.served);
        let released = Arc::clone(&self.released);

        let body = stream! {
            let _guard = ReleaseGuard(released);
            for response in config.responses {
                if let Some(delay_ms) = config.chunk_delay_ms {
                    sleep(Duration::from_millis(delay_ms)).await;
                }

                let frame = match response {
                    MockResponse::Text { content } => content_frame(&content),
                    MockResponse::Finish { reason } => finish_frame(&reason),
                    MockResponse::Raw { data } => format!("data: {data}\n\n"),
                    MockResponse::Event { event_type, data } => {
                        format!("event: {event_type}\ndata: {data}\n\n")
                    }
                    MockResponse::Done => "data: [DONE]\n\n".to_string(),
                    MockResponse::Error { error } => {
                        served.fetch_add(1, Ordering::SeqCst);
                        yield Err(error);
                        continue;
                    }
                    MockResponse::Delay { ms } => {
                        sleep(Duration::from_millis(ms)).await;
                        continue;
                    }
                    MockResponse::Hang => {
                        futures::future::pending::<()>().await;
                        continue;
                    }
                };

                served.fetch_add(1, Ordering::SeqCst);
                yield Ok(Bytes::from(frame));
            }
        };

        Box::pin(async move { Ok(Box::pin(body) as ByteStream) })
    }
}

/// Built-in scripts for common scenarios.
pub mod fixtures {
    use super::*;

    /// Stream `chunks` as content deltas, then `[DONE]`.
    pub fn streaming_text(chunks: &[&str]) -> MockConfig {
        let mut responses: Vec<_> = chunks
            .iter()
            .map(|chunk| MockResponse::Text {
                content: (*chunk).to_string(),
            })
            .collect();
        responses.push(MockResponse::Done);

        MockConfig::new().with_responses(responses)
    }

    /// Stream `text_before`, then fail the body read with `error`.
    pub fn error_mid_stream(text_before: &str, error: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![
            MockResponse::Text {
                content: text_before.to_string(),
            },
            MockResponse::Error {
                error: StreamError::Body(error.to_string()),
            },
        ])
    }

    /// Stream `reply` word by word and finish with `stop`.
    pub fn canned_reply(reply: &str) -> MockConfig {
        let mut responses: Vec<_> = reply
            .split_inclusive(' ')
            .map(|word| MockResponse::Text {
                content: word.to_string(),
            })
            .collect();
        responses.push(MockResponse::Finish {
            reason: "stop".to_string(),
        });

        MockConfig::new().with_responses(responses)
    }
}
