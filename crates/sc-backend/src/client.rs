//! Streaming chat-completion client.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use sc_protocol::{CompletionRequest, StreamError, StreamSignal};
use tracing::debug;

use crate::connector::{Connector, ReqwestConnector};
use crate::request::build_request;
use crate::signal::map_signals;
use crate::transport::{SseTransport, DEFAULT_CAPACITY};

/// Endpoint, credential and tuning for a [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full URL of the chat-completions endpoint.
    pub endpoint: String,
    /// Bearer credential.
    pub api_key: String,
    /// Model used when the request names none.
    pub default_model: Option<String>,
    /// Capacity of the transport channel.
    pub channel_capacity: usize,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            default_model: None,
            channel_capacity: DEFAULT_CAPACITY,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }
}

/// Chat-completion client.
pub struct ChatClient {
    config: ClientConfig,
    http: Client,
    transport: SseTransport,
}

impl ChatClient {
    /// Create a client talking to the network through `reqwest`.
    pub fn new(config: ClientConfig) -> Result<Self, StreamError> {
        let connector = ReqwestConnector::new(config.connect_timeout)?;
        let http = connector.client().clone();
        Ok(Self::build(config, http, Arc::new(connector)))
    }

    /// Create a client that opens connections through `connector`.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self::build(config, Client::new(), connector)
    }

    fn build(config: ClientConfig, http: Client, connector: Arc<dyn Connector>) -> Self {
        let transport = SseTransport::with_capacity(connector, config.channel_capacity);
        Self {
            config,
            http,
            transport,
        }
    }

    /// Stream a completion for `request`.
    ///
    /// The returned sequence is lazy: nothing is sent until it is polled.
    /// Dropping it at any point cancels the underlying connection.
    pub fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> impl Stream<Item = StreamSignal> + Send + 'static {
        let built = build_request(
            &self.http,
            &self.config.endpoint,
            &self.config.api_key,
            self.config.default_model.as_deref(),
            request,
        );
        let transport = self.transport.clone();

        stream! {
            let request = match built {
                Ok(request) => request,
                Err(e) => {
                    debug!(error = %e, "completion request rejected before sending");
                    yield StreamSignal::Failed(e);
                    return;
                }
            };

            let mut signals = Box::pin(map_signals(transport.connect(request)));
            while let Some(signal) = signals.next().await {
                yield signal;
            }
        }
    }
}

/// Drain a signal stream into the full reply text and finish reason.
pub async fn collect_text<S>(signals: S) -> Result<(String, Option<String>), StreamError>
where
    S: Stream<Item = StreamSignal>,
{
    let mut signals = std::pin::pin!(signals);
    let mut text = String::new();

    while let Some(signal) = signals.next().await {
        match signal {
            StreamSignal::Delta(delta) => text.push_str(&delta),
            StreamSignal::Completed { finish_reason } => return Ok((text, finish_reason)),
            StreamSignal::Failed(e) => return Err(e),
        }
    }

    Err(StreamError::StreamFailure)
}
