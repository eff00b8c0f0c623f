//! Opening the streaming HTTP connection.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use reqwest::Client;
use sc_protocol::StreamError;

/// Response body of an open connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Sends a fully formed request and hands back the streaming body.
///
/// Dropping the returned [`ByteStream`] must close the connection.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, request: reqwest::Request) -> BoxFuture<'static, Result<ByteStream, StreamError>>;
}

/// [`Connector`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct ReqwestConnector {
    http: Client,
}

impl ReqwestConnector {
    /// Build a connector with the given connect timeout.
    ///
    /// No overall timeout is set: a streamed completion may run for minutes.
    pub fn new(connect_timeout: Duration) -> Result<Self, StreamError> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        Ok(Self { http })
    }

    /// Client used to build requests for this connector.
    pub fn client(&self) -> &Client {
        &self.http
    }
}

impl Connector for ReqwestConnector {
    fn open(&self, request: reqwest::Request) -> BoxFuture<'static, Result<ByteStream, StreamError>> {
        let http = self.http.clone();
        Box::pin(async move {
            let response = http
                .execute(request)
                .await
                .map_err(|e| StreamError::Connect(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(StreamError::Status { status, body });
            }

            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| StreamError::Body(e.to_string())));
            Ok(Box::pin(body) as ByteStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_connector_does_not_fail() {
        assert!(ReqwestConnector::new(Duration::from_secs(10)).is_ok());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connect_error() {
        let connector = ReqwestConnector::new(Duration::from_millis(200)).unwrap();
        let request = connector
            .client()
            .post("http://127.0.0.1:9/v1/chat/completions")
            .build()
            .unwrap();

        match connector.open(request).await {
            Err(StreamError::Connect(_)) => {}
            Err(other) => panic!("expected connect error, got {other:?}"),
            Ok(_) => panic!("expected connect error, got a body"),
        }
    }
}
