//! sc-backend: Streaming chat-completion pipeline.
//!
//! Bytes from a long-lived HTTP response are parsed into SSE frames by
//! [`sse`], surfaced as [`transport::TransportEvent`]s through a bounded
//! channel, decoded by [`chunk`] and folded into
//! [`sc_protocol::StreamSignal`]s by [`signal`]. [`client::ChatClient`]
//! wires the stages together.

pub mod chunk;
pub mod client;
pub mod connector;
pub mod mock;
pub mod request;
pub mod signal;
pub mod sse;
pub mod transport;

pub use client::{collect_text, ChatClient, ClientConfig};
pub use connector::{ByteStream, Connector, ReqwestConnector};
pub use mock::{MockConfig, MockConnector, MockResponse};
pub use transport::{SseTransport, TransportEvent, TransportEvents};
