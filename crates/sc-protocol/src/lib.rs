//! sc-protocol: Shared types for the streamchat client.
//!
//! This crate defines the request shape handed to the streaming backend
//! and the signals the backend hands back to the caller.

pub mod message;
pub mod request;

pub use message::{StreamError, StreamSignal};
pub use request::{ChatMessage, CompletionRequest, Role};
