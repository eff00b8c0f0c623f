//! sc-core: Terminal chat client for streamchat.
//!
//! Configuration, logging setup, conversation state and the interactive
//! loop. Exposed as a library for integration testing.

pub mod config;
pub mod conversation;
pub mod logging;
pub mod repl;
