//! Interactive chat loop and single-turn execution.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use sc_backend::mock::fixtures;
use sc_backend::{ChatClient, Connector, MockConnector};
use sc_protocol::{StreamError, StreamSignal};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

use crate::config::{Config, ConfigError};
use crate::conversation::Conversation;

const MOCK_REPLY: &str = "This is a canned reply from the offline mock backend.";

/// How one turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { finish_reason: Option<String> },
    Failed(StreamError),
    Cancelled,
}

/// Build the chat client: the real backend, or a canned mock when `mock`.
pub fn build_client(config: &Config, mock: bool) -> Result<ChatClient, ConfigError> {
    if mock {
        let connector = Arc::new(MockConnector::new(
            fixtures::canned_reply(MOCK_REPLY).with_chunk_delay(30),
        ));
        let client_config = config.backend.client_config("mock");
        return Ok(ChatClient::with_connector(
            client_config,
            connector as Arc<dyn Connector>,
        ));
    }

    let api_key = config.backend.resolve_api_key()?;
    Ok(ChatClient::new(config.backend.client_config(api_key))?)
}

/// Send `input` and stream the reply to `out` until it ends or `cancel`
/// resolves.
///
/// A completed reply is committed to `conversation`; on failure or
/// cancellation the user turn is rolled back. Dropping the signal stream on
/// cancellation closes the connection.
pub async fn run_turn<W, F>(
    client: &ChatClient,
    conversation: &mut Conversation,
    input: &str,
    out: &mut W,
    cancel: F,
) -> TurnOutcome
where
    W: Write,
    F: Future<Output = ()>,
{
    conversation.push_user(input);
    let mut signals = Box::pin(client.stream_completion(&conversation.request()));
    let mut cancel = std::pin::pin!(cancel);
    let mut reply = String::new();

    let outcome = loop {
        tokio::select! {
            _ = &mut cancel => break TurnOutcome::Cancelled,
            signal = signals.next() => match signal {
                Some(StreamSignal::Delta(text)) => {
                    let _ = write!(out, "{text}");
                    let _ = out.flush();
                    reply.push_str(&text);
                }
                Some(StreamSignal::Completed { finish_reason }) => {
                    break TurnOutcome::Completed { finish_reason };
                }
                Some(StreamSignal::Failed(e)) => break TurnOutcome::Failed(e),
                None => break TurnOutcome::Failed(StreamError::StreamFailure),
            },
        }
    };
    drop(signals);

    if !reply.is_empty() {
        let _ = writeln!(out);
        let _ = out.flush();
    }

    match &outcome {
        TurnOutcome::Completed { finish_reason } => {
            debug!(chars = reply.len(), finish_reason = ?finish_reason, "reply completed");
            conversation.commit_reply(reply);
        }
        TurnOutcome::Failed(_) | TurnOutcome::Cancelled => conversation.rollback_user(),
    }
    outcome
}

/// Resolves on Ctrl-C.
pub async fn ctrl_c() {
    let _ = tokio::signal::ctrl_c().await;
}

/// What a line of REPL input asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Quit,
    Reset,
    Empty,
    Message(&'a str),
}

pub fn parse_command(line: &str) -> Command<'_> {
    match line.trim() {
        "/quit" | "/exit" => Command::Quit,
        "/reset" => Command::Reset,
        "" => Command::Empty,
        text => Command::Message(text),
    }
}

/// Run the interactive loop over `input` until EOF, `/quit` or an
/// interrupt at the prompt.
///
/// Replies go to `out`, diagnostics to `err`. `interrupt` is awaited afresh
/// for every prompt and every reply: during a reply it cancels only that
/// reply, at an idle prompt it ends the session.
pub async fn run_repl<R, W, E, I, F>(
    client: &ChatClient,
    config: &Config,
    input: R,
    out: &mut W,
    err: &mut E,
    mut interrupt: I,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    E: Write,
    I: FnMut() -> F,
    F: Future<Output = ()>,
{
    let mut conversation = Conversation::new(
        config.chat.system_prompt.clone(),
        config.chat.max_history_messages,
    );
    let mut lines = input.lines();

    loop {
        write!(out, "> ")?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupt() => {
                debug!("interrupted at prompt");
                None
            }
        };
        let Some(line) = line else {
            writeln!(out)?;
            return Ok(());
        };

        match parse_command(&line) {
            Command::Quit => return Ok(()),
            Command::Reset => {
                conversation.reset();
                writeln!(err, "conversation cleared")?;
            }
            Command::Empty => {}
            Command::Message(text) => {
                match run_turn(client, &mut conversation, text, out, interrupt()).await {
                    TurnOutcome::Completed { .. } => {}
                    TurnOutcome::Failed(e) => writeln!(err, "error: {e}")?,
                    TurnOutcome::Cancelled => {
                        info!("reply cancelled");
                        writeln!(err, "(cancelled)")?;
                    }
                }
            }
        }
    }
}

/// Answer a single prompt and return the process exit code.
pub async fn run_once<W, E>(
    client: &ChatClient,
    config: &Config,
    prompt: &str,
    out: &mut W,
    err: &mut E,
) -> i32
where
    W: Write,
    E: Write,
{
    let mut conversation = Conversation::new(
        config.chat.system_prompt.clone(),
        config.chat.max_history_messages,
    );
    match run_turn(client, &mut conversation, prompt, out, ctrl_c()).await {
        TurnOutcome::Completed { .. } => 0,
        TurnOutcome::Failed(e) => {
            let _ = writeln!(err, "error: {e}");
            1
        }
        TurnOutcome::Cancelled => 130,
    }
}
