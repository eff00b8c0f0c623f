//! Folding transport events into stream signals.
//!
//! Maps each [`TransportEvent`] on its own, then stops reading upstream as
//! soon as a terminal signal has been produced. Stopping drops the upstream
//! sequence, which releases its connection.

use async_stream::stream;
use futures::{Stream, StreamExt};
use sc_protocol::StreamSignal;
use tracing::trace;

use crate::chunk::{decode, is_done};
use crate::transport::TransportEvent;

/// Result of mapping a single transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapped {
    /// Nothing user-visible.
    Skip,
    /// A non-terminal signal.
    Emit(StreamSignal),
    /// A terminal signal; nothing may follow it.
    Finish(StreamSignal),
}

/// Map one transport event. Pure: the only state across events is "already
/// finished", which [`map_signals`] enforces.
pub fn map_event(event: TransportEvent) -> Mapped {
    match event {
        TransportEvent::Opened => Mapped::Skip,
        TransportEvent::Event { data, .. } => map_payload(&data),
        TransportEvent::Closed => Mapped::Finish(StreamSignal::completed(None)),
        TransportEvent::Error(cause) => Mapped::Finish(StreamSignal::Failed(cause)),
    }
}

fn map_payload(data: &str) -> Mapped {
    if is_done(data) {
        return Mapped::Finish(StreamSignal::completed(None));
    }

    let Some(chunk) = decode(data) else {
        trace!(payload = data, "skipping undecodable frame");
        return Mapped::Skip;
    };
    let Some(choice) = chunk.first_choice() else {
        return Mapped::Skip;
    };

    if let Some(reason) = choice.finish_reason() {
        return Mapped::Finish(StreamSignal::completed(Some(reason.to_string())));
    }
    match choice.content() {
        Some(text) => Mapped::Emit(StreamSignal::Delta(text.to_string())),
        None => Mapped::Skip,
    }
}

/// Turn a transport event sequence into a signal sequence.
///
/// The result preserves source order, never duplicates, and ends with
/// exactly one `Completed` or `Failed` whenever upstream produces a terminal
/// event.
pub fn map_signals<S>(events: S) -> impl Stream<Item = StreamSignal> + Send + 'static
where
    S: Stream<Item = TransportEvent> + Send + Unpin + 'static,
{
    stream! {
        let mut events = events;
        while let Some(event) = events.next().await {
            match map_event(event) {
                Mapped::Skip => {}
                Mapped::Emit(signal) => yield signal,
                Mapped::Finish(signal) => {
                    drop(events);
                    yield signal;
                    return;
                }
            }
        }
    }
}
