//! SSE transport: one request, one connection, one ordered event sequence.
//!
//! A producer task owns the connection and pushes [`TransportEvent`]s into a
//! bounded channel; [`TransportEvents`] is the single consumer. The task is
//! spawned on first poll, so nothing touches the network until someone
//! consumes. The response body lives in a slot shared with the consumer, so
//! dropping the consumer closes the socket before `drop` returns; the task
//! itself is aborted alongside.

use std::future::poll_fn;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use sc_protocol::StreamError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connector::{ByteStream, Connector};
use crate::sse::{parse_sse_stream, SseEvent, SseStream};

/// Default capacity of the channel between producer and consumer.
pub const DEFAULT_CAPACITY: usize = 64;

/// One occurrence on the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The server accepted the request and the body is streaming.
    Opened,
    /// One SSE frame with its payload still undecoded.
    Event {
        event_type: Option<String>,
        data: String,
    },
    /// The server ended the body.
    Closed,
    /// The transport failed.
    Error(StreamError),
}

impl TransportEvent {
    /// `Closed` and `Error` end the sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Closed | TransportEvent::Error(_))
    }
}

/// Opens SSE connections through a [`Connector`].
#[derive(Clone)]
pub struct SseTransport {
    connector: Arc<dyn Connector>,
    capacity: usize,
}

impl SseTransport {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_capacity(connector, DEFAULT_CAPACITY)
    }

    /// `capacity` is clamped to at least 1.
    pub fn with_capacity(connector: Arc<dyn Connector>, capacity: usize) -> Self {
        Self {
            connector,
            capacity: capacity.max(1),
        }
    }

    /// Describe a connection for `request`. Nothing is sent until the
    /// returned stream is first polled.
    ///
    /// Polling requires a Tokio runtime.
    pub fn connect(&self, request: reqwest::Request) -> TransportEvents {
        TransportEvents {
            state: State::Idle {
                connector: Arc::clone(&self.connector),
                request,
            },
            capacity: self.capacity,
            connection: Connection {
                task: None,
                body: BodySlot::default(),
            },
        }
    }
}

enum State {
    Idle {
        connector: Arc<dyn Connector>,
        request: reqwest::Request,
    },
    Streaming(mpsc::Receiver<TransportEvent>),
    Finished,
}

#[derive(Default)]
enum Slot {
    #[default]
    Connecting,
    Open(SseStream<ByteStream>),
    Released,
}

/// Response body shared by the producer task and the [`Connection`] guard.
///
/// The producer only holds the lock for the duration of a single poll, so
/// the guard can always take the body out and drop it synchronously.
#[derive(Clone, Default)]
struct BodySlot(Arc<Mutex<Slot>>);

impl BodySlot {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A producer that panicked mid-poll must not prevent teardown.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `body`. Returns false if the connection was released while it
    /// was being opened; `body` is dropped in that case.
    fn fill(&self, body: ByteStream) -> bool {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Released) {
            return false;
        }
        *slot = Slot::Open(parse_sse_stream(body));
        true
    }

    fn poll_frame(&self, cx: &mut Context<'_>) -> Poll<Option<Result<SseEvent, StreamError>>> {
        match &mut *self.lock() {
            Slot::Open(frames) => frames.poll_next_unpin(cx),
            Slot::Connecting | Slot::Released => Poll::Ready(None),
        }
    }

    /// Drop the body in place. Returns whether one was still open.
    fn release(&self) -> bool {
        let previous = std::mem::replace(&mut *self.lock(), Slot::Released);
        matches!(previous, Slot::Open(_))
    }
}

/// Ownership of the producer task and its body. Released at most once.
struct Connection {
    task: Option<JoinHandle<()>>,
    body: BodySlot,
}

impl Connection {
    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let closed_body = self.body.release();
            debug!(closed_body, "SSE connection released");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

/// Cold, single-consumer sequence of [`TransportEvent`]s.
///
/// Yields `Opened` before any `Event`, and ends right after the first
/// `Closed` or `Error`.
pub struct TransportEvents {
    state: State,
    capacity: usize,
    connection: Connection,
}

impl TransportEvents {
    fn start(&mut self) {
        let State::Idle { connector, request } =
            std::mem::replace(&mut self.state, State::Finished)
        else {
            return;
        };

        let (tx, rx) = mpsc::channel(self.capacity);
        debug!(url = %request.url(), "opening SSE connection");
        let body = self.connection.body.clone();
        self.connection.task = Some(tokio::spawn(produce(connector, request, body, tx)));
        self.state = State::Streaming(rx);
    }

    fn finish(&mut self) {
        self.state = State::Finished;
        self.connection.release();
    }

    /// Stop consuming and tear the connection down. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        self.finish();
    }
}

impl Stream for TransportEvents {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if matches!(this.state, State::Idle { .. }) {
            this.start();
        }

        let State::Streaming(rx) = &mut this.state else {
            return Poll::Ready(None);
        };

        match rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finish();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                // The producer always sends a terminal event before it exits,
                // so a closed channel means it died.
                this.finish();
                Poll::Ready(Some(TransportEvent::Error(StreamError::StreamFailure)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Producer side. Every send awaits channel capacity; a failed send means the
/// consumer is gone and has already dropped the body.
async fn produce(
    connector: Arc<dyn Connector>,
    request: reqwest::Request,
    body: BodySlot,
    tx: mpsc::Sender<TransportEvent>,
) {
    match connector.open(request).await {
        Ok(stream) => {
            if !body.fill(stream) {
                return;
            }
        }
        Err(e) => {
            warn!(error = %e, "SSE connection failed");
            let _ = tx.send(TransportEvent::Error(e)).await;
            return;
        }
    }

    if tx.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    let mut count = 0usize;
    while let Some(frame) = poll_fn(|cx| body.poll_frame(cx)).await {
        let event = match frame {
            Ok(frame) => TransportEvent::Event {
                event_type: frame.event_type,
                data: frame.data,
            },
            Err(e) => {
                warn!(error = %e, frames = count, "SSE stream failed");
                body.release();
                let _ = tx.send(TransportEvent::Error(e)).await;
                return;
            }
        };
        count += 1;
        if tx.send(event).await.is_err() {
            debug!(frames = count, "SSE consumer went away");
            return;
        }
    }

    debug!(frames = count, "SSE stream closed by server");
    body.release();
    let _ = tx.send(TransportEvent::Closed).await;
}
