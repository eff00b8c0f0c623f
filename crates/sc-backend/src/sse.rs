//! Server-Sent Events (SSE) frame parser.
//!
//! Turns a chunked byte stream into discrete `event`/`data` frames following
//! the W3C event-stream format. Lines are buffered as raw bytes and decoded
//! only once complete, so a UTF-8 sequence split across two network chunks
//! survives intact.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:` field). None if not specified.
    pub event_type: Option<String>,
    /// All `data:` lines of the frame joined with `\n`.
    pub data: String,
}

#[derive(Default)]
struct FrameBuilder {
    /// Bytes of the line currently being received.
    line_buf: Vec<u8>,
    event_type: Option<String>,
    data: Vec<String>,
}

impl FrameBuilder {
    /// Split `bytes` into lines, pushing every completed frame onto `out`.
    fn feed(&mut self, mut bytes: &[u8], out: &mut VecDeque<SseEvent>) {
        while let Some(pos) = bytes.iter().position(|&b| b == b'\n') {
            self.line_buf.extend_from_slice(&bytes[..pos]);
            bytes = &bytes[pos + 1..];

            let mut line = std::mem::take(&mut self.line_buf);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.process_line(&String::from_utf8_lossy(&line)) {
                out.push_back(event);
            }
        }
        self.line_buf.extend_from_slice(bytes);
    }

    /// Flush whatever is left once the body has ended.
    fn finish(&mut self) -> Option<SseEvent> {
        if !self.line_buf.is_empty() {
            let mut line = std::mem::take(&mut self.line_buf);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.process_line(&String::from_utf8_lossy(&line)) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id, retry and unknown fields carry nothing we surface
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            // A frame with no data is dropped together with its type.
            self.event_type = None;
            return None;
        }
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data.join("\n"),
        };
        self.data.clear();
        Some(event)
    }
}

/// Stream adapter yielding [`SseEvent`]s from a byte stream.
///
/// Errors from the inner stream are passed through as-is; the caller decides
/// whether to keep polling.
pub struct SseStream<S> {
    inner: S,
    frames: FrameBuilder,
    pending: VecDeque<SseEvent>,
    exhausted: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            frames: FrameBuilder::default(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<SseEvent, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.exhausted {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.frames.feed(&bytes, &mut this.pending);
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    this.exhausted = true;
                    if let Some(event) = this.frames.finish() {
                        this.pending.push_back(event);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Create an SSE stream from a byte stream.
pub fn parse_sse_stream<S, E>(stream: S) -> SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    SseStream::new(stream)
}
