//! Stream decoding: frames in, canonical events out.
//!
//! A [`DecodeSession`] owns all per-stream state: the frame reader, one
//! backend decoder and the queue of events not yet handed to the consumer.
//! [`EventStream`] drives it from an async body, [`DecodeIter`] from chunks
//! already in memory.

pub mod accumulator;
pub mod collect;
pub mod finalize;
pub mod frame;
pub mod inline_tags;
pub mod reasoning;

pub use accumulator::{parse_arguments, CallKey, ToolCallAccumulator, ToolCallState};
pub use collect::StreamTextResult;
pub use finalize::{Finalizer, ReasonSource};
pub use frame::{Frame, FrameReader, Framing};
pub use inline_tags::{InlineSegment, InlineTagExtractor};
pub use reasoning::{ReasoningAccumulator, ReasoningKey};

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{BoxStream, Stream};
use futures::StreamExt;
use tracing::debug;

use crate::config::DecoderConfig;
use crate::error::SluiceError;
use crate::types::{Backend, StreamEvent};

/// Whether a decoder wants more frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// A terminal signal was seen. No further frames are read.
    Finish,
}

/// Backend-specific payload decoding.
///
/// `decode` sees one frame payload at a time. `finish` is called exactly once
/// when the stream ends normally (terminal signal, `[DONE]` or end of body)
/// and must flush open state and push the single `End`.
pub trait StreamDecoder: Send {
    fn backend(&self) -> Backend;

    fn framing(&self) -> Framing;

    fn decode(&mut self, payload: &str, out: &mut Vec<StreamEvent>) -> Flow;

    fn finish(&mut self, out: &mut Vec<StreamEvent>);
}

/// Report a payload that failed to parse. Decoding carries on.
pub(crate) fn malformed_frame(
    backend: Backend,
    payload: &str,
    err: serde_json::Error,
    out: &mut Vec<StreamEvent>,
) {
    tracing::warn!(%backend, error = %err, payload_len = payload.len(), "Malformed stream frame");
    out.push(StreamEvent::error(
        format!("malformed {backend} frame: {err}"),
        Some(SluiceError::Serialization(err)),
    ));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Reading,
    Finished,
}

/// Pull-based decode state machine.
pub struct DecodeSession {
    reader: FrameReader,
    decoder: Box<dyn StreamDecoder>,
    events: VecDeque<StreamEvent>,
    phase: Phase,
    debug_frames_left: usize,
}

impl DecodeSession {
    pub fn new(decoder: Box<dyn StreamDecoder>, config: &DecoderConfig) -> Self {
        debug!(backend = %decoder.backend(), "Opening decode session");
        Self {
            reader: FrameReader::new(decoder.framing()),
            decoder,
            events: VecDeque::new(),
            phase: Phase::Reading,
            debug_frames_left: if config.debug_frames {
                DecoderConfig::DEBUG_FRAME_LIMIT
            } else {
                0
            },
        }
    }

    pub fn backend(&self) -> Backend {
        self.decoder.backend()
    }

    /// Decode one network chunk. Ignored once the session finished.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.phase == Phase::Finished {
            return;
        }
        for frame in self.reader.push(chunk) {
            let flow = match frame {
                Frame::Data(payload) => {
                    if self.debug_frames_left > 0 {
                        self.debug_frames_left -= 1;
                        debug!(backend = %self.decoder.backend(), data = %payload, "Stream frame raw");
                    }
                    let mut out = Vec::new();
                    let flow = self.decoder.decode(&payload, &mut out);
                    self.events.extend(out);
                    flow
                }
                Frame::Done => {
                    debug!(backend = %self.decoder.backend(), "Stream sentinel received");
                    Flow::Finish
                }
            };
            if flow == Flow::Finish {
                self.finalize();
                return;
            }
        }
    }

    /// The body ended without a terminal signal.
    pub fn end_of_input(&mut self) {
        if self.phase == Phase::Finished {
            return;
        }
        self.reader.finish();
        self.finalize();
    }

    /// The body failed. Emits one `Error` and no `End`.
    pub fn fail(&mut self, error: SluiceError) {
        if self.phase == Phase::Finished {
            return;
        }
        debug!(backend = %self.decoder.backend(), error = %error, "Stream failed");
        self.events
            .push_back(StreamEvent::error(error.to_string(), Some(error)));
        self.phase = Phase::Finished;
    }

    pub fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.pop_front()
    }

    /// True once no more events will ever be queued.
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// True when every queued event has been taken and the session is done.
    pub fn is_exhausted(&self) -> bool {
        self.is_finished() && self.events.is_empty()
    }

    fn finalize(&mut self) {
        let mut out = Vec::new();
        self.decoder.finish(&mut out);
        self.events.extend(out);
        self.phase = Phase::Finished;
    }
}

/// Response body as a stream of byte chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, SluiceError>>;

/// Canonical events decoded lazily from a response body.
///
/// Nothing is read from the body until an event is requested, and the body
/// is dropped as soon as the session finishes.
pub struct EventStream {
    session: DecodeSession,
    body: Option<ByteStream>,
}

impl EventStream {
    pub fn new(body: ByteStream, decoder: Box<dyn StreamDecoder>, config: &DecoderConfig) -> Self {
        Self {
            session: DecodeSession::new(decoder, config),
            body: Some(body),
        }
    }

    /// A stream that yields a single `Error` and ends.
    pub fn failed(decoder: Box<dyn StreamDecoder>, error: SluiceError) -> Self {
        let mut session = DecodeSession::new(decoder, &DecoderConfig::default());
        session.fail(error);
        Self {
            session,
            body: None,
        }
    }

    pub fn backend(&self) -> Backend {
        self.session.backend()
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.session.next_event() {
                return Poll::Ready(Some(event));
            }
            if this.session.is_finished() {
                this.body = None;
                return Poll::Ready(None);
            }
            let Some(body) = this.body.as_mut() else {
                this.session.end_of_input();
                continue;
            };
            match body.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.session.feed(&chunk),
                Poll::Ready(Some(Err(err))) => {
                    this.body = None;
                    this.session.fail(err);
                }
                Poll::Ready(None) => {
                    this.body = None;
                    this.session.end_of_input();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Blocking counterpart of [`EventStream`] over chunks already in memory.
pub struct DecodeIter<I> {
    session: DecodeSession,
    chunks: I,
}

impl<I> DecodeIter<I> {
    pub fn new<C>(chunks: C, decoder: Box<dyn StreamDecoder>, config: &DecoderConfig) -> Self
    where
        C: IntoIterator<IntoIter = I>,
    {
        Self {
            session: DecodeSession::new(decoder, config),
            chunks: chunks.into_iter(),
        }
    }
}

impl<I, B> Iterator for DecodeIter<I>
where
    I: Iterator<Item = B>,
    B: AsRef<[u8]>,
{
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.session.next_event() {
                return Some(event);
            }
            if self.session.is_finished() {
                return None;
            }
            match self.chunks.next() {
                Some(chunk) => self.session.feed(chunk.as_ref()),
                None => self.session.end_of_input(),
            }
        }
    }
}
