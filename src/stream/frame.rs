//! Byte stream to protocol frames.
//!
//! Network reads land at arbitrary offsets: in the middle of a frame, a JSON
//! payload or a multi-byte character. The reader keeps whatever cannot be
//! decided yet and only hands out complete frames.

use tracing::debug;

/// Payload that ends a stream without a terminal event.
pub const DONE_SENTINEL: &str = "[DONE]";

/// How a backend delimits frames on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One `data:` line per frame, separated by `\n`.
    Lines,
    /// `\n`-separated lines where both `data: {...}` and bare `{...}` lines
    /// carry a payload.
    JsonLines,
    /// SSE blocks separated by `\n\n`; the `data:` lines of a block are joined.
    Blocks,
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental frame splitter.
#[derive(Debug)]
pub struct FrameReader {
    framing: Framing,
    utf8: Utf8Decoder,
    buffer: String,
}

impl FrameReader {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            utf8: Utf8Decoder::default(),
            buffer: String::new(),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Feed one network chunk and return every frame it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let text = self.utf8.decode(bytes);
        self.buffer.push_str(&text);
        if self.buffer.contains('\r') {
            // A lone trailing `\r` stays until its `\n` arrives.
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let delimiter = match self.framing {
            Framing::Lines | Framing::JsonLines => "\n",
            Framing::Blocks => "\n\n",
        };

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.buffer[consumed..].find(delimiter) {
            let raw = &self.buffer[consumed..consumed + pos];
            consumed += pos + delimiter.len();
            if let Some(payload) = self.payload(raw) {
                frames.push(if payload.trim() == DONE_SENTINEL {
                    Frame::Done
                } else {
                    Frame::Data(payload)
                });
            }
        }
        self.buffer.drain(..consumed);
        frames
    }

    /// Signal end of input. An unterminated remainder is never a frame.
    pub fn finish(&mut self) {
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        if !self.buffer.trim().is_empty() {
            debug!(
                remainder_len = self.buffer.len(),
                "Dropping unterminated frame at end of stream"
            );
        }
        self.buffer.clear();
    }

    fn payload(&self, raw: &str) -> Option<String> {
        match self.framing {
            Framing::Lines => data_field(raw).filter(|p| !p.is_empty()).map(str::to_string),
            Framing::JsonLines => {
                if let Some(data) = data_field(raw) {
                    return (!data.is_empty()).then(|| data.to_string());
                }
                let trimmed = raw.trim();
                trimmed.starts_with('{').then(|| trimmed.to_string())
            }
            Framing::Blocks => {
                let lines: Vec<&str> = raw.split('\n').filter_map(data_field).collect();
                if lines.is_empty() {
                    return None;
                }
                let joined = lines.join("\n");
                (!joined.trim().is_empty()).then_some(joined)
            }
        }
    }
}

/// Strip the `data:` field name and one optional space.
fn data_field(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    Some(rest.trim_end())
}

/// Stateful UTF-8 decoding across chunk boundaries.
///
/// Incomplete trailing sequences are carried over; invalid bytes become
/// U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    pub(crate) fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
