//! Reasoning hidden inside visible text as `<think>...</think>` spans.
//!
//! Tags may be split across deltas, so anything that could still turn into a
//! tag is held back until the next push decides it.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SluiceError};

/// Tag names recognized when none are configured.
pub const DEFAULT_REASONING_TAGS: [&str; 3] = ["think", "thinking", "reasoning"];

static DEFAULT_OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(think|thinking|reasoning)>").expect("default reasoning tag regex must compile")
});

/// A piece of content after tag extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineSegment {
    Visible(String),
    Reasoning(String),
}

/// An opened tag whose close has not arrived. `pending` starts at the open
/// tag while a span is open.
#[derive(Debug)]
struct OpenSpan {
    close: String,
    body_start: usize,
    /// Bytes of `pending` already searched for `close`.
    scanned: usize,
}

impl OpenSpan {
    /// Where the next close search starts. Backs up far enough to catch a
    /// close tag split across the previous push.
    fn resume_at(&self, pending: &str) -> usize {
        let mut from = self
            .scanned
            .saturating_sub(self.close.len() - 1)
            .max(self.body_start);
        while !pending.is_char_boundary(from) {
            from -= 1;
        }
        from
    }
}

#[derive(Debug)]
pub struct InlineTagExtractor {
    tags: Vec<String>,
    open_tag: Regex,
    pending: String,
    open: Option<OpenSpan>,
    suppress_leading_ws: bool,
}

impl InlineTagExtractor {
    pub fn new<S: AsRef<str>>(tags: &[S]) -> Result<Self> {
        let tags: Vec<String> = tags
            .iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tags.is_empty() {
            return Err(SluiceError::Configuration(
                "at least one reasoning tag name is required".into(),
            ));
        }
        let alternation = tags
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let open_tag = Regex::new(&format!("<({alternation})>"))
            .map_err(|e| SluiceError::Configuration(format!("invalid reasoning tag: {e}")))?;
        Ok(Self {
            tags,
            open_tag,
            pending: String::new(),
            open: None,
            suppress_leading_ws: false,
        })
    }

    pub fn with_default_tags() -> Self {
        Self {
            tags: DEFAULT_REASONING_TAGS.map(String::from).to_vec(),
            open_tag: DEFAULT_OPEN_TAG.clone(),
            pending: String::new(),
            open: None,
            suppress_leading_ws: false,
        }
    }

    /// Append text and return everything that can be decided so far.
    pub fn push(&mut self, text: &str) -> Vec<InlineSegment> {
        self.pending.push_str(text);
        let mut segments = Vec::new();

        loop {
            let span = match self.open.take() {
                Some(span) => span,
                None => {
                    let Some((start, body_start, tag)) = self.next_open_tag() else {
                        let safe = self.safe_prefix_len();
                        let visible: String = self.pending.drain(..safe).collect();
                        self.emit_visible(&visible, &mut segments);
                        break;
                    };
                    let before: String = self.pending.drain(..start).collect();
                    self.emit_visible(&before, &mut segments);
                    let body_start = body_start - start;
                    OpenSpan {
                        close: format!("</{tag}>"),
                        body_start,
                        scanned: body_start,
                    }
                }
            };

            let from = span.resume_at(&self.pending);
            let Some(close_at) = self.pending[from..].find(&span.close) else {
                self.open = Some(OpenSpan {
                    scanned: self.pending.len(),
                    ..span
                });
                break;
            };
            let body_end = from + close_at;
            let reasoning = self.pending[span.body_start..body_end].trim().to_string();
            if !reasoning.is_empty() {
                segments.push(InlineSegment::Reasoning(reasoning));
            }
            self.suppress_leading_ws = true;
            self.pending.drain(..body_end + span.close.len());
        }

        segments
    }

    /// Flush whatever is held back, tags complete or not.
    pub fn finish(&mut self) -> Vec<InlineSegment> {
        let mut segments = Vec::new();
        let pending = std::mem::take(&mut self.pending);
        match self.open.take() {
            Some(span) => {
                let body = &pending[span.body_start..];
                let reasoning = strip_partial_suffix(body, &span.close).trim();
                if !reasoning.is_empty() {
                    segments.push(InlineSegment::Reasoning(reasoning.to_string()));
                }
            }
            None => self.emit_visible(&pending, &mut segments),
        }
        segments
    }

    fn next_open_tag(&self) -> Option<(usize, usize, String)> {
        let caps = self.open_tag.captures(&self.pending)?;
        let whole = caps.get(0)?;
        let name = caps.get(1)?.as_str().to_string();
        Some((whole.start(), whole.end(), name))
    }

    /// Length of the prefix that cannot be the start of a tag.
    fn safe_prefix_len(&self) -> usize {
        let Some(lt) = self.pending.rfind('<') else {
            return self.pending.len();
        };
        let suffix = &self.pending[lt..];
        if suffix.contains('>') {
            return self.pending.len();
        }
        let partial_close = suffix.starts_with("</");
        let partial_open = self
            .tags
            .iter()
            .any(|tag| format!("<{tag}>").starts_with(suffix));
        if partial_close || partial_open {
            lt
        } else {
            self.pending.len()
        }
    }

    fn emit_visible(&mut self, text: &str, segments: &mut Vec<InlineSegment>) {
        let text = if self.suppress_leading_ws {
            text.trim_start()
        } else {
            text
        };
        if text.is_empty() {
            return;
        }
        self.suppress_leading_ws = false;
        segments.push(InlineSegment::Visible(text.to_string()));
    }
}

/// Drop a trailing piece of `text` that is a proper prefix of `tag`.
fn strip_partial_suffix<'a>(text: &'a str, tag: &str) -> &'a str {
    let longest = tag
        .char_indices()
        .skip(1)
        .map(|(at, _)| at)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .find(|&at| text.ends_with(&tag[..at]));
    match longest {
        Some(at) => &text[..text.len() - at],
        None => text,
    }
}

impl Default for InlineTagExtractor {
    fn default() -> Self {
        Self::with_default_tags()
    }
}
