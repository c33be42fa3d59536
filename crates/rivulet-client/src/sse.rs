//! Server-Sent Events (SSE) parser.
//!
//! Turns raw body chunks into parser directives: finalized events, last-event-id
//! updates and reconnection-delay overrides. Chunks may split a codepoint, a
//! line, or a whole event at any byte; the directives produced are the same
//! regardless of how the stream is fragmented.

use std::time::Duration;

use rivulet_types::{EventSourceError, MESSAGE_EVENT};

use crate::decoder::Utf8Decoder;

/// A data-bearing event finalized at a blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: String,
    pub data: String,
}

/// Output of the parser, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseDirective {
    /// An event is ready for dispatch.
    Dispatch(SseEvent),
    /// The connection's last event id changes (`None` clears it).
    LastEventId(Option<String>),
    /// The server asked for a different reconnection delay.
    Retry(Duration),
}

/// Buffers decoded text and hands out complete, line-feed terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and return every line it completes, without terminators.
    ///
    /// Text after the last line feed stays buffered. When the input ends
    /// exactly on a line feed the buffer is left empty.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete[..last_newline]
            .split('\n')
            .map(str::to_owned)
            .collect()
    }

    /// The incomplete trailing fragment, if any.
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

/// Classification of a single complete line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Empty after trimming: an event boundary.
    Blank,
    /// Starts with `:`.
    Comment,
    Field { name: &'a str, value: &'a str },
    /// No `:` at all. Not an error, just skipped.
    Malformed,
}

/// Classify a line. Surrounding whitespace is trimmed from the line and from
/// the field value.
pub fn parse_line(line: &str) -> SseLine<'_> {
    let line = line.trim();
    if line.is_empty() {
        return SseLine::Blank;
    }

    let Some((name, value)) = line.split_once(':') else {
        return SseLine::Malformed;
    };

    if name.is_empty() {
        return SseLine::Comment;
    }

    SseLine::Field {
        name,
        value: value.trim(),
    }
}

/// Parse a `retry:` value as a signed base-10 integer of milliseconds.
///
/// An optional sign and the leading digits are used and anything after them
/// is ignored, so `"250ms"` yields 250. Negative values clamp to zero and
/// values too large for `u64` saturate. Values without leading digits are
/// rejected.
fn parse_retry(value: &str) -> Option<Duration> {
    let (negative, unsigned) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let digits = &unsigned[..end];
    if digits.is_empty() {
        return None;
    }
    if negative {
        return Some(Duration::ZERO);
    }
    Some(Duration::from_millis(digits.parse().unwrap_or(u64::MAX)))
}

/// Accumulates the fields of the event currently being built.
#[derive(Debug)]
pub struct EventAssembler {
    data: Vec<String>,
    event_type: String,
}

impl Default for EventAssembler {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            event_type: MESSAGE_EVENT.to_string(),
        }
    }
}

impl EventAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one classified line, returning a directive if it produced one.
    pub fn apply(&mut self, line: SseLine<'_>) -> Option<SseDirective> {
        match line {
            SseLine::Blank => self.finish().map(SseDirective::Dispatch),
            SseLine::Comment | SseLine::Malformed => None,
            SseLine::Field { name, value } => self.apply_field(name, value),
        }
    }

    fn apply_field(&mut self, name: &str, value: &str) -> Option<SseDirective> {
        match name {
            "event" => {
                self.event_type = value.to_string();
                None
            }
            "data" => {
                if !value.is_empty() {
                    self.data.push(value.to_string());
                }
                None
            }
            "id" => {
                if value.contains('\0') {
                    return None;
                }
                let id = (!value.is_empty()).then(|| value.to_string());
                Some(SseDirective::LastEventId(id))
            }
            "retry" => parse_retry(value).map(SseDirective::Retry),
            _ => None,
        }
    }

    /// Finalize the in-progress event, if it has any data, and reset.
    fn finish(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        let event_type = std::mem::replace(&mut self.event_type, MESSAGE_EVENT.to_string());
        Some(SseEvent { event_type, data })
    }

    /// Number of data lines accumulated for the current event.
    pub fn pending_data_lines(&self) -> usize {
        self.data.len()
    }
}

/// Incremental SSE parser that processes bytes into directives.
#[derive(Debug, Default)]
pub struct SseParser {
    decoder: Utf8Decoder,
    lines: LineBuffer,
    assembler: EventAssembler,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw bytes and return any directives it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseDirective>, EventSourceError> {
        let text = self.decoder.decode(chunk)?;
        Ok(self.feed_str(&text))
    }

    /// Feed already-decoded text.
    pub fn feed_str(&mut self, text: &str) -> Vec<SseDirective> {
        self.lines
            .push(text)
            .iter()
            .filter_map(|line| {
                let parsed = parse_line(line);
                if let SseLine::Field { name, value } = parsed {
                    tracing::trace!(field = name, value, "Processing line");
                }
                self.assembler.apply(parsed)
            })
            .collect()
    }
}
