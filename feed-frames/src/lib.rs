//! Reassemble line-framed event feeds from chunked byte streams.
//!
//! Network transports hand over bytes in whatever pieces they like: a chunk can end
//! in the middle of a UTF-8 character or halfway through a line. This crate turns
//! such a sequence back into complete lines and classifies each line as an
//! event-stream frame. Only `data:` frames carry a payload; every other field is
//! reported as [`Frame::Other`] so that consumers can skip it.

use serde::Serialize;

mod decoder;
mod stream;

pub use decoder::Utf8Decoder;
pub use stream::{split_lines, LineReassembler, LineStream};

/// Marker that introduces a payload-carrying frame.
pub const DATA_MARKER: &str = "data:";

/// One complete line of a feed, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Frame<'a> {
    /// Whitespace-only line.
    Blank,
    /// A `data:` line; holds the trimmed remainder after the marker, possibly empty.
    Data(&'a str),
    /// Any other non-blank line (`event:`, `id:`, comments, unknown fields).
    Other(&'a str),
}

impl<'a> Frame<'a> {
    /// Classifies a complete line.
    pub fn classify(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Frame::Blank;
        }
        match trimmed.strip_prefix(DATA_MARKER) {
            Some(rest) => Frame::Data(rest.trim()),
            None => Frame::Other(trimmed),
        }
    }

    /// The payload of a non-empty `data:` frame.
    pub fn payload(&self) -> Option<&'a str> {
        match *self {
            Frame::Data(payload) if !payload.is_empty() => Some(payload),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{split_lines, Frame};
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_frames() {
        assert_eq!(Frame::classify("   \t"), Frame::Blank);
        assert_eq!(
            Frame::classify("  data:  {\"name\":\"X\"}  "),
            Frame::Data("{\"name\":\"X\"}")
        );
        assert_eq!(Frame::classify("data:"), Frame::Data(""));
        assert_eq!(Frame::classify("event: product"), Frame::Other("event: product"));
        assert_eq!(Frame::classify(": keep-alive"), Frame::Other(": keep-alive"));
        assert_eq!(Frame::classify("Data: x"), Frame::Other("Data: x"));
    }

    #[test]
    fn payload_only_for_non_empty_data() {
        assert_eq!(Frame::classify("data: 1").payload(), Some("1"));
        assert_eq!(Frame::classify("data:   ").payload(), None);
        assert_eq!(Frame::classify("retry: 10").payload(), None);
        assert_eq!(Frame::Blank.payload(), None);
    }

    #[test]
    fn serializes_kind_and_text() {
        assert_eq!(
            serde_json::to_value(Frame::Data("{}")).expect("json"),
            serde_json::json!({"kind": "data", "text": "{}"})
        );
        assert_eq!(
            serde_json::to_value(Frame::Other("id: 7")).expect("json"),
            serde_json::json!({"kind": "other", "text": "id: 7"})
        );
    }

    #[test]
    fn in_memory_feed_yields_payloads() {
        let feed = b"event: product\ndata: {\"a\":1}\n\ndata: {\"b\":2}\ndata: {\"c\"";
        let payloads: Vec<String> = split_lines(feed)
            .iter()
            .filter_map(|line| Frame::classify(line).payload().map(str::to_string))
            .collect();
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
    }
}
