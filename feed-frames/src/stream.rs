//! Line reassembly over decoded text fragments.

use crate::decoder::Utf8Decoder;
use tracing::trace;

/// Accumulates text fragments and yields only complete lines.
///
/// The buffer never holds a complete line between calls: everything up to the last
/// `\n` is handed back, and only the trailing incomplete piece is retained.
#[derive(Debug, Default)]
pub struct LineReassembler {
    buffer: String,
}

impl LineReassembler {
    /// Creates an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Text received after the last line terminator.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Appends `fragment` and returns the lines it completed, in order.
    ///
    /// A `\r` directly before the terminator is stripped. Empty lines are returned as
    /// empty strings.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        if !fragment.contains('\n') {
            self.buffer.push_str(fragment);
            return Vec::new();
        }

        self.buffer.push_str(fragment);
        let split_at = match self.buffer.rfind('\n') {
            Some(index) => index + 1,
            None => return Vec::new(),
        };
        let rest = self.buffer.split_off(split_at);
        let complete = std::mem::replace(&mut self.buffer, rest);

        let lines: Vec<String> = complete
            .split_terminator('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();
        trace!(
            lines = lines.len(),
            retained = self.buffer.len(),
            "reassembled lines"
        );
        lines
    }

    /// Ends the stream, returning the unterminated remainder if there was one.
    ///
    /// The remainder is an incomplete frame; callers drop it.
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }
}

/// Byte-level front end: decodes chunks and reassembles them into lines.
///
/// One instance serves exactly one stream.
#[derive(Debug, Default)]
pub struct LineStream {
    decoder: Utf8Decoder,
    lines: LineReassembler,
}

impl LineStream {
    /// Creates a fresh decoder/reassembler pair.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw chunk and returns the complete lines it produced.
    pub fn write(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(chunk);
        self.lines.push(&text)
    }

    /// Bytes and characters received but not yet part of a complete line.
    pub fn buffered_len(&self) -> usize {
        self.lines.pending().len() + self.decoder.pending_len()
    }

    /// Finishes the stream and returns the discarded residual, if any.
    ///
    /// Bytes still held by the decoder are flushed first. They are an incomplete
    /// character, so they cannot complete a line.
    pub fn finish(mut self) -> Option<String> {
        let tail = self.decoder.finish();
        let mut lines = self.lines;
        if !tail.is_empty() {
            lines.push(&tail);
        }
        lines.finish()
    }
}

/// Convenience helper for in-memory feeds.
pub fn split_lines(feed: &[u8]) -> Vec<String> {
    let mut stream = LineStream::new();
    stream.write(feed)
}

#[cfg(test)]
mod tests {
    use super::{split_lines, LineReassembler, LineStream};
    use pretty_assertions::assert_eq;

    fn collect_chunked(feed: &[u8], boundaries: &[usize]) -> (Vec<String>, Option<String>) {
        let mut stream = LineStream::new();
        let mut lines = Vec::new();
        let mut start = 0;
        for &end in boundaries.iter().chain(std::iter::once(&feed.len())) {
            lines.extend(stream.write(&feed[start..end]));
            start = end;
        }
        (lines, stream.finish())
    }

    #[test]
    fn frame_split_across_fragments() {
        let mut lines = LineReassembler::new();
        assert!(lines.push("data: {\"nam").is_empty());
        assert_eq!(lines.pending(), "data: {\"nam");
        assert_eq!(
            lines.push("e\":\"Y\",\"rating\":5}\n"),
            vec!["data: {\"name\":\"Y\",\"rating\":5}".to_string()]
        );
        assert_eq!(lines.pending(), "");
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn several_frames_in_one_fragment() {
        let mut lines = LineReassembler::new();
        assert_eq!(
            lines.push("data: a\n\ndata: b\ndata: c"),
            vec![
                "data: a".to_string(),
                String::new(),
                "data: b".to_string()
            ]
        );
        assert_eq!(lines.finish(), Some("data: c".to_string()));
    }

    #[test]
    fn strips_carriage_return_before_terminator() {
        assert_eq!(
            split_lines(b"data: x\r\n\r\nid: 1\r\n"),
            vec!["data: x".to_string(), String::new(), "id: 1".to_string()]
        );
    }

    #[test]
    fn rechunking_never_changes_emitted_lines() {
        let feed = "event: product\ndata: {\"name\":\"Crème brûlée 🍮\",\"rating\":9}\n\ndata: {\"name\":\"Ω\"}\ndata: partial"
            .as_bytes();
        let expected = collect_chunked(feed, &[]);
        assert_eq!(expected.0.len(), 4);
        assert_eq!(expected.1.as_deref(), Some("data: partial"));

        for first in 0..=feed.len() {
            let actual = collect_chunked(feed, &[first]);
            assert_eq!(actual, expected, "boundary at {first}");
        }

        let byte_at_a_time: Vec<usize> = (1..feed.len()).collect();
        assert_eq!(collect_chunked(feed, &byte_at_a_time), expected);

        for width in [2usize, 3, 5, 7, 16] {
            let boundaries: Vec<usize> = (width..feed.len()).step_by(width).collect();
            assert_eq!(
                collect_chunked(feed, &boundaries),
                expected,
                "width {width}"
            );
        }
    }

    #[test]
    fn truncated_character_at_end_stays_in_residual() {
        let mut stream = LineStream::new();
        assert_eq!(stream.write(b"data: ok\ndata: \xE2\x98"), vec!["data: ok"]);
        assert_eq!(stream.buffered_len(), 8);
        assert_eq!(stream.finish(), Some("data: \u{FFFD}".to_string()));
    }
}
