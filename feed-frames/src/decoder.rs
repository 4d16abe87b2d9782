//! Incremental UTF-8 decoding for chunked byte streams.

use std::char::REPLACEMENT_CHARACTER;
use std::mem;

/// Decodes UTF-8 text from byte chunks whose boundaries may fall inside a character.
///
/// Incomplete sequences at the end of a chunk are held back and completed by the next
/// chunk. Invalid sequences decode to U+FFFD rather than failing.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Creates a decoder with no carried-over bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes held back waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Decodes `chunk`, returning every complete character seen so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut out = String::with_capacity(chunk.len() + self.pending.len());
        if self.pending.is_empty() {
            self.decode_into(chunk, &mut out);
        } else {
            let mut joined = mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            self.decode_into(&joined, &mut out);
        }
        out
    }

    /// Flushes any held-back bytes at end of stream.
    ///
    /// A truncated trailing sequence becomes a replacement character instead of
    /// being dropped.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = mem::take(&mut self.pending);
        String::from_utf8_lossy(&tail).into_owned()
    }

    fn decode_into(&mut self, mut input: &[u8], out: &mut String) {
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(invalid) => {
                            out.push(REPLACEMENT_CHARACTER);
                            input = &rest[invalid..];
                        }
                        None => {
                            self.pending.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }
}
