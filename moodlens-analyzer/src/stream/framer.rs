//! Line framer for newline-delimited JSON
//!
//! Holds back the incomplete trailing fragment between reads so lines are
//! reassembled correctly however the chunk boundaries fall. Buffering is
//! done on bytes, so a multi-byte UTF-8 character split across chunks is
//! decoded only once its line is complete.

/// Decodes a chunked byte stream into complete, non-blank lines
#[derive(Debug, Default)]
pub struct LineFramer {
    pending_fragment: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes
    ///
    /// The segment after the last `\n` is retained for the next call.
    /// Blank and whitespace-only lines are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending_fragment.extend_from_slice(chunk);

        let Some(last_newline) = self.pending_fragment.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let remainder = self.pending_fragment.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending_fragment, remainder);

        complete
            .split(|&b| b == b'\n')
            .filter_map(decode_line)
            .collect()
    }

    /// Text convenience for [`feed`](Self::feed)
    pub fn feed_str(&mut self, chunk: &str) -> Vec<String> {
        self.feed(chunk.as_bytes())
    }

    /// Flush the unterminated fragment when the stream closes
    pub fn finish(&mut self) -> Option<String> {
        let fragment = std::mem::take(&mut self.pending_fragment);
        decode_line(&fragment)
    }

    /// Bytes held back waiting for a line separator
    pub fn pending_len(&self) -> usize {
        self.pending_fragment.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}
