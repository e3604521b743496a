//! Bounded output accumulator for a task's final result

pub use relay_foundation::DEFAULT_MAX_OUTPUT_LEN as MAX_OUTPUT_LEN;

/// Append-only text chunks with a character cap.
///
/// Once the running length reaches the cap further chunks are dropped, so
/// memory stays bounded however verbose the agent is. Lengths are counted in
/// characters, not bytes, so truncation never splits a code point.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    chunks: Vec<String>,
    len: usize,
    max_len: usize,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::with_max_len(MAX_OUTPUT_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            chunks: Vec::new(),
            len: 0,
            max_len,
        }
    }

    /// Add a chunk if the buffer is still below its cap.
    ///
    /// Returns whether the chunk was kept.
    pub fn append(&mut self, text: &str) -> bool {
        if self.len >= self.max_len {
            return false;
        }
        self.len += text.chars().count();
        self.chunks.push(text.to_string());
        true
    }

    /// Join chunks with newlines, hard-truncated to the cap with a marker
    /// stating how many characters were elided.
    pub fn collect(&self) -> String {
        let joined = self.chunks.join("\n");
        let total = joined.chars().count();
        if total <= self.max_len {
            return joined;
        }

        let cut = joined
            .char_indices()
            .nth(self.max_len)
            .map(|(idx, _)| idx)
            .unwrap_or(joined.len());
        format!(
            "{}\n... (truncated, {} more chars)",
            &joined[..cut],
            total - self.max_len
        )
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    /// Characters accepted so far (before joining)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_joins_with_newlines() {
        let mut buf = OutputBuffer::new();
        buf.append("first");
        buf.append("second");
        assert_eq!(buf.collect(), "first\nsecond");
        assert_eq!(buf.collect(), buf.collect());
    }

    #[test]
    fn test_append_beyond_cap_is_noop() {
        let mut buf = OutputBuffer::new();
        let large = "x".repeat(MAX_OUTPUT_LEN + 100);

        // The first append is accepted because the buffer was below the cap
        assert!(buf.append(&large));
        assert_eq!(buf.chunks().len(), 1);

        assert!(!buf.append("more text"));
        assert_eq!(buf.chunks(), &[large]);
    }

    #[test]
    fn test_collect_truncates_with_marker() {
        let mut buf = OutputBuffer::new();
        buf.append(&"x".repeat(MAX_OUTPUT_LEN + 500));

        let result = buf.collect();
        let marker = "\n... (truncated, 500 more chars)";
        assert!(result.ends_with(marker));
        assert_eq!(result.chars().count(), MAX_OUTPUT_LEN + marker.chars().count());
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut buf = OutputBuffer::with_max_len(3);
        buf.append("héllo");
        assert_eq!(buf.collect(), "hél\n... (truncated, 2 more chars)");
    }

    #[test]
    fn test_separators_count_toward_cap() {
        let mut buf = OutputBuffer::with_max_len(10);
        buf.append("aaaaa");
        buf.append("bbbb");
        // 9 characters of chunks, 10 joined: exactly at the cap
        assert_eq!(buf.collect(), "aaaaa\nbbbb");

        buf.append("c");
        assert_eq!(buf.collect(), "aaaaa\nbbbb\n... (truncated, 2 more chars)");
    }
}
