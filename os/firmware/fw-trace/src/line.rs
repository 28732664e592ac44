use core::fmt;

/// Longest line forwarded to a [`TraceSink`](crate::TraceSink); longer
/// records are truncated.
pub const TRACE_LINE_LEN: usize = 160;

/// Fixed-capacity `fmt::Write` target.
///
/// Writes past the capacity are dropped at a UTF-8 character boundary, so
/// [`as_str`](Self::as_str) always yields valid text.
pub struct LineBuffer<const N: usize = TRACE_LINE_LEN> {
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LineBuffer<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            truncated: false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only whole characters are ever copied in.
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }

    /// Whether any output was dropped.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub const fn clear(&mut self) {
        self.len = 0;
        self.truncated = false;
    }
}

impl<const N: usize> fmt::Write for LineBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.len;
        let take = if s.len() <= room {
            s.len()
        } else {
            self.truncated = true;
            let mut end = room;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            end
        };
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        // Never fail: a truncated trace line beats a lost one.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn collects_formatted_output() {
        let mut line = LineBuffer::<32>::new();
        write!(line, "heap 0x{:x} used {}", 0x1000, 64).unwrap();
        assert_eq!(line.as_str(), "heap 0x1000 used 64");
        assert!(!line.is_truncated());
    }

    #[test]
    fn truncates_at_char_boundary() {
        let mut line = LineBuffer::<5>::new();
        write!(line, "ab€cd").unwrap();
        // "ab€" fills all five bytes, "cd" is dropped
        assert_eq!(line.as_str(), "ab€");
        assert!(line.is_truncated());
        line.clear();
        write!(line, "abcd€").unwrap();
        assert_eq!(line.as_str(), "abcd");
        assert!(line.is_truncated());
    }
}
