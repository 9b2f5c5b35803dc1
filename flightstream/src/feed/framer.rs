//! Newline framing for the upstream byte stream.
//!
//! Socket reads return arbitrary chunks. [`LineFramer`] buffers the trailing
//! partial line between reads and yields only complete lines. Bytes that are
//! not valid UTF-8 are replaced rather than rejected, so one corrupted line
//! never poisons the connection; the parser then classifies it.

/// Default upper bound on a single line.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;

/// Accumulates bytes and splits them into lines.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line_length: usize,
    /// Set while skipping the remainder of an overlong line.
    discarding: bool,
    discarded_lines: u64,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineFramer {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_length,
            discarding: false,
            discarded_lines: 0,
        }
    }

    /// Append a chunk and return every line it completed.
    ///
    /// Lines are returned without the terminating `\n` or `\r\n`. Empty lines
    /// are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(newline) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(newline);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.buffer.clear();
                continue;
            }

            self.buffer.extend_from_slice(head);
            if let Some(line) = self.take_line() {
                lines.push(line);
            }
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.max_line_length {
                tracing::warn!(
                    max = self.max_line_length,
                    "Feed line exceeds maximum length, discarding"
                );
                self.buffer.clear();
                self.discarding = true;
                self.discarded_lines += 1;
            }
        }

        lines
    }

    /// Bytes held for the current partial line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of overlong lines dropped so far.
    pub fn discarded_lines(&self) -> u64 {
        self.discarded_lines
    }

    /// Drop any partial line (used when a connection is replaced).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    fn take_line(&mut self) -> Option<String> {
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        let line = if self.buffer.len() > self.max_line_length {
            self.discarded_lines += 1;
            None
        } else if self.buffer.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buffer).into_owned())
        };
        self.buffer.clear();
        line
    }
}
