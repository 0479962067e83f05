//! Command line assembly
//!
//! Builds one command line at a time from single bytes fed in by the
//! connection state machine. Backslashes are normalized to forward slashes,
//! carriage returns are dropped and `\n` terminates a line. The buffer is
//! bounded: an oversized line is reported immediately and the reader then
//! discards bytes until the next terminator, so the stray tail can never be
//! misparsed as a fresh command.

/// Maximum verb length. Longer verbs are a syntax error.
pub const MAX_VERB_LEN: usize = 4;

/// Outcome of feeding one byte once a full line (or an error) is available.
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// A complete command line: upper-cased verb plus parameter tail.
    Line { verb: String, params: String },
    /// An empty line was received.
    Empty,
    /// The line or its verb exceeded the configured bounds.
    Overflow,
}

pub struct LineReader {
    buf: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl LineReader {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            limit,
            discarding: false,
        }
    }

    /// Drop any partial line, ready for a fresh connection.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    /// Feed one byte. Returns `Some` when a line completed or failed.
    pub fn push(&mut self, byte: u8) -> Option<LineOutcome> {
        let byte = if byte == b'\\' { b'/' } else { byte };

        if byte == b'\r' {
            return None;
        }

        if self.discarding {
            if byte == b'\n' {
                self.discarding = false;
            }
            return None;
        }

        if byte != b'\n' {
            if self.buf.len() < self.limit {
                self.buf.push(byte);
                return None;
            }
            // Line too long: report at once, then skip to the terminator.
            self.buf.clear();
            self.discarding = true;
            return Some(LineOutcome::Overflow);
        }

        if self.buf.is_empty() {
            return Some(LineOutcome::Empty);
        }

        let outcome = Self::split(&self.buf);
        self.buf.clear();
        Some(outcome)
    }

    fn split(line: &[u8]) -> LineOutcome {
        let (verb, tail) = match line.iter().position(|&b| b == b' ') {
            Some(at) => (&line[..at], &line[at + 1..]),
            None => (line, &line[line.len()..]),
        };

        if verb.len() > MAX_VERB_LEN {
            return LineOutcome::Overflow;
        }

        // Extra spaces between verb and parameter are skipped.
        let params = match tail.iter().position(|&b| b != b' ') {
            Some(at) => &tail[at..],
            None => &tail[tail.len()..],
        };

        LineOutcome::Line {
            verb: String::from_utf8_lossy(verb).to_ascii_uppercase(),
            params: String::from_utf8_lossy(params).into_owned(),
        }
    }
}
