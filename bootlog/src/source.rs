//! Log Source contract and an in-memory log buffer implementing it.

use std::time::{Duration, Instant};

use log::{Level, LevelFilter};

use crate::error::SourceError;

/// Resume point into a [`LogSource`]. Devices store it between flushes; only the
/// source interprets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceCursor(u64);

impl SourceCursor {
    pub const START: SourceCursor = SourceCursor(0);

    pub fn new(position: u64) -> Self {
        SourceCursor(position)
    }

    pub fn position(&self) -> u64 {
        self.0
    }
}

/// One formatted line and the cursor just past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLine<'a> {
    pub bytes: &'a [u8],
    pub next: SourceCursor,
}

pub trait LogSource {
    /// Line starting at `cursor`, or `Ok(None)` when nothing more is available yet.
    fn next_line(&self, cursor: SourceCursor) -> Result<Option<LogLine<'_>>, SourceError>;
}

impl<T: LogSource + ?Sized> LogSource for &T {
    fn next_line(&self, cursor: SourceCursor) -> Result<Option<LogLine<'_>>, SourceError> {
        (**self).next_line(cursor)
    }
}

/// Append-only buffer of formatted log lines.
pub struct MemoryLog {
    buf: Vec<u8>,
    min_level: LevelFilter,
    started: Instant,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new(LevelFilter::Trace)
    }
}

impl MemoryLog {
    pub fn new(min_level: LevelFilter) -> Self {
        MemoryLog {
            buf: Vec::new(),
            min_level,
            started: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn push(&mut self, level: Level, message: &str) {
        let elapsed = self.started.elapsed();
        self.push_at(elapsed, level, message);
    }

    /// Records `message` as if it was logged `elapsed` after the log was created.
    /// Entries below the configured level are dropped.
    pub fn push_at(&mut self, elapsed: Duration, level: Level, message: &str) {
        if level > self.min_level {
            return;
        }
        let line = format!(
            "[{:>4}.{:03}] {:<5} {}\n",
            elapsed.as_secs(),
            elapsed.subsec_millis(),
            level,
            message.trim_end_matches('\n')
        );
        self.buf.extend_from_slice(line.as_bytes());
    }

    /// Appends preformatted text. The last line is always terminated so that later
    /// entries start on a line of their own.
    pub fn push_raw(&mut self, text: &[u8]) {
        if text.is_empty() {
            return;
        }
        self.buf.extend_from_slice(text);
        if !text.ends_with(b"\n") {
            self.buf.push(b'\n');
        }
    }
}

impl LogSource for MemoryLog {
    fn next_line(&self, cursor: SourceCursor) -> Result<Option<LogLine<'_>>, SourceError> {
        let start = usize::try_from(cursor.position())
            .map_err(|_| SourceError::BadCursor(cursor.position()))?;
        if start > self.buf.len() || (start > 0 && self.buf[start - 1] != b'\n') {
            return Err(SourceError::BadCursor(cursor.position()));
        }
        if start == self.buf.len() {
            return Ok(None);
        }
        let end = self.buf[start..]
            .iter()
            .position(|b| *b == b'\n')
            .map_or(self.buf.len(), |i| start + i + 1);
        Ok(Some(LogLine {
            bytes: &self.buf[start..end],
            next: SourceCursor::new(end as u64),
        }))
    }
}
