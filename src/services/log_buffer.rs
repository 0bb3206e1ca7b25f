//! Bounded, line-aware output buffer for a single service.
//!
//! Writers append process output; once the buffer would exceed its maximum
//! size the oldest bytes are evicted in one trim, and the cut is moved forward
//! to the next line break so readers never see a partial first line. When no
//! line break follows the cut the whole buffer is dropped, and incoming bytes
//! are discarded up to the end of the interrupted line.

use std::io;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::models::LogBufferSettings;

#[derive(Debug, Default)]
struct BufferState {
    data: Vec<u8>,
    /// Set after an eviction had to drop a line that is still being written.
    skipping_line: bool,
}

/// Bounded append-only byte buffer with tail and search reads.
#[derive(Debug)]
pub struct CircularLogBuffer {
    state: RwLock<BufferState>,
    max_size: usize,
    trim_size: usize,
    lookahead: usize,
}

impl CircularLogBuffer {
    pub fn new(max_size: usize, trim_size: usize, lookahead: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            state: RwLock::new(BufferState::default()),
            max_size,
            trim_size: trim_size.clamp(1, max_size),
            lookahead,
        }
    }

    pub fn from_settings(settings: &LogBufferSettings) -> Self {
        Self::new(
            settings.max_bytes,
            settings.trim_bytes,
            settings.lookahead_bytes,
        )
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Append bytes, evicting old data if needed. Returns the number of bytes
    /// accepted (always `bytes.len()`).
    pub fn write(&self, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            return 0;
        }

        let mut state = self.write_guard();
        let mut incoming = bytes;
        if state.skipping_line {
            let Some(end) = find_newline(incoming) else {
                return bytes.len();
            };
            incoming = &incoming[end + 1..];
            state.skipping_line = false;
        }
        state.data.extend_from_slice(incoming);

        if state.data.len() > self.max_size {
            let overflow = state.data.len() - self.max_size;
            let target = overflow.max(self.trim_size).min(state.data.len());
            match self.line_boundary(&state.data, target) {
                Some(cut) => {
                    state.data.drain(..cut);
                }
                None => {
                    state.data.clear();
                    state.skipping_line = true;
                }
            }
        }

        bytes.len()
    }

    /// First line start at or after `target`.
    ///
    /// Searches the lookahead window first, then the rest of the buffer.
    /// `None` when the line containing `target` is still unterminated.
    fn line_boundary(&self, data: &[u8], target: usize) -> Option<usize> {
        if target == 0 || data[target - 1] == b'\n' {
            return Some(target);
        }

        let window_end = target.saturating_add(self.lookahead).min(data.len());
        find_newline(&data[target..window_end])
            .map(|pos| target + pos)
            .or_else(|| find_newline(&data[window_end..]).map(|pos| window_end + pos))
            .map(|pos| pos + 1)
    }

    /// Copy of the whole buffer.
    pub fn bytes(&self) -> Vec<u8> {
        self.read_guard().data.clone()
    }

    pub fn len(&self) -> usize {
        self.read_guard().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().data.is_empty()
    }

    pub fn clear(&self) {
        self.write_guard().data.clear();
    }

    /// The trailing `n` bytes, or everything when `n` covers the buffer.
    pub fn last_bytes(&self, n: usize) -> Vec<u8> {
        let state = self.read_guard();
        let data = &state.data;
        let start = data.len().saturating_sub(n);
        data[start..].to_vec()
    }

    /// The last `n` lines in chronological order.
    ///
    /// A trailing newline does not produce an empty final line. Invalid UTF-8
    /// is replaced.
    pub fn last_lines(&self, n: usize) -> Vec<String> {
        if n == 0 {
            return Vec::new();
        }

        let state = self.read_guard();
        let data = &state.data;
        if data.is_empty() {
            return Vec::new();
        }

        // exclusive end of the line being read; None once the start is reached
        let mut end = Some(data.len() - usize::from(data.ends_with(b"\n")));
        let mut lines = Vec::with_capacity(n.min(64));
        while lines.len() < n {
            let Some(line_end) = end else { break };
            let start = data[..line_end]
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |pos| pos + 1);
            lines.push(line_text(&data[start..line_end]));
            end = start.checked_sub(1);
        }

        lines.reverse();
        lines
    }

    /// Forward line iterator over a point-in-time copy of the buffer.
    pub fn lines(&self) -> LogLines {
        LogLines::new(self.bytes())
    }

    /// Byte offsets of every (possibly overlapping) occurrence of `pattern`.
    pub fn search(&self, pattern: &[u8]) -> Vec<usize> {
        if pattern.is_empty() {
            return Vec::new();
        }

        let state = self.read_guard();
        let data = &state.data;
        if pattern.len() > data.len() {
            return Vec::new();
        }

        data.windows(pattern.len())
            .enumerate()
            .filter(|(_, window)| *window == pattern)
            .map(|(offset, _)| offset)
            .collect()
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, BufferState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, BufferState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircularLogBuffer {
    fn default() -> Self {
        Self::from_settings(&LogBufferSettings::default())
    }
}

impl io::Write for &CircularLogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(CircularLogBuffer::write(*self, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn find_newline(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == b'\n')
}

fn line_text(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Restartable line iterator over an owned snapshot.
#[derive(Debug, Clone)]
pub struct LogLines {
    data: Vec<u8>,
    pos: usize,
}

impl LogLines {
    fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Start again from the first line of the same snapshot.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl Iterator for LogLines {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }

        let rest = &self.data[self.pos..];
        let (line, consumed) = match find_newline(rest) {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        Some(line_text(line))
    }
}
