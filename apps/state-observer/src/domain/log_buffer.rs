//! System Log Ring Buffer
//!
//! Keeps the most recent `capacity` log lines; pushing into a full buffer
//! evicts the oldest line.

use std::collections::VecDeque;

use bot_engine::domain::log::SystemLog;

/// Default number of retained log lines.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Capped, oldest-first log history.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<SystemLog>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    /// Empty buffer holding at most `capacity` lines (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full.
    ///
    /// Returns the evicted line, if any.
    pub fn push(&mut self, entry: SystemLog) -> Option<SystemLog> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Lines from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SystemLog> {
        self.entries.iter()
    }

    /// The `n` newest lines, oldest first.
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &SystemLog> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    /// Number of retained lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no line is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained lines.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_engine::domain::log::LogLevel;

    fn line(n: usize) -> SystemLog {
        SystemLog::new(LogLevel::Info, "bot-crypto", format!("line {n}"))
    }

    fn messages(buffer: &LogBuffer) -> Vec<String> {
        buffer.iter().map(|l| l.message.clone()).collect()
    }

    #[test]
    fn keeps_insertion_order() {
        let mut buffer = LogBuffer::new(3);
        buffer.push(line(1));
        buffer.push(line(2));

        assert_eq!(messages(&buffer), vec!["line 1", "line 2"]);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = LogBuffer::new(3);
        for n in 1..=3 {
            assert!(buffer.push(line(n)).is_none());
        }

        let evicted = buffer.push(line(4)).unwrap();

        assert_eq!(evicted.message, "line 1");
        assert_eq!(messages(&buffer), vec!["line 2", "line 3", "line 4"]);
        assert_eq!(buffer.len(), buffer.capacity());
    }

    #[test]
    fn latest_returns_newest_tail() {
        let mut buffer = LogBuffer::new(10);
        for n in 1..=5 {
            buffer.push(line(n));
        }

        let tail: Vec<_> = buffer.latest(2).map(|l| l.message.as_str()).collect();
        assert_eq!(tail, vec!["line 4", "line 5"]);
        assert_eq!(buffer.latest(50).count(), 5);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buffer = LogBuffer::new(0);
        buffer.push(line(1));
        buffer.push(line(2));

        assert_eq!(buffer.capacity(), 1);
        assert_eq!(messages(&buffer), vec!["line 2"]);
    }

    #[test]
    fn default_capacity() {
        assert_eq!(LogBuffer::default().capacity(), 500);
    }
}
