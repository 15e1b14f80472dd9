//!
//! src/status.rs  Oct 19th, 2026
//!
//! Bounded log of the most recent progress lines shown to the uploader
//!

use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone)]
pub struct StatusLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { lines: VecDeque::with_capacity(capacity), capacity }
    }

    /// Adds a line, dropping the oldest once full
    pub fn push(&mut self, message: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(message.into());
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lines.len()
    }
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::new(5)
    }
}

impl fmt::Display for StatusLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "> {line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_most_recent_lines() {
        let mut log = StatusLog::new(3);
        for i in 1..=5 {
            log.push(format!("step {i}"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["step 3", "step 4", "step 5"]);
        assert_eq!(log.last(), Some("step 5"));
    }

    #[test]
    fn renders_with_prompt_prefix() {
        let mut log = StatusLog::default();
        log.push("Uploading audio file...");
        log.push("Audio uploaded");
        assert_eq!(log.to_string(), "> Uploading audio file...\n> Audio uploaded");
        assert_eq!(StatusLog::new(0).to_string(), "");
    }
}
