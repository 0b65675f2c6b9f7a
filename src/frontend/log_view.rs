//! Scrollback model for the GUI log panel

use std::collections::VecDeque;

/// Default number of lines kept in the log panel
pub const DEFAULT_MAX_LINES: usize = 2000;

/// Where a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Command written to the robot
    Sent,
    /// Text received from the robot
    Received,
    /// Status message
    Info,
    /// Failure message
    Error,
}

/// One line in the log panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Local time the line was added, `HH:MM:SS.mmm`
    pub time: String,
    /// Line origin
    pub kind: LogKind,
    /// Line text
    pub text: String,
}

/// Bounded scrollback that reassembles received text into lines
#[derive(Debug)]
pub struct LogView {
    lines: VecDeque<LogLine>,
    max_lines: usize,
    partial: String,
}

impl Default for LogView {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

impl LogView {
    /// Create a log keeping at most `max_lines` lines
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
            partial: String::new(),
        }
    }

    /// Lines, oldest first
    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    /// Number of complete lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.partial.is_empty()
    }

    /// Received text not yet terminated by a newline
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Drop all lines
    pub fn clear(&mut self) {
        self.lines.clear();
        self.partial.clear();
    }

    /// Add a complete line
    pub fn push(&mut self, kind: LogKind, text: impl Into<String>) {
        if self.lines.len() == self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(LogLine {
            time: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
            kind,
            text: text.into(),
        });
    }

    /// Add text received from the robot, splitting it into lines
    pub fn push_received(&mut self, text: &str) {
        self.partial.push_str(text);
        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            let line = line.trim_end_matches(&['\r', '\n'][..]);
            if !line.is_empty() {
                self.push(LogKind::Received, line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_text_split_into_lines() {
        let mut log = LogView::default();
        log.push_received("Motor 1 ");
        assert_eq!(log.len(), 0);
        assert_eq!(log.partial(), "Motor 1 ");

        log.push_received("secildi\r\nileri\n\npartial");
        let texts: Vec<&str> = log.lines().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Motor 1 secildi", "ileri"]);
        assert!(log.lines().all(|l| l.kind == LogKind::Received));
        assert_eq!(log.partial(), "partial");
    }

    #[test]
    fn test_bounded() {
        let mut log = LogView::new(3);
        for i in 0..5 {
            log.push(LogKind::Info, format!("line {}", i));
        }
        let texts: Vec<&str> = log.lines().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["line 2", "line 3", "line 4"]);

        log.clear();
        assert!(log.is_empty());
    }
}
