// The operator-visible tail log: append-only, line-oriented, timestamp
// prefixed, truncated to the most recent N lines on every write. The external
// status panel tails this file, so the format is part of the interface.

use crate::constants::defaults::MAX_TAIL_LOG_LINES;

use chrono::Local;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// A bounded, line-oriented log file.
///
/// Every write rewrites the file with at most `max_lines` lines, each
/// prefixed with a `[dd/mm/YYYY HH:MM:SS]` local timestamp. Write failures
/// fall back to stderr and never propagate; losing a log line must not stall
/// the polling loop.
pub struct TailLog {
    path: PathBuf,
    max_lines: usize,
    // Serializes read-modify-write cycles within this process. The status
    // panel mutates the same file from its own process without locking; that
    // race is accepted.
    write_lock: Mutex<()>,
}

impl TailLog {
    /// Create a `TailLog` writing to `path`, keeping the default line limit.
    pub fn new(path: PathBuf) -> Self {
        Self::with_max_lines(path, MAX_TAIL_LOG_LINES)
    }

    /// Create a `TailLog` with an explicit line limit.
    pub fn with_max_lines(path: PathBuf, max_lines: usize) -> Self {
        Self {
            path,
            max_lines,
            write_lock: Mutex::new(()),
        }
    }

    /// The path of the underlying log file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Append a message, truncating the file to the most recent lines.
    pub fn append(&self, message: &str) {
        let _guard = self.write_lock.lock().unwrap();

        let timestamp = Local::now().format("%d/%m/%Y %H:%M:%S");
        let line = format!("[{}] {}", timestamp, message);

        let mut lines: Vec<String> = match fs::read_to_string(&self.path) {
            Ok(existing) => existing.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        };

        lines.push(line);
        if lines.len() > self.max_lines {
            let excess = lines.len() - self.max_lines;
            lines.drain(..excess);
        }

        let mut contents = lines.join("\n");
        contents.push('\n');

        if let Err(e) = fs::write(&self.path, contents) {
            eprintln!("Failed to write log file {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn append_prefixes_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let log = TailLog::new(dir.path().join("agent.log"));

        log.append("agent started");

        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(contents.starts_with('['));
        assert!(contents.trim_end().ends_with("agent started"));
    }

    #[test]
    fn truncates_to_most_recent_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = TailLog::with_max_lines(dir.path().join("agent.log"), 3);

        for i in 0..10 {
            log.append(&format!("message {}", i));
        }

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("message 7"));
        assert!(lines[2].ends_with("message 9"));
    }

    #[test]
    fn missing_file_is_created_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        assert!(!path.exists());

        let log = TailLog::new(path.clone());
        log.append("first");

        assert!(path.exists());
    }
}
