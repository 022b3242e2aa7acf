//! Per-run `events.log`: one `[HH:MM:SS] message` line per event.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use stepwise_common::formatter::truncate_for_log;
use tracing::{info, warn};

pub const EVENTS_FILE: &str = "events.log";

pub struct RunLog {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
    lines: Mutex<Vec<String>>,
    max_chars: usize,
}

impl RunLog {
    /// Append to `<dir>/events.log`. An unopenable file degrades to memory only.
    pub fn create(dir: &Path, max_chars: usize) -> Self {
        let path = dir.join(EVENTS_FILE);
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Cannot open {}: {}; events kept in memory", path.display(), e);
                None
            }
        };
        Self {
            path: Some(path),
            file: Mutex::new(file),
            lines: Mutex::new(Vec::new()),
            max_chars,
        }
    }

    pub fn in_memory(max_chars: usize) -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
            lines: Mutex::new(Vec::new()),
            max_chars,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record one event; the message is sanitized and truncated first.
    pub fn log(&self, message: impl AsRef<str>) {
        let message = self.sanitize(message.as_ref());
        info!(target: "stepwise::events", "{}", message);
        let line = format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), message);

        let mut file = self.file.lock();
        if let Some(f) = file.as_mut()
            && let Err(e) = writeln!(f, "{}", line)
        {
            warn!("events.log write failed: {}", e);
            *file = None;
        }
        drop(file);
        self.lines.lock().push(line);
    }

    /// Strip carriage returns and NULs, then cap the length.
    pub fn sanitize(&self, message: &str) -> String {
        let cleaned: String = message.chars().filter(|c| *c != '\r' && *c != '\0').collect();
        truncate_for_log(&cleaned, self.max_chars)
    }

    /// Lines written so far, timestamps included.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Lines with the `[HH:MM:SS] ` prefix removed.
    pub fn messages(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .map(|l| l.split_once("] ").map(|(_, m)| m.to_string()).unwrap_or_default())
            .collect()
    }
}
