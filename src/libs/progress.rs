//! Download progress reporting.
//!
//! The pipeline hands every response body to a [`ProgressTracker`], which returns a
//! wrapped reader. Terminal progress bars are out of scope; [`LogProgress`] reports
//! milestones through the regular log macros and [`NoProgress`] does nothing.

use std::io::{self, Read};
use std::sync::Mutex;

use colored::Colorize;

use crate::{log_debug, log_info};

/// Receives download streams and reports on them.
pub trait ProgressTracker: Send + Sync {
    /// Called once before any tool is processed.
    fn start(&self) {}

    /// Called once after every tool finished.
    fn wait(&self) {}

    /// Wraps `stream` so reads are reported under `name`.
    ///
    /// # Arguments
    /// * `name`: Label for the download, usually the asset file name.
    /// * `current`: Bytes already transferred before `stream` starts.
    /// * `total`: Expected size, when the server announced one.
    /// * `stream`: The body to wrap.
    fn track_progress(
        &self,
        name: &str,
        current: u64,
        total: Option<u64>,
        stream: Box<dyn Read + Send>,
    ) -> Box<dyn Read + Send>;
}

/// Tracker that passes streams through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressTracker for NoProgress {
    fn track_progress(
        &self,
        _name: &str,
        _current: u64,
        _total: Option<u64>,
        stream: Box<dyn Read + Send>,
    ) -> Box<dyn Read + Send> {
        stream
    }
}

/// Tracker that logs every quarter of a download.
#[derive(Debug, Default)]
pub struct LogProgress {
    tracked: Mutex<Vec<String>>,
}

impl LogProgress {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stream tracked so far, in order.
    #[must_use]
    pub fn tracked(&self) -> Vec<String> {
        self.tracked.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl ProgressTracker for LogProgress {
    fn start(&self) {
        log_debug!("[Progress] Tracking downloads");
    }

    fn wait(&self) {
        let count = self.tracked.lock().map(|t| t.len()).unwrap_or_default();
        log_debug!("[Progress] {} download(s) finished", count);
    }

    fn track_progress(
        &self,
        name: &str,
        current: u64,
        total: Option<u64>,
        stream: Box<dyn Read + Send>,
    ) -> Box<dyn Read + Send> {
        if let Ok(mut tracked) = self.tracked.lock() {
            tracked.push(name.to_string());
        }
        Box::new(LoggingReader {
            inner: stream,
            name: name.to_string(),
            read: current,
            total,
            next_quarter: 1,
        })
    }
}

struct LoggingReader {
    inner: Box<dyn Read + Send>,
    name: String,
    read: u64,
    total: Option<u64>,
    next_quarter: u64,
}

impl Read for LoggingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        match self.total {
            Some(total) if total > 0 => {
                while self.next_quarter <= 4 && self.read * 4 >= total * self.next_quarter {
                    log_info!(
                        "[Progress] {} {}% ({} / {} bytes)",
                        self.name.bold(),
                        self.next_quarter * 25,
                        self.read,
                        total
                    );
                    self.next_quarter += 1;
                }
            }
            _ if n == 0 && self.next_quarter <= 4 => {
                log_info!("[Progress] {} done ({} bytes)", self.name.bold(), self.read);
                self.next_quarter = 5;
            }
            _ => {}
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_stream_yields_the_same_bytes() {
        let tracker = LogProgress::new();
        let data = vec![7u8; 10_000];
        let mut reader = tracker.track_progress(
            "asset.tar.gz",
            0,
            Some(data.len() as u64),
            Box::new(io::Cursor::new(data.clone())),
        );
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(tracker.tracked(), vec!["asset.tar.gz".to_string()]);
    }

    #[test]
    fn no_progress_passes_through() {
        let mut reader = NoProgress.track_progress("x", 0, None, Box::new(&b"abc"[..]));
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abc");
    }
}
