//! Per-tool outcome of a pipeline run.

use std::fmt;
use std::path::PathBuf;

use crate::libs::errors::{Error, ErrorDetail};
use crate::schemas::cache_file::CacheItem;

/// Final state of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Installed (or re-installed).
    Success,
    /// Nothing to do, or deliberately not processed.
    Skipped,
    /// Processing failed.
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one tool pipeline.
#[derive(Debug)]
pub struct ToolResult {
    /// Tool name.
    pub tool: String,
    /// Final state.
    pub status: Status,
    /// Human-readable explanation (skip reason, failure summary, install log).
    pub message: String,
    /// Resolved version, when resolution got that far.
    pub version: String,
    /// Installed executable, on success.
    pub path: Option<PathBuf>,
    /// The failure, when `status` is `Failed`.
    pub error: Option<Error>,
    /// Record to store in the cache, on success.
    pub record: Option<CacheItem>,
}

impl ToolResult {
    /// A successful install.
    #[must_use]
    pub fn success(tool: &str, version: &str, path: PathBuf, message: String, record: CacheItem) -> Self {
        Self {
            tool: tool.to_string(),
            status: Status::Success,
            message,
            version: version.to_string(),
            path: Some(path),
            error: None,
            record: Some(record),
        }
    }

    /// A skipped tool.
    #[must_use]
    pub fn skipped(tool: &str, version: &str, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            status: Status::Skipped,
            message: reason.into(),
            version: version.to_string(),
            path: None,
            error: None,
            record: None,
        }
    }

    /// A failed tool.
    #[must_use]
    pub fn failed(tool: &str, version: &str, error: Error) -> Self {
        Self {
            tool: tool.to_string(),
            status: Status::Failed,
            message: format!("{} error", error.kind()),
            version: version.to_string(),
            path: None,
            error: Some(error),
            record: None,
        }
    }

    /// Error detail for the aggregate report, when the tool failed.
    #[must_use]
    pub fn detail(&self) -> Option<ErrorDetail> {
        self.error.as_ref().map(|error| ErrorDetail {
            tool: self.tool.clone(),
            message: self.message.clone(),
            error: error.to_string(),
            kind: error.kind(),
        })
    }
}
