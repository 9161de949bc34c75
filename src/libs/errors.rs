//! Error taxonomy shared by the whole install pipeline.
//!
//! Every failure a tool can hit maps to one [`ErrorKind`]. The processor turns the
//! error of each failed tool into an [`ErrorDetail`] and aggregates them into a
//! [`ProcessError`] once all tools are done.

use std::fmt;
use std::io;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::libs::asset_matcher::MatchError;
use crate::libs::inheritance::CycleError;
use crate::libs::templating::TemplateError;
use crate::schemas::results::ToolResult;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Invalid descriptor, unknown parent, unknown source kind.
    Usage,
    /// Version lookup failed, no asset matched, all sources exhausted.
    Resolve,
    /// Transport errors and HTTP statuses >= 400.
    Network,
    /// Checksum mismatch or missing checksum.
    Integrity,
    /// Output, extraction and permission problems.
    Filesystem,
    /// Post-install command failures.
    Execution,
    /// The run was interrupted.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Usage => "usage",
            Self::Resolve => "resolve",
            Self::Network => "network",
            Self::Integrity => "integrity",
            Self::Filesystem => "filesystem",
            Self::Execution => "execution",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors raised while resolving and installing a tool.
#[derive(Error, Debug)]
pub enum Error {
    /// The descriptor failed structural validation.
    #[error("invalid descriptor: {0}")]
    Validation(String),

    /// A descriptor inherits from a template that does not exist.
    #[error("unknown parent '{parent}' inherited by '{node}'")]
    UnknownParent {
        /// The inheriting descriptor.
        node: String,
        /// The missing parent name.
        parent: String,
    },

    /// The inheritance graph has a cycle.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// `source.type` or a fallback names an unsupported source.
    #[error("unknown source type '{0}'")]
    UnknownSource(String),

    /// A template failed to parse or render.
    #[error("template error in {field}: {source}")]
    Template {
        /// Descriptor field that held the template.
        field: String,
        /// Underlying template error.
        #[source]
        source: TemplateError,
    },

    /// A populator could not determine a version.
    #[error("version lookup failed: {0}")]
    Version(String),

    /// A release, tag or module does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// No release asset fits the platform and hints.
    #[error(transparent)]
    NoMatch(#[from] MatchError),

    /// The primary source and every fallback failed.
    #[error("all sources exhausted for '{tool}': {}", failures.join("; "))]
    Exhausted {
        /// Tool name.
        tool: String,
        /// One message per attempted source, in order.
        failures: Vec<String>,
    },

    /// `upgrade` refused to replace a newer installed version.
    #[error("installed version {installed} is newer than target {target}")]
    Downgrade {
        /// Version currently installed.
        installed: String,
        /// Version the descriptor resolved to.
        target: String,
    },

    /// Transport-level failure.
    #[error("request to {url} failed: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport error message.
        message: String,
    },

    /// The server answered with an error status.
    #[error("HTTP {status} from {url}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Downloaded content does not hash to the expected value.
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// File that was verified.
        file: String,
        /// Expected hex digest.
        expected: String,
        /// Computed hex digest.
        actual: String,
    },

    /// A checksum was required but could not be found.
    #[error("missing checksum: {0}")]
    MissingChecksum(String),

    /// Filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The archive could not be unpacked or did not contain the executable.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// An external command exited unsuccessfully.
    #[error("command `{command}` failed with exit code {code}: {output}")]
    Command {
        /// Command line that was run.
        command: String,
        /// Exit code, -1 when terminated by a signal.
        code: i32,
        /// Combined stdout and stderr.
        output: String,
    },

    /// An external command did not finish in time and was killed.
    #[error("command `{command}` timed out after {seconds:.1}s")]
    Timeout {
        /// Command line that was run.
        command: String,
        /// Allowed running time.
        seconds: f64,
    },

    /// The run was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::UnknownParent { .. }
            | Self::Cycle(_)
            | Self::UnknownSource(_)
            | Self::Template { .. } => ErrorKind::Usage,
            Self::Version(_)
            | Self::NotFound(_)
            | Self::NoMatch(_)
            | Self::Exhausted { .. }
            | Self::Downgrade { .. } => ErrorKind::Resolve,
            Self::Network { .. } | Self::Http { .. } => ErrorKind::Network,
            Self::ChecksumMismatch { .. } | Self::MissingChecksum(_) => ErrorKind::Integrity,
            Self::Io { .. } | Self::Extraction(_) => ErrorKind::Filesystem,
            Self::Command { .. } | Self::Timeout { .. } => ErrorKind::Execution,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True for errors with "does not exist" semantics (404s, unknown tags).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Http { status: 404, .. })
    }

    /// Wraps an I/O error with a description of the failed operation.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wraps an I/O error that happened on a specific path.
    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        Self::io(format!("failed to {action} {}", path.display()), source)
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a transport error.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a checksum mismatch error.
    pub fn checksum_mismatch(
        file: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            file: file.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// One failed tool, as reported in the aggregate error and the JSON error file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    /// Tool name.
    pub tool: String,
    /// Short human-readable summary.
    pub message: String,
    /// Full error text.
    pub error: String,
    /// Error classification.
    pub kind: ErrorKind,
}

/// Aggregate error returned by the processor when at least one tool failed.
#[derive(Error, Debug)]
#[error("{failed} of {total} tools failed ({successful} succeeded, {skipped} skipped)")]
pub struct ProcessError {
    /// Number of tools processed.
    pub total: usize,
    /// Number of tools installed.
    pub successful: usize,
    /// Number of tools that failed.
    pub failed: usize,
    /// Number of tools skipped.
    pub skipped: usize,
    /// One entry per failed tool.
    pub details: Vec<ErrorDetail>,
    /// Every per-tool result, in input order.
    pub results: Vec<ToolResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(Error::validation("x").kind(), ErrorKind::Usage);
        assert_eq!(Error::UnknownSource("svn".into()).kind(), ErrorKind::Usage);
        assert_eq!(Error::network("u", "reset").kind(), ErrorKind::Network);
        assert_eq!(
            Error::Http {
                url: "u".into(),
                status: 500
            }
            .kind(),
            ErrorKind::Network
        );
        assert_eq!(
            Error::checksum_mismatch("f", "a", "b").kind(),
            ErrorKind::Integrity
        );
        assert_eq!(Error::Extraction("x".into()).kind(), ErrorKind::Filesystem);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn not_found_covers_404() {
        let err = Error::Http {
            url: "https://api.github.com/repos/a/b/releases/latest".into(),
            status: 404,
        };
        assert!(err.is_not_found());
        assert!(Error::NotFound("tag v1".into()).is_not_found());
        assert!(!Error::network("u", "timeout").is_not_found());
    }

    #[test]
    fn exhausted_lists_every_failure() {
        let err = Error::Exhausted {
            tool: "gh".into(),
            failures: vec!["github: HTTP 404".into(), "url: HTTP 500".into()],
        };
        let text = err.to_string();
        assert!(text.contains("github: HTTP 404; url: HTTP 500"));
    }
}
