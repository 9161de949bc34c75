//! Run-wide settings handed to the processor.
//!
//! The CLI builds a [`Config`] from flags and environment variables; the library
//! never reads global configuration on its own apart from the documented token
//! variables.

use std::env;
use std::path::PathBuf;

use crate::schemas::tools::{Strategy, Tool};

/// Default number of concurrent tool pipelines.
pub const DEFAULT_PARALLEL: usize = 4;

/// Settings shared by every tool in a run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on concurrently processed tools.
    pub parallel: usize,
    /// Directory holding `cache.yml`.
    pub cache_dir: PathBuf,
    /// GitHub token (`GITHUB_TOKEN` / `GH_TOKEN`).
    pub github_token: Option<String>,
    /// GitLab token (`GITLAB_TOKEN`).
    pub gitlab_token: Option<String>,
    /// Generic bearer token for URL sources (`URL_TOKEN`).
    pub url_token: Option<String>,
    /// Ignore cached versions for every tool.
    pub no_cache: bool,
    /// Disable TLS certificate verification for every tool.
    pub no_verify_ssl: bool,
    /// Strategy forced onto every tool.
    pub strategy: Option<Strategy>,
    /// Output directory forced onto every tool.
    pub output: Option<String>,
    /// Where to write the JSON error report, if anywhere.
    pub error_file: Option<PathBuf>,
    /// Fall back to the token environment variables when a token is not set.
    pub env_tokens: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel: DEFAULT_PARALLEL,
            cache_dir: default_cache_dir(),
            github_token: None,
            gitlab_token: None,
            url_token: None,
            no_cache: false,
            no_verify_ssl: false,
            strategy: None,
            output: None,
            error_file: None,
            env_tokens: true,
        }
    }
}

impl Config {
    /// Path of the cache file.
    #[must_use]
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join("cache.yml")
    }

    /// GitHub token from the config, falling back to `GITHUB_TOKEN` then `GH_TOKEN`.
    #[must_use]
    pub fn github_token(&self) -> Option<String> {
        non_empty(self.github_token.clone())
            .or_else(|| self.env_token("GITHUB_TOKEN"))
            .or_else(|| self.env_token("GH_TOKEN"))
    }

    /// GitLab token from the config, falling back to `GITLAB_TOKEN`.
    #[must_use]
    pub fn gitlab_token(&self) -> Option<String> {
        non_empty(self.gitlab_token.clone()).or_else(|| self.env_token("GITLAB_TOKEN"))
    }

    /// URL token from the config, falling back to `URL_TOKEN`.
    #[must_use]
    pub fn url_token(&self) -> Option<String> {
        non_empty(self.url_token.clone()).or_else(|| self.env_token("URL_TOKEN"))
    }

    /// GitLab CI job token (`CI_JOB_TOKEN`).
    #[must_use]
    pub fn ci_job_token(&self) -> Option<String> {
        self.env_token("CI_JOB_TOKEN")
    }

    fn env_token(&self, name: &str) -> Option<String> {
        if self.env_tokens {
            non_empty(env::var(name).ok())
        } else {
            None
        }
    }

    /// Fields forced onto every descriptor, applied with `merge_from`.
    #[must_use]
    pub fn overrides(&self) -> Tool {
        Tool {
            strategy: self.strategy,
            output: self.output.clone().unwrap_or_default(),
            no_cache: self.no_cache.then_some(true),
            no_verify_ssl: self.no_verify_ssl.then_some(true),
            ..Tool::default()
        }
    }
}

/// `<user cache dir>/forgebin`, or `./.forgebin` when no cache dir is known.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("forgebin"))
        .unwrap_or_else(|| PathBuf::from(".forgebin"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
