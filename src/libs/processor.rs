//! # Processor
//!
//! Runs a whole tool list: loads the cache, resolves the defaults graph once, drives
//! every descriptor through the [`Pipeline`] on a bounded `rayon` pool and flushes the
//! cache a single time at the end. Pipelines share nothing but the cache, which sits
//! behind one `Mutex`.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Mutex;

use colored::Colorize;
use rayon::prelude::*;

use crate::libs::cache_store::CacheStore;
use crate::libs::cancel::CancelToken;
use crate::libs::errors::{Error, ErrorDetail, ProcessError, Result};
use crate::libs::inheritance;
use crate::libs::pipeline::{Pipeline, TagFilter};
use crate::libs::progress::{LogProgress, ProgressTracker};
use crate::libs::utilities::assets::HttpClient;
use crate::libs::utilities::platform;
use crate::populators::Services;
use crate::schemas::cache_file::Cache;
use crate::schemas::config::Config;
use crate::schemas::platform::Platform;
use crate::schemas::results::{Status, ToolResult};
use crate::schemas::tools::Tool;
use crate::{log_debug, log_error, log_info, log_warn};

/// Counts and results of a run in which no tool failed.
#[derive(Debug)]
pub struct Summary {
    /// Number of tools processed.
    pub total: usize,
    /// Number of tools installed.
    pub successful: usize,
    /// Number of tools skipped.
    pub skipped: usize,
    /// Every per-tool result, in input order.
    pub results: Vec<ToolResult>,
}

/// Orchestrates one run over a tool list.
pub struct Processor {
    config: Config,
    defaults: BTreeMap<String, Tool>,
    host: Platform,
    progress: Box<dyn ProgressTracker>,
    cancel: CancelToken,
}

impl Processor {
    /// A processor for `config`, on the detected host, logging download progress.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            defaults: BTreeMap::new(),
            host: platform::detect(),
            progress: Box::new(LogProgress::new()),
            cancel: CancelToken::new(),
        }
    }

    /// Installs a defaults map, resolving its inheritance graph.
    ///
    /// # Returns
    /// * `Err(Error::Cycle)` or `Err(Error::UnknownParent)` when the graph is invalid.
    pub fn with_defaults(mut self, defaults: &BTreeMap<String, Tool>) -> Result<Self> {
        self.defaults = inheritance::resolve_defaults(defaults)?;
        log_debug!("[Processor] Resolved {} default template(s)", self.defaults.len());
        Ok(self)
    }

    /// Overrides the detected platform.
    #[must_use]
    pub fn with_host(mut self, host: Platform) -> Self {
        self.host = host;
        self
    }

    /// Replaces the progress tracker.
    #[must_use]
    pub fn with_progress(mut self, progress: Box<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    /// Uses `cancel` as the run's cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The run's cancellation token, for wiring up signal handlers.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Effective pool size: the configured bound, clamped to 1 without a GitHub token
    /// so unauthenticated runs stay under the API rate limit.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        let configured = self.config.parallel.max(1);
        if configured > 1 && self.config.github_token().is_none() {
            log_warn!(
                "[Processor] No GitHub token set; processing tools one at a time instead of {}",
                configured
            );
            return 1;
        }
        configured
    }

    /// Processes every tool of `tools` that passes `tags`.
    ///
    /// # Arguments
    /// * `tools`: Descriptors as read from the tool list.
    /// * `tags`: Include/exclude selection.
    ///
    /// # Returns
    /// * `Ok(Summary)` when no tool failed.
    /// * `Err(ProcessError)` carrying the counts, one detail per failure and every
    ///   result otherwise.
    pub fn process(&self, tools: &[Tool], tags: &TagFilter) -> std::result::Result<Summary, ProcessError> {
        let store = CacheStore::new(self.config.cache_file());
        let cache = Mutex::new(store.load());

        log_info!("[Processor] Processing {} tool(s)", tools.len().to_string().bold());
        self.progress.start();
        let results = match HttpClient::new(self.config.no_verify_ssl) {
            Ok(client) => {
                let services = Services {
                    client,
                    config: self.config.clone(),
                    cancel: self.cancel.clone(),
                };
                self.run_all(tools, tags, &services, &cache)
            }
            Err(e) => {
                log_error!("[Processor] Cannot set up HTTP client: {}", e);
                tools
                    .iter()
                    .map(|tool| {
                        ToolResult::failed(
                            &tool.name,
                            &tool.version.version,
                            Error::validation(format!("cannot set up HTTP client: {e}")),
                        )
                    })
                    .collect()
            }
        };
        self.progress.wait();

        let cache = cache.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = store.save(&cache) {
            log_error!("[Processor] Failed to save cache: {}", e);
        }

        self.summarize(results)
    }

    fn run_all(
        &self,
        tools: &[Tool],
        tags: &TagFilter,
        services: &Services,
        cache: &Mutex<Cache>,
    ) -> Vec<ToolResult> {
        let pipeline = Pipeline {
            services,
            host: &self.host,
            defaults: &self.defaults,
            cache,
            progress: self.progress.as_ref(),
            tags,
        };
        let run = |tool: &Tool| -> ToolResult {
            if self.cancel.is_cancelled() {
                return ToolResult::failed(&tool.name, &tool.version.version, Error::Cancelled);
            }
            let result = pipeline.run(tool);
            if let Some(record) = &result.record {
                if let Ok(mut cache) = cache.lock() {
                    cache.add(record.clone());
                }
            }
            result
        };

        let threads = self.parallelism();
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => {
                log_debug!("[Processor] Running with {} worker(s)", threads);
                pool.install(|| tools.par_iter().map(run).collect())
            }
            Err(e) => {
                log_warn!("[Processor] Cannot start worker pool ({}); running sequentially", e);
                tools.iter().map(run).collect()
            }
        }
    }

    fn summarize(&self, results: Vec<ToolResult>) -> std::result::Result<Summary, ProcessError> {
        let count = |status: Status| results.iter().filter(|r| r.status == status).count();
        let total = results.len();
        let successful = count(Status::Success);
        let skipped = count(Status::Skipped);
        let failed = count(Status::Failed);
        let details: Vec<ErrorDetail> = results.iter().filter_map(ToolResult::detail).collect();

        if let Some(path) = &self.config.error_file {
            write_error_file(path, &details);
        }

        log_info!(
            "[Processor] Done: {} installed, {} skipped, {} failed",
            successful.to_string().green(),
            skipped.to_string().yellow(),
            failed.to_string().red()
        );

        if failed > 0 {
            Err(ProcessError {
                total,
                successful,
                failed,
                skipped,
                details,
                results,
            })
        } else {
            Ok(Summary {
                total,
                successful,
                skipped,
                results,
            })
        }
    }
}

// Written even when no tool failed; an empty array replaces any older report.
fn write_error_file(path: &std::path::Path, details: &[ErrorDetail]) {
    let written = serde_json::to_string_pretty(details)
        .map_err(std::io::Error::other)
        .and_then(|json| {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, json)
        });
    match written {
        Ok(()) => log_debug!("[Processor] Wrote error report to {}", path.display()),
        Err(e) => log_error!("[Processor] Cannot write error report {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::progress::NoProgress;

    fn processor(cache_dir: &std::path::Path, parallel: usize, token: Option<&str>) -> Processor {
        let config = Config {
            parallel,
            cache_dir: cache_dir.to_path_buf(),
            github_token: token.map(str::to_string),
            env_tokens: false,
            ..Config::default()
        };
        Processor::new(config)
            .with_host(Platform {
                os: "linux".into(),
                arch: "amd64".into(),
                ..Platform::default()
            })
            .with_progress(Box::new(NoProgress))
    }

    #[test]
    fn parallelism_is_at_least_one() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(processor(dir.path(), 8, Some("tok")).parallelism(), 8);
        assert_eq!(processor(dir.path(), 0, Some("tok")).parallelism(), 1);
    }

    #[test]
    fn parallelism_without_github_token_is_serial() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(processor(dir.path(), 8, None).parallelism(), 1);
        assert_eq!(processor(dir.path(), 1, None).parallelism(), 1);
    }

    #[test]
    fn failures_are_aggregated_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let tools: Vec<Tool> = serde_yaml::from_str(
            r#"
- {name: a, source: {type: none}}
- {name: b, output: /tmp, source: {type: svn}}
- {name: c, source: {type: none}}
"#,
        )
        .unwrap();
        let err = processor(dir.path(), 2, Some("tok"))
            .process(&tools, &TagFilter::default())
            .unwrap_err();
        assert_eq!((err.total, err.failed, err.skipped, err.successful), (3, 1, 2, 0));
        assert_eq!(err.details[0].tool, "b");
        let names: Vec<&str> = err.results.iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn writes_error_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("reports/errors.json");
        let mut processor = processor(dir.path(), 1, None);
        processor.config.error_file = Some(report.clone());
        let tools: Vec<Tool> = serde_yaml::from_str("[{name: b, output: /tmp, source: {type: svn}}]").unwrap();
        assert!(processor.process(&tools, &TagFilter::default()).is_err());

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(report).unwrap()).unwrap();
        assert_eq!(json[0]["tool"], "b");
        assert!(json[0]["error"].as_str().unwrap().contains("svn"));
    }

    #[test]
    fn cancelled_run_fails_every_tool() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor(dir.path(), 1, None);
        processor.cancel_token().cancel();
        let tools: Vec<Tool> = serde_yaml::from_str("[{name: a, source: {type: none}}]").unwrap();
        let err = processor.process(&tools, &TagFilter::default()).unwrap_err();
        assert_eq!(err.failed, 1);
        assert_eq!(err.details[0].kind, crate::ErrorKind::Cancelled);
    }
}
