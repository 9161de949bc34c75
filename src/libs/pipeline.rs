//! # Tool Pipeline
//!
//! Drives a single descriptor from its YAML form to an installed executable:
//!
//! ```text
//! Empty → Merged → TemplatedPre → Validated → SkipChecked → Resolved
//!       → StrategyDecided → Downloaded → PostCommanded → Cached
//! ```
//!
//! Every state is a plain function step in [`Pipeline::run`]; an `Err` anywhere turns
//! into a `Failed` [`ToolResult`] and a skip anywhere into a `Skipped` one. Nothing is
//! written to the output directory before the resolve and strategy steps pass, so a
//! skipped tool never touches the disk or, for `strategy: none`, the network.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use colored::Colorize;

use crate::libs::asset_matcher::Requirements;
use crate::libs::checksum;
use crate::libs::errors::{Error, Result};
use crate::libs::inheritance;
use crate::libs::installation::InstallRequest;
use crate::libs::merge::Merge;
use crate::libs::progress::ProgressTracker;
use crate::libs::strategy::{self, Decision};
use crate::libs::templating::{self, Pass};
use crate::libs::utilities::assets::HttpClient;
use crate::libs::utilities::shell;
use crate::populators::{Asset, Populator, Services, factory};
use crate::schemas::cache_file::{Cache, CacheItem};
use crate::schemas::platform::Platform;
use crate::schemas::results::ToolResult;
use crate::schemas::tools::{ChecksumType, SourceKind, Strategy, Tool, with_extension};
use crate::{log_debug, log_info, log_warn};

// ============================================================================
// TAG FILTER
// ============================================================================

/// Include/exclude tag sets given on the command line.
///
/// A tool is selected when it carries at least one included tag (or no includes
/// were given) and none of the excluded ones. Every tool implicitly carries its own
/// name as a tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl TagFilter {
    /// Builds a filter from `include` and `exclude` lists.
    #[must_use]
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Whether a tool carrying `tags` passes the filter.
    #[must_use]
    pub fn selects(&self, tags: &[String]) -> bool {
        let included = self.include.is_empty() || tags.iter().any(|t| self.include.contains(t));
        let excluded = tags.iter().any(|t| self.exclude.contains(t));
        included && !excluded
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Shared, read-only state for running descriptors through the pipeline.
pub struct Pipeline<'a> {
    /// HTTP client, configuration and cancellation.
    pub services: &'a Services,
    /// Detected host platform.
    pub host: &'a Platform,
    /// Defaults with inheritance already resolved.
    pub defaults: &'a BTreeMap<String, Tool>,
    /// The install cache, read for installed versions.
    pub cache: &'a Mutex<Cache>,
    /// Receives download streams.
    pub progress: &'a dyn ProgressTracker,
    /// Tag selection of this run.
    pub tags: &'a TagFilter,
}

// What a resolved source produced.
struct Resolved {
    tool: Tool,
    kind: SourceKind,
    populator: Populator,
    asset: Asset,
}

enum Outcome {
    Skipped(String),
    Installed {
        path: PathBuf,
        message: String,
        record: CacheItem,
    },
}

impl Pipeline<'_> {
    /// Runs one descriptor to completion.
    ///
    /// # Arguments
    /// * `tool`: The descriptor as read from the tool list.
    ///
    /// # Returns
    /// * `ToolResult`: never an error; failures are carried in the result.
    pub fn run(&self, tool: &Tool) -> ToolResult {
        let mut version = tool.version.version.clone();
        match self.execute(tool, &mut version) {
            Ok(Outcome::Skipped(reason)) => {
                log_info!("[Pipeline] {} skipped: {}", tool.name.bold(), reason.yellow());
                ToolResult::skipped(&tool.name, &version, reason)
            }
            Ok(Outcome::Installed { path, message, record }) => {
                log_info!(
                    "[Pipeline] {} {} installed at {}",
                    tool.name.bold(),
                    version.green(),
                    path.display().to_string().cyan()
                );
                ToolResult::success(&tool.name, &version, path, message, record)
            }
            Err(e) => {
                log_warn!("[Pipeline] {} failed: {}", tool.name.bold(), e.to_string().red());
                ToolResult::failed(&tool.name, &version, e)
            }
        }
    }

    fn execute(&self, input: &Tool, version: &mut String) -> Result<Outcome> {
        // Merged
        let mut tool = self.merge(input)?;

        // TemplatedPre
        templating::apply(&mut tool, Pass::Pre, &BTreeMap::new())?;

        // Validated
        let kind = validate(&mut tool)?;
        if !tool.tags.contains(&tool.name) {
            tool.tags.push(tool.name.clone());
        }

        // SkipChecked
        if let Some(reason) = self.skip_reason(&tool, kind)? {
            return Ok(Outcome::Skipped(reason));
        }

        // Resolved
        let services = self.services_for(&tool)?;
        let Resolved {
            tool,
            kind,
            populator,
            asset,
        } = self.resolve(&tool, kind, &services)?;
        *version = tool.version.version.clone();

        // StrategyDecided
        let exe = Path::new(&tool.output).join(tool.exe_file_name());
        if let Decision::Skip(reason) = self.decide(&tool, &exe)? {
            return Ok(Outcome::Skipped(reason));
        }

        // Downloaded
        let expectation = checksum::resolve(&tool.checksum, &asset, &services.client)?;
        let installed = populator.install(&InstallRequest {
            tool: &tool,
            asset: &asset,
            expectation: &expectation,
            client: &services.client,
            progress: self.progress,
            cancel: &services.cancel,
        })?;

        // PostCommanded
        let mut message = installed.log.clone();
        if !tool.commands.is_empty() {
            log_info!("[Pipeline] Running {} post-install command(s) for {}", tool.commands.len(), tool.name.bold());
            let output = shell::run_all(&tool.commands, &tool.env, &services.cancel)?;
            log_debug!("[Pipeline] Post-install output for {}: {}", tool.name, output);
            message.push_str(&format!(", ran {} command(s)", tool.commands.len()));
        }

        // Cached
        let now = Utc::now();
        let record = CacheItem {
            id: tool.id(),
            name: tool.name.clone(),
            path: installed.path.display().to_string(),
            version: tool.version.version.clone(),
            downloaded: now,
            updated: now,
            kind: kind.as_str().to_string(),
        };
        Ok(Outcome::Installed {
            path: installed.path,
            message,
            record,
        })
    }

    /// Applies inherited defaults, then the run-wide overrides, then the host platform.
    fn merge(&self, input: &Tool) -> Result<Tool> {
        let merged = inheritance::apply_defaults(input, self.defaults)?;
        let mut tool = merged.merge_from(&[&self.services.config.overrides()]);
        tool.platform.complete_from(self.host);
        Ok(tool)
    }

    fn skip_reason(&self, tool: &Tool, kind: SourceKind) -> Result<Option<String>> {
        if !self.tags.selects(&tool.tags) {
            return Ok(Some("excluded by tags".to_string()));
        }
        for skip in &tool.skip {
            if condition_met(&skip.condition)? {
                return Ok(Some(if skip.reason.is_empty() {
                    "skip condition met".to_string()
                } else {
                    skip.reason.clone()
                }));
            }
        }
        if kind == SourceKind::None {
            return Ok(Some("source type is none".to_string()));
        }
        // The exe name may still depend on the version; that case is left to the
        // strategy step after resolution.
        if tool.strategy() == Strategy::None && !tool.exe.name.contains("{{") {
            let exe = Path::new(&tool.output).join(tool.exe_file_name());
            if exe.exists() {
                return Ok(Some("already exists".to_string()));
            }
        }
        Ok(None)
    }

    // Per-tool TLS settings need their own client.
    fn services_for(&self, tool: &Tool) -> Result<Services> {
        if tool.no_verify_ssl() && !self.services.config.no_verify_ssl {
            log_warn!("[Pipeline] TLS verification disabled for {}", tool.name.bold());
            return Ok(Services {
                client: HttpClient::new(true)?,
                ..self.services.clone()
            });
        }
        Ok(self.services.clone())
    }

    /// Tries the primary source, then every fallback in order.
    ///
    /// Failures of all but the last attempt are logged as warnings. With a single
    /// source its error is returned as is; with several, `Error::Exhausted` lists them.
    fn resolve(&self, tool: &Tool, primary: SourceKind, services: &Services) -> Result<Resolved> {
        let mut kinds = vec![primary];
        for fallback in &tool.fallbacks {
            if !kinds.contains(fallback) {
                kinds.push(*fallback);
            }
        }

        let mut failures = Vec::new();
        let mut last = None;
        for kind in &kinds {
            services.cancel.check()?;
            match resolve_with(tool, *kind, services) {
                Ok(resolved) => {
                    if !failures.is_empty() {
                        log_info!("[Pipeline] {} resolved through fallback {}", tool.name.bold(), kind.as_str().cyan());
                    }
                    return Ok(resolved);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    log_warn!("[Pipeline] Source {} failed for {}: {}", kind.as_str().yellow(), tool.name, e);
                    failures.push(format!("{}: {}", kind.as_str(), e));
                    last = Some(e);
                }
            }
        }

        match last {
            Some(e) if kinds.len() == 1 => Err(e),
            _ => Err(Error::Exhausted {
                tool: tool.name.clone(),
                failures,
            }),
        }
    }

    fn decide(&self, tool: &Tool, exe: &Path) -> Result<Decision> {
        let strategy = tool.strategy();
        let installed = match strategy {
            Strategy::Sync | Strategy::Upgrade => {
                let cached = self
                    .cache
                    .lock()
                    .map_err(|_| Error::validation("cache lock poisoned"))?
                    .get(&tool.id())
                    .cloned();
                strategy::installed_version(
                    exe,
                    cached.as_ref(),
                    tool.no_cache(),
                    &tool.version.commands,
                    &tool.version.patterns,
                    &self.services.cancel,
                )
            }
            Strategy::None | Strategy::Force => None,
        };
        strategy::decide(strategy, exe, &tool.version.version, installed.as_deref())
    }
}

/// Resolves version and asset through one source.
///
/// The descriptor is cloned so a failed attempt leaves no rendered fields behind
/// for the next fallback.
fn resolve_with(input: &Tool, kind: SourceKind, services: &Services) -> Result<Resolved> {
    let mut tool = input.clone();
    tool.source.kind = kind.as_str().to_string();

    let mut populator = factory(kind, &tool, services)?;
    if tool.version.version.is_empty() {
        tool.version.version = populator.version()?;
    }
    log_debug!(
        "[Pipeline] {} version {} via {}",
        tool.name,
        tool.version.version.cyan(),
        kind.as_str()
    );

    templating::apply(&mut tool, Pass::Post, &populator.metadata())?;
    let base = if tool.exe.name.is_empty() {
        tool.name.clone()
    } else {
        tool.exe.name.clone()
    };
    tool.exe.name = with_extension(&base, &tool.platform.extension);

    let requirements = Requirements {
        platform: tool.platform.clone(),
        hints: tool.hints.clone(),
        extensions: tool.extensions.clone(),
    };
    let explicit_url = !tool.url.is_empty()
        && matches!(kind, SourceKind::GitHub | SourceKind::GitLab | SourceKind::Command);
    let asset = if explicit_url {
        Asset::from_url(&tool.url, Vec::new())
    } else {
        let version = tool.version.version.clone();
        populator.path(&tool, &version, &requirements)?
    };
    tool.url = asset.url.clone();

    templating::apply(&mut tool, Pass::PostUrl, &populator.metadata())?;
    Ok(Resolved {
        tool,
        kind,
        populator,
        asset,
    })
}

/// Checks required fields, parses the source kind and expands the output path.
fn validate(tool: &mut Tool) -> Result<SourceKind> {
    if tool.name.trim().is_empty() {
        return Err(Error::validation("tool name is required"));
    }
    if tool.source.kind.trim().is_empty() {
        return Err(Error::validation(format!("{}: source.type is required", tool.name)));
    }
    let kind: SourceKind = tool.source.kind.parse().map_err(Error::UnknownSource)?;
    tool.checksum
        .kind
        .parse::<ChecksumType>()
        .map_err(|other| Error::validation(format!("{}: unknown checksum type '{other}'", tool.name)))?;
    if kind != SourceKind::None {
        if tool.output.trim().is_empty() {
            return Err(Error::validation(format!("{}: output is required", tool.name)));
        }
        tool.output = expand_path(&tool.output)?;
    }
    Ok(kind)
}

/// Expands `~` and `$VAR` in `path`.
pub fn expand_path(path: &str) -> Result<String> {
    shellexpand::full(path.trim())
        .map(|expanded| expanded.into_owned())
        .map_err(|e| Error::validation(format!("cannot expand '{path}': {e}")))
}

// A rendered skip condition must be a boolean.
fn condition_met(condition: &str) -> Result<bool> {
    let rendered = condition.trim();
    if rendered.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if rendered.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::validation(format!(
            "skip condition must render to true or false, got '{rendered}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::cancel::CancelToken;
    use crate::libs::errors::ErrorKind;
    use crate::libs::progress::NoProgress;
    use crate::populators::testing::serve;
    use crate::schemas::config::Config;
    use crate::schemas::results::Status;
    use std::fs;

    fn host() -> Platform {
        Platform {
            os: "linux".into(),
            arch: "amd64".into(),
            libc: "gnu".into(),
            ..Platform::default()
        }
    }

    fn services() -> Services {
        Services {
            client: HttpClient::new(false).unwrap(),
            config: Config::default(),
            cancel: CancelToken::new(),
        }
    }

    fn run(tool: &Tool, tags: &TagFilter) -> ToolResult {
        let services = services();
        let host = host();
        let defaults = BTreeMap::new();
        let cache = Mutex::new(Cache::default());
        let pipeline = Pipeline {
            services: &services,
            host: &host,
            defaults: &defaults,
            cache: &cache,
            progress: &NoProgress,
            tags,
        };
        pipeline.run(tool)
    }

    fn tool(yaml: &str) -> Tool {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn tag_filter_selection() {
        let filter = TagFilter::new(vec!["cli".into()], vec!["slow".into()]);
        assert!(filter.selects(&["cli".into()]));
        assert!(!filter.selects(&["cli".into(), "slow".into()]));
        assert!(!filter.selects(&["other".into()]));
        assert!(TagFilter::default().selects(&[]));
    }

    #[test]
    fn unknown_source_is_a_usage_failure() {
        let result = run(&tool("{name: t, output: /tmp, source: {type: svn}}"), &TagFilter::default());
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.error.unwrap().kind(), ErrorKind::Usage);
    }

    #[test]
    fn missing_name_fails() {
        let result = run(&tool("{output: /tmp, source: {type: url}}"), &TagFilter::default());
        assert_eq!(result.status, Status::Failed);
    }

    #[test]
    fn name_is_an_implicit_tag() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!("{{name: gh, output: {}, source: {{type: none}}}}", dir.path().display());
        let only_gh = TagFilter::new(vec!["gh".into()], Vec::new());
        let result = run(&tool(&yaml), &only_gh);
        assert_eq!(result.message, "source type is none");

        let not_gh = TagFilter::new(Vec::new(), vec!["gh".into()]);
        assert_eq!(run(&tool(&yaml), &not_gh).message, "excluded by tags");
    }

    #[test]
    fn templated_skip_condition() {
        let yaml = r#"
name: win-only
output: /tmp/bin
source: {type: url, url: {url: "https://example.invalid/x"}}
skip:
  - reason: windows only
    condition: '{{ ne .Platform.OS "windows" }}'
"#;
        let result = run(&tool(yaml), &TagFilter::default());
        assert_eq!(result.status, Status::Skipped);
        assert_eq!(result.message, "windows only");
    }

    #[test]
    fn skip_condition_must_render_a_boolean() {
        let yaml = r#"
name: typo
output: /tmp/bin
source: {type: url, url: {url: "https://example.invalid/x"}}
skip:
  - reason: never
    condition: "false"
  - reason: misspelled
    condition: ture
"#;
        let result = run(&tool(yaml), &TagFilter::default());
        assert_eq!(result.status, Status::Failed);
        let error = result.error.as_ref().unwrap();
        assert_eq!(error.kind(), ErrorKind::Usage);
        assert!(error.to_string().contains("'ture'"), "{error}");
    }

    #[test]
    fn strategy_none_skips_existing_binary_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t"), b"#!/bin/sh\n").unwrap();
        let yaml = format!(
            "{{name: t, output: {}, exe: t, strategy: none, source: {{type: github, github: {{repo: o/t, api: 'http://127.0.0.1:9'}}}}}}",
            dir.path().display()
        );
        let result = run(&tool(&yaml), &TagFilter::default());
        assert_eq!(result.status, Status::Skipped);
        assert_eq!(result.message, "already exists");
    }

    #[test]
    fn installs_from_url_and_records_cache_item() {
        let base = serve(vec![("/dl/t-1.2.0", 200, "#!/bin/sh\necho 1.2.0\n".to_string())]);
        let out = tempfile::tempdir().unwrap();
        let yaml = format!(
            "{{name: t, version: 1.2.0, output: {}, strategy: force, source: {{type: url, url: {{url: '{}/dl/t-{{{{ .Version }}}}'}}}}}}",
            out.path().display(),
            base
        );
        let result = run(&tool(&yaml), &TagFilter::default());
        assert_eq!(result.status, Status::Success, "{:?}", result.error);
        assert_eq!(result.version, "1.2.0");
        assert_eq!(result.path.as_deref(), Some(out.path().join("t").as_path()));
        let record = result.record.unwrap();
        assert_eq!(record.kind, "url");
        assert_eq!(record.version, "1.2.0");
        assert_eq!(record.id, crate::schemas::tools::tool_id(&out.path().display().to_string(), "t"));
    }

    #[test]
    fn checksum_value_can_use_source_metadata() {
        use sha2::{Digest, Sha256};

        let body = "#!/bin/sh\necho 2.0.0\n".to_string();
        let digest = hex::encode(Sha256::digest(body.as_bytes()));
        let base = serve(vec![
            ("/dl/t-2.0.0", 200, body),
            ("/dl/t-2.0.0.sha256", 200, format!("{digest}  t-2.0.0\n")),
        ]);
        let out = tempfile::tempdir().unwrap();
        let yaml = format!(
            "{{name: t, version: 2.0.0, output: {}, strategy: force, checksum: {{type: sha256, value: 'url:{{{{ .Source.URL }}}}.sha256'}}, source: {{type: url, url: {{url: '{}/dl/t-{{{{ .Version }}}}'}}}}}}",
            out.path().display(),
            base
        );
        let result = run(&tool(&yaml), &TagFilter::default());
        assert_eq!(result.status, Status::Success, "{:?}", result.error);
        assert!(out.path().join("t").exists());
    }

    #[test]
    fn single_source_failure_keeps_its_kind() {
        let base = serve(Vec::new());
        let yaml = format!(
            "{{name: t, output: /tmp/forgebin-none, source: {{type: github, github: {{repo: o/t, api: '{base}'}}}}}}"
        );
        let result = run(&tool(&yaml), &TagFilter::default());
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.error.unwrap().kind(), ErrorKind::Resolve);
    }

    #[test]
    fn expands_home_in_output() {
        let mut t = tool("{name: t, output: '~/bin', source: {type: url}}");
        validate(&mut t).unwrap();
        assert!(!t.output.starts_with('~'));
    }
}
