// This file contains the logic for the `forgebin install` command.
// It reads the tool list and the optional defaults, builds the run configuration from
// flags and environment variables, wires Ctrl-C to cancellation and prints the
// result table once every tool is done.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use forgebin::libs::config_loading::{expand_path, load_defaults, load_tools};
use forgebin::libs::pipeline::TagFilter;
use forgebin::libs::report;
use forgebin::schemas::config::{Config, DEFAULT_PARALLEL, default_cache_dir};
use forgebin::schemas::tools::Strategy;
use forgebin::{Processor, log_debug, log_info, log_warn};
use std::path::PathBuf;

/// Flags of `forgebin install`.
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Tool list (YAML): a sequence of descriptors, or a mapping with `tools:`
    pub tools: String,

    /// Defaults file (YAML mapping of template name to partial descriptor)
    #[arg(long)]
    pub defaults: Option<String>,

    /// Output directory forced onto every tool
    #[arg(short, long)]
    pub output: Option<String>,

    /// Strategy forced onto every tool: none, sync, force or upgrade
    #[arg(short, long)]
    pub strategy: Option<Strategy>,

    /// Maximum number of tools processed concurrently
    #[arg(short = 'j', long, default_value_t = DEFAULT_PARALLEL)]
    pub parallel: usize,

    /// Directory holding cache.yml
    #[arg(long, env = "FORGEBIN_CACHE_DIR")]
    pub cache_dir: Option<String>,

    /// Only process tools carrying one of these tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Skip tools carrying one of these tags
    #[arg(long, value_delimiter = ',')]
    pub exclude_tags: Vec<String>,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitLab token
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: Option<String>,

    /// Bearer token for url sources
    #[arg(long, env = "URL_TOKEN", hide_env_values = true)]
    pub url_token: Option<String>,

    /// Ignore cached versions
    #[arg(long)]
    pub no_cache: bool,

    /// Disable TLS certificate verification
    #[arg(long)]
    pub no_verify_ssl: bool,

    /// Write failures as JSON to this file
    #[arg(long)]
    pub error_file: Option<String>,
}

impl InstallArgs {
    fn config(&self) -> Config {
        Config {
            parallel: self.parallel,
            cache_dir: self
                .cache_dir
                .as_deref()
                .map(expand_path)
                .unwrap_or_else(default_cache_dir),
            github_token: self.github_token.clone(),
            gitlab_token: self.gitlab_token.clone(),
            url_token: self.url_token.clone(),
            no_cache: self.no_cache,
            no_verify_ssl: self.no_verify_ssl,
            strategy: self.strategy,
            output: self.output.clone(),
            error_file: self.error_file.as_deref().map(expand_path),
            env_tokens: true,
        }
    }
}

/// Runs the `install` command.
///
/// # Returns
/// * `Ok(true)` when no tool failed, `Ok(false)` when at least one did.
/// * `Err` when the input files cannot be loaded.
pub fn run(args: InstallArgs) -> Result<bool> {
    let tools_path: PathBuf = expand_path(&args.tools);
    let mut loaded = load_tools(&tools_path)
        .with_context(|| format!("cannot load tool list {}", tools_path.display()))?;

    if let Some(defaults) = &args.defaults {
        let defaults_path = expand_path(defaults);
        let from_file = load_defaults(&defaults_path)
            .with_context(|| format!("cannot load defaults {}", defaults_path.display()))?;
        // Templates in the defaults file win over inline ones of the same name.
        loaded.defaults.extend(from_file);
    }

    let config = args.config();
    log_debug!("[Install] Cache directory: {}", config.cache_dir.display());

    let processor = Processor::new(config)
        .with_defaults(&loaded.defaults)
        .context("invalid defaults")?;

    let cancel = processor.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
        log_warn!("[Install] Cannot install Ctrl-C handler: {}", e);
    }

    let tags = TagFilter::new(args.tags, args.exclude_tags);
    match processor.process(&loaded.tools, &tags) {
        Ok(summary) => {
            report::print(&summary.results);
            log_info!(
                "{} {} installed, {} skipped",
                "Done:".bold(),
                summary.successful.to_string().green(),
                summary.skipped.to_string().yellow()
            );
            Ok(true)
        }
        Err(failure) => {
            report::print(&failure.results);
            log_warn!("{}", failure.to_string().red());
            Ok(false)
        }
    }
}
