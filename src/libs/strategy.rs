//! # Download Strategies
//!
//! Decides whether a resolved tool actually needs to be downloaded:
//!
//! - `force`: always.
//! - `none`: only when the executable is not in the output directory yet.
//! - `sync`: when the resolved version differs from the installed one.
//! - `upgrade`: like `sync`, but an installed version newer than the target is an
//!   error rather than a silent downgrade. Versions that do not parse leniently as
//!   semver make `upgrade` fall back to `sync` with a warning.
//!
//! The installed version comes from the cache unless `no-cache` is set, otherwise
//! from running the executable with `version.commands` and matching `version.patterns`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use regex::Regex;
use semver::Version;

use crate::libs::cancel::CancelToken;
use crate::libs::errors::{Error, Result};
use crate::libs::utilities::shell;
use crate::schemas::cache_file::CacheItem;
use crate::schemas::tools::Strategy;
use crate::{log_debug, log_warn};

/// Arguments tried when a descriptor lists no `version.commands`.
pub const DEFAULT_VERSION_COMMANDS: [&str; 3] = ["--version", "-v", "version"];

/// Version regex used when a descriptor lists no `version.patterns`.
pub const DEFAULT_VERSION_PATTERN: &str = r"\d+\.\d+\.\d+(?:[-+][0-9A-Za-z.\-]+)?";

/// How long a single version command may run before it is killed.
pub const DETECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a strategy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Download and install.
    Proceed,
    /// Leave the tool alone, with the reason reported to the user.
    Skip(String),
}

/// Applies `strategy` to the current state of the output directory.
///
/// # Arguments
/// * `strategy`: Effective strategy of the tool.
/// * `exe`: Full path of the installed executable.
/// * `target`: Resolved version.
/// * `installed`: Installed version, when known.
///
/// # Returns
/// * `Ok(Decision)`, or `Err(Error::Downgrade)` when `upgrade` finds a newer install.
pub fn decide(
    strategy: Strategy,
    exe: &Path,
    target: &str,
    installed: Option<&str>,
) -> Result<Decision> {
    if strategy == Strategy::Force {
        return Ok(Decision::Proceed);
    }
    if !exe.exists() {
        return Ok(Decision::Proceed);
    }

    match strategy {
        Strategy::Force => Ok(Decision::Proceed),
        Strategy::None => Ok(Decision::Skip("already exists".into())),
        Strategy::Sync => Ok(sync(target, installed)),
        Strategy::Upgrade => {
            let Some(installed) = installed else {
                return Ok(Decision::Proceed);
            };
            match (parse_lenient(installed), parse_lenient(target)) {
                (Some(have), Some(want)) => match have.cmp(&want) {
                    Ordering::Greater => Err(Error::Downgrade {
                        installed: installed.to_string(),
                        target: target.to_string(),
                    }),
                    Ordering::Equal => Ok(Decision::Skip(format!("already at version {target}"))),
                    Ordering::Less => Ok(Decision::Proceed),
                },
                _ => {
                    log_warn!(
                        "[Strategy] Cannot compare versions '{}' and '{}'; treating upgrade as sync",
                        installed.yellow(),
                        target.yellow()
                    );
                    Ok(sync(target, Some(installed)))
                }
            }
        }
    }
}

fn sync(target: &str, installed: Option<&str>) -> Decision {
    match installed {
        Some(installed) if versions_equal(installed, target) => {
            Decision::Skip(format!("already at version {target}"))
        }
        _ => Decision::Proceed,
    }
}

/// Compares two versions semantically, falling back to text without a `v` prefix.
#[must_use]
pub fn versions_equal(a: &str, b: &str) -> bool {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(x), Some(y)) => x == y,
        _ => strip_v(a) == strip_v(b),
    }
}

fn strip_v(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed
        .strip_prefix(['v', 'V'])
        .unwrap_or(trimmed)
}

/// Parses `v1.2`, `1.2.3-rc.1`, `2` and similar into a semver version.
#[must_use]
pub fn parse_lenient(version: &str) -> Option<Version> {
    let version = strip_v(version);
    let split = version.find(['-', '+']).unwrap_or(version.len());
    let (core, rest) = version.split_at(split);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let mut padded: Vec<&str> = parts.clone();
    while padded.len() < 3 {
        padded.push("0");
    }
    Version::parse(&format!("{}{rest}", padded.join("."))).ok()
}

/// Installed version of a tool: the cache record unless bypassed, else detected by running the executable.
pub fn installed_version(
    exe: &Path,
    cached: Option<&CacheItem>,
    no_cache: bool,
    commands: &[String],
    patterns: &[String],
    cancel: &CancelToken,
) -> Option<String> {
    if !no_cache {
        if let Some(item) = cached {
            log_debug!("[Strategy] Using cached version {} for {}", item.version.cyan(), item.name);
            return Some(item.version.clone());
        }
    }
    if !exe.exists() {
        return None;
    }
    detect_version(exe, commands, patterns, cancel)
}

/// Runs the executable and extracts its version from the output.
///
/// Each version command gets [`DETECT_TIMEOUT`]; output of a non-zero exit is still
/// searched.
#[must_use]
pub fn detect_version(
    exe: &Path,
    commands: &[String],
    patterns: &[String],
    cancel: &CancelToken,
) -> Option<String> {
    detect_version_within(exe, commands, patterns, cancel, DETECT_TIMEOUT)
}

fn detect_version_within(
    exe: &Path,
    commands: &[String],
    patterns: &[String],
    cancel: &CancelToken,
    timeout: Duration,
) -> Option<String> {
    let commands: Vec<String> = if commands.is_empty() {
        DEFAULT_VERSION_COMMANDS.iter().map(|c| c.to_string()).collect()
    } else {
        commands.to_vec()
    };
    let regexes: Vec<Regex> = if patterns.is_empty() {
        Regex::new(DEFAULT_VERSION_PATTERN).into_iter().collect()
    } else {
        patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    log_warn!("[Strategy] Ignoring invalid version pattern '{}': {}", p, e);
                    None
                }
            })
            .collect()
    };

    let program = exe.display().to_string();
    for command in &commands {
        let args: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        let text = match shell::run_program_within(&program, &args, &BTreeMap::new(), cancel, timeout) {
            Ok((stdout, stderr)) => format!("{stdout}\n{stderr}"),
            Err(Error::Command { output, .. }) => output,
            Err(Error::Cancelled) => return None,
            Err(e) => {
                log_debug!("[Strategy] Failed to run {} {}: {}", program, command, e);
                continue;
            }
        };

        for regex in &regexes {
            if let Some(captures) = regex.captures(&text) {
                let found = captures.get(1).or_else(|| captures.get(0));
                if let Some(found) = found {
                    let version = found.as_str().trim().to_string();
                    log_debug!("[Strategy] Detected version {} from {}", version.cyan(), exe.display());
                    return Some(version);
                }
            }
        }
    }
    None
}
