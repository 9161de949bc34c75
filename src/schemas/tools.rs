//! # Tool Descriptor Schema
//!
//! This module defines the data structures for tool descriptors: what to install,
//! where it comes from, how to pick the right release asset and how to decide
//! whether any work is needed. Descriptors are parsed from YAML tool lists and
//! defaults files, and every field is optional so partial descriptors can be merged
//! with the templates they inherit from.
//!
//! ## Usage Example
//!
//! ```yaml
//! - name: gh
//!   version: "2.0.0"
//!   source:
//!     type: github
//!     github:
//!       repo: cli/cli
//!   output: ~/.local/bin
//!   strategy: sync
//!   checksum:
//!     type: file
//!   skip:
//!     - reason: "musl only"
//!       condition: '{{ ne .Platform.Libc "musl" }}'
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::schemas::platform::Platform;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Supported release sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// GitHub releases API.
    GitHub,
    /// GitLab releases API.
    GitLab,
    /// A plain (templated) URL.
    Url,
    /// `go install` of a module package.
    Go,
    /// An external command that prints the download URL.
    Command,
    /// No source at all; the tool is always skipped.
    None,
}

impl SourceKind {
    /// Lowercase name as used in descriptors and the cache.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Url => "url",
            Self::Go => "go",
            Self::Command => "command",
            Self::None => "none",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            "url" => Ok(Self::Url),
            "go" => Ok(Self::Go),
            "command" => Ok(Self::Command),
            "none" => Ok(Self::None),
            other => Err(other.to_string()),
        }
    }
}

/// Policy that decides whether a download is necessary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Skip when the executable already exists.
    #[default]
    None,
    /// Download when the resolved version differs from the installed one.
    Sync,
    /// Always download.
    Force,
    /// Like `sync`, but never replace a newer installed version.
    Upgrade,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Sync => "sync",
            Self::Force => "force",
            Self::Upgrade => "upgrade",
        };
        f.write_str(name)
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "sync" => Ok(Self::Sync),
            "force" => Ok(Self::Force),
            "upgrade" => Ok(Self::Upgrade),
            other => Err(format!("unknown strategy '{other}' (expected none, sync, force or upgrade)")),
        }
    }
}

/// How the downloaded artifact is turned into installed files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Copy the whole extracted archive into the output directory.
    Extract,
    /// Locate a single executable by `exe.patterns` and place it in the output.
    #[default]
    Find,
}

/// How a hint pattern is compared against an asset name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintType {
    /// Case-insensitive substring.
    #[default]
    Contains,
    /// Case-insensitive glob over the whole name.
    Glob,
    /// Regular expression.
    Regex,
}

/// What a matching (or non-matching) hint does to a candidate's score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HintMatch {
    /// Adds `weight` when the pattern matches.
    #[default]
    Weighted,
    /// Eliminates the candidate when the pattern does not match.
    Must,
    /// Eliminates the candidate when the pattern matches.
    MustNot,
    /// Subtracts `weight` when the pattern matches.
    Negative,
}

/// Supported checksum algorithms plus the `none` and `file` modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    /// No verification.
    #[default]
    None,
    /// SHA-256 hex digest.
    Sha256,
    /// SHA-512 hex digest.
    Sha512,
    /// SHA-1 hex digest.
    Sha1,
    /// MD5 hex digest.
    Md5,
    /// A checksums file published next to the asset.
    File,
}

impl FromStr for ChecksumType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "sha1" => Ok(Self::Sha1),
            "md5" => Ok(Self::Md5),
            "file" => Ok(Self::File),
            other => Err(other.to_string()),
        }
    }
}

// ============================================================================
// NESTED SCHEMAS
// ============================================================================

/// Target version plus the rules for reading the installed version back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Version {
    /// Target version. Empty means "ask the source for the latest".
    #[serde(alias = "literal")]
    pub version: String,
    /// Arguments passed to the installed executable to print its version.
    pub commands: Vec<String>,
    /// Regexes extracting the version from that output.
    pub patterns: Vec<String>,
}

/// Name of the installed executable and how to find it inside archives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exe {
    /// File name in the output directory. Defaults to the tool name.
    pub name: String,
    /// Regexes matched against archive entry names.
    pub patterns: Vec<String>,
}

/// A scoring rule for the asset matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hint {
    /// Pattern to look for in asset names.
    pub pattern: String,
    /// Score contribution. Defaults to 1.
    pub weight: Option<i64>,
    /// Comparison used for `pattern`.
    #[serde(rename = "type")]
    pub kind: HintType,
    /// Effect of the comparison on the score.
    #[serde(rename = "match")]
    pub matching: HintMatch,
}

impl Hint {
    /// Weight with the default applied.
    #[must_use]
    pub fn weight(&self) -> i64 {
        self.weight.unwrap_or(1)
    }
}

/// A condition that, when it renders to `true`, skips the tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Skip {
    /// Message reported when the condition holds.
    pub reason: String,
    /// Boolean template expression.
    pub condition: String,
}

/// GitHub releases configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSource {
    /// `owner/name`.
    pub repo: String,
    /// API token; falls back to the configured or environment token.
    pub token: String,
    /// Accept pre-releases when looking up the latest version.
    pub pre: Option<bool>,
    /// API base URL. Defaults to `https://api.github.com`.
    pub api: String,
}

/// GitLab releases configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitLabSource {
    /// Project path, e.g. `gitlab-org/cli`.
    pub project: String,
    /// API token; falls back to the configured or environment token.
    pub token: String,
    /// Server base URL. Defaults to `https://gitlab.com`.
    pub server: String,
    /// Accept upcoming releases when looking up the latest version.
    pub pre: Option<bool>,
}

/// Plain URL configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlSource {
    /// Download URL template.
    pub url: String,
    /// Bearer token sent as `Authorization`.
    pub token: String,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
}

/// `go install` configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoSource {
    /// Package path passed to `go install`.
    pub package: String,
    /// Module path used for the latest-version lookup. Derived from `package` when empty.
    pub module: String,
    /// Go executable. Defaults to `go`.
    pub command: String,
}

/// External-command configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSource {
    /// Shell commands whose trimmed stdout is the download URL.
    pub commands: Vec<String>,
}

/// Where a tool comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    /// Source kind as written; templated before being parsed into a [`SourceKind`].
    #[serde(rename = "type")]
    pub kind: String,
    /// GitHub settings.
    pub github: GitHubSource,
    /// GitLab settings.
    pub gitlab: GitLabSource,
    /// URL settings.
    pub url: UrlSource,
    /// Go settings.
    pub go: GoSource,
    /// Command settings.
    pub command: CommandSource,
}

/// Integrity verification settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checksum {
    /// `none`, `sha256`, `sha512`, `sha1`, `md5` or `file`; templated before parsing.
    #[serde(rename = "type")]
    pub kind: String,
    /// Hex digest, or `url:` / `path:` pointing at content holding it.
    pub value: String,
    /// Regex extracting the digest from free-form content.
    pub pattern: String,
    /// File name to look up in a checksums file. Defaults to the asset name.
    pub entry: String,
}

// ============================================================================
// TOOL DESCRIPTOR
// ============================================================================

/// A single tool descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Tool {
    /// Short identifier, also used as an implicit tag.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Target version and installed-version probing.
    #[serde(deserialize_with = "version_or_scalar")]
    pub version: Version,
    /// Explicit download URL; populators fill it when empty.
    pub url: String,
    /// Directory the executable is placed in.
    pub output: String,
    /// Executable name and archive patterns.
    #[serde(deserialize_with = "exe_or_scalar")]
    pub exe: Exe,
    /// Target platform overrides.
    pub platform: Platform,
    /// Additional names linked or copied next to the executable.
    pub aliases: Vec<String>,
    /// Arbitrary template variables.
    pub values: BTreeMap<String, serde_yaml::Value>,
    /// Sources tried when the primary one fails.
    pub fallbacks: Vec<SourceKind>,
    /// Asset-matching hints.
    pub hints: Vec<Hint>,
    /// Source selection and per-kind settings.
    pub source: Source,
    /// Shell commands run after installation.
    pub commands: Vec<String>,
    /// Tags used for include/exclude filtering.
    pub tags: Vec<String>,
    /// Download policy.
    pub strategy: Option<Strategy>,
    /// Acceptable archive extensions.
    pub extensions: Vec<String>,
    /// Skip conditions.
    pub skip: Vec<Skip>,
    /// Installation mode.
    pub mode: Option<Mode>,
    /// Environment for templates and post-install commands.
    pub env: BTreeMap<String, String>,
    /// Integrity verification.
    pub checksum: Checksum,
    /// Disable TLS certificate verification.
    pub no_verify_ssl: Option<bool>,
    /// Ignore the cache when deciding whether to download.
    pub no_cache: Option<bool>,
    /// Template names this descriptor inherits from.
    #[serde(deserialize_with = "list_or_scalar")]
    pub inherit: Vec<String>,
}

impl Tool {
    /// Stable identifier: hex SHA-256 of `output + "/" + name`.
    #[must_use]
    pub fn id(&self) -> String {
        tool_id(&self.output, &self.name)
    }

    /// Executable file name with the platform suffix applied.
    #[must_use]
    pub fn exe_file_name(&self) -> String {
        let base = if self.exe.name.is_empty() {
            &self.name
        } else {
            &self.exe.name
        };
        with_extension(base, &self.platform.extension)
    }

    /// Effective strategy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy.unwrap_or_default()
    }

    /// Effective installation mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or_default()
    }

    /// Whether TLS verification is disabled for this tool.
    #[must_use]
    pub fn no_verify_ssl(&self) -> bool {
        self.no_verify_ssl.unwrap_or(false)
    }

    /// Whether the cache is bypassed for this tool.
    #[must_use]
    pub fn no_cache(&self) -> bool {
        self.no_cache.unwrap_or(false)
    }
}

/// Computes the cache id for an output directory and tool name.
#[must_use]
pub fn tool_id(output: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(output.as_bytes());
    hasher.update(b"/");
    hasher.update(name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Appends `extension` to `name` unless it already ends with it.
#[must_use]
pub fn with_extension(name: &str, extension: &str) -> String {
    if extension.is_empty() || name.to_lowercase().ends_with(&extension.to_lowercase()) {
        name.to_string()
    } else {
        format!("{name}{extension}")
    }
}

// ============================================================================
// SCALAR SHORTHANDS
// ============================================================================

// Scalars are read through `serde_yaml::Value` and stringified rather than through an
// untagged enum, so `exe: 7z` and `inherit: base` work alike.
fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn version_or_scalar<'de, D>(deserializer: D) -> Result<Version, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(Version::default());
    }
    // `1.20` arrives as the float 1.2; its source text is gone by now.
    if let serde_yaml::Value::Number(n) = &value {
        if n.is_f64() {
            return Err(D::Error::custom(format!(
                "version {n} must be quoted: YAML reads unquoted decimals as numbers and drops trailing zeros"
            )));
        }
    }
    if let Some(literal) = scalar_to_string(&value) {
        return Ok(Version {
            version: literal,
            ..Version::default()
        });
    }
    serde_yaml::from_value(value).map_err(D::Error::custom)
}

fn exe_or_scalar<'de, D>(deserializer: D) -> Result<Exe, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(Exe::default());
    }
    if let Some(name) = scalar_to_string(&value) {
        return Ok(Exe {
            name,
            ..Exe::default()
        });
    }
    serde_yaml::from_value(value).map_err(D::Error::custom)
}

fn list_or_scalar<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    match value {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| D::Error::custom("expected a list of names"))
            })
            .collect(),
        other => scalar_to_string(&other)
            .map(|s| vec![s])
            .ok_or_else(|| D::Error::custom("expected a name or a list of names")),
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct SkipFields {
    reason: String,
    condition: String,
}

impl<'de> Deserialize<'de> for Skip {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        if let Some(condition) = scalar_to_string(&value) {
            return Ok(Skip {
                reason: String::new(),
                condition,
            });
        }
        let fields: SkipFields = serde_yaml::from_value(value).map_err(D::Error::custom)?;
        Ok(Skip {
            reason: fields.reason,
            condition: fields.condition,
        })
    }
}
