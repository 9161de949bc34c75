// Reads the YAML files a run starts from: the tool list and the optional defaults.
// Paths given on the command line may use `~` and `$VAR`; both are expanded here.
use colored::Colorize;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use crate::libs::errors::{Error, Result};
use crate::schemas::tools::Tool;
use crate::{log_debug, log_info};

/// Accepted shapes of a tool list file.
///
/// Either a bare sequence of descriptors, or a mapping with a `tools:` key that may
/// also carry the defaults inline under `defaults:`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolFile {
    List(Vec<Tool>),
    Document {
        tools: Vec<Tool>,
        #[serde(default)]
        defaults: BTreeMap<String, Tool>,
    },
}

/// Everything loaded from the tool list file.
#[derive(Debug, Default)]
pub struct LoadedTools {
    /// Descriptors in file order.
    pub tools: Vec<Tool>,
    /// Defaults declared in the same file, if any.
    pub defaults: BTreeMap<String, Tool>,
}

/// Expands `~` and environment variables in a user-supplied path.
///
/// Undefined variables are left as written so the later read reports the real path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(path).map(|p| p.into_owned()).unwrap_or_else(|_| path.to_string()))
}

/// Loads a tool list.
///
/// # Arguments
/// * `path`: The YAML file, already expanded.
///
/// # Returns
/// * `Result<LoadedTools>`: the descriptors, plus any inline defaults.
///   A missing file is an `Io` error, malformed YAML a `Validation` error.
pub fn load_tools(path: &Path) -> Result<LoadedTools> {
    log_debug!("[Config] Loading tool list from {}", path.display());
    let contents = read(path)?;
    let parsed: ToolFile = serde_yaml::from_str(&contents).map_err(|e| {
        Error::validation(format!("failed to parse tool list {}: {}", path.display(), e))
    })?;

    let loaded = match parsed {
        ToolFile::List(tools) => LoadedTools {
            tools,
            defaults: BTreeMap::new(),
        },
        ToolFile::Document { tools, defaults } => LoadedTools { tools, defaults },
    };
    log_info!(
        "[Config] Loaded {} tool(s) from {}",
        loaded.tools.len().to_string().bold(),
        path.display().to_string().cyan()
    );
    Ok(loaded)
}

/// Loads a defaults file: a mapping of template name to partial descriptor.
pub fn load_defaults(path: &Path) -> Result<BTreeMap<String, Tool>> {
    log_debug!("[Config] Loading defaults from {}", path.display());
    let contents = read(path)?;
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let defaults: BTreeMap<String, Tool> = serde_yaml::from_str(&contents).map_err(|e| {
        Error::validation(format!("failed to parse defaults {}: {}", path.display(), e))
    })?;
    log_info!(
        "[Config] Loaded {} default template(s) from {}",
        defaults.len().to_string().bold(),
        path.display().to_string().cyan()
    );
    Ok(defaults)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io_at("read", path, e))
}
