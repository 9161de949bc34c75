// This module resolves tools whose download URL is printed by an external command,
// for vendors that publish URLs through their own tooling or a web page that needs
// scraping. Each command runs through the shell; the trimmed stdout of the last one
// is the URL.

use colored::Colorize;

use crate::libs::cancel::CancelToken;
use crate::libs::errors::{Error, Result};
use crate::libs::utilities::shell;
use crate::log_debug;
use crate::populators::{Asset, Services};
use crate::schemas::tools::Tool;

/// Command populator.
pub struct Command {
    version: String,
    cancel: CancelToken,
    url: String,
}

impl Command {
    /// Reads the command settings of `tool`.
    pub fn initialize(tool: &Tool, services: &Services) -> Result<Self> {
        if tool.source.command.commands.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::validation(format!(
                "{}: source.command.commands must list at least one command",
                tool.name
            )));
        }
        Ok(Self {
            version: tool.version.version.clone(),
            cancel: services.cancel.clone(),
            url: String::new(),
        })
    }

    /// The descriptor's version.
    pub fn version(&mut self) -> Result<String> {
        Ok(self.version.clone())
    }

    /// Runs the (rendered) commands and takes the last output as the URL.
    pub fn path(&mut self, tool: &Tool) -> Result<Asset> {
        let mut last = String::new();
        for command in tool.source.command.commands.iter().filter(|c| !c.trim().is_empty()) {
            let (stdout, _) = shell::run(command, &tool.env, &self.cancel)?;
            last = stdout;
        }
        let url = last.trim();
        if url.is_empty() {
            return Err(Error::NotFound(format!("{}: command printed no URL", tool.name)));
        }
        log_debug!("[Command] Resolved {} for {}", url.cyan(), tool.name);
        self.url = url.to_string();
        Ok(Asset::from_url(url, Vec::new()))
    }

    /// `url` after [`path`](Self::path).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "url" if !self.url.is_empty() => Some(self.url.clone()),
            _ => None,
        }
    }
}
