// This module resolves tools downloaded from a plain (templated) URL.
// There is no API to ask: the version comes from the descriptor and the URL is
// whatever `source.url.url` (or the top-level `url`) renders to.

use colored::Colorize;

use crate::libs::errors::{Error, Result};
use crate::log_debug;
use crate::populators::{Asset, Services};
use crate::schemas::tools::Tool;

/// URL populator.
pub struct Url {
    version: String,
    token: Option<String>,
    url: String,
}

impl Url {
    /// Reads the URL settings of `tool`. The token falls back to `URL_TOKEN`.
    pub fn initialize(tool: &Tool, services: &Services) -> Result<Self> {
        let token = Some(tool.source.url.token.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| services.config.url_token());
        Ok(Self {
            version: tool.version.version.clone(),
            token,
            url: String::new(),
        })
    }

    /// The descriptor's version. URL sources cannot discover one.
    pub fn version(&mut self) -> Result<String> {
        if self.version.is_empty() {
            log_debug!("[URL] No version given; the download is treated as unversioned");
        }
        Ok(self.version.clone())
    }

    /// The rendered URL with the configured headers.
    pub fn path(&mut self, tool: &Tool) -> Result<Asset> {
        let url = if tool.source.url.url.trim().is_empty() {
            tool.url.trim()
        } else {
            tool.source.url.url.trim()
        };
        if url.is_empty() {
            return Err(Error::validation(format!(
                "{}: url source needs source.url.url or url",
                tool.name
            )));
        }

        let mut headers: Vec<(String, String)> = tool
            .source
            .url
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let has_auth = headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("authorization"));
        if let (Some(token), false) = (&self.token, has_auth) {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        log_debug!("[URL] Resolved {} for {}", url.cyan(), tool.name);
        self.url = url.to_string();
        Ok(Asset::from_url(url, headers))
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
