// This module resolves tools distributed as GitHub releases.
// It looks up the latest release (or a tagged one), picks the right asset for the
// target platform and hands back its download URL.

use serde::Deserialize;
// For colored terminal output, making logs more readable.
use colored::Colorize;

use crate::libs::asset_matcher::Requirements;
use crate::libs::errors::{Error, Result};
use crate::libs::utilities::assets::HttpClient;
use crate::populators::{Asset, Services, api_url, select_asset, toggle_v_prefix};
use crate::schemas::tools::Tool;
use crate::{log_debug, log_info};

/// Public GitHub API.
pub const DEFAULT_API: &str = "https://api.github.com";

/// A release as returned by the GitHub API (only the fields we use).
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    /// Git tag the release was cut from.
    pub tag_name: String,
    /// Release page.
    #[serde(default)]
    pub html_url: String,
    /// Whether the release is marked as a pre-release.
    #[serde(default)]
    pub prerelease: bool,
    /// Whether the release is an unpublished draft.
    #[serde(default)]
    pub draft: bool,
    /// Uploaded files.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A single uploaded file of a [`Release`].
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    /// File name.
    pub name: String,
    /// Public download URL.
    pub browser_download_url: String,
}

/// GitHub releases populator.
pub struct GitHub {
    client: HttpClient,
    api: String,
    repo: String,
    token: Option<String>,
    pre: bool,
    release: Option<Release>,
}

impl GitHub {
    /// Reads the GitHub settings of `tool`.
    ///
    /// The token comes from the descriptor, then from the run configuration
    /// (`GITHUB_TOKEN` / `GH_TOKEN`).
    pub fn initialize(tool: &Tool, services: &Services) -> Result<Self> {
        let settings = &tool.source.github;
        let repo = settings.repo.trim().trim_matches('/').to_string();
        if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(Error::validation(format!(
                "{}: source.github.repo must be 'owner/name', got '{}'",
                tool.name, settings.repo
            )));
        }
        let token = Some(settings.token.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| services.config.github_token());
        let api = if settings.api.trim().is_empty() {
            DEFAULT_API.to_string()
        } else {
            settings.api.trim().trim_end_matches('/').to_string()
        };
        Ok(Self {
            client: services.client.clone(),
            api,
            repo,
            token,
            pre: settings.pre.unwrap_or(false),
            release: None,
        })
    }

    // `repos/{owner}/{name}/...` with every segment percent-encoded.
    fn endpoint(&self, tail: &[&str]) -> Result<String> {
        let mut segments = vec!["repos"];
        segments.extend(self.repo.split('/'));
        segments.extend_from_slice(tail);
        api_url(&self.api, &segments)
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Accept".to_string(), "application/vnd.github+json".to_string()),
            ("X-GitHub-Api-Version".to_string(), "2022-11-28".to_string()),
        ];
        headers.extend(self.auth());
        headers
    }

    fn auth(&self) -> Vec<(String, String)> {
        self.token
            .iter()
            .map(|token| ("Authorization".to_string(), format!("Bearer {token}")))
            .collect()
    }

    /// Tag of the latest release, or of the newest non-draft release when `pre` is set.
    pub fn version(&mut self) -> Result<String> {
        let release = if self.pre {
            let url = format!("{}?per_page=30", self.endpoint(&["releases"])?);
            let releases: Vec<Release> = self.client.get_json(&url, &self.headers())?;
            releases
                .into_iter()
                .find(|r| !r.draft)
                .ok_or_else(|| Error::NotFound(format!("no releases published for {}", self.repo)))?
        } else {
            let url = self.endpoint(&["releases", "latest"])?;
            self.client.get_json::<Release>(&url, &self.headers()).map_err(|e| {
                if e.is_not_found() {
                    Error::NotFound(format!("no latest release for {}", self.repo))
                } else {
                    e
                }
            })?
        };
        log_info!("[GitHub] Latest release of {} is {}", self.repo.bold(), release.tag_name.green());
        let tag = release.tag_name.clone();
        self.release = Some(release);
        Ok(tag)
    }

    /// Fetches the release for `tag`, retrying with the `v` prefix toggled on 404.
    fn release_by_tag(&self, tag: &str) -> Result<Release> {
        let fetch = |tag: &str| -> Result<Release> {
            let url = self.endpoint(&["releases", "tags", tag])?;
            self.client.get_json::<Release>(&url, &self.headers())
        };
        match fetch(tag) {
            Err(e) if e.is_not_found() => {
                let alternate = toggle_v_prefix(tag);
                log_debug!("[GitHub] Tag {} not found, trying {}", tag, alternate);
                fetch(&alternate).map_err(|e| {
                    if e.is_not_found() {
                        Error::NotFound(format!("release {tag} of {}", self.repo))
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }

    /// Picks the asset of release `version` that best fits `requirements`.
    pub fn path(&mut self, version: &str, requirements: &Requirements) -> Result<Asset> {
        let release = match &self.release {
            Some(release) if release.tag_name == version => release.clone(),
            _ => {
                let release = self.release_by_tag(version)?;
                self.release = Some(release.clone());
                release
            }
        };
        let assets: Vec<(String, String)> = release
            .assets
            .iter()
            .map(|a| (a.name.clone(), a.browser_download_url.clone()))
            .collect();
        let asset = select_asset(&assets, requirements, self.auth())?;
        log_debug!("[GitHub] Selected asset {} from {}", asset.name.cyan(), release.tag_name);
        Ok(asset)
    }

    /// `repo`, `tag` (after a lookup) or `release` (release page URL).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "repo" => Some(self.repo.clone()),
            "api" => Some(self.api.clone()),
            "tag" => self.release.as_ref().map(|r| r.tag_name.clone()),
            "release" => self.release.as_ref().map(|r| r.html_url.clone()),
            _ => None,
        }
    }
}
