// This module resolves tools distributed as GitLab releases, on gitlab.com or a
// self-hosted server. Release links and the generated source archives are both
// offered to the asset matcher.

use colored::Colorize;
use serde::Deserialize;

use crate::libs::asset_matcher::Requirements;
use crate::libs::errors::{Error, Result};
use crate::libs::templating::file_name_of;
use crate::libs::utilities::assets::HttpClient;
use crate::populators::{Asset, Services, api_url, select_asset, toggle_v_prefix};
use crate::schemas::tools::Tool;
use crate::{log_debug, log_info};

/// Public GitLab server.
pub const DEFAULT_SERVER: &str = "https://gitlab.com";

#[derive(Debug, Clone, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    upcoming_release: bool,
    #[serde(default)]
    assets: Assets,
    #[serde(default, rename = "_links")]
    links: Option<ReleaseLinks>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Assets {
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    sources: Vec<SourceArchive>,
}

#[derive(Debug, Clone, Deserialize)]
struct Link {
    name: String,
    url: String,
    #[serde(default)]
    direct_asset_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SourceArchive {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ReleaseLinks {
    #[serde(rename = "self", default)]
    page: String,
}

// Personal tokens and CI job tokens go in different headers.
#[derive(Debug, Clone)]
enum Token {
    Private(String),
    Job(String),
}

/// GitLab releases populator.
pub struct GitLab {
    client: HttpClient,
    server: String,
    project: String,
    token: Option<Token>,
    pre: bool,
    release: Option<Release>,
}

impl GitLab {
    /// Reads the GitLab settings of `tool`.
    ///
    /// The token comes from the descriptor, then `GITLAB_TOKEN` (sent as `PRIVATE-TOKEN`),
    /// then `CI_JOB_TOKEN` (sent as `JOB-TOKEN`).
    pub fn initialize(tool: &Tool, services: &Services) -> Result<Self> {
        let settings = &tool.source.gitlab;
        let project = settings.project.trim().trim_matches('/').to_string();
        if project.is_empty() {
            return Err(Error::validation(format!(
                "{}: source.gitlab.project is required",
                tool.name
            )));
        }
        let token = Some(settings.token.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| services.config.gitlab_token())
            .map(Token::Private)
            .or_else(|| services.config.ci_job_token().map(Token::Job));
        let server = if settings.server.trim().is_empty() {
            DEFAULT_SERVER.to_string()
        } else {
            settings.server.trim().trim_end_matches('/').to_string()
        };
        Ok(Self {
            client: services.client.clone(),
            server,
            project,
            token,
            pre: settings.pre.unwrap_or(false),
            release: None,
        })
    }

    fn headers(&self) -> Vec<(String, String)> {
        match &self.token {
            Some(Token::Private(token)) => vec![("PRIVATE-TOKEN".to_string(), token.clone())],
            Some(Token::Job(token)) => vec![("JOB-TOKEN".to_string(), token.clone())],
            None => Vec::new(),
        }
    }

    fn releases_url(&self, tag: Option<&str>) -> Result<String> {
        let mut segments = vec!["api", "v4", "projects", self.project.as_str(), "releases"];
        segments.extend(tag);
        api_url(&self.server, &segments)
    }

    /// Tag of the newest release; upcoming releases only count when `pre` is set.
    pub fn version(&mut self) -> Result<String> {
        let releases: Vec<Release> = self.client.get_json(&self.releases_url(None)?, &self.headers())?;
        let release = releases
            .into_iter()
            .find(|r| self.pre || !r.upcoming_release)
            .ok_or_else(|| Error::NotFound(format!("no releases published for {}", self.project)))?;
        log_info!("[GitLab] Latest release of {} is {}", self.project.bold(), release.tag_name.green());
        let tag = release.tag_name.clone();
        self.release = Some(release);
        Ok(tag)
    }

    fn release_by_tag(&self, tag: &str) -> Result<Release> {
        let fetch = |tag: &str| -> Result<Release> {
            let url = self.releases_url(Some(tag))?;
            self.client.get_json::<Release>(&url, &self.headers())
        };
        match fetch(tag) {
            Err(e) if e.is_not_found() => {
                let alternate = toggle_v_prefix(tag);
                log_debug!("[GitLab] Tag {} not found, trying {}", tag, alternate);
                fetch(&alternate).map_err(|e| {
                    if e.is_not_found() {
                        Error::NotFound(format!("release {tag} of {}", self.project))
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }

    /// Picks the release link or source archive of `version` that fits `requirements`.
    pub fn path(&mut self, version: &str, requirements: &Requirements) -> Result<Asset> {
        let release = match &self.release {
            Some(release) if release.tag_name == version => release.clone(),
            _ => {
                let release = self.release_by_tag(version)?;
                self.release = Some(release.clone());
                release
            }
        };
        let mut assets: Vec<(String, String)> = release
            .assets
            .links
            .iter()
            .map(|link| {
                let url = link.direct_asset_url.clone().unwrap_or_else(|| link.url.clone());
                (link.name.clone(), url)
            })
            .collect();
        assets.extend(
            release
                .assets
                .sources
                .iter()
                .map(|source| (file_name_of(&source.url), source.url.clone())),
        );
        let asset = select_asset(&assets, requirements, self.headers())?;
        log_debug!("[GitLab] Selected asset {} from {}", asset.name.cyan(), release.tag_name);
        Ok(asset)
    }

    /// `project`, `server`, `tag` (after a lookup) or `release` (release page URL).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "project" => Some(self.project.clone()),
            "server" => Some(self.server.clone()),
            "tag" => self.release.as_ref().map(|r| r.tag_name.clone()),
            "release" => self
                .release
                .as_ref()
                .and_then(|r| r.links.as_ref())
                .map(|l| l.page.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::cancel::CancelToken;
    use crate::populators::testing::serve;
    use crate::schemas::config::Config;
    use crate::schemas::platform::Platform;

    fn services() -> Services {
        Services {
            client: HttpClient::new(false).unwrap(),
            config: Config {
                gitlab_token: Some("glpat".into()),
                ..Config::default()
            },
            cancel: CancelToken::new(),
        }
    }

    fn tool(server: &str, pre: bool) -> Tool {
        let mut tool = Tool {
            name: "glab".into(),
            ..Tool::default()
        };
        tool.source.gitlab.project = "gitlab-org/cli".into();
        tool.source.gitlab.server = server.into();
        tool.source.gitlab.pre = Some(pre);
        tool
    }

    fn releases() -> String {
        serde_json::json!([
            {"tag_name": "v2.0.0-rc1", "upcoming_release": true, "assets": {"links": []}},
            {
                "tag_name": "v1.40.0",
                "assets": {
                    "links": [
                        {"name": "glab_1.40.0_Linux_x86_64.tar.gz", "url": "https://gl/l", "direct_asset_url": "https://gl/direct/linux"},
                        {"name": "glab_1.40.0_macOS_arm64.tar.gz", "url": "https://gl/m"},
                        {"name": "checksums.txt", "url": "https://gl/sums"}
                    ],
                    "sources": [{"format": "zip", "url": "https://gl/cli-v1.40.0.zip"}]
                },
                "_links": {"self": "https://gitlab.com/gitlab-org/cli/-/releases/v1.40.0"}
            }
        ])
        .to_string()
    }

    #[test]
    fn skips_upcoming_releases_unless_pre() {
        let base = serve(vec![("/api/v4/projects/gitlab-org%2Fcli/releases", 200, releases())]);
        let mut stable = GitLab::initialize(&tool(&base, false), &services()).unwrap();
        assert_eq!(stable.version().unwrap(), "v1.40.0");

        let requirements = Requirements {
            platform: Platform {
                os: "linux".into(),
                arch: "amd64".into(),
                ..Platform::default()
            },
            ..Requirements::default()
        };
        let asset = stable.path("v1.40.0", &requirements).unwrap();
        assert_eq!(asset.url, "https://gl/direct/linux");
        assert_eq!(asset.headers, vec![("PRIVATE-TOKEN".to_string(), "glpat".to_string())]);
        assert_eq!(
            stable.get("release").as_deref(),
            Some("https://gitlab.com/gitlab-org/cli/-/releases/v1.40.0")
        );

        let mut pre = GitLab::initialize(&tool(&base, true), &services()).unwrap();
        assert_eq!(pre.version().unwrap(), "v2.0.0-rc1");
    }

    #[test]
    fn project_is_required() {
        let mut bad = tool("http://unused", false);
        bad.source.gitlab.project.clear();
        assert!(matches!(
            GitLab::initialize(&bad, &services()),
            Err(Error::Validation(_))
        ));
    }
}
