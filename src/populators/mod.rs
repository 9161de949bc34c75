//! # Source Populators
//!
//! A populator knows how to talk to one kind of release source. All of them expose the
//! same capabilities, dispatched through the [`Populator`] sum type:
//!
//! - `version()`: the latest version, used when the descriptor names none,
//! - `path(tool, version, requirements)`: the asset to download for that version,
//! - `install(request)`: turns the asset into installed files,
//! - `get(key)`: source metadata (repository, tag, release page), exposed to templates
//!   under `.Source` through [`Populator::metadata`].
//!
//! [`factory`] picks the variant for a [`SourceKind`]; the pipeline calls it once for
//! the primary source and once per fallback.

// Each source lives in its own module.
pub mod command;
pub mod github;
pub mod gitlab;
pub mod go;
pub mod url;

use std::collections::BTreeMap;

use crate::libs::asset_matcher::Requirements;
use crate::libs::cancel::CancelToken;
use crate::libs::errors::{Error, Result};
use crate::libs::installation::{InstallRequest, Installed, install_asset};
use crate::libs::templating::file_name_of;
use crate::libs::utilities::assets::HttpClient;
use crate::schemas::config::Config;
use crate::schemas::tools::{SourceKind, Tool};

/// A downloadable release artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Asset {
    /// File name as published.
    pub name: String,
    /// Download URL.
    pub url: String,
    /// Headers the download needs (authorization).
    pub headers: Vec<(String, String)>,
    /// Sibling checksums file, as `(name, url)`, when the release publishes one.
    pub checksum: Option<(String, String)>,
}

impl Asset {
    /// An asset known only by its URL.
    #[must_use]
    pub fn from_url(url: &str, headers: Vec<(String, String)>) -> Self {
        Self {
            name: file_name_of(url),
            url: url.to_string(),
            headers,
            checksum: None,
        }
    }
}

/// Run-wide collaborators handed to every populator.
#[derive(Clone)]
pub struct Services {
    /// Shared HTTP client.
    pub client: HttpClient,
    /// Run settings, including tokens.
    pub config: Config,
    /// Run-wide cancellation.
    pub cancel: CancelToken,
}

/// `get` keys and the `.Source` field each one is published as.
pub const METADATA_FIELDS: [(&str, &str); 10] = [
    ("repo", "Repo"),
    ("api", "API"),
    ("project", "Project"),
    ("server", "Server"),
    ("tag", "Tag"),
    ("release", "Release"),
    ("package", "Package"),
    ("module", "Module"),
    ("proxy", "Proxy"),
    ("url", "URL"),
];

/// One of the supported release sources.
pub enum Populator {
    /// GitHub releases.
    GitHub(github::GitHub),
    /// GitLab releases.
    GitLab(gitlab::GitLab),
    /// A plain URL.
    Url(url::Url),
    /// `go install`.
    Go(go::Go),
    /// An external command printing the URL.
    Command(command::Command),
    /// No source.
    None,
}

/// Builds and initializes the populator for `kind` from `tool`.
///
/// # Returns
/// * `Err(Error::Validation)` when the settings the source needs are missing.
pub fn factory(kind: SourceKind, tool: &Tool, services: &Services) -> Result<Populator> {
    Ok(match kind {
        SourceKind::GitHub => Populator::GitHub(github::GitHub::initialize(tool, services)?),
        SourceKind::GitLab => Populator::GitLab(gitlab::GitLab::initialize(tool, services)?),
        SourceKind::Url => Populator::Url(url::Url::initialize(tool, services)?),
        SourceKind::Go => Populator::Go(go::Go::initialize(tool, services)?),
        SourceKind::Command => Populator::Command(command::Command::initialize(tool, services)?),
        SourceKind::None => Populator::None,
    })
}

impl Populator {
    /// Latest version published by the source.
    pub fn version(&mut self) -> Result<String> {
        match self {
            Self::GitHub(p) => p.version(),
            Self::GitLab(p) => p.version(),
            Self::Url(p) => p.version(),
            Self::Go(p) => p.version(),
            Self::Command(p) => p.version(),
            Self::None => Ok(String::new()),
        }
    }

    /// Asset to download for `version`.
    ///
    /// `tool` is the descriptor after the version-dependent template pass.
    pub fn path(&mut self, tool: &Tool, version: &str, requirements: &Requirements) -> Result<Asset> {
        match self {
            Self::GitHub(p) => p.path(version, requirements),
            Self::GitLab(p) => p.path(version, requirements),
            Self::Url(p) => p.path(tool),
            Self::Go(p) => Ok(p.path(version)),
            Self::Command(p) => p.path(tool),
            Self::None => Err(Error::NotFound("source type 'none' has no assets".into())),
        }
    }

    /// Installs the asset. Archive sources download it; `go` builds it.
    pub fn install(&self, request: &InstallRequest<'_>) -> Result<Installed> {
        match self {
            Self::Go(p) => p.install(request),
            Self::None => Err(Error::NotFound("source type 'none' cannot install".into())),
            _ => install_asset(request),
        }
    }

    /// Source metadata such as `repo`, `tag` or `release`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::GitHub(p) => p.get(key),
            Self::GitLab(p) => p.get(key),
            Self::Url(p) => p.get(key),
            Self::Go(p) => p.get(key),
            Self::Command(p) => p.get(key),
            Self::None => None,
        }
    }

    /// Every metadata value the source currently knows, keyed by its template field
    /// name (`Repo`, `Tag`, ...).
    #[must_use]
    pub fn metadata(&self) -> BTreeMap<String, String> {
        METADATA_FIELDS
            .iter()
            .filter_map(|(key, field)| self.get(key).map(|value| (field.to_string(), value)))
            .collect()
    }
}

/// The alternate spelling of a tag: `v1.2.3` and `1.2.3` map onto each other.
pub(crate) fn toggle_v_prefix(tag: &str) -> String {
    match tag.strip_prefix('v') {
        Some(stripped) => stripped.to_string(),
        None => format!("v{tag}"),
    }
}

/// Picks the best asset among `(name, url)` pairs and attaches the checksum sibling.
pub(crate) fn select_asset(
    assets: &[(String, String)],
    requirements: &Requirements,
    headers: Vec<(String, String)>,
) -> Result<Asset> {
    use crate::libs::asset_matcher::{Matcher, pick_checksum_file};

    let names: Vec<&str> = assets.iter().map(|(name, _)| name.as_str()).collect();
    let best = Matcher::new(requirements)?.best(&names)?;
    let url_of = |name: &str| {
        assets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, url)| url.clone())
            .unwrap_or_default()
    };
    let checksum = pick_checksum_file(&names, &best.name).map(|name| {
        let url = url_of(&name);
        (name, url)
    });
    Ok(Asset {
        url: url_of(&best.name),
        name: best.name,
        headers,
        checksum,
    })
}

/// Appends `segments` to the API base URL, percent-encoding each one.
///
/// A segment keeps its `/` characters encoded, so `gitlab-org/cli` stays a single
/// segment (`gitlab-org%2Fcli`).
pub(crate) fn api_url(base: &str, segments: &[&str]) -> Result<String> {
    let mut url = ::url::Url::parse(base)
        .map_err(|e| Error::validation(format!("invalid API url '{base}': {e}")))?;
    url.path_segments_mut()
        .map_err(|()| Error::validation(format!("invalid API url '{base}'")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.into())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal release host for populator tests.

    use std::time::Duration;
    use tiny_http::{Response, Server, StatusCode};

    /// Serves `routes` (`path`, `status`, `body`) until no request arrives for two seconds.
    ///
    /// Returns the base URL. Unknown paths answer 404.
    pub fn serve(routes: Vec<(&'static str, u16, String)>) -> String {
        let server = Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.server_addr().to_ip().unwrap());
        std::thread::spawn(move || {
            while let Ok(Some(request)) = server.recv_timeout(Duration::from_secs(2)) {
                let path = request.url().to_string();
                let response = match routes.iter().find(|(p, _, _)| *p == path) {
                    Some((_, status, body)) => {
                        Response::from_string(body.clone()).with_status_code(StatusCode(*status))
                    }
                    None => Response::from_string("Not Found").with_status_code(StatusCode(404)),
                };
                let _ = request.respond(response);
            }
        });
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::platform::Platform;

    #[test]
    fn toggles_v_prefix() {
        assert_eq!(toggle_v_prefix("v1.2.3"), "1.2.3");
        assert_eq!(toggle_v_prefix("1.2.3"), "v1.2.3");
    }

    #[test]
    fn api_urls_encode_each_segment() {
        assert_eq!(
            api_url("https://gitlab.com", &["api", "v4", "projects", "gitlab-org/cli"]).unwrap(),
            "https://gitlab.com/api/v4/projects/gitlab-org%2Fcli"
        );
        assert_eq!(
            api_url("https://git.example.com/gitlab/", &["releases", "v1.0 rc#1"]).unwrap(),
            "https://git.example.com/gitlab/releases/v1.0%20rc%231"
        );
        assert!(matches!(api_url("not a url", &["x"]), Err(Error::Validation(_))));
    }

    #[test]
    fn selects_asset_with_checksum_sibling() {
        let assets: Vec<(String, String)> = [
            "tool-1.0-linux-amd64.tar.gz",
            "tool-1.0-linux-arm64.tar.gz",
            "tool-1.0-darwin-amd64.tar.gz",
            "tool-1.0-SHA256SUMS",
        ]
        .iter()
        .map(|n| (n.to_string(), format!("https://dl/{n}")))
        .collect();
        let requirements = Requirements {
            platform: Platform {
                os: "linux".into(),
                arch: "amd64".into(),
                ..Platform::default()
            },
            ..Requirements::default()
        };
        let asset = select_asset(&assets, &requirements, Vec::new()).unwrap();
        assert_eq!(asset.name, "tool-1.0-linux-amd64.tar.gz");
        assert_eq!(asset.url, "https://dl/tool-1.0-linux-amd64.tar.gz");
        assert_eq!(
            asset.checksum,
            Some((
                "tool-1.0-SHA256SUMS".to_string(),
                "https://dl/tool-1.0-SHA256SUMS".to_string()
            ))
        );
    }

    #[test]
    fn none_source_has_no_assets() {
        let mut populator = Populator::None;
        assert!(populator.metadata().is_empty());
        assert_eq!(populator.version().unwrap(), "");
        assert!(
            populator
                .path(&Tool::default(), "", &Requirements::default())
                .unwrap_err()
                .is_not_found()
        );
    }
}
