// This module installs Go tools with `go install`.
// The latest version is looked up on the module proxy; the build happens in a
// temporary GOBIN and the binary is then moved into the output directory like any
// downloaded executable.

use std::collections::BTreeMap;
use std::env;

use colored::Colorize;
use serde::Deserialize;

use crate::libs::cancel::CancelToken;
use crate::libs::checksum::Expectation;
use crate::libs::errors::{Error, Result};
use crate::libs::installation::{InstallRequest, Installed, output_dir, place_executable, staging_dir};
use crate::libs::utilities::assets::HttpClient;
use crate::libs::utilities::binary::find_executable;
use crate::libs::utilities::shell;
use crate::populators::{Asset, Services};
use crate::schemas::tools::Tool;
use crate::{log_debug, log_info};

/// Module proxy used when `GOPROXY` names no HTTP proxy.
pub const DEFAULT_PROXY: &str = "https://proxy.golang.org";

#[derive(Debug, Deserialize)]
struct Latest {
    #[serde(rename = "Version")]
    version: String,
}

/// `go install` populator.
pub struct Go {
    client: HttpClient,
    cancel: CancelToken,
    proxy: String,
    package: String,
    module: String,
    command: String,
}

impl Go {
    /// Reads the Go settings of `tool`.
    ///
    /// The module defaults to the package path up to `/cmd/`, or the package itself.
    pub fn initialize(tool: &Tool, services: &Services) -> Result<Self> {
        let settings = &tool.source.go;
        let package = settings.package.trim().to_string();
        if package.is_empty() {
            return Err(Error::validation(format!("{}: source.go.package is required", tool.name)));
        }
        let module = if settings.module.trim().is_empty() {
            module_of(&package)
        } else {
            settings.module.trim().to_string()
        };
        let command = if settings.command.trim().is_empty() {
            "go".to_string()
        } else {
            settings.command.trim().to_string()
        };
        Ok(Self {
            client: services.client.clone(),
            cancel: services.cancel.clone(),
            proxy: proxy_from(env::var("GOPROXY").ok().as_deref()),
            package,
            module,
            command,
        })
    }

    /// Latest module version according to the proxy.
    pub fn version(&mut self) -> Result<String> {
        let url = format!("{}/{}/@latest", self.proxy, escape_module(&self.module));
        let latest: Latest = self.client.get_json(&url, &[]).map_err(|e| {
            if e.is_not_found() {
                Error::NotFound(format!("module {} on {}", self.module, self.proxy))
            } else {
                e
            }
        })?;
        log_info!("[Go] Latest version of {} is {}", self.module.bold(), latest.version.green());
        Ok(latest.version)
    }

    /// The `package@version` pseudo-asset.
    #[must_use]
    pub fn path(&self, version: &str) -> Asset {
        let version = if version.is_empty() { "latest" } else { version };
        Asset {
            name: package_base(&self.package),
            url: format!("{}@{}", self.package, version),
            headers: Vec::new(),
            checksum: None,
        }
    }

    /// Builds the package into a temporary GOBIN and moves the binary into place.
    pub fn install(&self, request: &InstallRequest<'_>) -> Result<Installed> {
        if !matches!(request.expectation, Expectation::None) {
            return Err(Error::validation(format!(
                "{}: checksums cannot be verified for go builds; use checksum type none",
                request.tool.name
            )));
        }
        let tool = request.tool;
        let gobin = staging_dir()?;

        let mut env: BTreeMap<String, String> = tool.env.clone();
        env.insert("GOBIN".to_string(), gobin.path().display().to_string());

        log_info!("[Go] Building {}", request.asset.url.cyan());
        let args = vec!["install".to_string(), request.asset.url.clone()];
        let (stdout, stderr) = shell::run_program(&self.command, &args, &env, &self.cancel)?;
        log_debug!("[Go] go install output: {}{}", stdout, stderr);

        let found = find_executable(gobin.path(), &tool.exe.patterns, &package_base(&self.package))?;
        let output = output_dir(tool)?;
        let (path, files) = place_executable(&found, tool, &output)?;
        Ok(Installed {
            log: format!("built {} with {}, installed {}", request.asset.url, self.command, path.display()),
            path,
            files,
        })
    }

    /// `package`, `module` or `proxy`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "package" => Some(self.package.clone()),
            "module" => Some(self.module.clone()),
            "proxy" => Some(self.proxy.clone()),
            _ => None,
        }
    }
}

/// Module path of a package: everything before `/cmd/`, or the package itself.
#[must_use]
pub fn module_of(package: &str) -> String {
    match package.find("/cmd/") {
        Some(index) => package[..index].to_string(),
        None => package.to_string(),
    }
}

/// Binary name `go install` produces for a package: its last element, skipping a
/// trailing major-version suffix such as `/v2`.
#[must_use]
pub fn package_base(package: &str) -> String {
    let mut parts = package.trim_end_matches('/').rsplit('/');
    let last = parts.next().unwrap_or_default();
    let is_major = last.len() > 1
        && last.starts_with('v')
        && last[1..].chars().all(|c| c.is_ascii_digit());
    if is_major {
        parts.next().unwrap_or(last).to_string()
    } else {
        last.to_string()
    }
}

/// Escapes a module path for the proxy protocol: capitals become `!` + lowercase.
#[must_use]
pub fn escape_module(module: &str) -> String {
    let mut escaped = String::with_capacity(module.len());
    for c in module.chars() {
        if c.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(c.to_ascii_lowercase());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

// First HTTP(S) entry of a GOPROXY list; `direct` and `off` have no lookup endpoint.
fn proxy_from(goproxy: Option<&str>) -> String {
    goproxy
        .into_iter()
        .flat_map(|list| list.split([',', '|']))
        .map(str::trim)
        .find(|entry| entry.starts_with("http://") || entry.starts_with("https://"))
        .map(|entry| entry.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_PROXY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::populators::testing::serve;
    use crate::schemas::config::Config;

    fn services() -> Services {
        Services {
            client: HttpClient::new(false).unwrap(),
            config: Config::default(),
            cancel: CancelToken::new(),
        }
    }

    #[test]
    fn derives_module_and_binary_names() {
        assert_eq!(module_of("golang.org/x/tools/cmd/goimports"), "golang.org/x/tools");
        assert_eq!(module_of("github.com/owner/tool"), "github.com/owner/tool");
        assert_eq!(package_base("golang.org/x/tools/cmd/goimports"), "goimports");
        assert_eq!(package_base("github.com/owner/tool/v2"), "tool");
        assert_eq!(escape_module("github.com/BurntSushi/toml"), "github.com/!burnt!sushi/toml");
    }

    #[test]
    fn proxy_selection() {
        assert_eq!(proxy_from(None), DEFAULT_PROXY);
        assert_eq!(proxy_from(Some("direct")), DEFAULT_PROXY);
        assert_eq!(
            proxy_from(Some("https://goproxy.io/,direct")),
            "https://goproxy.io"
        );
    }

    #[test]
    fn latest_version_from_proxy() {
        let base = serve(vec![(
            "/github.com/!owner/tool/@latest",
            200,
            r#"{"Version":"v1.4.2","Time":"2024-01-01T00:00:00Z"}"#.to_string(),
        )]);
        let mut tool = Tool {
            name: "tool".into(),
            ..Tool::default()
        };
        tool.source.go.package = "github.com/Owner/tool/cmd/tool".into();
        tool.source.go.module = "github.com/Owner/tool".into();
        let mut go = Go::initialize(&tool, &services()).unwrap();
        go.proxy = base;

        assert_eq!(go.version().unwrap(), "v1.4.2");
        let asset = go.path("v1.4.2");
        assert_eq!(asset.url, "github.com/Owner/tool/cmd/tool@v1.4.2");
        assert_eq!(asset.name, "tool");
    }

    #[test]
    fn package_is_required() {
        let tool = Tool {
            name: "tool".into(),
            ..Tool::default()
        };
        assert!(matches!(
            Go::initialize(&tool, &services()),
            Err(Error::Validation(_))
        ));
    }
}
