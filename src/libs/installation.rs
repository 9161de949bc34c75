//! # Installation
//!
//! Turns a resolved asset into files in the output directory:
//!
//! 1. a fresh temporary directory (removed on every exit path when the `TempDir` drops),
//! 2. download into it with progress reporting,
//! 3. checksum verification,
//! 4. extraction,
//! 5. locating the executable (`find`) or taking the whole tree (`extract`),
//! 6. an atomic move into `output`, aliases and the execute bit.
//!
//! Nothing is written to `output` before the checksum has been verified.

use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::libs::cancel::CancelToken;
use crate::libs::checksum::{self, Expectation};
use crate::libs::errors::{Error, Result};
use crate::libs::progress::ProgressTracker;
use crate::libs::templating::file_name_of;
use crate::libs::utilities::assets::{HttpClient, detect_file_type};
use crate::libs::utilities::binary::{copy_tree, create_alias, find_executable, make_executable, move_binary};
use crate::libs::utilities::compression::extract_archive;
use crate::populators::Asset;
use crate::schemas::tools::{Mode, Tool, with_extension};
use crate::{log_debug, log_info};

/// Everything needed to install one asset.
pub struct InstallRequest<'a> {
    /// Fully resolved descriptor.
    pub tool: &'a Tool,
    /// The asset to download.
    pub asset: &'a Asset,
    /// Expected digest.
    pub expectation: &'a Expectation,
    /// Shared HTTP client.
    pub client: &'a HttpClient,
    /// Receives the download stream.
    pub progress: &'a dyn ProgressTracker,
    /// Run-wide cancellation.
    pub cancel: &'a CancelToken,
}

/// What an installation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    /// Human-readable summary of the steps taken.
    pub log: String,
    /// The installed executable (or the output directory for `extract` trees without one).
    pub path: PathBuf,
    /// Every file written to the output directory, aliases included.
    pub files: Vec<PathBuf>,
}

/// Creates the temporary directory a download attempt is staged in.
pub fn staging_dir() -> Result<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix("forgebin-")
        .tempdir()
        .map_err(|e| Error::io("failed to create temporary directory", e))
}

/// Downloads, verifies and installs `request.asset`.
pub fn install_asset(request: &InstallRequest<'_>) -> Result<Installed> {
    let tool = request.tool;
    let asset = request.asset;
    let staging = staging_dir()?;

    let file_name = if asset.name.is_empty() {
        file_name_of(&asset.url)
    } else {
        asset.name.clone()
    };
    let file_name = if file_name.is_empty() { tool.name.clone() } else { file_name };
    let download = staging.path().join(&file_name);

    log_info!("[Install] Downloading {} for {}", file_name.cyan(), tool.name.bold());
    let bytes = request.client.download(
        &asset.url,
        &asset.headers,
        &download,
        request.progress,
        request.cancel,
    )?;

    checksum::verify(&download, request.expectation)?;
    request.cancel.check()?;

    let file_type = detect_file_type(&download);
    let extracted = extract_archive(&download, staging.path(), Some(&file_type))?;
    request.cancel.check()?;

    let mut log = vec![format!("downloaded {file_name} ({bytes} bytes)")];
    if !matches!(request.expectation, Expectation::None) {
        log.push("checksum verified".to_string());
    }
    if file_type != "binary" {
        log.push(format!("extracted {file_type} archive"));
    }

    let output = output_dir(tool)?;
    let installed = match tool.mode() {
        Mode::Find => {
            let found = find_executable(&extracted, &tool.exe.patterns, &tool.exe_file_name())?;
            let (path, files) = place_executable(&found, tool, &output)?;
            log.push(format!("installed {}", path.display()));
            Installed {
                log: String::new(),
                path,
                files,
            }
        }
        Mode::Extract => {
            let files = copy_tree(&extracted, &output).map_err(|e| Error::io_at("copy into", &output, e))?;
            let exe = output.join(tool.exe_file_name());
            let path = if exe.is_file() {
                make_executable(&exe).map_err(|e| Error::io_at("chmod", &exe, e))?;
                exe
            } else {
                output.clone()
            };
            log.push(format!("extracted {} files into {}", files.len(), output.display()));
            Installed {
                log: String::new(),
                path,
                files,
            }
        }
    };

    log_debug!("[Install] Staging directory {:?} released", staging.path().display());
    Ok(Installed {
        log: log.join(", "),
        ..installed
    })
}

/// The expanded, existing output directory of `tool`.
pub fn output_dir(tool: &Tool) -> Result<PathBuf> {
    let output = PathBuf::from(&tool.output);
    fs::create_dir_all(&output).map_err(|e| Error::io_at("create output directory", &output, e))?;
    Ok(output)
}

/// Moves `found` to `output/<exe name>`, marks it executable and creates the aliases.
///
/// # Returns
/// * `Result<(PathBuf, Vec<PathBuf>)>`: the executable and every file written.
pub fn place_executable(found: &Path, tool: &Tool, output: &Path) -> Result<(PathBuf, Vec<PathBuf>)> {
    let target = output.join(tool.exe_file_name());
    make_executable(found).map_err(|e| Error::io_at("chmod", found, e))?;
    move_binary(found, &target).map_err(|e| Error::io_at("move executable to", &target, e))?;

    let mut files = vec![target.clone()];
    for alias in &tool.aliases {
        let alias_path = output.join(with_extension(alias, &tool.platform.extension));
        if alias_path == target {
            continue;
        }
        create_alias(&target, &alias_path).map_err(|e| Error::io_at("create alias", &alias_path, e))?;
        files.push(alias_path);
    }
    Ok((target, files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::progress::NoProgress;
    use crate::schemas::tools::Tool;

    fn tool(output: &Path) -> Tool {
        Tool {
            name: "t".into(),
            output: output.display().to_string(),
            aliases: vec!["tt".into()],
            ..Tool::default()
        }
    }

    #[test]
    fn places_executable_and_aliases() {
        let staging = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let found = staging.path().join("t-linux-amd64");
        fs::write(&found, b"bin").unwrap();

        let tool = tool(out.path());
        let (path, files) = place_executable(&found, &tool, out.path()).unwrap();
        assert_eq!(path, out.path().join("t"));
        assert_eq!(files.len(), 2);
        assert!(out.path().join("tt").exists());
        assert!(!found.exists());
    }

    #[test]
    fn mismatched_checksum_writes_nothing() {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = std::thread::spawn(move || {
            if let Ok(request) = server.recv() {
                request.respond(tiny_http::Response::from_data(b"payload".to_vec())).unwrap();
            }
        });

        let out = tempfile::tempdir().unwrap();
        let tool = tool(out.path());
        let asset = Asset {
            name: "t".into(),
            url: format!("http://{addr}/t"),
            ..Asset::default()
        };
        let expectation = Expectation::digest(checksum::Algorithm::Sha256, &"de".repeat(32));
        let client = HttpClient::new(false).unwrap();
        let err = install_asset(&InstallRequest {
            tool: &tool,
            asset: &asset,
            expectation: &expectation,
            client: &client,
            progress: &NoProgress,
            cancel: &CancelToken::new(),
        })
        .unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert!(!out.path().join("t").exists());
    }
}
