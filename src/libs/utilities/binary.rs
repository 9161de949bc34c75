// The 'colored' crate helps us make our console output look pretty and readable
use colored::Colorize;
// Our custom logging macros to give us nicely formatted (and colored!) output
// for debugging, general information, and errors.
use crate::{log_debug, log_warn};
use crate::libs::errors::{Error, Result};
// Recognizes ELF / Mach-O / PE headers so real executables win over scripts and docs.
use goblin::Object;
// Executable patterns from descriptors are regular expressions.
use regex::Regex;
// For working with file paths, specifically to construct installation paths.
use std::path::{Path, PathBuf};
// For file system operations: creating directories, reading files, etc.
use std::fs;
// Setting the executable bits is a Unix-only concept.
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
// `std::io` contains core input/output functionalities and error types.
use std::io;
// Recursive traversal of extracted archives.
use walkdir::WalkDir;

/// Locates the executable to install inside an extracted archive.
///
/// Every regular file whose name (or path relative to `dir`) matches one of `patterns`
/// is a candidate. When `patterns` is empty the default is the executable name itself,
/// with or without `.exe`. Candidates are ranked native executables first, then files
/// with an execute bit, then the shallowest path. When nothing matches, a tree that holds
/// exactly one file, or exactly one native executable, still yields that file.
///
/// # Arguments
/// * `dir`: The extracted tree.
/// * `patterns`: Regexes from `exe.patterns`.
/// * `exe_name`: The executable name from the descriptor.
///
/// # Returns
/// * `Result<PathBuf>`: the chosen file, or `Error::Extraction` naming the patterns.
pub fn find_executable(dir: &Path, patterns: &[String], exe_name: &str) -> Result<PathBuf> {
    log_debug!("[Utils] Searching for {} in: {:?}", exe_name.bold(), dir.to_string_lossy().yellow());

    let regexes = compile_patterns(patterns, exe_name)?;

    let files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    let mut candidates: Vec<(u8, usize, PathBuf)> = files
        .iter()
        .filter(|path| {
            let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let relative = path
                .strip_prefix(dir)
                .map(|r| r.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            regexes.iter().any(|re| re.is_match(&file_name) || re.is_match(&relative))
        })
        .map(|path| (rank(path), path.components().count(), path.clone()))
        .collect();
    candidates.sort();

    if let Some((_, _, best)) = candidates.into_iter().next() {
        log_debug!("[Utils] Found executable {:?}", best.display().to_string().green());
        return Ok(best);
    }

    if files.len() == 1 {
        log_debug!("[Utils] Archive holds a single file, using it as the executable");
        return Ok(files[0].clone());
    }
    let native: Vec<&PathBuf> = files.iter().filter(|p| is_native_executable(p)).collect();
    if let [only] = native.as_slice() {
        log_warn!(
            "[Utils] No file matched {:?}; using the only native executable {:?}",
            patterns,
            only.display()
        );
        return Ok((*only).clone());
    }

    Err(Error::Extraction(format!(
        "no executable matching {} found in archive ({} files)",
        if patterns.is_empty() { exe_name.to_string() } else { patterns.join(", ") },
        files.len()
    )))
}

fn compile_patterns(patterns: &[String], exe_name: &str) -> Result<Vec<Regex>> {
    if patterns.is_empty() {
        let stem = exe_name.strip_suffix(".exe").unwrap_or(exe_name);
        let default = format!(r"(?i)^{}(\.exe)?$", regex::escape(stem));
        return Regex::new(&default)
            .map(|re| vec![re])
            .map_err(|e| Error::validation(format!("invalid executable name '{exe_name}': {e}")));
    }
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| Error::validation(format!("invalid exe pattern '{p}': {e}"))))
        .collect()
}

// Lower is better.
fn rank(path: &Path) -> u8 {
    if is_native_executable(path) {
        0
    } else if has_execute_bit(path) {
        1
    } else {
        2
    }
}

/// True when the file parses as an ELF, Mach-O or PE executable.
pub fn is_native_executable(path: &Path) -> bool {
    match fs::read(path) {
        Ok(bytes) => matches!(
            Object::parse(&bytes),
            Ok(Object::Elf(_)) | Ok(Object::Mach(_)) | Ok(Object::PE(_))
        ),
        Err(_) => false,
    }
}

#[cfg(unix)]
fn has_execute_bit(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn has_execute_bit(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("exe"))
        .unwrap_or(false)
}

/// Moves a file into place, replacing whatever is at `to`.
///
/// A plain rename is used when possible. Across filesystems the file is first copied
/// next to the destination and then renamed over it, so `to` never holds a partial file.
///
/// # Arguments
/// * `from`: The source path (`&Path`) of the file to be moved.
/// * `to`: The destination path (`&Path`), including the final file name.
pub fn move_binary(from: &Path, to: &Path) -> io::Result<()> {
    log_debug!("[Utils] Moving binary from {:?} to {:?}", from.to_string_lossy().yellow(), to.to_string_lossy().cyan());

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            log_debug!("[Utils] Cross-device move, staging a copy next to {:?}", to.display());
            let staged = staging_path(to);
            fs::copy(from, &staged)?;
            if let Err(e) = fs::rename(&staged, to) {
                let _ = fs::remove_file(&staged);
                return Err(e);
            }
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

fn staging_path(to: &Path) -> PathBuf {
    let name = to.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    to.with_file_name(format!(".{name}.forgebin-tmp"))
}

/// Recursively copies `from` into `to`, used by the `extract` installation mode.
///
/// # Returns
/// * `io::Result<Vec<PathBuf>>`: every file written, in traversal order.
pub fn copy_tree(from: &Path, to: &Path) -> io::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry.path().strip_prefix(from).map_err(io::Error::other)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let staged = staging_path(&target);
            fs::copy(entry.path(), &staged)?;
            fs::rename(&staged, &target)?;
            written.push(target);
        }
    }
    Ok(written)
}

/// Makes a given file executable. On Unix-like systems, this is equivalent to `chmod 755 file`.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    log_debug!("[Utils] File {:?} is now executable.", path.to_string_lossy().green());
    Ok(())
}

// Windows has no execute bit; `.exe` files are runnable as they are.
#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Creates `alias` next to `target`: a relative symlink on Unix, a copy on Windows.
///
/// An existing file at the alias path is replaced.
pub fn create_alias(target: &Path, alias: &Path) -> io::Result<()> {
    if alias.symlink_metadata().is_ok() {
        fs::remove_file(alias)?;
    }

    #[cfg(unix)]
    {
        let link_target = match (target.parent(), alias.parent()) {
            (Some(a), Some(b)) if a == b => target
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| target.to_path_buf()),
            _ => target.to_path_buf(),
        };
        std::os::unix::fs::symlink(link_target, alias)?;
    }
    #[cfg(not(unix))]
    {
        fs::copy(target, alias)?;
    }

    log_debug!("[Utils] Alias {:?} -> {:?}", alias.display(), target.display());
    Ok(())
}
