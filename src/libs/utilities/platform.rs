// Our custom logging macros to give us nicely formatted (and colored!) output
// for debugging, general information, and errors.
use crate::{log_debug, log_warn};
// The platform record every descriptor is completed from.
use crate::schemas::platform::{Platform, extension_for};
// The 'colored' crate helps us make our console output look pretty and readable.
use colored::Colorize;
// For reading `/etc/os-release` and probing the dynamic loader.
use std::fs;
use std::path::Path;

/// Detects the platform `forgebin` is running on.
///
/// OS and architecture come from the target the binary was compiled for, libc and
/// distribution are detected on Linux only.
///
/// # Returns
/// * `Platform`: fully populated for the host. Unknown values are kept as reported by
///   the compiler so they can still be matched against asset names.
pub fn detect() -> Platform {
    let os = normalize_os(std::env::consts::OS);
    let arch = normalize_arch(std::env::consts::ARCH);

    let (libc, distribution) = if os == "linux" {
        (detect_libc(Path::new("/")), detect_distribution(Path::new("/etc/os-release")))
    } else {
        (String::new(), String::new())
    };

    let platform = Platform {
        extension: extension_for(&os).to_string(),
        os,
        arch,
        distribution,
        libc,
    };
    log_debug!(
        "[Platform] Detected {}/{} (libc: {}, distribution: {})",
        platform.os.cyan(),
        platform.arch.cyan(),
        platform.libc,
        platform.distribution
    );
    platform
}

/// Maps common OS spellings onto the names used in descriptors.
///
/// # Arguments
/// * `os`: An OS name such as `macOS`, `Darwin`, `win32` or `linux`.
///
/// # Returns
/// * `String`: one of `linux`, `darwin`, `windows`, `freebsd`, `netbsd`, `openbsd`,
///   `android`, or the lowercase input when it is not recognized.
pub fn normalize_os(os: &str) -> String {
    match os.trim().to_lowercase().as_str() {
        "macos" | "darwin" | "osx" | "mac" | "apple-darwin" => "darwin".to_string(),
        "linux" => "linux".to_string(),
        "windows" | "win" | "win32" | "win64" => "windows".to_string(),
        "freebsd" => "freebsd".to_string(),
        "netbsd" => "netbsd".to_string(),
        "openbsd" => "openbsd".to_string(),
        "android" => "android".to_string(),
        other => {
            log_warn!("[Platform] Unknown OS '{}', using as-is. Asset matching may be poor.", other.purple());
            other.to_string()
        }
    }
}

/// Maps common architecture spellings onto the names used in descriptors.
///
/// # Arguments
/// * `arch`: An architecture such as `x86_64`, `aarch64`, `i686` or `armv7l`.
///
/// # Returns
/// * `String`: one of `amd64`, `arm64`, `arm`, `386`, `ppc64le`, `s390x`, `riscv64`,
///   `mips64le`, or the lowercase input when it is not recognized.
pub fn normalize_arch(arch: &str) -> String {
    match arch.trim().to_lowercase().as_str() {
        "amd64" | "x86_64" | "x64" | "x86-64" => "amd64".to_string(),
        "arm64" | "aarch64" | "armv8" => "arm64".to_string(),
        "arm" | "armv7" | "armv7l" | "armv6" | "armv6l" | "armhf" | "armel" => "arm".to_string(),
        "386" | "i386" | "i686" | "x86" => "386".to_string(),
        "ppc64le" | "powerpc64le" => "ppc64le".to_string(),
        "s390x" => "s390x".to_string(),
        "riscv64" | "riscv64gc" => "riscv64".to_string(),
        "mips64le" | "mips64el" => "mips64le".to_string(),
        other => {
            log_warn!("[Platform] Unknown architecture '{}', using as-is. Asset matching may be poor.", other.purple());
            other.to_string()
        }
    }
}

/// Determines the C library by looking at the dynamic loaders under `root`.
///
/// `/lib/ld-musl-*` means musl, `/lib*/ld-linux*` means glibc.
///
/// # Returns
/// * `String`: `musl`, `glibc` or `unknown`.
pub fn detect_libc(root: &Path) -> String {
    let has_loader = |dir: &str, prefix: &str| {
        fs::read_dir(root.join(dir))
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .any(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
            })
            .unwrap_or(false)
    };

    if has_loader("lib", "ld-musl-") {
        return "musl".to_string();
    }
    if ["lib", "lib64", "lib32"].iter().any(|dir| has_loader(dir, "ld-linux")) {
        return "glibc".to_string();
    }
    "unknown".to_string()
}

/// Reads the distribution id (`ID=`) from an os-release file.
///
/// # Returns
/// * `String`: the lowercase id without quotes, or an empty string.
pub fn detect_distribution(os_release: &Path) -> String {
    fs::read_to_string(os_release)
        .ok()
        .and_then(|content| {
            content.lines().find_map(|line| {
                line.strip_prefix("ID=")
                    .map(|id| id.trim().trim_matches('"').trim_matches('\'').to_lowercase())
            })
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_aliases() {
        assert_eq!(normalize_os("macOS"), "darwin");
        assert_eq!(normalize_os("Win64"), "windows");
        assert_eq!(normalize_arch("x86_64"), "amd64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("i686"), "386");
        assert_eq!(normalize_arch("armv7l"), "arm");
    }

    #[test]
    fn detects_libc_from_loader() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("lib")).unwrap();
        assert_eq!(detect_libc(root.path()), "unknown");

        fs::write(root.path().join("lib/ld-musl-x86_64.so.1"), "").unwrap();
        assert_eq!(detect_libc(root.path()), "musl");

        let glibc = tempfile::tempdir().unwrap();
        fs::create_dir_all(glibc.path().join("lib64")).unwrap();
        fs::write(glibc.path().join("lib64/ld-linux-x86-64.so.2"), "").unwrap();
        assert_eq!(detect_libc(glibc.path()), "glibc");
    }

    #[test]
    fn reads_distribution_id() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("os-release");
        fs::write(&file, "NAME=\"Alpine Linux\"\nID=alpine\nVERSION_ID=3.19.0\n").unwrap();
        assert_eq!(detect_distribution(&file), "alpine");
        assert_eq!(detect_distribution(&dir.path().join("missing")), "");
    }

    #[test]
    fn detected_host_is_consistent() {
        let host = detect();
        assert!(!host.os.is_empty());
        assert!(!host.arch.is_empty());
        assert_eq!(host.extension, extension_for(&host.os));
    }
}
