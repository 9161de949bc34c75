//! # Platform Schema
//!
//! Describes the machine a tool is installed for. Every field is a plain string so a
//! descriptor can override any of them (`platform: {os: linux, libc: musl}`); fields
//! left empty are filled from the detected host with [`Platform::merge`].

use serde::{Deserialize, Serialize};

/// Operating system, architecture, libc flavor and executable suffix of a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Platform {
    /// `linux`, `darwin`, `windows`, `freebsd`, `netbsd`, `openbsd` or `android`.
    pub os: String,
    /// `amd64`, `arm64`, `arm`, `386`, `ppc64le`, `s390x`, `riscv64` or `mips64le`.
    pub arch: String,
    /// Linux distribution id from `/etc/os-release` (e.g. `ubuntu`, `alpine`).
    pub distribution: String,
    /// `glibc`, `musl` or `unknown`. Empty outside Linux.
    pub libc: String,
    /// Conventional executable suffix: `.exe` on Windows, empty elsewhere.
    pub extension: String,
}

impl Platform {
    /// Fills every empty field from `other`, never overwriting values already set.
    pub fn merge(&mut self, other: &Platform) {
        fill(&mut self.os, &other.os);
        fill(&mut self.arch, &other.arch);
        fill(&mut self.distribution, &other.distribution);
        fill(&mut self.libc, &other.libc);
        fill(&mut self.extension, &other.extension);
    }

    /// Completes a (possibly user-overridden) platform from the detected host.
    ///
    /// Unlike a bare [`merge`](Self::merge), host details that only make sense for
    /// the host OS (libc, distribution, executable suffix) are not copied when the
    /// descriptor targets a different OS.
    pub fn complete_from(&mut self, host: &Platform) {
        let foreign = !self.os.is_empty() && self.os != host.os;
        if foreign {
            fill(&mut self.arch, &host.arch);
            if self.extension.is_empty() {
                self.extension = extension_for(&self.os).to_string();
            }
        } else {
            self.merge(host);
        }
    }

    /// True when the platform targets Windows.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

/// Returns the conventional executable suffix for an OS name.
#[must_use]
pub fn extension_for(os: &str) -> &'static str {
    if os == "windows" { ".exe" } else { "" }
}

fn fill(target: &mut String, source: &str) {
    if target.is_empty() && !source.is_empty() {
        *target = source.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Platform {
        Platform {
            os: "linux".into(),
            arch: "amd64".into(),
            distribution: "debian".into(),
            libc: "glibc".into(),
            extension: String::new(),
        }
    }

    #[test]
    fn merge_only_fills_empty_fields() {
        let mut platform = Platform {
            libc: "musl".into(),
            ..Platform::default()
        };
        platform.merge(&host());
        assert_eq!(platform.os, "linux");
        assert_eq!(platform.arch, "amd64");
        assert_eq!(platform.libc, "musl");
        assert_eq!(platform.distribution, "debian");
    }

    #[test]
    fn foreign_os_does_not_inherit_host_libc() {
        let mut platform = Platform {
            os: "windows".into(),
            ..Platform::default()
        };
        platform.complete_from(&host());
        assert_eq!(platform.arch, "amd64");
        assert_eq!(platform.extension, ".exe");
        assert!(platform.libc.is_empty());
    }
}
