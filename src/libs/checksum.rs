//! # Checksum Verification
//!
//! Resolves what a downloaded asset is expected to hash to, and checks it.
//!
//! `checksum.type` selects the mode:
//! - `none`: nothing is verified;
//! - `sha256`, `sha512`, `sha1`, `md5`: `checksum.value` carries the hex digest, or
//!   points at content holding it with a `url:` / `path:` prefix;
//! - `file`: the checksums file published next to the asset is downloaded and the
//!   asset's entry is looked up. The algorithm follows from the digest length.
//!
//! Content holding several lines is treated as a sums file (GNU `hex  name`,
//! `hex *name` and BSD `ALGO (name) = hex` layouts) and searched for `checksum.entry`
//! (the asset file name by default). Single-line content yields its first token. An
//! optional `checksum.pattern` regex extracts the digest from free-form text instead.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::str::FromStr;

use colored::Colorize;
use regex::Regex;
use sha2::{Digest, Sha256, Sha512};

use crate::libs::errors::{Error, Result};
use crate::libs::utilities::assets::HttpClient;
use crate::populators::Asset;
use crate::schemas::tools::{Checksum, ChecksumType};
use crate::{log_debug, log_info};

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// MD5 (32 hex chars).
    Md5,
    /// SHA-1 (40 hex chars).
    Sha1,
    /// SHA-256 (64 hex chars).
    Sha256,
    /// SHA-512 (128 hex chars).
    Sha512,
}

impl Algorithm {
    /// Parses `sha256`, `SHA-256`, `md5` and friends.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace('-', "").as_str() {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Infers the algorithm from the length of a hex digest.
    #[must_use]
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(Self::Md5),
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            128 => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Lowercase algorithm name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Hex digest of everything `reader` yields.
    pub fn digest_reader(self, reader: impl Read) -> io::Result<String> {
        match self {
            Self::Md5 => hash_reader::<md5::Md5>(reader),
            Self::Sha1 => hash_reader::<sha1::Sha1>(reader),
            Self::Sha256 => hash_reader::<Sha256>(reader),
            Self::Sha512 => hash_reader::<Sha512>(reader),
        }
    }

    /// Hex digest of a byte slice.
    #[must_use]
    pub fn digest_bytes(self, bytes: &[u8]) -> String {
        match self {
            Self::Md5 => hex::encode(md5::Md5::digest(bytes)),
            Self::Sha1 => hex::encode(sha1::Sha1::digest(bytes)),
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

fn hash_reader<D: Digest + Write>(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// What a download must hash to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// No verification (`checksum.type: none`).
    None,
    /// A concrete digest.
    Digest {
        /// Algorithm to use.
        algorithm: Algorithm,
        /// Lowercase hex digest.
        hex: String,
    },
}

impl Expectation {
    /// A digest expectation with the hex normalized to lowercase.
    #[must_use]
    pub fn digest(algorithm: Algorithm, hex: &str) -> Self {
        Self::Digest {
            algorithm,
            hex: hex.trim().to_lowercase(),
        }
    }
}

/// Compares the digest of `bytes` with `expected`.
pub fn verify_bytes(name: &str, bytes: &[u8], algorithm: Algorithm, expected: &str) -> Result<()> {
    let actual = algorithm.digest_bytes(bytes);
    compare(name, &actual, expected)
}

/// Compares the digest of the file at `path` with `expected`.
pub fn verify_file(path: &Path, algorithm: Algorithm, expected: &str) -> Result<()> {
    let file = File::open(path).map_err(|e| Error::io_at("open", path, e))?;
    let actual = algorithm
        .digest_reader(file)
        .map_err(|e| Error::io_at("read", path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    compare(&name, &actual, expected)
}

/// Verifies a file against an [`Expectation`]. `None` always passes.
pub fn verify(path: &Path, expectation: &Expectation) -> Result<()> {
    match expectation {
        Expectation::None => Ok(()),
        Expectation::Digest { algorithm, hex } => {
            verify_file(path, *algorithm, hex)?;
            log_info!(
                "[Checksum] {} verified ({})",
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
                    .bold(),
                algorithm.name()
            );
            Ok(())
        }
    }
}

fn compare(name: &str, actual: &str, expected: &str) -> Result<()> {
    let expected = expected.trim().to_lowercase();
    if actual.eq_ignore_ascii_case(&expected) {
        Ok(())
    } else {
        Err(Error::checksum_mismatch(name, expected, actual))
    }
}

/// One line of a sums file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumEntry {
    /// File name as written.
    pub name: String,
    /// Lowercase hex digest.
    pub hex: String,
    /// Algorithm, when the BSD layout names it.
    pub algorithm: Option<Algorithm>,
}

/// Parses GNU (`hex  name`, `hex *name`) and BSD (`ALGO (name) = hex`) lines.
///
/// Lines in neither layout are ignored.
#[must_use]
pub fn parse_sums(content: &str) -> Vec<SumEntry> {
    let mut entries = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(entry) = parse_bsd(line).or_else(|| parse_gnu(line)) {
            entries.push(entry);
        }
    }
    entries
}

fn parse_gnu(line: &str) -> Option<SumEntry> {
    let (hex, rest) = line.split_once(char::is_whitespace)?;
    if !is_hex(hex) {
        return None;
    }
    let name = rest.trim_start().trim_start_matches('*').trim();
    if name.is_empty() {
        return None;
    }
    Some(SumEntry {
        name: name.to_string(),
        hex: hex.to_lowercase(),
        algorithm: None,
    })
}

fn parse_bsd(line: &str) -> Option<SumEntry> {
    let (algo, rest) = line.split_once('(')?;
    let (name, rest) = rest.rsplit_once(')')?;
    let hex = rest.trim().strip_prefix('=')?.trim();
    if !is_hex(hex) {
        return None;
    }
    Some(SumEntry {
        name: name.trim().to_string(),
        hex: hex.to_lowercase(),
        algorithm: Algorithm::from_name(algo),
    })
}

fn is_hex(s: &str) -> bool {
    s.len() >= 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Finds the digest recorded for `entry` in a sums file.
///
/// Names match exactly first, then by their last path component.
#[must_use]
pub fn lookup(content: &str, entry: &str) -> Option<SumEntry> {
    let entries = parse_sums(content);
    let base = |name: &str| name.rsplit('/').next().unwrap_or(name).to_string();
    entries
        .iter()
        .find(|e| e.name == entry)
        .or_else(|| entries.iter().find(|e| base(&e.name) == base(entry)))
        .cloned()
}

/// Extracts a digest from fetched content.
///
/// # Arguments
/// * `content`: Text of a `.sha256` file, a sums file or any free-form page.
/// * `pattern`: Optional regex; capture group 1 (or the whole match) is the digest.
/// * `entry`: File name to look up when the content is a multi-line sums file.
pub fn extract(content: &str, pattern: &str, entry: &str) -> Result<String> {
    if !pattern.is_empty() {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::validation(format!("invalid checksum pattern '{pattern}': {e}")))?;
        let captures = regex.captures(content).ok_or_else(|| {
            Error::MissingChecksum(format!("pattern '{pattern}' did not match"))
        })?;
        let digest = captures.get(1).or_else(|| captures.get(0)).map(|m| m.as_str());
        return digest
            .map(|d| d.trim().to_lowercase())
            .ok_or_else(|| Error::MissingChecksum(format!("pattern '{pattern}' did not match")));
    }

    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() > 1 {
        return lookup(content, entry)
            .map(|e| e.hex)
            .ok_or_else(|| Error::MissingChecksum(format!("no entry for '{entry}'")));
    }
    // A single BSD line still names its file; honor it before taking the first token.
    if let Some(single) = lines.first().and_then(|line| parse_bsd(line)) {
        return Ok(single.hex);
    }
    content
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .ok_or_else(|| Error::MissingChecksum("checksum content is empty".into()))
}

/// Loads content referenced by a `url:` or `path:` prefix.
fn load_reference(value: &str, client: &HttpClient) -> Result<Option<String>> {
    if let Some(url) = value.strip_prefix("url:") {
        log_debug!("[Checksum] Fetching checksum from {}", url.blue());
        return client.get_text(url.trim(), &[]).map(Some);
    }
    if let Some(path) = value.strip_prefix("path:") {
        let expanded = shellexpand::tilde(path.trim()).to_string();
        let path = Path::new(&expanded);
        return std::fs::read_to_string(path)
            .map(Some)
            .map_err(|e| Error::io_at("read checksum file", path, e));
    }
    Ok(None)
}

/// Works out the expected digest for `asset`.
///
/// # Returns
/// * `Ok(Expectation::None)` for `checksum.type: none`.
/// * `Err(Error::MissingChecksum)` when a checksum is required but cannot be found,
///   including `type: file` releases without a checksums sibling.
pub fn resolve(checksum: &Checksum, asset: &Asset, client: &HttpClient) -> Result<Expectation> {
    let kind = ChecksumType::from_str(&checksum.kind)
        .map_err(|kind| Error::validation(format!("unknown checksum type '{kind}'")))?;
    let entry = if checksum.entry.is_empty() {
        asset.name.as_str()
    } else {
        checksum.entry.as_str()
    };

    let explicit = match kind {
        ChecksumType::None => return Ok(Expectation::None),
        ChecksumType::Md5 => Some(Algorithm::Md5),
        ChecksumType::Sha1 => Some(Algorithm::Sha1),
        ChecksumType::Sha256 => Some(Algorithm::Sha256),
        ChecksumType::Sha512 => Some(Algorithm::Sha512),
        ChecksumType::File => None,
    };

    let hex = match load_reference(&checksum.value, client)? {
        Some(content) => extract(&content, &checksum.pattern, entry)?,
        None if !checksum.value.trim().is_empty() => checksum.value.trim().to_lowercase(),
        None if kind == ChecksumType::File => {
            let (name, url) = asset.checksum.as_ref().ok_or_else(|| {
                Error::MissingChecksum(format!("no checksum file published for {}", asset.name))
            })?;
            log_debug!("[Checksum] Using checksum file {}", name.cyan());
            let content = client.get_text(url, &asset.headers)?;
            extract(&content, &checksum.pattern, entry)?
        }
        None => {
            return Err(Error::MissingChecksum(format!(
                "checksum type '{}' requires a value",
                checksum.kind
            )));
        }
    };

    let algorithm = match explicit {
        Some(algorithm) => algorithm,
        None => Algorithm::from_hex_len(hex.len()).ok_or_else(|| {
            Error::MissingChecksum(format!("cannot infer algorithm from '{hex}'"))
        })?,
    };
    Ok(Expectation::digest(algorithm, &hex))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn verifies_and_detects_bit_flips() {
        let bytes = b"hello".to_vec();
        assert!(verify_bytes("hello", &bytes, Algorithm::Sha256, HELLO_SHA256).is_ok());
        assert!(verify_bytes("hello", &bytes, Algorithm::Sha256, &HELLO_SHA256.to_uppercase()).is_ok());

        for bit in 0..8 {
            let mut flipped = bytes.clone();
            flipped[0] ^= 1 << bit;
            let err = verify_bytes("hello", &flipped, Algorithm::Sha256, HELLO_SHA256).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Integrity);
        }
    }

    #[test]
    fn every_algorithm_round_trips_through_its_own_digest() {
        for algorithm in [Algorithm::Md5, Algorithm::Sha1, Algorithm::Sha256, Algorithm::Sha512] {
            let digest = algorithm.digest_bytes(b"forgebin");
            assert_eq!(Algorithm::from_hex_len(digest.len()), Some(algorithm));
            assert_eq!(algorithm.digest_reader(&b"forgebin"[..]).unwrap(), digest);
        }
    }

    #[test]
    fn parses_gnu_and_bsd_layouts() {
        let content = format!(
            "{HELLO_SHA256}  tool-linux-amd64.tar.gz\n{HELLO_SHA256} *tool-darwin.zip\nSHA256 (tool.exe) = {HELLO_SHA256}\nnot a checksum line\n"
        );
        let entries = parse_sums(&content);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].name, "tool-darwin.zip");
        assert_eq!(entries[2].name, "tool.exe");
        assert_eq!(entries[2].algorithm, Some(Algorithm::Sha256));
    }

    #[test]
    fn lookup_falls_back_to_base_name() {
        let content = format!("{HELLO_SHA256}  ./dist/tool.tar.gz\n");
        assert_eq!(lookup(&content, "tool.tar.gz").unwrap().hex, HELLO_SHA256);
        assert!(lookup(&content, "other.tar.gz").is_none());
    }

    #[test]
    fn extract_modes() {
        let single = format!("{HELLO_SHA256}  tool.tar.gz\n");
        assert_eq!(extract(&single, "", "whatever").unwrap(), HELLO_SHA256);

        let multi = format!("{}  a.tar.gz\n{HELLO_SHA256}  b.tar.gz\n", "0".repeat(64));
        assert_eq!(extract(&multi, "", "b.tar.gz").unwrap(), HELLO_SHA256);
        assert!(extract(&multi, "", "c.tar.gz").is_err());

        let page = format!("<td>sha256: {HELLO_SHA256}</td>");
        assert_eq!(
            extract(&page, r"sha256: ([0-9a-f]{64})", "").unwrap(),
            HELLO_SHA256
        );
    }

    #[test]
    fn algorithm_names() {
        assert_eq!(Algorithm::from_name("SHA-256"), Some(Algorithm::Sha256));
        assert_eq!(Algorithm::from_name("md5"), Some(Algorithm::Md5));
        assert_eq!(Algorithm::from_name("crc32"), None);
    }

    #[test]
    fn resolve_without_network() {
        let client = HttpClient::new(false).unwrap();
        let asset = Asset {
            name: "tool.tar.gz".into(),
            ..Asset::default()
        };

        let none = Checksum::default();
        assert_eq!(resolve(&none, &asset, &client).unwrap(), Expectation::None);

        let inline = Checksum {
            kind: "sha256".into(),
            value: HELLO_SHA256.to_uppercase(),
            ..Checksum::default()
        };
        assert_eq!(
            resolve(&inline, &asset, &client).unwrap(),
            Expectation::Digest {
                algorithm: Algorithm::Sha256,
                hex: HELLO_SHA256.into()
            }
        );

        let missing = Checksum {
            kind: "sha256".into(),
            ..Checksum::default()
        };
        assert_eq!(
            resolve(&missing, &asset, &client).unwrap_err().kind(),
            crate::ErrorKind::Integrity
        );

        let file_without_sibling = Checksum {
            kind: "file".into(),
            ..Checksum::default()
        };
        assert_eq!(
            resolve(&file_without_sibling, &asset, &client).unwrap_err().kind(),
            crate::ErrorKind::Integrity
        );
    }

    #[test]
    fn resolve_reads_path_references() {
        let dir = tempfile::tempdir().unwrap();
        let sums = dir.path().join("SHA256SUMS");
        std::fs::write(&sums, format!("{}  other\n{HELLO_SHA256}  tool.tar.gz\n", "1".repeat(64))).unwrap();

        let client = HttpClient::new(false).unwrap();
        let asset = Asset {
            name: "tool.tar.gz".into(),
            ..Asset::default()
        };
        let checksum = Checksum {
            kind: "file".into(),
            value: format!("path:{}", sums.display()),
            ..Checksum::default()
        };
        assert_eq!(
            resolve(&checksum, &asset, &client).unwrap(),
            Expectation::Digest {
                algorithm: Algorithm::Sha256,
                hex: HELLO_SHA256.into()
            }
        );
    }
}
