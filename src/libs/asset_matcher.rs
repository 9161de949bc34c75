//! # Asset Matcher
//!
//! Picks the release asset that fits a platform best. Every candidate name is scored
//! against a set of hints made of the user's own hints, a synthetic extension hint and
//! hints derived from the target platform:
//!
//! | match      | effect when the pattern matches | effect when it does not |
//! |------------|---------------------------------|-------------------------|
//! | `must`     | nothing                         | candidate eliminated    |
//! | `must-not` | candidate eliminated            | nothing                 |
//! | `weighted` | `+weight`                       | nothing                 |
//! | `negative` | `-weight`                       | nothing                 |
//!
//! The highest surviving score wins; exact ties go to the lexicographically earliest
//! name so the choice never depends on API ordering.

use std::cmp::Ordering;
use std::fmt;

use colored::Colorize;
use glob::{MatchOptions, Pattern};
use regex::Regex;
use thiserror::Error;

use crate::libs::templating::strip_archive_extension;
use crate::log_debug;
use crate::schemas::platform::Platform;
use crate::schemas::tools::{Hint, HintMatch, HintType};

// ============================================================================
// PLATFORM TABLES
// ============================================================================

const OS_PATTERNS: [(&str, &str); 7] = [
    ("linux", r"(?i)linux"),
    ("darwin", r"(?i)(darwin|mac-?os|osx|apple)"),
    ("windows", r"(?i)(windows|win32|win64|\.exe$)"),
    ("freebsd", r"(?i)freebsd"),
    ("netbsd", r"(?i)netbsd"),
    ("openbsd", r"(?i)openbsd"),
    ("android", r"(?i)android"),
];

const ARCH_PATTERNS: [(&str, &str); 8] = [
    ("amd64", r"(?i)(amd64|x86_64|x86-64|(^|[^a-z0-9])x64)"),
    ("arm64", r"(?i)(arm64|aarch64|armv8)"),
    (
        "arm",
        r"(?i)(^|[^a-z0-9])(armv[5-7]l?|armhf|armel|arm32|arm)([^a-z0-9]|$)",
    ),
    ("386", r"(?i)(i386|i686|(^|[^a-z0-9])386|x86([^_\-0-9]|$)|win32)"),
    ("ppc64le", r"(?i)ppc64le"),
    ("s390x", r"(?i)s390x"),
    ("riscv64", r"(?i)riscv64"),
    ("mips64le", r"(?i)mips64le"),
];

const ARCHIVE_PATTERN: &str = r"(?i)\.(tar\.gz|tgz|tar\.xz|txz|tar\.bz2|tbz2?|zip|gz)$";

const NON_BINARY_PATTERN: &str = r"(?i)(checksum|shasum|sha256|sha512|sha1|md5|hash|sums?([^a-z]|$)|digest|\.sig$|\.asc$|\.pem$|\.sbom|\.deb$|\.rpm$|\.apk$|\.msi$|\.json$|\.txt$)";

const CHECKSUM_MARKERS: [&str; 8] = [
    "checksum", "shasum", "sha256", "sha512", "md5", "hash", "sum", "digest",
];

// ============================================================================
// TYPES
// ============================================================================

/// What an asset has to fit.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    /// Target platform.
    pub platform: Platform,
    /// User-supplied hints.
    pub hints: Vec<Hint>,
    /// Acceptable extensions; when non-empty at least one must match.
    pub extensions: Vec<String>,
}

/// A candidate that survived scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Asset name.
    pub name: String,
    /// Final score.
    pub score: i64,
}

/// Why a candidate was eliminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Asset name.
    pub candidate: String,
    /// The `must` / `must-not` hint that removed it.
    pub hint: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.candidate, self.hint)
    }
}

/// Failure to pick an asset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// The release has no assets at all.
    #[error("no assets to choose from")]
    Empty,
    /// Every candidate was eliminated.
    #[error("no asset matched: {}", rejected.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    NoMatch {
        /// One entry per candidate.
        rejected: Vec<Rejection>,
    },
    /// A hint pattern failed to compile.
    #[error("invalid hint '{pattern}': {message}")]
    InvalidHint {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },
}

enum Compiled {
    Contains(String),
    Glob(Pattern),
    Regex(Regex),
}

impl Compiled {
    fn new(hint: &Hint) -> Result<Self, MatchError> {
        let invalid = |message: String| MatchError::InvalidHint {
            pattern: hint.pattern.clone(),
            message,
        };
        Ok(match hint.kind {
            HintType::Contains => Self::Contains(hint.pattern.to_lowercase()),
            HintType::Glob => Self::Glob(Pattern::new(&hint.pattern).map_err(|e| invalid(e.to_string()))?),
            HintType::Regex => Self::Regex(Regex::new(&hint.pattern).map_err(|e| invalid(e.to_string()))?),
        })
    }

    fn is_match(&self, name: &str) -> bool {
        match self {
            Self::Contains(needle) => name.to_lowercase().contains(needle),
            Self::Glob(pattern) => pattern.matches_with(
                name,
                MatchOptions {
                    case_sensitive: false,
                    ..MatchOptions::new()
                },
            ),
            Self::Regex(regex) => regex.is_match(name),
        }
    }
}

struct Rule {
    label: String,
    pattern: Compiled,
    weight: i64,
    matching: HintMatch,
}

/// Compiled hint set for one set of [`Requirements`].
pub struct Matcher {
    rules: Vec<Rule>,
}

impl Matcher {
    /// Compiles the effective hints: user hints, then the extension hint, then the
    /// platform hints.
    pub fn new(requirements: &Requirements) -> Result<Self, MatchError> {
        let mut hints = requirements.hints.clone();
        hints.extend(extension_hints(&requirements.extensions, &requirements.platform));
        hints.extend(platform_hints(&requirements.platform));

        let rules = hints
            .iter()
            .filter(|hint| !hint.pattern.is_empty())
            .map(|hint| {
                Ok(Rule {
                    label: format!("{} '{}'", match_label(hint.matching), hint.pattern),
                    pattern: Compiled::new(hint)?,
                    weight: hint.weight(),
                    matching: hint.matching,
                })
            })
            .collect::<Result<Vec<_>, MatchError>>()?;
        Ok(Self { rules })
    }

    /// Scores a single candidate; `Err` carries the eliminating hint.
    pub fn score(&self, candidate: &str) -> Result<i64, String> {
        let mut score = 0;
        for rule in &self.rules {
            let matched = rule.pattern.is_match(candidate);
            match rule.matching {
                HintMatch::Must if !matched => return Err(rule.label.clone()),
                HintMatch::MustNot if matched => return Err(rule.label.clone()),
                HintMatch::Weighted if matched => score += rule.weight,
                HintMatch::Negative if matched => score -= rule.weight,
                _ => {}
            }
        }
        Ok(score)
    }

    /// Surviving candidates, best first.
    pub fn rank<S: AsRef<str>>(&self, candidates: &[S]) -> (Vec<Match>, Vec<Rejection>) {
        let mut matches = Vec::new();
        let mut rejected = Vec::new();
        for candidate in candidates {
            let name = candidate.as_ref();
            match self.score(name) {
                Ok(score) => {
                    log_debug!("[Matcher] {} scored {}", name.dimmed(), score);
                    matches.push(Match {
                        name: name.to_string(),
                        score,
                    });
                }
                Err(hint) => {
                    log_debug!("[Matcher] {} rejected by {}", name.dimmed(), hint);
                    rejected.push(Rejection {
                        candidate: name.to_string(),
                        hint,
                    });
                }
            }
        }
        matches.sort_by(|a, b| match b.score.cmp(&a.score) {
            Ordering::Equal => a.name.cmp(&b.name),
            other => other,
        });
        (matches, rejected)
    }

    /// The single best candidate.
    pub fn best<S: AsRef<str>>(&self, candidates: &[S]) -> Result<Match, MatchError> {
        if candidates.is_empty() {
            return Err(MatchError::Empty);
        }
        let (matches, rejected) = self.rank(candidates);
        matches
            .into_iter()
            .next()
            .ok_or(MatchError::NoMatch { rejected })
    }
}

fn match_label(matching: HintMatch) -> &'static str {
    match matching {
        HintMatch::Weighted => "weighted",
        HintMatch::Must => "must",
        HintMatch::MustNot => "must-not",
        HintMatch::Negative => "negative",
    }
}

fn regex_hint(pattern: &str, weight: i64, matching: HintMatch) -> Hint {
    Hint {
        pattern: pattern.to_string(),
        weight: Some(weight),
        kind: HintType::Regex,
        matching,
    }
}

/// Hints derived from the target platform.
#[must_use]
pub fn platform_hints(platform: &Platform) -> Vec<Hint> {
    let mut hints = Vec::new();
    let os = platform.os.as_str();

    if OS_PATTERNS.iter().any(|(name, _)| *name == os) {
        for (name, pattern) in OS_PATTERNS {
            if name == os {
                hints.push(regex_hint(pattern, 1, HintMatch::Must));
            } else if !(os == "android" && name == "linux") {
                hints.push(regex_hint(pattern, 1, HintMatch::MustNot));
            }
        }
    }

    let arch = platform.arch.as_str();
    if ARCH_PATTERNS.iter().any(|(name, _)| *name == arch) {
        let rosetta = os == "darwin" && arch == "arm64";
        for (name, pattern) in ARCH_PATTERNS {
            if name == arch {
                hints.push(regex_hint(pattern, 3, HintMatch::Weighted));
            } else if rosetta && name == "amd64" {
                hints.push(regex_hint(pattern, 1, HintMatch::Weighted));
            } else {
                hints.push(regex_hint(pattern, 1, HintMatch::MustNot));
            }
        }
    }

    if os == "linux" {
        match platform.libc.as_str() {
            "musl" => hints.push(regex_hint("(?i)musl", 1, HintMatch::Weighted)),
            "glibc" => {
                hints.push(regex_hint("(?i)musl", 1, HintMatch::Negative));
                hints.push(regex_hint("(?i)gnu", 1, HintMatch::Weighted));
            }
            _ => {}
        }
    }

    hints.push(regex_hint(NON_BINARY_PATTERN, 10, HintMatch::Negative));
    hints
}

/// The synthetic extension hint.
#[must_use]
pub fn extension_hints(extensions: &[String], platform: &Platform) -> Vec<Hint> {
    if extensions.is_empty() {
        let mut hints = vec![regex_hint(ARCHIVE_PATTERN, 1, HintMatch::Weighted)];
        if platform.is_windows() {
            hints.push(regex_hint(r"(?i)\.exe$", 1, HintMatch::Weighted));
        }
        return hints;
    }

    let alternatives: Vec<String> = extensions
        .iter()
        .filter(|ext| !ext.is_empty())
        .map(|ext| regex::escape(ext))
        .collect();
    if alternatives.is_empty() {
        return Vec::new();
    }
    // An empty entry means "no extension is fine too", so the list only ranks.
    let matching = if extensions.iter().any(String::is_empty) {
        HintMatch::Weighted
    } else {
        HintMatch::Must
    };
    vec![regex_hint(
        &format!("(?i)({})$", alternatives.join("|")),
        1,
        matching,
    )]
}

/// True when the name looks like a checksum file.
#[must_use]
pub fn is_checksum_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    CHECKSUM_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Picks the checksum file that belongs to `asset` among `candidates`.
///
/// Names containing the asset name (or its stem) score +2, the conventional
/// `checksum.txt` / `checksums.txt` score +1; ties go to the earliest name.
#[must_use]
pub fn pick_checksum_file<S: AsRef<str>>(candidates: &[S], asset: &str) -> Option<String> {
    let asset_lower = asset.to_lowercase();
    let stem = strip_archive_extension(&asset_lower);

    let mut best: Option<(i64, &str)> = None;
    for candidate in candidates.iter().map(AsRef::as_ref) {
        if candidate == asset || !is_checksum_file(candidate) {
            continue;
        }
        let lower = candidate.to_lowercase();
        let mut score = 0;
        if lower.contains(&asset_lower) || (!stem.is_empty() && lower.contains(&stem)) {
            score += 2;
        }
        if lower == "checksum.txt" || lower == "checksums.txt" {
            score += 1;
        }
        let better = match best {
            None => true,
            Some((top, name)) => score > top || (score == top && candidate < name),
        };
        if better {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, name)| name.to_string())
}
