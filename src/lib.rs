//! # forgebin
//!
//! Declarative, cross-platform installer and updater for release binaries.
//!
//! A list of tool descriptors (YAML) is merged with inherited defaults, templated,
//! filtered, resolved against a release source (GitHub, GitLab, a plain URL, the Go
//! module fetcher or an external command), downloaded, verified, extracted and
//! placed in an output directory. A small cache records what was installed so later
//! runs can decide whether any work is needed.
//!
//! ## Layout
//!
//! - [`schemas`]: serde data model (tool descriptors, platform, cache items, results).
//! - [`libs`]: the resolution and install pipeline plus its collaborators.
//! - [`populators`]: per-source adapters that find versions and asset URLs.

pub mod logger;

pub mod libs;
pub mod populators;
pub mod schemas;

pub use libs::errors::{Error, ErrorKind, Result};
pub use libs::processor::Processor;
pub use schemas::config::Config;
pub use schemas::tools::Tool;
