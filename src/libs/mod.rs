// This is the main module file for the `libs` directory.
// It declares the pipeline building blocks; `utilities` holds the low-level
// helpers (platform detection, HTTP, archives, binaries, timestamps).

// Error taxonomy shared by every stage.
pub mod errors;
// Descriptor merging and the defaults inheritance graph.
pub mod inheritance;
pub mod merge;
// Go-template style rendering of descriptor fields.
pub mod templating;
// Release asset scoring.
pub mod asset_matcher;
// Integrity verification.
pub mod checksum;
// Whether a download is needed at all.
pub mod strategy;
// Download, verify, extract and place.
pub mod installation;
// Per-tool state machine and the concurrent orchestrator around it.
pub mod pipeline;
pub mod processor;
// Collaborators: cache persistence, progress, cancellation, config files, reporting.
pub mod cache_store;
pub mod cancel;
pub mod config_loading;
pub mod progress;
pub mod report;

pub mod utilities;
