// This is the main module file for the `utilities` directory.
// It declares the low-level helpers the install pipeline is built from.

// Host platform detection and name normalization.
pub mod platform;
// HTTP client, downloads and file type detection.
pub mod assets;
// Archive extraction.
pub mod compression;
// Locating, moving and aliasing executables.
pub mod binary;
// Human-readable cache timestamps.
pub mod timestamps;
// Shell command execution with cancellation.
pub mod shell;
