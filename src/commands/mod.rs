// Register application subcommands.
// Each module corresponds to a specific `forgebin` command-line action.

// Inspects and edits the install cache.
pub mod cache;
// Installs or updates the tools of a tool list.
pub mod install;
// Prints the detected platform.
pub mod platform;
// Displays the version of forgebin.
pub mod version;
