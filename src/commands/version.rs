// This file handles `forgebin version`: the version of this build plus the host it
// was compiled for.

use colored::Colorize;
use forgebin::log_info;

/// Prints the package version and target triple components.
pub fn run() {
    log_info!(
        "{} {} ({}/{})",
        env!("CARGO_PKG_NAME").bold(),
        env!("CARGO_PKG_VERSION").green(),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}
