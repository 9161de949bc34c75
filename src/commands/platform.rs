// This file handles `forgebin platform`: it prints what platform detection found, which
// is what every descriptor is completed from unless it overrides `platform:` fields.

use colored::Colorize;
use forgebin::libs::utilities::platform::detect;
use forgebin::log_info;

/// Prints the detected platform.
pub fn run() {
    let platform = detect();
    let or_dash = |value: &str| if value.is_empty() { "-".to_string() } else { value.to_string() };

    log_info!("[Platform] {:<13} {}", "OS:", platform.os.cyan());
    log_info!("[Platform] {:<13} {}", "Architecture:", platform.arch.cyan());
    log_info!("[Platform] {:<13} {}", "Libc:", or_dash(&platform.libc));
    log_info!("[Platform] {:<13} {}", "Distribution:", or_dash(&platform.distribution));
    log_info!("[Platform] {:<13} {}", "Extension:", or_dash(&platform.extension));
}
