use chrono::{DateTime, Duration, Utc};

/// Converts a Chrono `Duration` object into a human-readable string representation.
///
/// The largest whole unit is used: days, then hours, then minutes. Anything under a
/// minute is reported as "0 minutes".
///
/// # Arguments
/// * `duration` - A reference to a Chrono `Duration` object to be formatted
pub fn format_duration(duration: &Duration) -> String {
    if duration.num_days() > 0 {
        format!("{} days", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{} hours", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{} minutes", duration.num_minutes())
    } else {
        "0 minutes".to_string()
    }
}

/// Describes a cache timestamp relative to now, e.g. "3 days ago" or "just now".
pub fn time_since(timestamp: &DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(*timestamp);
    if elapsed.num_minutes() > 0 {
        format!("{} ago", format_duration(&elapsed))
    } else {
        "just now".to_string()
    }
}

/// Formats a timestamp the way `cache list` prints it: `2024-01-15 10:30 UTC`.
pub fn display_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M UTC").to_string()
}
