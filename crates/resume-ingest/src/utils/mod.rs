//! Small formatting helpers shared by error messages and validation reports.

const KB: u64 = 1024;
const MB: u64 = 1024 * 1024;

/// Format a measured size, always with one decimal place above one kilobyte.
///
/// ```rust
/// use resume_ingest::utils::format_size;
///
/// assert_eq!(format_size(2 * 1024 * 1024), "2.0MB");
/// assert_eq!(format_size(12_900_000), "12.3MB");
/// assert_eq!(format_size(1536), "1.5KB");
/// assert_eq!(format_size(12), "12 bytes");
/// ```
pub fn format_size(bytes: u64) -> String {
    if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format a configured limit; whole units are printed without decimals.
///
/// ```rust
/// use resume_ingest::utils::format_limit;
///
/// assert_eq!(format_limit(1024 * 1024), "1MB");
/// assert_eq!(format_limit(1024 * 1024 + 512 * 1024), "1.5MB");
/// assert_eq!(format_limit(500 * 1024), "500KB");
/// ```
pub fn format_limit(bytes: u64) -> String {
    if bytes >= MB {
        if bytes % MB == 0 {
            format!("{}MB", bytes / MB)
        } else {
            format!("{:.1}MB", bytes as f64 / MB as f64)
        }
    } else if bytes >= KB {
        if bytes % KB == 0 {
            format!("{}KB", bytes / KB)
        } else {
            format!("{:.1}KB", bytes as f64 / KB as f64)
        }
    } else {
        format!("{} bytes", bytes)
    }
}
