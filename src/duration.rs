//! Human-readable durations for the command line.

use std::time::Duration;

/// Unit suffixes and their length in seconds. `ms` must precede `m` and `s`.
const UNITS: [(&str, f64); 4] = [("ms", 0.001), ("h", 3600.0), ("m", 60.0), ("s", 1.0)];

/// Parse a duration from a human-readable string.
///
/// Supports the suffixes `ms`, `s`, `m` and `h`. Without a suffix the value
/// is interpreted as seconds. Fractional values are accepted.
///
/// # Examples
/// ```
/// use switchbot_listener::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("2.5").unwrap(), Duration::from_millis(2500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (number, scale) = UNITS
        .iter()
        .find_map(|&(suffix, scale)| src.strip_suffix(suffix).map(|n| (n, scale)))
        .unwrap_or((src, 1.0));

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;

    Duration::try_from_secs_f64(value * scale).map_err(|_| format!("invalid duration: {src}"))
}

/// Longest accepted scan window.
pub const MAX_SCAN_DURATION: Duration = Duration::from_secs(24 * 3600);

/// Like [`parse_duration`], rejecting an empty window or one longer than [`MAX_SCAN_DURATION`].
pub fn parse_scan_duration(src: &str) -> Result<Duration, String> {
    let duration = parse_duration(src)?;
    if duration.is_zero() {
        return Err("scan duration must be greater than zero".to_string());
    }
    if duration > MAX_SCAN_DURATION {
        return Err(format!(
            "scan duration must be at most {}h",
            MAX_SCAN_DURATION.as_secs() / 3600
        ));
    }
    Ok(duration)
}
