//! Human-readable formatting shared by the progress line, the completion
//! marker and the CLI summary.

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes == 0 {
        return "0 B".to_owned();
    }
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Format a rate in bytes per second, rounding fractional bytes down.
pub fn format_rate(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return format_bytes(0);
    }
    format_bytes(bytes_per_sec as u64)
}

/// `HH:MM:SS`. Negative, NaN and infinite inputs render as zero.
pub fn format_hms(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Percentage of `total` covered by `current`, clamped to `[0, 100]`.
///
/// The total is an operator estimate, so overshooting it is normal.
pub fn progress_percent(current: u64, total: u64) -> f64 {
    if total == 0 {
        return if current > 0 { 100.0 } else { 0.0 };
    }
    (current as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

pub fn render_bar(percent: f64, width: usize) -> String {
    let percent = percent.clamp(0.0, 100.0);
    let filled = ((width as f64) * percent / 100.0) as usize;
    let filled = filled.min(width);
    format!(
        "[{}{}] {:.1}%",
        "█".repeat(filled),
        "░".repeat(width - filled),
        percent
    )
}
