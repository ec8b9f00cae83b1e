use chrono::{Local, TimeZone};

pub(crate) const GAUGE_WIDTH: usize = 10;

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

/// Local time of a millisecond epoch stamp.
pub(crate) fn format_last_watched(epoch_ms: i64) -> String {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// `m:ss`, or `h:mm:ss` past the first hour.
pub(crate) fn format_position(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub(crate) fn progress_gauge(percent: u8, width: usize) -> String {
    let percent = percent.min(100);
    let filled = (usize::from(percent) * width + 50) / 100;
    format!(
        "[{}{}] {percent:>3}%",
        "#".repeat(filled),
        ".".repeat(width - filled)
    )
}

pub(crate) fn favorite_marker(is_favorite: bool) -> &'static str {
    if is_favorite { "*" } else { " " }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("Ação e Aventura", 8), "Ação ...");
        assert_eq!(truncate("short", 8), "short");
    }

    #[test]
    fn positions_render_as_clock_time() {
        assert_eq!(format_position(0.0), "0:00");
        assert_eq!(format_position(65.9), "1:05");
        assert_eq!(format_position(3_725.0), "1:02:05");
        assert_eq!(format_position(f64::NAN), "0:00");
    }

    #[test]
    fn gauge_scales_to_width() {
        assert_eq!(progress_gauge(0, 10), "[..........]   0%");
        assert_eq!(progress_gauge(45, 10), "[#####.....]  45%");
        assert_eq!(progress_gauge(100, 4), "[####] 100%");
        assert_eq!(progress_gauge(250, 4), "[####] 100%");
    }

    #[test]
    fn out_of_range_stamp_renders_placeholder() {
        assert_eq!(format_last_watched(i64::MAX), "-");
    }
}
