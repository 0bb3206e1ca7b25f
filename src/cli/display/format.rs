//! Uptime, size, and truncation formatters for CLI output.

/// Compact uptime: `45s`, `3m10s`, `2h05m`, `3d04h`, or `-`.
pub fn format_uptime(uptime: Option<chrono::Duration>) -> String {
    let Some(secs) = uptime.map(|d| d.num_seconds().max(0)) else {
        return "-".to_string();
    };

    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3_600 => format!("{}m{:02}s", s / 60, s % 60),
        s if s < 86_400 => format!("{}h{:02}m", s / 3_600, (s % 3_600) / 60),
        s => format!("{}d{:02}h", s / 86_400, (s % 86_400) / 3_600),
    }
}

/// Memory in MB, switching to GB above 1024.
pub fn format_memory(mb: f64) -> String {
    if mb <= 0.0 {
        "-".to_string()
    } else if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else {
        format!("{mb:.1} MB")
    }
}

pub fn format_cpu(percent: f64) -> String {
    if percent <= 0.0 {
        "-".to_string()
    } else {
        format!("{percent:.1}%")
    }
}

/// Truncate a string with unicode ellipsis, on a character boundary.
pub fn truncate_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{kept}\u{2026}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(None), "-");
        assert_eq!(format_uptime(Some(chrono::Duration::seconds(45))), "45s");
        assert_eq!(format_uptime(Some(chrono::Duration::seconds(190))), "3m10s");
        assert_eq!(format_uptime(Some(chrono::Duration::seconds(7_500))), "2h05m");
        assert_eq!(format_uptime(Some(chrono::Duration::seconds(273_600))), "3d04h");
        assert_eq!(format_uptime(Some(chrono::Duration::seconds(-5))), "0s");
    }

    #[test]
    fn test_format_memory_and_cpu() {
        assert_eq!(format_memory(0.0), "-");
        assert_eq!(format_memory(12.34), "12.3 MB");
        assert_eq!(format_memory(2048.0), "2.0 GB");
        assert_eq!(format_cpu(0.0), "-");
        assert_eq!(format_cpu(150.26), "150.3%");
    }

    #[test]
    fn test_truncate_ellipsis() {
        assert_eq!(truncate_ellipsis("short", 10), "short");
        assert_eq!(truncate_ellipsis("connection refused", 8), "connect\u{2026}");
        assert_eq!(truncate_ellipsis("héllo wörld", 5), "héll\u{2026}");
    }
}
