//! Time parsing utilities for scheduler output.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::time::Duration;

/// Parse epoch seconds (the SGE XML timestamp format).
pub fn parse_epoch_seconds(s: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = s.trim().parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Parse an ISO-ish scheduler timestamp (YYYY-MM-DDTHH:MM:SS), the
/// format shared by squeue/sacct and PBS JSON fields.
///
/// Returns None for empty strings or placeholder values like "N/A".
pub fn parse_iso_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() || s == "N/A" || s == "Unknown" || s == "None" {
        return None;
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .and_then(|dt| Utc.from_local_datetime(&dt).single())
}

/// Parse a duration in scheduler time formats.
///
/// Supports:
/// - D-HH:MM:SS (Slurm time limit with days)
/// - HH:MM:SS (Slurm, SGE h_rt, PBS walltime)
/// - MM:SS
/// - Seconds as integer
///
/// Returns None for "UNLIMITED", placeholders, or empty strings.
pub fn parse_hms_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() || s == "UNLIMITED" || s == "-" {
        return None;
    }

    // Check for day separator (D-HH:MM:SS)
    let parts: Vec<&str> = s.split('-').collect();
    let (days, time_part) = if parts.len() == 2 {
        (parts[0].parse::<u64>().ok()?, parts[1])
    } else {
        (0, parts[0])
    };

    let time_parts: Vec<&str> = time_part.split(':').collect();
    let mut fields = Vec::with_capacity(time_parts.len());
    for part in &time_parts {
        fields.push(part.parse::<u64>().ok()?);
    }

    let seconds = match fields.len() {
        3 => fields[0] * 3600 + fields[1] * 60 + fields[2],
        2 => fields[0] * 60 + fields[1],
        1 => fields[0],
        _ => return None,
    };

    Some(Duration::from_secs(days * 86400 + seconds))
}

/// Format a duration as HH:MM:SS, the walltime format qsub and sbatch
/// both accept.
pub fn format_hms_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_epoch_seconds() {
        let dt = parse_epoch_seconds("1705312800").unwrap();
        assert_eq!(dt.timestamp(), 1705312800);
        assert!(parse_epoch_seconds("not-a-number").is_none());
        assert!(parse_epoch_seconds("").is_none());
    }

    #[test]
    fn test_parse_iso_timestamp() {
        let dt = parse_iso_timestamp("2024-01-15T10:30:00").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-15");

        assert!(parse_iso_timestamp("N/A").is_none());
        assert!(parse_iso_timestamp("Unknown").is_none());
        assert!(parse_iso_timestamp("").is_none());
    }

    #[test]
    fn test_parse_hms_duration() {
        assert_eq!(
            parse_hms_duration("1:00:00"),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            parse_hms_duration("1-00:00:00"),
            Some(Duration::from_secs(86400))
        );
        assert_eq!(parse_hms_duration("30:00"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_hms_duration("3600"), Some(Duration::from_secs(3600)));
        assert!(parse_hms_duration("UNLIMITED").is_none());
        assert!(parse_hms_duration("1:xx:00").is_none());
    }

    #[test]
    fn test_format_hms_duration() {
        assert_eq!(format_hms_duration(Duration::from_secs(3661)), "01:01:01");
        assert_eq!(
            format_hms_duration(Duration::from_secs(30 * 3600)),
            "30:00:00"
        );
    }
}
