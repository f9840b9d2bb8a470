//! Timestamp formatting with preset and offset support.
//!
//! Offsets are given as `Z`, `UTC`, or `±HH[:MM]` forms; named tz-database
//! zones are not supported.

use anyhow::{Result, bail};
use chrono::{FixedOffset, Local, Utc};

/// Parse a UTC offset string onto a [`FixedOffset`].
///
/// Accepted: `Z`, `UTC`, `+HH:MM`, `-HH:MM`, `+HHMM`, `+HH`.
pub fn parse_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(FixedOffset::east_opt(0).unwrap());
    }

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1i32, &s[1..]),
        Some(b'-') => (-1i32, &s[1..]),
        _ => bail!("Invalid offset: {s} (use Z, UTC, or ±HH:MM)"),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>()?, 0),
        4 => (digits[..2].parse::<i32>()?, digits[2..].parse::<i32>()?),
        _ => bail!("Invalid offset: {s} (use Z, UTC, or ±HH:MM)"),
    };
    if hours > 23 || minutes > 59 {
        bail!("Invalid offset: {s} (out of range)");
    }

    let secs = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(secs).ok_or_else(|| anyhow::anyhow!("Invalid offset: {s}"))
}

/// Format the current time.
///
/// Precedence matches the original behavior: `preset` wins over `fmt`;
/// with neither, RFC 3339.
pub fn now_formatted(offset: Option<&str>, preset: Option<&str>, fmt: Option<&str>) -> Result<String> {
    let pattern = match preset {
        Some("date") => Some("%Y-%m-%d"),
        Some("time") => Some("%H:%M:%S"),
        Some("datetime") => Some("%Y-%m-%d %H:%M:%S"),
        Some(other) => bail!("Unknown preset: {other} (use date, time, or datetime)"),
        None => fmt,
    };

    match offset {
        Some(off) => {
            let now = Utc::now().with_timezone(&parse_offset(off)?);
            Ok(match pattern {
                Some(p) => now.format(p).to_string(),
                None => now.to_rfc3339(),
            })
        }
        None => {
            let now = Local::now();
            Ok(match pattern {
                Some(p) => now.format(p).to_string(),
                None => now.to_rfc3339(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_parse() {
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_offset("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_offset("-0500").unwrap().local_minus_utc(), -18000);
        assert_eq!(parse_offset("+05:30").unwrap().local_minus_utc(), 19800);
        assert_eq!(parse_offset("-08").unwrap().local_minus_utc(), -28800);
    }

    #[test]
    fn bad_offsets_are_errors() {
        for bad in ["US/Eastern", "5", "+25:00", "+02:75", "", "++02"] {
            assert!(parse_offset(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn presets_have_expected_shape() {
        let date = now_formatted(Some("Z"), Some("date"), None).unwrap();
        assert_eq!(date.len(), 10);
        assert_eq!(date.matches('-').count(), 2);

        let time = now_formatted(Some("Z"), Some("time"), None).unwrap();
        assert_eq!(time.len(), 8);
        assert_eq!(time.matches(':').count(), 2);

        let both = now_formatted(Some("Z"), Some("datetime"), None).unwrap();
        assert_eq!(both.len(), 19);
    }

    #[test]
    fn custom_format_wins_without_preset() {
        let out = now_formatted(Some("Z"), None, Some("%Y")).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn unknown_preset_is_an_error() {
        assert!(now_formatted(None, Some("century"), None).is_err());
    }
}
