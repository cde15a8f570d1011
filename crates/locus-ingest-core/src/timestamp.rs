use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use thiserror::Error;

const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// Order matters: the first pattern that parses the whole string wins.
const STRICT_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse timestamp: {raw}")]
pub struct TimestampParseError {
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid UTC offset `{0}`; expected Z or ±HH:MM")]
pub struct InvalidUtcOffset(pub String);

/// How zone-less strict matches are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimezoneMode {
    /// Inputs already denote UTC; the value is only reformatted.
    #[default]
    AssumeUtc,
    /// Inputs are wall-clock times at this offset and are shifted to UTC.
    FixedOffset(FixedOffset),
}

impl TimezoneMode {
    pub fn from_offset(raw: Option<&str>) -> Result<Self, InvalidUtcOffset> {
        match raw {
            None => Ok(Self::AssumeUtc),
            Some(raw) => parse_utc_offset(raw).map(|offset| {
                if offset.local_minus_utc() == 0 {
                    Self::AssumeUtc
                } else {
                    Self::FixedOffset(offset)
                }
            }),
        }
    }
}

fn parse_utc_offset(raw: &str) -> Result<FixedOffset, InvalidUtcOffset> {
    let invalid = || InvalidUtcOffset(raw.to_string());
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'+') => (1, &trimmed[1..]),
        Some(b'-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "00"));
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Looks already canonical: has a date/time `T` and either a `Z` or a `+` offset marker.
fn looks_canonical(raw: &str) -> bool {
    raw.contains('T') && (raw.contains('Z') || raw.contains('+'))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampNormalizer {
    mode: TimezoneMode,
}

impl TimestampNormalizer {
    pub fn new(mode: TimezoneMode) -> Self {
        Self { mode }
    }

    /// Converts `raw` to `YYYY-MM-DDTHH:MM:SSZ`, dropping fractional seconds.
    ///
    /// Strings matching none of the strict patterns but carrying a `T` plus a `Z` or `+`
    /// marker pass through byte-for-byte, whatever offset they carry.
    pub fn normalize(&self, raw: &str) -> Result<String, TimestampParseError> {
        for format in STRICT_FORMATS {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
                return self.render(parsed, raw);
            }
        }

        if looks_canonical(raw) {
            return Ok(raw.to_string());
        }

        Err(TimestampParseError {
            raw: raw.to_string(),
        })
    }

    fn render(&self, parsed: NaiveDateTime, raw: &str) -> Result<String, TimestampParseError> {
        let utc = match self.mode {
            TimezoneMode::AssumeUtc => parsed,
            TimezoneMode::FixedOffset(offset) => offset
                .from_local_datetime(&parsed)
                .single()
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| TimestampParseError {
                    raw: raw.to_string(),
                })?,
        };
        Ok(utc.format(CANONICAL_FORMAT).to_string())
    }
}

pub fn normalize_timestamp(raw: &str) -> Result<String, TimestampParseError> {
    TimestampNormalizer::default().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_formats_reformat_and_truncate_fractions() {
        let cases = [
            ("2024-01-15 12:30:00", "2024-01-15T12:30:00Z"),
            ("2024-01-15T12:30:00", "2024-01-15T12:30:00Z"),
            ("2024-01-15 12:30:00.987654", "2024-01-15T12:30:00Z"),
            ("2024-01-15T23:59:59.5", "2024-01-15T23:59:59Z"),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_timestamp(raw).as_deref(), Ok(expected), "{raw}");
        }
    }

    #[test]
    fn canonical_looking_strings_pass_through_unchanged() {
        for raw in [
            "2024-01-15T12:30:00Z",
            "2024-01-15T12:30:00.123Z",
            "2024-01-15T12:30:00+05:30",
        ] {
            assert_eq!(normalize_timestamp(raw).as_deref(), Ok(raw));
        }
    }

    #[test]
    fn negative_offset_without_marker_is_rejected() {
        let err = normalize_timestamp("2024-01-15T12:30:00-05:00").expect_err("no Z or +");
        assert_eq!(err.raw, "2024-01-15T12:30:00-05:00");
    }

    #[test]
    fn garbage_is_a_parse_error_carrying_input() {
        let err = normalize_timestamp("not-a-date").expect_err("garbage");
        assert_eq!(err.to_string(), "could not parse timestamp: not-a-date");
        assert!(normalize_timestamp("").is_err());
        assert!(normalize_timestamp("2024-13-01 00:00:00").is_err());
    }

    #[test]
    fn fixed_offset_mode_shifts_strict_matches_only() {
        let mode = TimezoneMode::from_offset(Some("+02:00")).expect("valid offset");
        let normalizer = TimestampNormalizer::new(mode);

        assert_eq!(
            normalizer.normalize("2024-01-15 01:30:00").as_deref(),
            Ok("2024-01-14T23:30:00Z")
        );
        assert_eq!(
            normalizer.normalize("2024-01-15T12:30:00+09:00").as_deref(),
            Ok("2024-01-15T12:30:00+09:00")
        );
    }

    #[test]
    fn offset_parsing_accepts_common_spellings() {
        assert_eq!(TimezoneMode::from_offset(None), Ok(TimezoneMode::AssumeUtc));
        assert_eq!(
            TimezoneMode::from_offset(Some("Z")),
            Ok(TimezoneMode::AssumeUtc)
        );
        assert_eq!(
            TimezoneMode::from_offset(Some("-0530")),
            Err(InvalidUtcOffset("-0530".to_string()))
        );
        assert_eq!(
            TimezoneMode::from_offset(Some("-05:30")),
            Ok(TimezoneMode::FixedOffset(
                FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap()
            ))
        );
        assert!(TimezoneMode::from_offset(Some("+24:00")).is_err());
        assert!(TimezoneMode::from_offset(Some("02:00")).is_err());
    }
}
