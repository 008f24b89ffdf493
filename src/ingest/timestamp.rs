use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Layouts tried, in order, after RFC 3339. `%.f` also matches a missing fraction.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A normalized `timestamp_local` cell.
///
/// Parsing never fails: anything that cannot be read as an instant becomes
/// `Invalid`, and rows carrying it are dropped before grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Valid(NaiveDateTime),
    Invalid,
}

impl Timestamp {
    /// Parse with the built-in layouts only.
    pub fn parse(text: &str) -> Self {
        TimestampParser::default().parse(text)
    }

    pub const fn instant(self) -> Option<NaiveDateTime> {
        match self {
            Self::Valid(ts) => Some(ts),
            Self::Invalid => None,
        }
    }

    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

impl From<Option<NaiveDateTime>> for Timestamp {
    fn from(value: Option<NaiveDateTime>) -> Self {
        value.map_or(Self::Invalid, Self::Valid)
    }
}

/// Text-to-timestamp parser with optional caller-supplied `chrono` layouts.
///
/// Offsets (RFC 3339 `Z` / `+02:00`) are normalized to UTC wall time; naive
/// layouts are taken as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampParser {
    extra_formats: Vec<String>,
}

impl TimestampParser {
    pub const fn new(extra_formats: Vec<String>) -> Self {
        Self { extra_formats }
    }

    pub fn extra_formats(&self) -> &[String] {
        &self.extra_formats
    }

    pub fn parse(&self, text: &str) -> Timestamp {
        let text = text.trim();
        if text.is_empty() {
            return Timestamp::Invalid;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Timestamp::Valid(dt.naive_utc());
        }

        for fmt in DATETIME_FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
                return Timestamp::Valid(ts);
            }
        }
        for fmt in DATE_FORMATS {
            if let Some(ts) = parse_date(text, fmt) {
                return Timestamp::Valid(ts);
            }
        }

        for fmt in &self.extra_formats {
            if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
                return Timestamp::Valid(ts);
            }
            if let Some(ts) = parse_date(text, fmt) {
                return Timestamp::Valid(ts);
            }
        }

        Timestamp::Invalid
    }
}

fn parse_date(text: &str, fmt: &str) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(text, fmt)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
