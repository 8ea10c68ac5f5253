//! Event key decoding and artifact references
//!
//! Event keys look like `2025-05-21T19-50-13-708146`: a calendar date, a `T`
//! separator, then dash-separated hour, minute, second and an optional
//! sub-second component. This module turns such a key into a short local
//! display label and into the storage-safe form used by artifact file names.
//!
//! Decoding never fails from the caller's point of view: a key that does not
//! match the grammar is displayed as-is and a warning is logged.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use thiserror::Error;
use tracing::warn;

/// Separator between the date part and the time part of a key
const DATE_TIME_SEPARATOR: char = 'T';

/// Separator between the fields of the date and time parts
const FIELD_SEPARATOR: char = '-';

/// Short time format (24h hour:minute)
pub const TIME_FORMAT: &str = "%H:%M";

/// Short date format (day/month/year)
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Why a key could not be decoded into a local instant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyDecodeError {
    /// Key does not split into a date part and a time part with enough fields
    #[error("unexpected key shape: {0}")]
    Shape(String),

    /// A date or time field is not an integer
    #[error("non-numeric field '{0}'")]
    NonNumeric(String),

    /// Fields are numeric but do not form a valid calendar date or time of day
    #[error("invalid date or time: {0}")]
    InvalidDate(String),

    /// The wall-clock time does not exist in the local timezone (DST gap)
    #[error("local time does not exist: {0}")]
    NonexistentLocalTime(String),
}

/// Artifact images produced by the backend for a finished event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Heatmap,
    Trend,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Heatmap, ArtifactKind::Trend];

    /// File name prefix used by the backend
    pub fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Heatmap => "heatmap",
            ArtifactKind::Trend => "trend",
        }
    }
}

/// Decode a key into a local instant
///
/// Only the date and the first three time components (hour, minute, second)
/// are used; any sub-second component is ignored. Ambiguous local times
/// (DST fall-back) resolve to the earliest instant.
pub fn try_decode(key: &str) -> Result<DateTime<Local>, KeyDecodeError> {
    let parts: Vec<&str> = key.split(DATE_TIME_SEPARATOR).collect();
    if parts.len() != 2 {
        return Err(KeyDecodeError::Shape(format!(
            "expected one '{}' separator, found {} part(s)",
            DATE_TIME_SEPARATOR,
            parts.len()
        )));
    }

    let date_fields: Vec<&str> = parts[0].split(FIELD_SEPARATOR).collect();
    if date_fields.len() != 3 {
        return Err(KeyDecodeError::Shape(format!(
            "date part '{}' must be YYYY-MM-DD",
            parts[0]
        )));
    }

    let time_fields: Vec<&str> = parts[1].split(FIELD_SEPARATOR).collect();
    if time_fields.len() < 3 {
        return Err(KeyDecodeError::Shape(format!(
            "time part '{}' needs hour, minute and second",
            parts[1]
        )));
    }

    let year: i32 = parse_field(date_fields[0])?;
    let month: u32 = parse_field(date_fields[1])?;
    let day: u32 = parse_field(date_fields[2])?;
    let hour: u32 = parse_field(time_fields[0])?;
    let minute: u32 = parse_field(time_fields[1])?;
    let second: u32 = parse_field(time_fields[2])?;

    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| KeyDecodeError::InvalidDate(parts[0].to_string()))?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| KeyDecodeError::InvalidDate(parts[1].to_string()))?;
    let naive = NaiveDateTime::new(date, time);

    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| KeyDecodeError::NonexistentLocalTime(naive.to_string()))
}

fn parse_field<T: std::str::FromStr>(field: &str) -> Result<T, KeyDecodeError> {
    field
        .parse::<T>()
        .map_err(|_| KeyDecodeError::NonNumeric(field.to_string()))
}

/// Human-readable label for a key: short local time and short date
///
/// Falls back to the key itself when it cannot be decoded.
///
/// # Examples
///
/// ```
/// use obdl_common::timestamp::decode;
///
/// assert_eq!(decode("2025-05-21T19-50-13-708146"), "19:50 21/05/2025");
/// assert_eq!(decode("not-a-timestamp"), "not-a-timestamp");
/// ```
pub fn decode(key: &str) -> String {
    match try_decode(key) {
        Ok(instant) => format_label(&instant),
        Err(e) => {
            warn!(key = %key, error = %e, "Could not decode event key, showing raw key");
            key.to_string()
        }
    }
}

/// Render an instant as `"{short time} {short date}"`
pub fn format_label(instant: &DateTime<Local>) -> String {
    format!(
        "{} {}",
        instant.format(TIME_FORMAT),
        instant.format(DATE_FORMAT)
    )
}

/// Storage-safe form of a key: every `:` and `.` replaced with `-`
///
/// Only used to build artifact references, never for identity.
pub fn to_artifact_ref(key: &str) -> String {
    key.replace([':', '.'], "-")
}

/// Server path of an artifact image for a key
///
/// ```
/// use obdl_common::timestamp::{artifact_path, ArtifactKind};
///
/// assert_eq!(
///     artifact_path(ArtifactKind::Trend, "2025-05-21T19:50:13.7"),
///     "/plots/trend_2025-05-21T19-50-13-7.png"
/// );
/// ```
pub fn artifact_path(kind: ArtifactKind, key: &str) -> String {
    format!("/plots/{}_{}.png", kind.prefix(), to_artifact_ref(key))
}
