use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Stored form of every timestamp column. Fixed width and UTC, so text
/// comparison in SQL orders the same way as time.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

/// `[start, end)` bounds in stored timestamp form covering `from..until`.
pub fn date_bounds(from: NaiveDate, until: NaiveDate) -> Result<(String, String)> {
    let start = from
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid start date {from}"))?
        .and_utc();
    let end = until
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid end date {until}"))?
        .and_utc();
    Ok((format_timestamp(&start), format_timestamp(&end)))
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}
