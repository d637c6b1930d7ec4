use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveTime, Utc};

use crate::models::FeedbackKind;

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn to_u8(value: i64, field: &str) -> Result<u8> {
    u8::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn epoch_to_datetime(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| anyhow!("epoch seconds {seconds} out of range"))
}

pub fn parse_feedback_kind(value: &str) -> Result<FeedbackKind> {
    FeedbackKind::parse(value).ok_or_else(|| anyhow!("unknown feedback type {value}"))
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_clock_time(value: &str, field: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .with_context(|| format!("failed to parse {field} {value:?}"))
}

/// Comma-separated weekday numbers, 0 = Monday through 6 = Sunday.
pub fn parse_weekdays(value: &str) -> Result<Vec<u8>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<u8>() {
            Ok(day) if day <= 6 => Ok(day),
            _ => Err(anyhow!("invalid weekday {part:?}")),
        })
        .collect()
}

pub fn join_weekdays(days: &[u8]) -> String {
    days.iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
