use crate::error::{PrStatError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};

/// Which end of a range a date input is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Last millisecond of `date`.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::milliseconds(1)
}

/// Parses a `--since`/`--until` value.
///
/// Accepts RFC 3339, `YYYY-MM-DD`, `today`, `yesterday` and
/// `<duration> ago` (humantime syntax, e.g. `2weeks ago`). Day-only inputs
/// snap to the start or end of the day depending on `bound`.
pub fn parse_date(input: &str, bound: Bound, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    let day = match trimmed.to_lowercase().as_str() {
        "today" => Some(now.date_naive()),
        "yesterday" => Some(now.date_naive() - Duration::days(1)),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d").ok(),
    };
    if let Some(day) = day {
        return Ok(match bound {
            Bound::Start => start_of_day(day),
            Bound::End => end_of_day(day),
        });
    }

    if let Some(span) = trimmed.strip_suffix("ago") {
        let span = humantime::parse_duration(span.trim())
            .map_err(|e| PrStatError::InvalidDate(format!("'{input}': {e}")))?;
        let span = Duration::from_std(span)
            .map_err(|_| PrStatError::InvalidDate(format!("Duration overflow for '{input}'")))?;
        return now
            .checked_sub_signed(span)
            .ok_or_else(|| PrStatError::InvalidDate(format!("Duration overflow for '{input}'")));
    }

    Err(PrStatError::InvalidDate(format!(
        "'{input}' (expected RFC3339, YYYY-MM-DD, today, yesterday or '<duration> ago')"
    )))
}

/// Monday 00:00 to Sunday 23:59:59.999 of the ISO week before `now`.
pub fn last_week(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let this_monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let last_monday = this_monday - Duration::days(7);
    let last_sunday = this_monday - Duration::days(1);
    (start_of_day(last_monday), end_of_day(last_sunday))
}

/// Timestamp rendered for use inside a file name (`:` and `.` become `-`).
pub fn file_safe_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}
