//! Date and time text formats understood by SQL Anywhere.
//!
//! Values cross the boundary as text: `YYYY-MM-DD`, `HH:MM:SS[.fffffffff]`
//! and `YYYY-MM-DD HH:MM:SS[.fffffffff]`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Error, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// The calendar date that marks a time-of-day value: year 0, January 1st.
pub fn zero_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(0, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// A timestamp on the zero date, which encodes as a bare time.
pub fn time_of_day(time: NaiveTime) -> NaiveDateTime {
    zero_date().and_time(time)
}

/// Seconds plus up to nine fractional digits, trailing zeros dropped.
fn format_time(time: NaiveTime) -> String {
    let mut out = time.format("%H:%M:%S").to_string();
    let nanos = time.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let digits = format!("{:09}", nanos);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    out
}

/// Encode a timestamp for binding. Zero-date values are sent as time only.
pub fn timestamp_to_string(ts: &NaiveDateTime) -> String {
    let date = ts.date();
    if date.year() == 0 && date.month() == 1 && date.day() == 1 {
        return format_time(ts.time());
    }
    format!("{} {}", date.format(DATE_FORMAT), format_time(ts.time()))
}

pub fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).map_err(|source| Error::Parse {
        kind: "date",
        text: text.to_string(),
        source,
    })
}

pub fn parse_time(text: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), TIME_FORMAT).map_err(|source| Error::Parse {
        kind: "time",
        text: text.to_string(),
        source,
    })
}

pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), DATETIME_FORMAT).map_err(|source| Error::Parse {
        kind: "timestamp",
        text: text.to_string(),
        source,
    })
}
