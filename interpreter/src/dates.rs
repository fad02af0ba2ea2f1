//! Date and time helpers behind `DATETIME`, `DATETIME_DOY`, `DAYSECS`,
//! `CURRENT_ZULU` and `CURRENT_TIME`.
//!
//! A time is either an ISO string (`2024-02-29`, `2024-060T12:30:15.25Z`,
//! `2024-02-29 12:30`) or a number of seconds from 2000-01-01T12:00:00 UTC.
//! Leap seconds are not counted.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc};

use crate::error::RuntimeError;
use crate::number::float_repr;
use crate::runtime_value::RuntimeValue;

/// Unix time of 2000-01-01T12:00:00.
const J2000_UNIX_SECONDS: i64 = 946_728_000;

/// Values that stand for a missing time and pass through unchanged.
const FLAGS: [&str; 3] = ["UNK", "N/A", "NULL"];

/// Most fractional-second digits ever written.
pub const MAX_DIGITS: usize = 9;

/// Fractional digits shown for a numeric time when none are requested.
const MAX_NUMERIC_DIGITS: usize = 6;

/// A point in time, plus how many fractional-second digits it was written with.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Moment {
    at: NaiveDateTime,
    digits: usize,
}

/// `DATETIME` and `DATETIME_DOY`: the time as `yyyy-mm-ddThh:mm:ss[.f]Z`, or
/// `yyyy-dddThh:mm:ss[.f]Z` when `day_of_year` is set.
///
/// `offset` is added in seconds. Without `digits`, the seconds keep as many
/// decimals as the input had.
pub fn format_datetime(
    value: &RuntimeValue,
    offset: f64,
    digits: Option<usize>,
    day_of_year: bool,
) -> Result<RuntimeValue, RuntimeError> {
    if let Some(flag) = flag(value) {
        return Ok(flag);
    }
    let moment = moment(value)?;
    let digits = digits.unwrap_or(moment.digits).min(MAX_DIGITS);
    let at = round(shift(moment.at, offset)?, digits)?;

    let date = if day_of_year { at.format("%Y-%j") } else { at.format("%Y-%m-%d") };
    let mut text = format!("{date}T{}", at.format("%H:%M:%S"));
    if digits > 0 {
        let unit = 10u32.pow((MAX_DIGITS - digits) as u32);
        let fraction = at.nanosecond() % 1_000_000_000 / unit;
        text.push_str(&format!(".{fraction:0digits$}"));
    }
    text.push('Z');
    Ok(RuntimeValue::String(text))
}

/// `DAYSECS`: seconds since the most recent midnight. Also accepts a bare
/// `hh:mm[:ss[.f]]`. Whole seconds come back as an integer.
pub fn day_seconds(value: &RuntimeValue) -> Result<RuntimeValue, RuntimeError> {
    if let Some(flag) = flag(value) {
        return Ok(flag);
    }
    let clock = match value {
        RuntimeValue::String(text) => parse_clock(text.trim()),
        _ => None,
    };
    let (time, digits) = match clock {
        Some(found) => found,
        None => {
            let moment = moment(value)?;
            (moment.at.time(), moment.digits)
        }
    };

    let seconds = i64::from(time.num_seconds_from_midnight());
    let nanos = time.nanosecond() % 1_000_000_000;
    if digits == 0 && nanos == 0 {
        Ok(RuntimeValue::Integer(seconds))
    } else {
        Ok(RuntimeValue::Float(seconds as f64 + f64::from(nanos) / 1e9))
    }
}

/// `CURRENT_ZULU` (UTC, trailing `Z`) and `CURRENT_TIME` (local clock).
pub fn now(zulu: bool, date_only: bool) -> RuntimeValue {
    let text = match (zulu, date_only) {
        (true, true) => Utc::now().format("%Y-%m-%d").to_string(),
        (true, false) => Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        (false, true) => Local::now().format("%Y-%m-%d").to_string(),
        (false, false) => Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
    };
    RuntimeValue::String(text)
}

fn flag(value: &RuntimeValue) -> Option<RuntimeValue> {
    match value {
        RuntimeValue::String(text) if FLAGS.contains(&text.trim()) => Some(RuntimeValue::String(text.trim().to_string())),
        _ => None,
    }
}

fn moment(value: &RuntimeValue) -> Result<Moment, RuntimeError> {
    match value {
        RuntimeValue::String(text) => parse_moment(text.trim())
            .ok_or_else(|| RuntimeError::ValueError(format!("unrecognized date/time '{text}'"))),
        RuntimeValue::Integer(seconds) => J2000_UNIX_SECONDS
            .checked_add(*seconds)
            .and_then(|unix| DateTime::from_timestamp(unix, 0))
            .map(|at| Moment {
                at: at.naive_utc(),
                digits: 0,
            })
            .ok_or_else(out_of_range),
        RuntimeValue::Float(seconds) => {
            let whole = seconds.floor();
            if !whole.is_finite() || whole.abs() > 1e15 {
                return Err(out_of_range());
            }
            let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
            DateTime::from_timestamp(J2000_UNIX_SECONDS + whole as i64, nanos)
                .map(|at| Moment {
                    at: at.naive_utc(),
                    digits: numeric_digits(*seconds),
                })
                .ok_or_else(out_of_range)
        }
        other => Err(RuntimeError::TypeError(format!(
            "expected a date/time string or seconds, not '{}'",
            other.type_name()
        ))),
    }
}

/// Decimals in the shortest form of `seconds`, capped.
fn numeric_digits(seconds: f64) -> usize {
    float_repr(seconds)
        .split_once('.')
        .map_or(0, |(_, fraction)| fraction.trim_end_matches('0').len())
        .min(MAX_NUMERIC_DIGITS)
}

/// `yyyy-mm-dd` or `yyyy-ddd`, optionally followed by `T` or a space and a clock time.
fn parse_moment(text: &str) -> Option<Moment> {
    let (date, clock) = match text.split_once(['T', ' ']) {
        Some((date, clock)) => (date, Some(clock.trim())),
        None => (text, None),
    };
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%j"))
        .ok()?;
    let (time, digits) = match clock {
        Some(clock) => parse_clock(clock)?,
        None => (NaiveTime::MIN, 0),
    };
    Some(Moment {
        at: date.and_time(time),
        digits,
    })
}

/// `hh:mm[:ss[.f]]` with an optional trailing `Z`.
fn parse_clock(text: &str) -> Option<(NaiveTime, usize)> {
    let text = text.strip_suffix('Z').unwrap_or(text);
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    if fraction.len() > MAX_DIGITS || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let time = NaiveTime::parse_from_str(whole, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(whole, "%H:%M"))
        .ok()?;
    let nanos = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}").parse::<u32>().ok()?
    };
    Some((time.with_nanosecond(nanos)?, fraction.len()))
}

fn shift(at: NaiveDateTime, offset: f64) -> Result<NaiveDateTime, RuntimeError> {
    if offset == 0.0 {
        return Ok(at);
    }
    let nanos = (offset * 1e9).round();
    if !nanos.is_finite() || nanos.abs() >= 9.0e18 {
        return Err(out_of_range());
    }
    at.checked_add_signed(TimeDelta::nanoseconds(nanos as i64))
        .ok_or_else(out_of_range)
}

/// Round to `digits` decimals of a second, carrying into the seconds.
fn round(at: NaiveDateTime, digits: usize) -> Result<NaiveDateTime, RuntimeError> {
    let unit = 10i64.pow((MAX_DIGITS - digits) as u32);
    let nanos = i64::from(at.nanosecond() % 1_000_000_000);
    let rounded = (nanos + unit / 2) / unit * unit;
    at.with_nanosecond(0)
        .and_then(|whole| whole.checked_add_signed(TimeDelta::nanoseconds(rounded)))
        .ok_or_else(out_of_range)
}

fn out_of_range() -> RuntimeError {
    RuntimeError::OverflowError("date/time out of range".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use regex::Regex;
    use rstest::rstest;

    fn text(value: RuntimeValue) -> String {
        value.to_string()
    }

    #[rstest]
    #[case("2024-02-29", "2024-02-29T00:00:00Z")]
    #[case("2024-060T12:30:15.250Z", "2024-02-29T12:30:15.250Z")]
    #[case("2024-02-29 12:30", "2024-02-29T12:30:00Z")]
    #[case(" 1999-12-31T23:59:59 ", "1999-12-31T23:59:59Z")]
    #[case("UNK", "UNK")]
    #[case("N/A", "N/A")]
    fn strings_are_normalized(#[case] input: &str, #[case] expected: &str) {
        let value = format_datetime(&input.into(), 0.0, None, false).unwrap();
        assert_eq!(text(value), expected);
    }

    #[rstest]
    #[case(RuntimeValue::Integer(0), "2000-01-01T12:00:00Z")]
    #[case(RuntimeValue::Integer(-43_200), "2000-01-01T00:00:00Z")]
    #[case(RuntimeValue::Float(86_400.5), "2000-01-02T12:00:00.5Z")]
    fn numbers_count_from_2000(#[case] input: RuntimeValue, #[case] expected: &str) {
        assert_eq!(text(format_datetime(&input, 0.0, None, false).unwrap()), expected);
    }

    #[test]
    fn day_of_year_form() {
        let value = format_datetime(&"2024-12-31T23:59:59".into(), 0.0, None, true).unwrap();
        assert_eq!(text(value), "2024-366T23:59:59Z");
    }

    #[test]
    fn offset_and_digits() {
        let shifted = format_datetime(&"2024-02-28T23:00:00".into(), 3600.0, None, false).unwrap();
        assert_eq!(text(shifted), "2024-02-29T00:00:00Z");

        let cut = format_datetime(&"2024-01-01T12:00:00.123456".into(), 0.0, Some(3), false).unwrap();
        assert_eq!(text(cut), "2024-01-01T12:00:00.123Z");

        let rounded = format_datetime(&"2024-01-01T12:00:00.6".into(), 0.0, Some(0), false).unwrap();
        assert_eq!(text(rounded), "2024-01-01T12:00:01Z");

        let carried = format_datetime(&"2024-12-31T23:59:59.9996".into(), 0.0, Some(3), false).unwrap();
        assert_eq!(text(carried), "2025-01-01T00:00:00.000Z");
    }

    #[test]
    fn bad_times_are_rejected() {
        let err = format_datetime(&"soon".into(), 0.0, None, false).unwrap_err();
        assert_eq!(err, RuntimeError::ValueError("unrecognized date/time 'soon'".into()));
        assert_eq!(format_datetime(&RuntimeValue::None, 0.0, None, false).unwrap_err().kind(), "TypeError");
        assert_eq!(
            format_datetime(&RuntimeValue::Float(f64::INFINITY), 0.0, None, false).unwrap_err().kind(),
            "OverflowError"
        );
        assert_eq!(
            format_datetime(&RuntimeValue::Integer(i64::MAX), 0.0, None, false).unwrap_err().kind(),
            "OverflowError"
        );
    }

    #[test]
    fn seconds_since_midnight() {
        assert_eq!(day_seconds(&"12:00:01".into()).unwrap(), RuntimeValue::Integer(43_201));
        assert_eq!(day_seconds(&"2024-01-01T00:01:00.5Z".into()).unwrap(), RuntimeValue::Float(60.5));
        assert_eq!(day_seconds(&RuntimeValue::Integer(0)).unwrap(), RuntimeValue::Integer(43_200));
        assert_eq!(day_seconds(&"N/A".into()).unwrap(), RuntimeValue::from("N/A"));
        assert_eq!(day_seconds(&"noon".into()).unwrap_err().kind(), "ValueError");
    }

    #[test]
    fn clock_readings_have_iso_shape() {
        let zulu = Regex::new(r"^\d{4}-\d\d-\d\dT\d\d:\d\d:\d\dZ$").unwrap();
        assert!(zulu.is_match(&text(now(true, false))));
        let local = Regex::new(r"^\d{4}-\d\d-\d\dT\d\d:\d\d:\d\d$").unwrap();
        assert!(local.is_match(&text(now(false, false))));
        let date = Regex::new(r"^\d{4}-\d\d-\d\d$").unwrap();
        assert!(date.is_match(&text(now(true, true))));
        assert!(date.is_match(&text(now(false, true))));
    }
}
