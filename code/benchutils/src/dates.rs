/// Timestamps in benchmark logs come in many shapes: ISO strings with and without fractional
/// seconds and offsets, bare times of day, and UNIX epoch floats.  Everything is reduced to a
/// naive wall-clock `Timestamp` with microsecond precision in some known frame, and it is the
/// caller's job to track which frame that is.
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;

pub type Timestamp = NaiveDateTime;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClockFormatError {
    #[error("Unparseable timestamp '{0}'")]
    Syntax(String),

    #[error("Time of day '{0}' requires a reference date")]
    MissingDate(String),

    #[error("Epoch value {0} is out of range")]
    EpochRange(f64),

    #[error("Unknown timezone '{0}'")]
    Zone(String),
}

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const ISO_OUTPUT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Parse an ISO-8601-ish timestamp.  The date and time may be separated by `T` or a space, the
/// fraction may be introduced by `.` or `,` and may be absent, and there may be a trailing `Z` or
/// `+HH:MM`/`+HHMM` offset.  Returns the wall-clock time as written together with the offset, if
/// any.

pub fn parse_iso(s: &str) -> Result<(Timestamp, Option<FixedOffset>), ClockFormatError> {
    let trimmed = s.trim();
    if trimmed.len() < 19 || !trimmed.is_ascii() {
        return Err(ClockFormatError::Syntax(s.to_string()));
    }
    let (body, offset) = split_offset(trimmed).ok_or_else(|| ClockFormatError::Syntax(s.to_string()))?;
    let mut normalized = body.replace(',', ".");
    if normalized.as_bytes()[10] == b' ' {
        normalized.replace_range(10..11, "T");
    }
    match NaiveDateTime::parse_from_str(&normalized, ISO_FORMAT) {
        Ok(t) => Ok((round_to_micros(t), offset)),
        Err(_) => Err(ClockFormatError::Syntax(s.to_string())),
    }
}

// Returns None if there is something that looks like an offset but does not parse as one.

fn split_offset(s: &str) -> Option<(&str, Option<FixedOffset>)> {
    if let Some(body) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        return Some((body, FixedOffset::east_opt(0)));
    }
    // Only the time part can carry a sign; the date part has dashes.
    let time_part = &s[10..];
    match time_part.rfind(|c| c == '+' || c == '-') {
        Some(ix) => {
            let ix = ix + 10;
            let offset = crate::zones::parse_offset(&s[ix..])?;
            Some((&s[..ix], Some(offset)))
        }
        None => Some((s, None)),
    }
}

/// Parse `HH:MM:SS` or `HH:MM:SS.ffffff` and attach it to `date`.

pub fn parse_time_of_day(s: &str, date: Option<NaiveDate>) -> Result<Timestamp, ClockFormatError> {
    let trimmed = s.trim().replace(',', ".");
    let tod = NaiveTime::parse_from_str(&trimmed, "%H:%M:%S%.f")
        .map_err(|_| ClockFormatError::Syntax(s.to_string()))?;
    match date {
        Some(d) => Ok(round_to_micros(d.and_time(tod))),
        None => Err(ClockFormatError::MissingDate(s.to_string())),
    }
}

/// Convert UNIX epoch seconds to wall-clock time in `zone`, rounded to the microsecond.

pub fn from_epoch(secs: f64, zone: FixedOffset) -> Result<Timestamp, ClockFormatError> {
    if !secs.is_finite() {
        return Err(ClockFormatError::EpochRange(secs));
    }
    let micros = (secs * 1_000_000.0).round();
    if micros.abs() >= i64::MAX as f64 {
        return Err(ClockFormatError::EpochRange(secs));
    }
    let micros = micros as i64;
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1000) as u32;
    match DateTime::from_timestamp(secs, nanos) {
        Some(t) => Ok(t.with_timezone(&zone).naive_local()),
        None => Err(ClockFormatError::EpochRange(secs as f64)),
    }
}

/// Move a wall-clock time from one zone to another.

pub fn convert_zone(t: Timestamp, from: FixedOffset, to: FixedOffset) -> Timestamp {
    let delta = to.local_minus_utc() - from.local_minus_utc();
    t + Duration::seconds(delta as i64)
}

/// The canonical rendering, always with six fractional digits.

pub fn format_timestamp(t: &Timestamp) -> String {
    t.format(ISO_OUTPUT).to_string()
}

pub fn parse_date(s: &str) -> Result<NaiveDate, ClockFormatError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| ClockFormatError::Syntax(s.to_string()))
}

fn round_to_micros(t: Timestamp) -> Timestamp {
    let nanos = t.nanosecond() as i64;
    let rounded = (nanos + 500) / 1000 * 1000;
    t + Duration::nanoseconds(rounded - nanos)
}

#[test]
fn test_parse_iso() {
    let (t, off) = parse_iso("2019-02-11T16:13:04.123456").unwrap();
    assert!(off.is_none());
    assert!(format_timestamp(&t) == "2019-02-11T16:13:04.123456");

    let (t, _) = parse_iso("2019-02-11T16:13:04").unwrap();
    assert!(format_timestamp(&t) == "2019-02-11T16:13:04.000000");

    let (t, _) = parse_iso("2019-09-17 14:30:24,660").unwrap();
    assert!(format_timestamp(&t) == "2019-09-17T14:30:24.660000");

    let (t, off) = parse_iso("2019-02-11T16:13:04.5+02:00").unwrap();
    assert!(format_timestamp(&t) == "2019-02-11T16:13:04.500000");
    assert!(off.unwrap().local_minus_utc() == 7200);

    let (_, off) = parse_iso("2019-02-11T16:13:04Z").unwrap();
    assert!(off.unwrap().local_minus_utc() == 0);

    let (_, off) = parse_iso("2019-02-11T16:13:04-0500").unwrap();
    assert!(off.unwrap().local_minus_utc() == -5 * 3600);

    assert!(parse_iso("16:13:04").is_err());
    assert!(parse_iso("2019-02-11T16:13:04+zz").is_err());
    assert!(parse_iso("2019-13-11T16:13:04").is_err());
}

#[test]
fn test_parse_time_of_day() {
    let d = parse_date("2019-02-11").unwrap();
    let t = parse_time_of_day("16:13:04", Some(d)).unwrap();
    assert!(format_timestamp(&t) == "2019-02-11T16:13:04.000000");
    assert!(parse_time_of_day("16:13:04", None) == Err(ClockFormatError::MissingDate("16:13:04".to_string())));
    assert!(parse_time_of_day("up", Some(d)).is_err());
}

#[test]
fn test_from_epoch() {
    let utc = FixedOffset::east_opt(0).unwrap();
    let t = from_epoch(1570072473.0, utc).unwrap();
    assert!(format_timestamp(&t) == "2019-10-03T03:14:33.000000");

    let t = from_epoch(1539307779.1729501, utc).unwrap();
    assert!(format_timestamp(&t) == "2018-10-12T01:29:39.172950");

    let cest = FixedOffset::east_opt(7200).unwrap();
    let t = from_epoch(1570072473.0, cest).unwrap();
    assert!(format_timestamp(&t) == "2019-10-03T05:14:33.000000");
    assert!(convert_zone(t, cest, utc) == from_epoch(1570072473.0, utc).unwrap());

    assert!(from_epoch(f64::NAN, utc).is_err());
}
