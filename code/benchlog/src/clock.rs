/// Clock normalization: turn the raw timestamps of one source into instants in the reference frame.
///
/// The reference frame is the wall-clock time of the reference timezone (by convention the zone
/// of the baseline data).  Timestamps whose zone is known are converted exactly.  For the rest,
/// ie bare times of day and epoch values rendered in a local zone that is not the reference zone,
/// we apply the old constant-hour heuristic: compare the hour of the source's first timestamp with
/// the hour of the anchor (the first reference timestamp) and shift the whole source by that many
/// hours.  The hour difference is taken in (-12, 12] and applied as a duration, so the date rolls
/// over if it needs to.
///
/// Bare times of day also get a date: the reference date, advanced by a day each time the clock
/// runs backwards by more than twelve hours (a log that crosses midnight).
use crate::event::{Event, RawEvent, RawTime};

use benchutils::{
    convert_zone, from_epoch, parse_iso, parse_time_of_day, ClockFormatError, Timestamp,
};
use chrono::{Duration, FixedOffset, NaiveDate, Timelike};

#[derive(Debug, Clone)]
pub struct ClockReference {
    /// Date for time-of-day timestamps.
    pub date: Option<NaiveDate>,

    /// The reference zone.
    pub timezone: FixedOffset,

    /// The zone of the machine that wrote epoch and local-ISO timestamps.
    pub local: FixedOffset,

    /// The first timestamp of the reference source, in the reference frame.
    pub anchor: Option<Timestamp>,

    /// Apply the constant-hour heuristic for sources whose frame is not known.
    pub align_hours: bool,
}

impl ClockReference {
    pub fn new(timezone: FixedOffset) -> ClockReference {
        ClockReference {
            date: None,
            timezone,
            local: timezone,
            anchor: None,
            align_hours: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Frame {
    Reference,
    Local,
    Unknown,
}

/// Normalize the timestamps of one source.  Fails on the first timestamp that cannot be
/// normalized.

pub fn normalize_clock(
    events: Vec<RawEvent>,
    reference: &ClockReference,
) -> Result<Vec<Event>, ClockFormatError> {
    let (events, errors) = normalize_clock_lenient(events, reference);
    match errors.into_iter().next() {
        Some(e) => Err(e),
        None => Ok(events),
    }
}

/// Normalize the timestamps of one source, dropping the samples whose timestamps cannot be
/// normalized and returning the errors for them.

pub fn normalize_clock_lenient(
    events: Vec<RawEvent>,
    reference: &ClockReference,
) -> (Vec<Event>, Vec<ClockFormatError>) {
    let mut errors = vec![];
    let mut resolved = vec![];
    let mut day_offset = 0;
    let mut last_tod: Option<Timestamp> = None;
    for e in events {
        let r = match e.time {
            RawTime::TimeOfDay(ref s) => {
                let date = reference.date.map(|d| d + Duration::days(day_offset));
                parse_time_of_day(s, date).map(|mut t| {
                    if let Some(prev) = last_tod {
                        if prev - t > Duration::hours(12) {
                            day_offset += 1;
                            t += Duration::days(1);
                        }
                    }
                    last_tod = Some(t);
                    (t, Frame::Unknown)
                })
            }
            ref raw => resolve(raw, reference),
        };
        match r {
            Ok((t, frame)) => resolved.push((t, frame, e)),
            Err(err) => errors.push(err),
        }
    }

    // All samples from one source are in one frame, except in the pathological case of a parser
    // that mixes representations; in that case each frame is treated separately.
    let shift_for = |frame: Frame| -> Duration {
        if frame == Frame::Reference {
            return Duration::zero();
        }
        match (reference.align_hours, reference.anchor) {
            (true, Some(anchor)) => {
                let first = resolved
                    .iter()
                    .filter(|(_, f, _)| *f == frame)
                    .map(|(t, _, _)| *t)
                    .min();
                match first {
                    Some(first) => Duration::hours(hour_difference(anchor, first)),
                    None => Duration::zero(),
                }
            }
            _ => {
                if frame == Frame::Local {
                    Duration::seconds((reference.timezone.local_minus_utc() - reference.local.local_minus_utc()) as i64)
                } else {
                    Duration::zero()
                }
            }
        }
    };
    let local_shift = shift_for(Frame::Local);
    let unknown_shift = shift_for(Frame::Unknown);

    let events = resolved
        .into_iter()
        .map(|(t, frame, e)| {
            let t = match frame {
                Frame::Reference => t,
                Frame::Local => t + local_shift,
                Frame::Unknown => t + unknown_shift,
            };
            e.retime(t)
        })
        .collect::<Vec<Event>>();
    (events, errors)
}

fn resolve(raw: &RawTime, reference: &ClockReference) -> Result<(Timestamp, Frame), ClockFormatError> {
    let local_frame = if reference.local == reference.timezone {
        Frame::Reference
    } else {
        Frame::Local
    };
    match raw {
        RawTime::Iso(s) => {
            let (t, offset) = parse_iso(s)?;
            match offset {
                Some(zone) => Ok((convert_zone(t, zone, reference.timezone), Frame::Reference)),
                None => Ok((t, Frame::Reference)),
            }
        }
        RawTime::LocalIso(s) => {
            let (t, offset) = parse_iso(s)?;
            match offset {
                Some(zone) => Ok((convert_zone(t, zone, reference.timezone), Frame::Reference)),
                None => Ok((t, local_frame)),
            }
        }
        RawTime::IsoIn(s, zone) => {
            let (t, offset) = parse_iso(s)?;
            let zone = offset.unwrap_or(*zone);
            Ok((convert_zone(t, zone, reference.timezone), Frame::Reference))
        }
        RawTime::TimeOfDay(s) => Ok((parse_time_of_day(s, reference.date)?, Frame::Unknown)),
        RawTime::Epoch(secs) => Ok((from_epoch(*secs, reference.local)?, local_frame)),
        RawTime::EpochIn(secs, _) => Ok((from_epoch(*secs, reference.timezone)?, Frame::Reference)),
        RawTime::At(t) => Ok((*t, Frame::Reference)),
    }
}

/// anchor.hour - first.hour, taken in (-12, 12].

fn hour_difference(anchor: Timestamp, first: Timestamp) -> i64 {
    let mut d = anchor.hour() as i64 - first.hour() as i64;
    if d > 12 {
        d -= 24;
    } else if d <= -12 {
        d += 24;
    }
    d
}

#[cfg(test)]
fn reference_for_tests() -> ClockReference {
    let mut r = ClockReference::new(benchutils::utc());
    r.date = Some(benchutils::parse_date("2019-02-11").unwrap());
    r
}

#[test]
fn test_time_of_day() {
    use crate::event::{Sample, Source};
    use benchutils::format_timestamp;

    let r = reference_for_tests();
    let evs = vec![Sample::new(RawTime::TimeOfDay("16:13:04".to_string()), Source::Top)];
    let out = normalize_clock(evs, &r).unwrap();
    assert!(format_timestamp(&out[0].time) == "2019-02-11T16:13:04.000000");
}

#[test]
fn test_time_of_day_needs_date() {
    use crate::event::{Sample, Source};

    let r = ClockReference::new(benchutils::utc());
    let evs = vec![Sample::new(RawTime::TimeOfDay("16:13:04".to_string()), Source::Top)];
    assert!(normalize_clock(evs, &r) == Err(ClockFormatError::MissingDate("16:13:04".to_string())));
}

#[test]
fn test_midnight_rollover() {
    use crate::event::{Sample, Source};
    use benchutils::format_timestamp;

    let r = reference_for_tests();
    let evs = ["23:59:58", "23:59:59", "00:00:01"]
        .iter()
        .map(|s| Sample::new(RawTime::TimeOfDay(s.to_string()), Source::Top))
        .collect::<Vec<RawEvent>>();
    let out = normalize_clock(evs, &r).unwrap();
    assert!(format_timestamp(&out[2].time) == "2019-02-12T00:00:01.000000");
}

#[test]
fn test_iso_forms() {
    use crate::event::{Sample, Source};
    use benchutils::format_timestamp;

    let r = reference_for_tests();
    let edt = benchutils::parse_zone("EDT").unwrap();
    let evs = vec![
        Sample::new(RawTime::Iso("2019-02-11T16:13:04.123456".to_string()), Source::Baseline),
        Sample::new(RawTime::Iso("2019-02-11T16:13:05".to_string()), Source::Baseline),
        Sample::new(RawTime::Iso("2019-02-11T18:13:06+02:00".to_string()), Source::Baseline),
        Sample::new(RawTime::IsoIn("2019-02-11 12:13:07".to_string(), edt), Source::Vmstat),
        Sample::new(RawTime::EpochIn(1549901588.0, edt), Source::Netdev),
    ];
    let out = normalize_clock(evs, &r).unwrap();
    let times = out.iter().map(|e| format_timestamp(&e.time)).collect::<Vec<String>>();
    assert!(times[0] == "2019-02-11T16:13:04.123456");
    assert!(times[1] == "2019-02-11T16:13:05.000000");
    assert!(times[2] == "2019-02-11T16:13:06.000000");
    assert!(times[3] == "2019-02-11T16:13:07.000000");
    assert!(times[4] == "2019-02-11T16:13:08.000000");
}

#[test]
fn test_hour_alignment() {
    use crate::event::{Sample, Source};
    use benchutils::format_timestamp;

    // The anchor is at 16:xx, the top clock says 11:xx, so the source is moved by +5h.
    let mut r = reference_for_tests();
    r.anchor = Some(benchutils::parse_iso("2019-02-11T16:13:00").unwrap().0);
    let evs = ["11:13:04", "11:14:04"]
        .iter()
        .map(|s| Sample::new(RawTime::TimeOfDay(s.to_string()), Source::Top))
        .collect::<Vec<RawEvent>>();
    let out = normalize_clock(evs.clone(), &r).unwrap();
    assert!(format_timestamp(&out[0].time) == "2019-02-11T16:13:04.000000");
    assert!(format_timestamp(&out[1].time) == "2019-02-11T16:14:04.000000");

    r.align_hours = false;
    let out = normalize_clock(evs, &r).unwrap();
    assert!(format_timestamp(&out[0].time) == "2019-02-11T11:13:04.000000");

    // Across midnight the shift is taken the short way round.
    assert!(hour_difference(
        benchutils::parse_iso("2019-02-11T23:00:00").unwrap().0,
        benchutils::parse_iso("2019-02-12T01:00:00").unwrap().0
    ) == -2);
    assert!(hour_difference(
        benchutils::parse_iso("2019-02-12T01:00:00").unwrap().0,
        benchutils::parse_iso("2019-02-11T23:00:00").unwrap().0
    ) == 2);
}

#[test]
fn test_local_epoch() {
    use crate::event::{Sample, Source};
    use benchutils::format_timestamp;

    // Epoch values rendered in the local zone, then moved to the reference zone exactly when
    // there is nothing to align against.
    let mut r = reference_for_tests();
    r.local = benchutils::parse_zone("CET").unwrap();
    let evs = vec![Sample::new(RawTime::Epoch(1570072473.0), Source::Netdev)];
    let out = normalize_clock(evs.clone(), &r).unwrap();
    assert!(format_timestamp(&out[0].time) == "2019-10-03T03:14:33.000000");

    // With an anchor the hour heuristic wins.
    r.anchor = Some(benchutils::parse_iso("2019-10-03T07:00:00").unwrap().0);
    let out = normalize_clock(evs, &r).unwrap();
    assert!(format_timestamp(&out[0].time) == "2019-10-03T07:14:33.000000");
}

#[test]
fn test_lenient() {
    use crate::event::{Sample, Source};

    let r = reference_for_tests();
    let evs = vec![
        Sample::new(RawTime::Iso("2019-02-11T16:13:04".to_string()), Source::Syslog),
        Sample::new(RawTime::Iso("garbage".to_string()), Source::Syslog),
    ];
    let (out, errors) = normalize_clock_lenient(evs.clone(), &r);
    assert!(out.len() == 1);
    assert!(errors.len() == 1);
    assert!(normalize_clock(evs, &r).is_err());
}
