/// `vmstat -t` output:
///
/// ```text
/// procs -----------memory---------- ---swap-- -----io---- -system-- ------cpu----- -----timestamp-----
///  r  b   swpd   free   buff  cache   si   so    bi    bo   in   cs us sy id wa st                 UTC
///  2  0  43836 1524804  31152 278956  148   75   154    83   21    8  0  0 98  2  0 2019-02-11 16:13:04
/// ```
///
/// The last word of the column header names the zone of the timestamps, so vmstat is one of the
/// sources whose clock can be converted exactly.
use crate::event::{RawStream, RawTime, Sample, Source};

use benchutils::{parse_int, parse_zone, utc};

const COLUMNS: [&str; 17] = [
    "r", "b", "swpd", "free", "buff", "cache", "si", "so", "bi", "bo", "in", "cs", "us", "sy", "id",
    "wa", "st",
];

pub fn parse_vmstat(text: &str) -> RawStream {
    let mut stream = RawStream::new(Source::Vmstat);
    let mut zone = None;
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("procs") {
            // The header repeats every screenful; the zone will not change.
            if let Some(header) = lines.next() {
                if zone.is_none() {
                    let name = header.split_whitespace().last().unwrap_or("");
                    zone = match parse_zone(name) {
                        Ok(z) => Some(z),
                        Err(e) => {
                            log::warn!("vmstat: {e}, assuming UTC");
                            Some(utc())
                        }
                    };
                }
            }
            continue;
        }
        let cols = trimmed.split_whitespace().collect::<Vec<&str>>();
        if cols.len() != COLUMNS.len() + 2 || !cols[0].starts_with(|c: char| c.is_ascii_digit()) {
            log::warn!("vmstat: bad line '{trimmed}'");
            stream.discarded += 1;
            continue;
        }
        let values = cols[..COLUMNS.len()].iter().map(|s| parse_int(s)).collect::<Option<Vec<i64>>>();
        let Some(values) = values else {
            log::warn!("vmstat: bad numbers in '{trimmed}'");
            stream.discarded += 1;
            continue;
        };
        let stamp = format!("{} {}", cols[COLUMNS.len()], cols[COLUMNS.len() + 1]);
        let time = match zone {
            Some(z) => RawTime::IsoIn(stamp, z),
            None => RawTime::LocalIso(stamp),
        };
        let mut e = Sample::new(time, Source::Vmstat);
        for (name, v) in COLUMNS.iter().zip(values) {
            e.put(&format!("vmstat_{name}"), v);
        }
        stream.events.push(e);
    }
    stream
}

#[cfg(test)]
pub(crate) const VMSTAT_FOR_TESTS: &str = "\
procs -----------memory---------- ---swap-- -----io---- -system-- ------cpu----- -----timestamp-----
 r  b   swpd   free   buff  cache   si   so    bi    bo   in   cs us sy id wa st                 EDT
 2  0  43836 1524804  31152 278956  148   75   154    83   21    8  0  0 98  2  0 2019-02-11 12:13:04
 0  0  43836 1524000  31152 278956    0    0     0     0   30   12  1  0 99  0  0 2019-02-11 12:13:06
 0  0  43836 x  31152 278956    0    0     0     0   30   12  1  0 99  0  0 2019-02-11 12:13:08
";

#[test]
fn test_parse_vmstat() {
    use crate::event::Value;

    let stream = parse_vmstat(VMSTAT_FOR_TESTS);
    assert!(stream.events.len() == 2);
    assert!(stream.discarded == 1);
    let e = &stream.events[0];
    let edt = parse_zone("EDT").unwrap();
    assert!(e.time == RawTime::IsoIn("2019-02-11 12:13:04".to_string(), edt));
    assert!(e.get("vmstat_r") == Some(Value::Int(2)));
    assert!(e.get("vmstat_free") == Some(Value::Int(1524804)));
    assert!(e.get("vmstat_st") == Some(Value::Int(0)));
    assert!(e.fields.len() == 17);
}

#[test]
fn test_vmstat_without_header() {
    let stream = parse_vmstat(" 2  0  43836 1524804  31152 278956  148   75   154    83   21    8  0  0 98  2  0 2019-02-11 16:13:04\n");
    assert!(stream.events.len() == 1);
    assert!(matches!(stream.events[0].time, RawTime::LocalIso(_)));
}
