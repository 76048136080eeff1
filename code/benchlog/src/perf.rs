/// `perf stat -x, -I <ms>` output, one line per event per interval:
///
/// ```text
/// # started on Mon Feb 11 16:13:00 2019
///      1.000393662,2000.51,msec,task-clock,2000508614,100.00,2.001,CPUs utilized
/// ```
///
/// Column 0 is seconds since perf started, which is taken to be the run start from the meta file.
/// Column 3 names the event, and every other column that is a plain number becomes a field named
/// after the event and the column index.
use crate::event::{RawEvent, RawStream, RawTime, Sample, Source};

use benchutils::{is_plain_number, parse_float};
use std::collections::BTreeSet;
use ustr::Ustr;

pub fn parse_perf(text: &str, run_start: f64) -> RawStream {
    let mut stream = RawStream::new(Source::Perf);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                log::warn!("perf: {e}");
                stream.discarded += 1;
                continue;
            }
        };
        let (Some(offset), Some(event)) = (record.get(0).and_then(parse_float), record.get(3)) else {
            log::warn!("perf: bad record {:?}", record);
            stream.discarded += 1;
            continue;
        };
        if event.is_empty() {
            stream.discarded += 1;
            continue;
        }
        let time = RawTime::Epoch(run_start + offset);
        let ix = match stream.events.iter().rposition(|e| e.time == time) {
            Some(ix) => ix,
            None => {
                stream.events.push(Sample::new(time, Source::Perf));
                stream.events.len() - 1
            }
        };
        let e = &mut stream.events[ix];
        for (idx, col) in record.iter().enumerate().skip(1) {
            if idx == 3 || !is_plain_number(col) {
                continue;
            }
            e.put_opt(&format!("perf_{event}_{idx}"), parse_float(col));
        }
    }
    drop_constant_fields(&mut stream.events);
    stream
}

// A counter that never moves tells us nothing about the run.
fn drop_constant_fields(events: &mut [RawEvent]) {
    if events.len() < 2 {
        return;
    }
    let names = events.iter().flat_map(|e| e.fields.keys().copied()).collect::<BTreeSet<Ustr>>();
    for name in names {
        let mut values = events.iter().filter_map(|e| e.fields.get(&name).copied().flatten());
        let Some(first) = values.next() else {
            continue;
        };
        if values.all(|v| v.same(&first)) {
            log::debug!("perf: dropping constant field {name}");
            for e in events.iter_mut() {
                e.fields.remove(&name);
            }
        }
    }
}

#[cfg(test)]
pub(crate) const PERF_FOR_TESTS: &str = "\
# started on Mon Feb 11 16:13:00 2019

     1.000393662,2000.51,msec,task-clock,2000508614,100.00,2.001,CPUs utilized
     1.000393662,<not counted>,,cycles,0,100.00,,
     2.000801255,1999.87,msec,task-clock,1999868772,100.00,2.000,CPUs utilized
     2.000801255,12,,context-switches,2000508614,100.00,0.006,K/sec
";

#[test]
fn test_parse_perf() {
    use crate::event::Value;

    let stream = parse_perf(PERF_FOR_TESTS, 1549901580.0);
    assert!(stream.discarded == 0);
    assert!(stream.events.len() == 2);
    let e = &stream.events[0];
    assert!(e.time == RawTime::Epoch(1549901580.0 + 1.000393662));
    assert!(e.get("perf_task-clock_1") == Some(Value::Float(2000.51)));
    assert!(e.get("perf_task-clock_4") == Some(Value::Float(2000508614.0)));
    // Constant over the run
    assert!(e.get("perf_task-clock_5").is_none());
    assert!(e.get("perf_cycles_4").is_none());
    // Only observed once, so it cannot be seen to change, and is also dropped.
    assert!(stream.events[1].get("perf_context-switches_1").is_none());
    assert!(stream.events[1].get("perf_task-clock_6") == Some(Value::Float(2.0)));
}
