/// `baseline.json`: the playbook's own account of the run, as written by the json stdout callback.
///
/// ```text
/// [{"play": {"id", "name", "duration": {"start", "end"?}},
///   "tasks": [{"task": {"id", "name", "duration": {"start", "end"}},
///              "hosts": {"<name>": {"duration": {"start", "end"}, "offset": {"start", "end"}}}}]}]
/// ```
///
/// Times are ISO strings in the reference frame.  Every distinct time in the file becomes one event,
/// so the baseline both defines the validity window of the run and anchors the clocks of the other
/// sources.
use crate::event::{Ids, RawStream, RawTime, Sample, Source};

use anyhow::Result;
use benchutils::{convert_zone, parse_iso, utc, Timestamp};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use ustr::{ustr, Ustr};

#[derive(Debug, Deserialize)]
struct Span {
    start: String,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    id: String,
    name: String,
    duration: Span,
}

#[derive(Debug, Deserialize)]
struct HostResult {
    duration: Span,
    #[serde(default)]
    offset: Option<Span>,
}

#[derive(Debug, Deserialize)]
struct TaskEntry {
    task: Named,
    #[serde(default)]
    hosts: BTreeMap<String, HostResult>,
}

#[derive(Debug, Deserialize)]
struct PlayEntry {
    play: Named,
    #[serde(default)]
    tasks: Vec<TaskEntry>,
}

struct TaskInfo {
    number: u32,
    uuid: Ustr,
    name: Ustr,
    start: Timestamp,
    // (host, start, end)
    hosts: Vec<(Ustr, Timestamp, Timestamp)>,
}

// A comparable key for a timestamp string; offsets are folded into UTC.

fn key(s: &str) -> Option<Timestamp> {
    match parse_iso(s) {
        Ok((t, Some(zone))) => Some(convert_zone(t, zone, utc())),
        Ok((t, None)) => Some(t),
        Err(_) => None,
    }
}

fn note(s: &str, stream: &mut RawStream) -> Option<Timestamp> {
    let k = key(s);
    if k.is_none() {
        log::warn!("baseline: bad timestamp '{s}'");
        stream.discarded += 1;
    }
    k
}

pub fn parse_baseline(text: &str) -> Result<RawStream> {
    let plays: Vec<PlayEntry> = serde_json::from_str(text)?;
    let mut stream = RawStream::new(Source::Baseline);

    let mut times: BTreeMap<Timestamp, &str> = BTreeMap::new();
    let mut play_starts = vec![];
    let mut tasks = vec![];
    let mut all_hosts = BTreeSet::new();
    for play in &plays {
        if let Some(t) = note(&play.play.duration.start, &mut stream) {
            times.entry(t).or_insert(&play.play.duration.start);
            play_starts.push(t);
        }
        if let Some(ref end) = play.play.duration.end {
            if let Some(t) = note(end, &mut stream) {
                times.entry(t).or_insert(end);
            }
        }
        for task in &play.tasks {
            let mut spans = vec![&task.task.duration];
            let mut hosts = vec![];
            for (name, result) in &task.hosts {
                all_hosts.insert(name.as_str());
                spans.push(&result.duration);
                if let Some(ref offset) = result.offset {
                    spans.push(offset);
                }
                if let (Some(s), Some(e)) = (key(&result.duration.start), result.duration.end.as_deref().and_then(key)) {
                    hosts.push((ustr(name), s, e));
                }
            }
            for span in spans {
                for s in std::iter::once(&span.start).chain(span.end.iter()) {
                    if let Some(t) = note(s, &mut stream) {
                        times.entry(t).or_insert(s);
                    }
                }
            }
            if let Some(start) = key(&task.task.duration.start) {
                tasks.push(TaskInfo {
                    number: tasks.len() as u32 + 1,
                    uuid: ustr(&task.task.id),
                    name: ustr(&task.task.name),
                    start,
                    hosts,
                });
            }
        }
    }
    log::debug!("baseline: {} plays, {} tasks, {} timestamps", plays.len(), tasks.len(), times.len());

    for (t, raw) in times {
        let play_number = play_starts.iter().filter(|s| **s <= t).count();
        let current = tasks.iter().filter(|task| task.start <= t).last();
        let active = tasks
            .iter()
            .flat_map(|task| task.hosts.iter())
            .filter(|(_, s, e)| *s <= t && t <= *e)
            .map(|(h, _, _)| *h)
            .collect::<BTreeSet<Ustr>>();
        let mut e = Sample::new(RawTime::Iso(raw.to_string()), Source::Baseline)
            .with("plays_count", plays.len())
            .with("tasks_count", tasks.len())
            .with("hosts", all_hosts.len())
            .with("hosts_active", active.len());
        e.put_opt("play_number", if play_number > 0 { Some(play_number) } else { None });
        if let Some(task) = current {
            e.ids = Ids::task(Some(task.uuid), Some(task.name), Some(task.number));
            let remaining = task.hosts.iter().filter(|(_, _, end)| *end > t).count();
            e.put("hosts_remaining", remaining);
        } else {
            e.put_opt::<usize>("hosts_remaining", None);
        }
        stream.events.push(e);
    }
    Ok(stream)
}

#[cfg(test)]
pub(crate) const BASELINE_FOR_TESTS: &str = r#"[
  {"play": {"id": "p1", "name": "bench",
            "duration": {"start": "2019-02-11T16:13:00.000000", "end": "2019-02-11T16:13:20.000000"}},
   "tasks": [
     {"task": {"id": "t1", "name": "ping",
               "duration": {"start": "2019-02-11T16:13:01.000000", "end": "2019-02-11T16:13:05.000000"}},
      "hosts": {"h1": {"duration": {"start": "2019-02-11T16:13:01.000000", "end": "2019-02-11T16:13:03.000000"}},
                "h2": {"duration": {"start": "2019-02-11T16:13:01.000000", "end": "2019-02-11T16:13:05.000000"}}}},
     {"task": {"id": "t2", "name": "copy",
               "duration": {"start": "2019-02-11T16:13:06.000000", "end": "2019-02-11T16:13:20.000000"}},
      "hosts": {"h1": {"duration": {"start": "2019-02-11T16:13:06.000000", "end": "2019-02-11T16:13:20.000000"}}}}
   ]}
]"#;

#[test]
fn test_baseline_rows() {
    use crate::event::Value;

    let stream = parse_baseline(BASELINE_FOR_TESTS).unwrap();
    assert!(stream.discarded == 0);
    let times = stream.events.iter().map(|e| e.time.to_string()).collect::<Vec<String>>();
    assert!(
        times
            == vec![
                "2019-02-11T16:13:00.000000",
                "2019-02-11T16:13:01.000000",
                "2019-02-11T16:13:03.000000",
                "2019-02-11T16:13:05.000000",
                "2019-02-11T16:13:06.000000",
                "2019-02-11T16:13:20.000000",
            ]
    );

    let first = &stream.events[0];
    assert!(first.ids.task_number.is_none());
    assert!(first.get("play_number") == Some(Value::Int(1)));
    assert!(first.get("tasks_count") == Some(Value::Int(2)));
    assert!(first.get("hosts_remaining").is_none());

    // At 16:13:03 h1 has just finished the first task, h2 is still running.
    let e = &stream.events[2];
    assert!(e.ids.task_number == Some(1));
    assert!(e.get("hosts_active") == Some(Value::Int(2)));
    assert!(e.get("hosts_remaining") == Some(Value::Int(1)));

    let e = &stream.events[4];
    assert!(e.ids.task_name == Some(ustr("copy")));
    assert!(e.ids.task_number == Some(2));
    assert!(e.get("hosts_active") == Some(Value::Int(1)));
    assert!(e.get("hosts") == Some(Value::Int(2)));
}

#[test]
fn test_baseline_bad_input() {
    assert!(parse_baseline("[{").is_err());
    let text = r#"[{"play": {"id": "p", "name": "x", "duration": {"start": "yesterday"}}, "tasks": []}]"#;
    let stream = parse_baseline(text).unwrap();
    assert!(stream.discarded == 1);
    assert!(stream.events.is_empty());
}
