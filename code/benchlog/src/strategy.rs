/// The three files written by the benchmark strategy at the end of a run:
///
/// ```text
/// <ts>_meta.json              {start, stop, forks, hosts, time}
/// <ts>_host_queue_starts.json [{host, task_uuid, task_name, time}, ...]
/// <ts>_concurrent_hosts.json  [{time, task_uuid, task_name, active: [host, ...]}, ...]
/// ```
///
/// Times are UNIX epoch seconds as floats.  A queue start is recorded every time a host is handed a
/// task, and a concurrent-hosts snapshot is taken at the same moment, listing the hosts that are
/// busy.
///
/// From these we produce one observation per snapshot, and per-task, per-host spans.
use crate::event::{Ids, RawStream, RawTime, Sample, Source};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use ustr::{ustr, Ustr};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunMeta {
    pub start: f64,
    pub stop: f64,
    #[serde(default)]
    pub forks: Option<u32>,
    #[serde(default)]
    pub hosts: Option<u32>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueueStart {
    pub host: String,
    pub task_uuid: String,
    pub task_name: String,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Snapshot {
    pub time: f64,
    pub task_uuid: String,
    pub task_name: String,
    pub active: Vec<String>,
}

/// How long one host spent on one task, in seconds.  `lag` is from the start of the run to the
/// host being queued.

#[derive(Debug, Clone, PartialEq)]
pub struct TaskHostSpan {
    pub task_number: u32,
    pub task_uuid: Ustr,
    pub task_name: Ustr,
    pub host: Ustr,
    pub lag: f64,
    pub start: f64,
    pub stop: f64,
    pub duration: f64,
}

pub fn parse_run_meta(text: &str) -> Result<RunMeta> {
    Ok(serde_json::from_str(text)?)
}

pub fn parse_queue_starts(text: &str) -> Result<Vec<QueueStart>> {
    Ok(serde_json::from_str(text)?)
}

pub fn parse_concurrent_hosts(text: &str) -> Result<Vec<Snapshot>> {
    Ok(serde_json::from_str(text)?)
}

// Task uuids in order of first appearance among the queue starts, then any that only appear in
// the snapshots.

fn task_order(starts: &[QueueStart], snapshots: &[Snapshot]) -> HashMap<Ustr, u32> {
    let mut order = HashMap::new();
    for uuid in starts
        .iter()
        .map(|s| &s.task_uuid)
        .chain(snapshots.iter().map(|s| &s.task_uuid))
    {
        let n = order.len() as u32 + 1;
        order.entry(ustr(uuid)).or_insert(n);
    }
    order
}

/// One event per snapshot, with the task identifiers and the fields hosts_active, hosts_remaining,
/// hosts, tasks_count and (if known) forks.  `hosts_remaining` counts the hosts that have not yet
/// been seen active since the current task began.

pub fn strategy_observations(meta: &RunMeta, starts: &[QueueStart], snapshots: &[Snapshot]) -> RawStream {
    let order = task_order(starts, snapshots);
    let tasks_count = order.len();
    let all_hosts = snapshots
        .iter()
        .flat_map(|s| s.active.iter())
        .map(|h| h.as_str())
        .collect::<BTreeSet<&str>>();

    let mut sorted = snapshots.iter().collect::<Vec<&Snapshot>>();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut stream = RawStream::new(Source::Baseline);
    let mut current: Option<&str> = None;
    let mut remaining = BTreeSet::new();
    for snap in sorted {
        if current != Some(snap.task_uuid.as_str()) {
            log::debug!("strategy: new task '{}'", snap.task_name);
            current = Some(snap.task_uuid.as_str());
            remaining = all_hosts.clone();
        }
        for h in &snap.active {
            remaining.remove(h.as_str());
        }
        let uuid = ustr(&snap.task_uuid);
        let mut e = Sample::new(RawTime::Epoch(snap.time), Source::Baseline)
            .with_ids(Ids::task(Some(uuid), Some(ustr(&snap.task_name)), order.get(&uuid).copied()))
            .with("hosts_active", snap.active.len())
            .with("hosts_remaining", remaining.len())
            .with("hosts", all_hosts.len())
            .with("tasks_count", tasks_count);
        e.put_opt("forks", meta.forks);
        stream.events.push(e);
    }
    stream
}

/// One span per queue start.  A host is done with a task at the first later snapshot where it is
/// no longer active, or at the end of the run if there is none.

pub fn task_host_spans(meta: &RunMeta, starts: &[QueueStart], snapshots: &[Snapshot]) -> Vec<TaskHostSpan> {
    let order = task_order(starts, snapshots);
    let mut sorted = snapshots.iter().collect::<Vec<&Snapshot>>();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut spans = starts
        .iter()
        .map(|qs| {
            let stop = sorted
                .iter()
                .find(|s| s.time > qs.time && !s.active.iter().any(|h| *h == qs.host))
                .map(|s| s.time)
                .unwrap_or(meta.stop);
            let uuid = ustr(&qs.task_uuid);
            TaskHostSpan {
                task_number: order.get(&uuid).copied().unwrap_or(0),
                task_uuid: uuid,
                task_name: ustr(&qs.task_name),
                host: ustr(&qs.host),
                lag: qs.time - meta.start,
                start: qs.time,
                stop,
                duration: stop - qs.time,
            }
        })
        .collect::<Vec<TaskHostSpan>>();
    spans.sort_by(|a, b| a.task_number.cmp(&b.task_number).then(a.start.total_cmp(&b.start)));
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Value;

    const META: &str = r#"{"start": 100.0, "stop": 110.0, "forks": 2, "hosts": 3, "time": "110.5"}"#;

    const STARTS: &str = r#"[
      {"host": "h1", "task_uuid": "u1", "task_name": "ping", "time": 101.0},
      {"host": "h2", "task_uuid": "u1", "task_name": "ping", "time": 101.5},
      {"host": "h1", "task_uuid": "u2", "task_name": "copy", "time": 104.0}
    ]"#;

    const SNAPSHOTS: &str = r#"[
      {"time": 101.0, "task_uuid": "u1", "task_name": "ping", "active": []},
      {"time": 101.5, "task_uuid": "u1", "task_name": "ping", "active": ["h1"]},
      {"time": 103.0, "task_uuid": "u1", "task_name": "ping", "active": ["h2"]},
      {"time": 104.0, "task_uuid": "u2", "task_name": "copy", "active": []},
      {"time": 105.0, "task_uuid": "u2", "task_name": "copy", "active": ["h1"]}
    ]"#;

    #[test]
    fn test_observations() {
        let meta = parse_run_meta(META).unwrap();
        let starts = parse_queue_starts(STARTS).unwrap();
        let snaps = parse_concurrent_hosts(SNAPSHOTS).unwrap();
        let stream = strategy_observations(&meta, &starts, &snaps);
        assert!(stream.events.len() == 5);

        let remaining = stream
            .events
            .iter()
            .map(|e| e.get("hosts_remaining"))
            .collect::<Vec<Option<Value>>>();
        assert!(
            remaining
                == vec![
                    Some(Value::Int(2)),
                    Some(Value::Int(1)),
                    Some(Value::Int(0)),
                    Some(Value::Int(2)),
                    Some(Value::Int(1))
                ]
        );
        assert!(stream.events[3].ids.task_number == Some(2));
        assert!(stream.events[3].ids.task_name == Some(ustr("copy")));
        assert!(stream.events[0].get("forks") == Some(Value::Int(2)));
        assert!(stream.events[0].get("tasks_count") == Some(Value::Int(2)));
        assert!(stream.events[0].get("hosts") == Some(Value::Int(2)));
        assert!(stream.events[1].time == RawTime::Epoch(101.5));
    }

    #[test]
    fn test_spans() {
        let meta = parse_run_meta(META).unwrap();
        let starts = parse_queue_starts(STARTS).unwrap();
        let snaps = parse_concurrent_hosts(SNAPSHOTS).unwrap();
        let spans = task_host_spans(&meta, &starts, &snaps);
        assert!(spans.len() == 3);
        // h1 is active at 101.5 and gone at 103.0.
        assert!(spans[0].host == ustr("h1") && spans[0].stop == 103.0 && spans[0].duration == 2.0);
        assert!(spans[0].lag == 1.0);
        // h2 is still active at 103.0 and gone at 104.0.
        assert!(spans[1].host == ustr("h2") && spans[1].stop == 104.0);
        // h1 on u2 is still active at the last snapshot.
        assert!(spans[2].task_number == 2 && spans[2].stop == 110.0);
    }

    #[test]
    fn test_meta_without_forks() {
        let meta = parse_run_meta(r#"{"start": 1.0, "stop": 2.0, "forks": null}"#).unwrap();
        assert!(meta.forks.is_none());
        assert!(parse_run_meta("{").is_err());
    }
}
