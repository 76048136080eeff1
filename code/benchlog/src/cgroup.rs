/// Per-task cgroup accounting, one file per task and kind in `cgroup_data/`, named
/// `<n>-<task uuid>-<kind>.json`, eg `7-0654e32d-bf38-1fea-7039-000000000016-pids.json`.  Each line
/// is a JSON object:
///
/// ```text
/// {"timestamp": 1568610146.120834, "value": 12, "task_name": "ping", "task_uuid": "0654e32d-..."}
/// ```
///
/// The timestamp is UNIX seconds on the controller.  The task number is not in the file; it is looked
/// up from the uuid in the baseline when the timeline is built.
use crate::event::{Ids, RawStream, RawTime, Sample, Source};

use serde::Deserialize;
use ustr::ustr;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Stamp {
    Epoch(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct CgroupLine {
    timestamp: Stamp,
    value: f64,
    #[serde(default)]
    task_name: Option<String>,
    #[serde(default)]
    task_uuid: Option<String>,
}

/// The field that a file's samples go into, from the kind at the end of the file name.

pub fn cgroup_field(file_name: &str) -> Option<&'static str> {
    let stem = file_name.strip_suffix(".json")?;
    match stem.rsplit('-').next()? {
        "cpu" | "cpuacct" => Some("cgroup_cpu_used"),
        "pids" => Some("cgroup_pids_running"),
        "memory" => Some("cgroup_mem_used"),
        _ => None,
    }
}

/// Parse all the cgroup files of a run into one stream.  `files` holds (file name, contents).

pub fn parse_cgroup(files: &[(String, String)]) -> RawStream {
    let mut stream = RawStream::new(Source::Cgroup);
    for (name, text) in files {
        let Some(field) = cgroup_field(name) else {
            log::warn!("cgroup: unknown kind of file '{name}'");
            continue;
        };
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let sample = match serde_json::from_str::<CgroupLine>(line) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("cgroup: {name}: {e}");
                    stream.discarded += 1;
                    continue;
                }
            };
            let time = match sample.timestamp {
                Stamp::Epoch(secs) => RawTime::Epoch(secs),
                Stamp::Text(s) => RawTime::LocalIso(s),
            };
            let ids = Ids::task(sample.task_uuid.as_deref().map(ustr), sample.task_name.as_deref().map(ustr), None);
            stream.events.push(Sample::new(time, Source::Cgroup).with_ids(ids).with(field, sample.value));
        }
    }
    stream
}

#[test]
fn test_cgroup_field() {
    assert!(cgroup_field("7-0654e32d-bf38-1fea-7039-000000000016-pids.json") == Some("cgroup_pids_running"));
    assert!(cgroup_field("1-abc-memory.json") == Some("cgroup_mem_used"));
    assert!(cgroup_field("1-abc-cpu.json") == Some("cgroup_cpu_used"));
    assert!(cgroup_field("1-abc-blkio.json").is_none());
    assert!(cgroup_field("notes.txt").is_none());
}

#[test]
fn test_parse_cgroup() {
    use crate::event::Value;

    let files = vec![
        (
            "1-t1-pids.json".to_string(),
            "{\"timestamp\": 1549901581.5, \"value\": 3, \"task_name\": \"ping\", \"task_uuid\": \"t1\"}\n\
             not json\n\
             {\"timestamp\": \"2019-02-11T16:13:02.000000\", \"value\": 4, \"task_name\": \"ping\", \"task_uuid\": \"t1\"}\n"
                .to_string(),
        ),
        ("1-t1-blkio.json".to_string(), "{}".to_string()),
    ];
    let stream = parse_cgroup(&files);
    assert!(stream.discarded == 1);
    assert!(stream.events.len() == 2);
    let e = &stream.events[0];
    assert!(e.time == RawTime::Epoch(1549901581.5));
    assert!(e.ids.task_uuid == Some(ustr("t1")));
    assert!(e.ids.task_number.is_none());
    assert!(e.get("cgroup_pids_running") == Some(Value::Float(3.0)));
    assert!(matches!(stream.events[1].time, RawTime::LocalIso(_)));
}
