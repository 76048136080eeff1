/// The Ansible log (`log_path`, or syslog captured with the same format).  Lines of interest:
///
/// ```text
/// 2019-09-17 14:30:24,660 p=5489 u=vagrant |  TASK [wipe out the rules] ****
/// 2019-09-17 14:30:25,100 p=5489 u=vagrant |  ok: [host-1]
/// 2019-09-17 14:30:24,700 p=5489 u=vagrant |  7705 1539307779.17295: running TaskExecutor() for sshd_145/TASK: wipe out the rules
/// 2019-09-17 14:30:24,900 p=5489 u=vagrant |  7705 1539307779.65405: done running TaskExecutor() for sshd_145/TASK: wipe out the rules [525400a6-0421-65e9-9a84-00000000002e]
/// ```
///
/// Anything not starting with a date is a continuation of the previous message and is ignored.
/// The timestamps are local time on the controller and have millisecond resolution; several lines
/// can share a timestamp, and those are folded into one event.
///
/// Task numbers are only emitted on request: when there is a baseline it owns the numbering, and
/// two sources numbering tasks independently would conflict.
use crate::event::{Ids, RawEvent, RawStream, RawTime, Sample, Source};

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use ustr::{ustr, Ustr};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyslogOptions {
    pub number_tasks: bool,
}

struct Patterns {
    line: Regex,
    task: Regex,
    marker: Regex,
    executor: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        line: Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:,\d+)?)\s+(.*)$").unwrap(),
        task: Regex::new(r"^TASK \[(.*?)\]").unwrap(),
        marker: Regex::new(r"^(ok|changed|failed|fatal|skipping|unreachable): \[([^\]]+)\]").unwrap(),
        executor: Regex::new(
            r"(done )?running TaskExecutor\(\) for ([^/\s]+)/TASK: (.*?)(?: \[([0-9a-fA-F-]+)\])?\s*$",
        )
        .unwrap(),
    })
}

enum Entry {
    Task(String),
    Done(String),
    Executor { done: bool, host: String, task: String, uuid: Option<String> },
}

// Strip the "p=NNN u=user |" logging prefix if there is one.
fn message(body: &str) -> &str {
    match body.split_once(" | ") {
        Some((prefix, rest)) if prefix.starts_with("p=") => rest.trim(),
        _ => body.trim(),
    }
}

fn classify(msg: &str) -> Option<Entry> {
    let p = patterns();
    if let Some(c) = p.task.captures(msg) {
        return Some(Entry::Task(c[1].to_string()));
    }
    if let Some(c) = p.marker.captures(msg) {
        // "ok: [host-1 -> localhost]" is a delegated result for host-1.
        let host = c[2].split(" -> ").next().unwrap_or(&c[2]).trim();
        return Some(Entry::Done(host.to_string()));
    }
    if let Some(c) = p.executor.captures(msg) {
        return Some(Entry::Executor {
            done: c.get(1).is_some(),
            host: c[2].to_string(),
            task: c[3].trim().to_string(),
            uuid: c.get(4).map(|m| m.as_str().to_string()),
        });
    }
    None
}

pub fn parse_syslog(text: &str, options: SyslogOptions) -> RawStream {
    let p = patterns();
    let mut stream = RawStream::new(Source::Syslog);

    let mut entries = vec![];
    for line in text.lines() {
        let trimmed = line.trim();
        let dated = trimmed
            .as_bytes()
            .get(..4)
            .map_or(false, |b| b.iter().all(u8::is_ascii_digit));
        if !dated {
            continue;
        }
        let Some(c) = p.line.captures(trimmed) else {
            log::warn!("syslog: bad line '{trimmed}'");
            stream.discarded += 1;
            continue;
        };
        if let Some(entry) = classify(message(&c[2])) {
            entries.push((c[1].to_string(), entry));
        }
    }

    // Every host that ever reports a result.
    let all_hosts = entries
        .iter()
        .filter_map(|(_, e)| match e {
            Entry::Done(h) => Some(h.as_str()),
            _ => None,
        })
        .collect::<BTreeSet<&str>>();

    let mut task_number = 0u32;
    let mut task_name: Option<Ustr> = None;
    let mut done = BTreeSet::new();
    let mut executors = 0i64;
    let mut last_stamp = String::new();
    for (stamp, entry) in &entries {
        let mut e = Sample::new(RawTime::LocalIso(stamp.clone()), Source::Syslog);
        match entry {
            Entry::Task(name) => {
                task_number += 1;
                task_name = Some(ustr(name));
                done.clear();
                let number = if options.number_tasks { Some(task_number) } else { None };
                e.ids = Ids::task(None, task_name, number);
                put_progress(&mut e, done.len(), all_hosts.len());
            }
            Entry::Done(host) => {
                done.insert(host.as_str());
                e.ids.task_name = task_name;
                e.ids.host = Some(ustr(host));
                put_progress(&mut e, done.len(), all_hosts.len());
            }
            Entry::Executor { done: finished, host, task, uuid } => {
                executors = if *finished { (executors - 1).max(0) } else { executors + 1 };
                e.ids = Ids::task(uuid.as_deref().map(ustr), Some(ustr(task)), None);
                e.ids.host = Some(ustr(host));
                e.put("syslog_executors_running", executors);
            }
        }
        if *stamp == last_stamp {
            if let Some(prev) = stream.events.last_mut() {
                fold_into(prev, e);
                continue;
            }
        }
        last_stamp = stamp.clone();
        stream.events.push(e);
    }
    stream
}

fn put_progress(e: &mut RawEvent, done: usize, total: usize) {
    e.put("syslog_hosts_done", done);
    e.put("syslog_hosts_remaining", total.saturating_sub(done));
}

// Later lines at the same timestamp update the earlier event; the first host stays.
fn fold_into(prev: &mut RawEvent, e: RawEvent) {
    prev.fields.extend(e.fields);
    prev.ids.task_uuid = e.ids.task_uuid.or(prev.ids.task_uuid);
    prev.ids.task_name = e.ids.task_name.or(prev.ids.task_name);
    prev.ids.task_number = e.ids.task_number.or(prev.ids.task_number);
    prev.ids.host = prev.ids.host.or(e.ids.host);
}

#[cfg(test)]
pub(crate) const SYSLOG_FOR_TESTS: &str = "\
2019-02-11 16:13:01,000 p=5489 u=vagrant |  PLAY [bench] *****
2019-02-11 16:13:01,500 p=5489 u=vagrant |  TASK [ping] *****
2019-02-11 16:13:01,600 p=5489 u=vagrant |  7705 1549901581.60000: running TaskExecutor() for h1/TASK: ping
2019-02-11 16:13:01,600 p=5489 u=vagrant |  7706 1549901581.60010: running TaskExecutor() for h2/TASK: ping
2019-02-11 16:13:02,900 p=5489 u=vagrant |  7705 1549901582.90000: done running TaskExecutor() for h1/TASK: ping [525400a6-0421-65e9-9a84-000000000032]
2019-02-11 16:13:03,000 p=5489 u=vagrant |  ok: [h1]
    continuation of the previous message
2019-02-11 16:13:04,000 p=5489 u=vagrant |  changed: [h2 -> localhost]
2019-02-11 16:13:06,000 p=5489 u=vagrant |  TASK [copy] *****
2019-02-11 16:13:07,000 p=5489 u=vagrant |  ok: [h1]
2019-02-11 garbage
";

#[test]
fn test_parse_syslog() {
    use crate::event::Value;

    let stream = parse_syslog(SYSLOG_FOR_TESTS, SyslogOptions::default());
    assert!(stream.discarded == 1);
    // PLAY is ignored, the two executor lines at 16:13:01,600 fold into one event.
    assert!(stream.events.len() == 7);

    let e = &stream.events[0];
    assert!(e.time == RawTime::LocalIso("2019-02-11 16:13:01,500".to_string()));
    assert!(e.ids.task_name == Some(ustr("ping")));
    assert!(e.ids.task_number.is_none());
    assert!(e.get("syslog_hosts_remaining") == Some(Value::Int(2)));

    let e = &stream.events[1];
    assert!(e.get("syslog_executors_running") == Some(Value::Int(2)));
    assert!(e.ids.host == Some(ustr("h1")));

    let e = &stream.events[2];
    assert!(e.get("syslog_executors_running") == Some(Value::Int(1)));
    assert!(e.ids.task_uuid == Some(ustr("525400a6-0421-65e9-9a84-000000000032")));

    let e = &stream.events[4];
    assert!(e.ids.host == Some(ustr("h2")));
    assert!(e.get("syslog_hosts_done") == Some(Value::Int(2)));
    assert!(e.get("syslog_hosts_remaining") == Some(Value::Int(0)));

    let e = &stream.events[6];
    assert!(e.ids.task_name == Some(ustr("copy")));
    assert!(e.get("syslog_hosts_done") == Some(Value::Int(1)));
}

#[test]
fn test_syslog_numbering() {
    let stream = parse_syslog(SYSLOG_FOR_TESTS, SyslogOptions { number_tasks: true });
    let numbers = stream.events.iter().filter_map(|e| e.ids.task_number).collect::<Vec<u32>>();
    assert!(numbers == vec![1, 2]);
}

#[test]
fn test_syslog_non_ascii_continuation() {
    let text = "\
2019-02-11 16:13:01,500 p=5489 u=vagrant |  TASK [ping] *****
€€ résultat continuation line
é
2019-02-11 16:13:02,000 p=5489 u=vagrant |  ok: [h1]
";
    let stream = parse_syslog(text, SyslogOptions::default());
    assert!(stream.discarded == 0);
    assert!(stream.events.len() == 2);
}
