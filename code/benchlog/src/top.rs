/// `top -b` output.  Each block looks like this:
///
/// ```text
/// top - 16:13:04 up 17 days, 21:39,  1 user,  load average: 0.08, 0.03, 0.05
/// Tasks:  84 total,   2 running,  77 sleeping,   2 stopped,   2 zombie
/// %Cpu(s): 10.3 us,  3.7 sy,  0.0 ni, 86.0 id,  0.0 wa,  0.0 hi,  0.0 si,  0.0 st
/// KiB Mem :  1882220 total,  1513532 free,    56916 used,   311772 buff/cache
/// KiB Swap:  2097148 total,  2053312 free,    43836 used.  1597056 avail Mem
///
///   PID USER      PR  NI    VIRT    RES    SHR S  %CPU %MEM     TIME+ COMMAND
/// 22933 centos    20   0  229176  18900   4328 R  87.5  0.1   0:00.14 ansible-playbook
/// ```
///
/// The header only has a time of day.  Process lines are not kept individually; we count the
/// processes of the playbook and of its ssh machinery, and sum their %CPU and %MEM.
use crate::event::{RawEvent, RawStream, RawTime, Sample, Source};

use benchutils::{parse_float, parse_int};
use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    header: Regex,
    users: Regex,
    load: Regex,
    pair: Regex,
    memory: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        header: Regex::new(r"^top - (\d{1,2}:\d{2}:\d{2})\b").unwrap(),
        users: Regex::new(r"(\d+) users?").unwrap(),
        load: Regex::new(r"load average: ([\d.]+),? ([\d.]+),? ([\d.]+)").unwrap(),
        pair: Regex::new(r"([\d.]+)\s+([A-Za-z][\w/]*)").unwrap(),
        memory: Regex::new(r"^([KMGT]i?B) (Mem|Swap)\s*:").unwrap(),
    })
}

// Process classes we count: name, and a predicate on the command line.  A line is counted for the
// playbook and, independently, for the first of the ssh classes that matches.

const PROCESS_CLASSES: [&str; 4] = ["playbook", "sshpass", "sshmux", "ssh"];

fn classify(line: &str) -> (bool, Option<&'static str>) {
    let playbook = line.contains("ansible-playbook");
    let ssh = if line.contains("sshpass") {
        Some("sshpass")
    } else if line.contains("ssh:") && line.contains(".ansible/cp") && line.contains("[mux]") {
        Some("sshmux")
    } else if line.contains(" ssh ") || line.ends_with(" ssh") {
        Some("ssh")
    } else {
        None
    };
    (playbook, ssh)
}

fn kib_scale(unit: &str) -> f64 {
    match unit {
        "MiB" | "MB" => 1024.0,
        "GiB" | "GB" => 1024.0 * 1024.0,
        "TiB" | "TB" => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    }
}

// Field names may contain '/' ("buff/cache"), and "avail Mem" comes out as "avail".
fn field_key(name: &str) -> String {
    name.replace('/', "_").to_ascii_lowercase()
}

fn new_block(tod: &str, line: &str) -> RawEvent {
    let p = patterns();
    let mut e = Sample::new(RawTime::TimeOfDay(tod.to_string()), Source::Top);
    if let Some(c) = p.users.captures(line) {
        e.put_opt("top_users", parse_int(&c[1]));
    }
    if let Some(c) = p.load.captures(line) {
        e.put_opt("top_load_1", parse_float(&c[1]));
        e.put_opt("top_load_5", parse_float(&c[2]));
        e.put_opt("top_load_15", parse_float(&c[3]));
    }
    for class in PROCESS_CLASSES {
        e.put(&format!("top_pids_{class}"), 0i64);
        e.put(&format!("top_pids_{class}_cpu"), 0.0);
        e.put(&format!("top_pids_{class}_mem"), 0.0);
    }
    e
}

fn add_process(e: &mut RawEvent, class: &str, cpu: f64, mem: f64) {
    let count = format!("top_pids_{class}");
    let n = e.get(&count).and_then(|v| v.as_f64()).unwrap_or(0.0) as i64;
    e.put(&count, n + 1);
    for (suffix, amount) in [("cpu", cpu), ("mem", mem)] {
        let key = format!("top_pids_{class}_{suffix}");
        let sum = e.get(&key).and_then(|v| v.as_f64()).unwrap_or(0.0);
        e.put(&key, sum + amount);
    }
}

pub fn parse_top(text: &str) -> RawStream {
    let p = patterns();
    let mut stream = RawStream::new(Source::Top);
    let mut current: Option<RawEvent> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(c) = p.header.captures(trimmed) {
            if let Some(e) = current.take() {
                stream.events.push(e);
            }
            current = Some(new_block(&c[1], trimmed));
            continue;
        }
        let Some(ref mut e) = current else {
            // Anything before the first header is junk from a truncated capture.
            stream.discarded += 1;
            continue;
        };
        if trimmed.starts_with("Tasks:") || trimmed.starts_with("Threads:") {
            for c in p.pair.captures_iter(trimmed) {
                let key = if &c[2] == "total" { "top_tasks".to_string() } else { format!("top_{}", &c[2]) };
                e.put_opt(&key, parse_int(&c[1]));
            }
        } else if trimmed.starts_with("%Cpu") {
            let rest = trimmed.splitn(2, ':').nth(1).unwrap_or("");
            for c in p.pair.captures_iter(rest) {
                e.put_opt(&format!("top_cpu_{}", field_key(&c[2])), parse_float(&c[1]));
            }
        } else if let Some(m) = p.memory.captures(trimmed) {
            let scale = kib_scale(&m[1]);
            let kind = m[2].to_ascii_lowercase();
            let rest = &trimmed[m.get(0).map(|x| x.end()).unwrap_or(0)..];
            for c in p.pair.captures_iter(rest) {
                if let Some(x) = parse_float(&c[1]) {
                    let kib = (x * scale).round() as i64;
                    e.put(&format!("top_kib_{kind}_{}", field_key(&c[2])), kib);
                }
            }
        } else if trimmed.starts_with("PID") {
            // column header
        } else if trimmed.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            let parts = trimmed.split_whitespace().collect::<Vec<&str>>();
            let (cpu, mem) = match (parts.get(8).and_then(|s| parse_float(s)), parts.get(9).and_then(|s| parse_float(s))) {
                (Some(cpu), Some(mem)) => (cpu, mem),
                _ => {
                    log::warn!("top: bad process line '{trimmed}'");
                    stream.discarded += 1;
                    continue;
                }
            };
            let (playbook, ssh) = classify(trimmed);
            if playbook {
                add_process(e, "playbook", cpu, mem);
            }
            if let Some(class) = ssh {
                add_process(e, class, cpu, mem);
            }
        } else {
            log::warn!("top: unrecognized line '{trimmed}'");
            stream.discarded += 1;
        }
    }
    if let Some(e) = current {
        stream.events.push(e);
    }
    stream
}

#[cfg(test)]
pub(crate) const TOP_FOR_TESTS: &str = "\
top - 16:13:04 up 17 days, 21:39,  1 user,  load average: 0.08, 0.03, 0.05
Tasks:  84 total,   2 running,  77 sleeping,   2 stopped,   2 zombie
%Cpu(s): 10.3 us,  3.7 sy,  0.0 ni, 86.0 id,  0.0 wa,  0.0 hi,  0.0 si,  0.0 st
KiB Mem :  1882220 total,  1513532 free,    56916 used,   311772 buff/cache
KiB Swap:  2097148 total,  2053312 free,    43836 used.  1597056 avail Mem

  PID USER      PR  NI    VIRT    RES    SHR S  %CPU %MEM     TIME+ COMMAND
22933 centos    20   0  229176  18900   4328 R  87.5  0.1   0:00.14 /usr/bin/python2 /usr/bin/ansible-playbook -i inv site.yml
22934 centos    20   0  229176  18900   4328 S  12.5  0.2   0:00.14 /usr/bin/python2 /usr/bin/ansible-playbook -i inv site.yml
22990 centos    20   0   72000   5000   3000 S   1.0  0.0   0:00.01 ssh: /home/centos/.ansible/cp/1e6775b5cb [mux]
23001 centos    20   0   72000   5000   3000 S   0.5  0.0   0:00.01 sshpass -d12 ssh -o ControlMaster=auto h1

top - 16:13:07 up 17 days, 21:39,  2 users,  load average: 0.10, 0.04, 0.05
Tasks:  85 total,   1 running,  80 sleeping,   0 stopped,   0 zombie
MiB Mem :   1838.1 total,   1478.1 free,     55.6 used,    304.5 buff/cache
";

#[test]
fn test_parse_top() {
    use crate::event::Value;

    let stream = parse_top(TOP_FOR_TESTS);
    assert!(stream.events.len() == 2);
    assert!(stream.discarded == 0);
    let e = &stream.events[0];
    assert!(e.time == RawTime::TimeOfDay("16:13:04".to_string()));
    assert!(e.get("top_users") == Some(Value::Int(1)));
    assert!(e.get("top_load_15") == Some(Value::Float(0.05)));
    assert!(e.get("top_tasks") == Some(Value::Int(84)));
    assert!(e.get("top_zombie") == Some(Value::Int(2)));
    assert!(e.get("top_cpu_us") == Some(Value::Float(10.3)));
    assert!(e.get("top_kib_mem_total") == Some(Value::Int(1882220)));
    assert!(e.get("top_kib_mem_buff_cache") == Some(Value::Int(311772)));
    assert!(e.get("top_kib_swap_avail") == Some(Value::Int(1597056)));
    assert!(e.get("top_pids_playbook") == Some(Value::Int(2)));
    assert!(e.get("top_pids_playbook_cpu") == Some(Value::Float(100.0)));
    assert!(e.get("top_pids_sshmux") == Some(Value::Int(1)));
    assert!(e.get("top_pids_sshpass") == Some(Value::Int(1)));
    assert!(e.get("top_pids_ssh") == Some(Value::Int(0)));

    let e = &stream.events[1];
    assert!(e.get("top_users") == Some(Value::Int(2)));
    assert!(e.get("top_kib_mem_total") == Some(Value::Int(1882214)));
    assert!(e.get("top_pids_playbook") == Some(Value::Int(0)));
}

#[test]
fn test_parse_top_junk() {
    let stream = parse_top("garbage\ntop - 10:00:00 up 1 day,  1 user,  load average: 0.00, 0.01, 0.05\n9999 x\n");
    assert!(stream.events.len() == 1);
    assert!(stream.discarded == 2);
}
