/// `ps.log` as written by the `record` sampler: a `#<epoch seconds>` marker line followed by the
/// output of `ps xao pid,ppid,pgid,sid,%cpu,%mem,cmd`, repeated.
///
/// ```text
/// #1549901581.123
///   PID  PPID  PGID   SID %CPU %MEM CMD
/// 22933 22900 22933 22900 87.5  0.1 /usr/bin/python2 /usr/bin/ansible-playbook site.yml
/// ```
///
/// Each snapshot becomes one event with the totals over all processes and over the playbook's
/// processes.
use crate::event::{RawEvent, RawStream, RawTime, Sample, Source};

use benchutils::parse_float;

const SUMS: [&str; 4] = ["ps_cpu", "ps_mem", "ps_playbook_cpu", "ps_playbook_mem"];

fn add(e: &mut RawEvent, name: &str, amount: f64) {
    let sum = e.get(name).and_then(|v| v.as_f64()).unwrap_or(0.0);
    e.put(name, sum + amount);
}

pub fn parse_ps(text: &str) -> RawStream {
    let mut stream = RawStream::new(Source::Ps);
    let mut current: Option<RawEvent> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(stamp) = trimmed.strip_prefix('#') {
            if let Some(e) = current.take() {
                stream.events.push(e);
            }
            let Some(secs) = parse_float(stamp.trim()) else {
                log::warn!("ps: bad marker '{trimmed}'");
                stream.discarded += 1;
                continue;
            };
            let mut e = Sample::new(RawTime::Epoch(secs), Source::Ps);
            for name in SUMS {
                e.put(name, 0.0);
            }
            e.put("ps_playbook_pids", 0i64);
            current = Some(e);
            continue;
        }
        if !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            // Column header
            continue;
        }
        let Some(ref mut e) = current else {
            stream.discarded += 1;
            continue;
        };
        let cols = trimmed.split_whitespace().collect::<Vec<&str>>();
        let (Some(cpu), Some(mem)) = (cols.get(4).and_then(|s| parse_float(s)), cols.get(5).and_then(|s| parse_float(s))) else {
            log::warn!("ps: bad process line '{trimmed}'");
            stream.discarded += 1;
            continue;
        };
        add(e, "ps_cpu", cpu);
        add(e, "ps_mem", mem);
        if trimmed.contains("ansible-playbook") {
            let n = e.get("ps_playbook_pids").and_then(|v| v.as_f64()).unwrap_or(0.0) as i64;
            e.put("ps_playbook_pids", n + 1);
            add(e, "ps_playbook_cpu", cpu);
            add(e, "ps_playbook_mem", mem);
        }
    }
    if let Some(e) = current {
        stream.events.push(e);
    }
    stream
}

#[cfg(test)]
pub(crate) const PS_FOR_TESTS: &str = "\
#1549901582.5
  PID  PPID  PGID   SID %CPU %MEM CMD
    1     0     1     1  0.0  0.1 /sbin/init
22933 22900 22933 22900 87.5  0.1 /usr/bin/python2 /usr/bin/ansible-playbook -i inv site.yml
22934 22933 22933 22900 12.5  0.2 /usr/bin/python2 /usr/bin/ansible-playbook -i inv site.yml
#1549901582.6
  PID  PPID  PGID   SID %CPU %MEM CMD
    1     0     1     1  1.0  0.1 /sbin/init
    2     0     1     1  x  0.1 broken
";

#[test]
fn test_parse_ps() {
    use crate::event::Value;

    let stream = parse_ps(PS_FOR_TESTS);
    assert!(stream.events.len() == 2);
    assert!(stream.discarded == 1);
    let e = &stream.events[0];
    assert!(e.time == RawTime::Epoch(1549901582.5));
    assert!(e.get("ps_cpu") == Some(Value::Float(100.0)));
    assert!(e.get("ps_playbook_pids") == Some(Value::Int(2)));
    assert!(e.get("ps_playbook_cpu") == Some(Value::Float(100.0)));
    let e = &stream.events[1];
    assert!(e.get("ps_cpu") == Some(Value::Float(1.0)));
    assert!(e.get("ps_playbook_pids") == Some(Value::Int(0)));
    assert!(e.get("ps_playbook_mem") == Some(Value::Float(0.0)));
}
