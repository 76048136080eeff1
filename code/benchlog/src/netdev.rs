/// Repeated snapshots of `/proc/net/dev`, each preceded by a line with the epoch time in seconds:
///
/// ```text
/// 1570072473
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs ...
///   eth0: 294830289  225911    0    4    0     0          0         0  5348537   65950    0 ...
/// ```
///
/// Counters are summed across interfaces.
use crate::event::{RawEvent, RawStream, RawTime, Sample, Source};

use benchutils::{parse_float, parse_int};

// "face |bytes packets ...|bytes packets ..." -> rx_bytes, rx_packets, ..., tx_bytes, ...
fn column_names(header: &str) -> Vec<String> {
    let mut sections = header.split('|');
    let _ = sections.next();
    let mut names = vec![];
    for prefix in ["rx", "tx"] {
        if let Some(section) = sections.next() {
            for col in section.split_whitespace() {
                names.push(format!("netdev_{prefix}_{col}"));
            }
        }
    }
    names
}

pub fn parse_netdev(text: &str) -> RawStream {
    let mut stream = RawStream::new(Source::Netdev);
    let mut columns: Vec<String> = vec![];
    let mut current: Option<RawEvent> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("Inter") {
            continue;
        }
        if trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') {
            if let Some(e) = current.take() {
                stream.events.push(e);
            }
            current = parse_float(trimmed).map(|secs| Sample::new(RawTime::Epoch(secs), Source::Netdev));
            if current.is_none() {
                stream.discarded += 1;
            }
            continue;
        }
        if trimmed.starts_with("face") {
            columns = column_names(trimmed);
            continue;
        }
        let (Some(e), Some((_iface, counters))) = (current.as_mut(), trimmed.split_once(':')) else {
            log::warn!("netdev: unexpected line '{trimmed}'");
            stream.discarded += 1;
            continue;
        };
        let counters = counters.split_whitespace().map(parse_int).collect::<Option<Vec<i64>>>();
        match counters {
            Some(counters) if counters.len() == columns.len() => {
                for (name, v) in columns.iter().zip(counters) {
                    let sum = match e.get(name) {
                        Some(crate::event::Value::Int(prev)) => prev + v,
                        _ => v,
                    };
                    e.put(name, sum);
                }
            }
            _ => {
                log::warn!("netdev: bad counters '{trimmed}'");
                stream.discarded += 1;
            }
        }
    }
    if let Some(e) = current {
        stream.events.push(e);
    }
    stream
}

#[cfg(test)]
pub(crate) const NETDEV_FOR_TESTS: &str = "\
1549901580
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
  eth0: 294830289  225911    0    4    0     0          0         0  5348537   65950    0    0    0     0       0          0
  eth1: 84383376  192518    0 5117    0     0          0         0 234408595  178496    0    0    0     0       0          0
    lo:       0       0    0    0    0     0          0         0        0       0    0    0    0     0       0          0
1549901590
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
  eth0: 294830389  225912    0    4    0     0          0         0  5348637   65951    0    0    0     0       0          0
";

#[test]
fn test_parse_netdev() {
    use crate::event::Value;

    let stream = parse_netdev(NETDEV_FOR_TESTS);
    assert!(stream.events.len() == 2);
    assert!(stream.discarded == 0);
    let e = &stream.events[0];
    assert!(e.time == RawTime::Epoch(1549901580.0));
    assert!(e.get("netdev_rx_bytes") == Some(Value::Int(294830289 + 84383376)));
    assert!(e.get("netdev_rx_drop") == Some(Value::Int(5121)));
    assert!(e.get("netdev_tx_bytes") == Some(Value::Int(5348537 + 234408595)));
    assert!(e.fields.len() == 16);
    assert!(stream.events[1].get("netdev_tx_packets") == Some(Value::Int(65951)));
}
