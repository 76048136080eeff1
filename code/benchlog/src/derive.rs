/// Derived percentage columns.  A ratio column is numerator / (denominator + offset) * 100, and is
/// null where either side is missing or the denominator is zero.
use crate::event::Value;
use crate::timeline::Timeline;

use ustr::ustr;

#[derive(Debug, Clone, PartialEq)]
pub struct Ratio {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
    pub offset: f64,
}

impl Ratio {
    pub fn new(name: &str, numerator: &str, denominator: &str, offset: f64) -> Ratio {
        Ratio {
            name: name.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            offset,
        }
    }
}

pub fn standard_ratios() -> Vec<Ratio> {
    vec![
        Ratio::new("hosts_remaining_%", "hosts_remaining", "hosts", 0.0),
        Ratio::new("forks_active_%", "hosts_active", "forks", 0.0),
        Ratio::new("workers_active_%", "syslog_executors_running", "forks", 0.0),
        // The playbook itself is one of the processes.
        Ratio::new("playbook_pids_fork_%", "top_pids_playbook", "forks", 1.0),
        Ratio::new("task_count_%", "task_number", "tasks_count", 0.0),
        Ratio::new("mem_used_%", "top_kib_mem_used", "top_kib_mem_total", 0.0),
    ]
}

pub fn ratio(numerator: Option<Value>, denominator: Option<Value>, offset: f64) -> Option<Value> {
    let n = numerator?.as_f64()?;
    let d = denominator?.as_f64()? + offset;
    if d == 0.0 {
        None
    } else {
        Some(Value::Float(n / d * 100.0))
    }
}

/// Add one column per ratio.  Inputs may be metric or identifier columns; a ratio whose inputs
/// are absent from the timeline still gets a column, all null.

pub fn derive_ratios(timeline: Timeline, ratios: &[Ratio]) -> Timeline {
    ratios.iter().fold(timeline, |tl, r| {
        let values = tl
            .rows()
            .iter()
            .map(|row| ratio(tl.lookup(row, &r.numerator), tl.lookup(row, &r.denominator), r.offset))
            .collect::<Vec<Option<Value>>>();
        tl.with_column(ustr(&r.name), values)
    })
}

#[test]
fn test_ratio() {
    assert!(ratio(Some(Value::Int(5)), Some(Value::Int(10)), 0.0) == Some(Value::Float(50.0)));
    assert!(ratio(Some(Value::Int(5)), Some(Value::Int(0)), 0.0).is_none());
    assert!(ratio(Some(Value::Int(5)), None, 0.0).is_none());
    assert!(ratio(None, Some(Value::Int(10)), 0.0).is_none());
    assert!(ratio(Some(Value::Int(2)), Some(Value::Int(3)), 1.0) == Some(Value::Float(50.0)));
    assert!(ratio(Some(Value::from("x")), Some(Value::Int(3)), 0.0).is_none());
}

#[test]
fn test_derive_ratios() {
    use crate::event::{Sample, Source};
    use crate::reconcile::{merge, MergeOptions};

    let t0 = benchutils::parse_iso("2019-02-11T16:13:00").unwrap().0;
    let mut a = Sample::new(t0, Source::Baseline).with("hosts_remaining", 3).with("hosts", 4);
    a.ids.task_number = Some(1);
    let b = Sample::new(t0 + chrono::Duration::seconds(1), Source::Baseline)
        .with("hosts_remaining", 1)
        .with("hosts", 0)
        .with("tasks_count", 4);
    let tl = merge(vec![vec![a, b]], &MergeOptions::default()).unwrap();
    let tl = derive_ratios(tl, &standard_ratios());
    let r0 = &tl.rows()[0];
    let r1 = &tl.rows()[1];
    assert!(tl.lookup(r0, "hosts_remaining_%") == Some(Value::Float(75.0)));
    assert!(tl.lookup(r1, "hosts_remaining_%").is_none());
    assert!(tl.lookup(r0, "task_count_%").is_none());
    assert!(tl.column("mem_used_%").is_some());
    assert!(tl.rows().iter().all(|r| tl.lookup(r, "mem_used_%").is_none()));
}
