/// Merging normalized sample streams onto one timeline.
///
/// The pipeline is:
///
/// - flatten all streams, remembering the source of each event
/// - compute the schema as the union of field names
/// - give every event a slot for every column, absent fields being null
/// - sort stably by time, so events with equal times keep arrival order
/// - forward-fill columns except `task_number`, `host`, and the instantaneous ones
/// - collapse events with equal times into one row
/// - optionally trim to a window
///
/// Filling happens before collapsing, which means a filled value can meet an observed value at the
/// same time.  To keep that from looking like a conflict every cell remembers whether it was
/// observed or filled, and only two different observed values conflict.
use crate::error::ReconcileError;
use crate::event::{Event, Ids, SourceSet, Value};
use crate::timeline::{Row, Timeline};

use benchutils::Timestamp;
use std::collections::{BTreeSet, HashMap};
use ustr::Ustr;

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Columns whose name starts with one of these are never forward-filled.
    pub instantaneous: Vec<String>,

    /// Inclusive window to trim to.
    pub window: Option<(Timestamp, Timestamp)>,
}

impl Default for MergeOptions {
    fn default() -> MergeOptions {
        MergeOptions {
            instantaneous: vec!["top_".to_string()],
            window: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cell<T> {
    Null,
    Observed(T),
    Filled(T),
}

impl<T: Copy> Cell<T> {
    fn from_option(v: Option<T>) -> Cell<T> {
        match v {
            Some(v) => Cell::Observed(v),
            None => Cell::Null,
        }
    }

    fn value(&self) -> Option<T> {
        match self {
            Cell::Null => None,
            Cell::Observed(v) | Cell::Filled(v) => Some(*v),
        }
    }

    fn fill_from(&mut self, last: &Option<T>) {
        if let Cell::Null = *self {
            if let Some(v) = last {
                *self = Cell::Filled(*v);
            }
        }
    }

    // Observed beats filled beats null; among filled values the later one wins.  Two observed
    // values must agree, otherwise both are returned as the error.
    fn combine<F>(self, later: Cell<T>, same: F) -> Result<Cell<T>, (T, T)>
    where
        F: Fn(&T, &T) -> bool,
    {
        match (self, later) {
            (Cell::Observed(a), Cell::Observed(b)) => {
                if same(&a, &b) {
                    Ok(Cell::Observed(a))
                } else {
                    Err((a, b))
                }
            }
            (Cell::Observed(a), _) => Ok(Cell::Observed(a)),
            (_, Cell::Observed(b)) => Ok(Cell::Observed(b)),
            (Cell::Filled(_), Cell::Filled(b)) => Ok(Cell::Filled(b)),
            (Cell::Filled(a), Cell::Null) => Ok(Cell::Filled(a)),
            (Cell::Null, later) => Ok(later),
        }
    }
}

struct Pending {
    time: Timestamp,
    sources: SourceSet,
    host: Cell<Ustr>,
    task_uuid: Cell<Ustr>,
    task_name: Cell<Ustr>,
    task_number: Cell<u32>,
    values: Vec<Cell<Value>>,
}

impl Pending {
    fn into_row(self) -> Row {
        Row {
            time: self.time,
            sources: self.sources,
            ids: Ids {
                host: self.host.value(),
                task_uuid: self.task_uuid.value(),
                task_name: self.task_name.value(),
                task_number: self.task_number.value(),
            },
            values: self.values.iter().map(|c| c.value()).collect(),
        }
    }
}

/// Merge streams of normalized events into a timeline.  Each inner vector is one source stream; the
/// order of the streams is the arrival order used to break ties between equal timestamps.

pub fn merge(streams: Vec<Vec<Event>>, options: &MergeOptions) -> Result<Timeline, ReconcileError> {
    let schema = streams
        .iter()
        .flatten()
        .flat_map(|e| e.fields.keys().copied())
        .collect::<BTreeSet<Ustr>>()
        .into_iter()
        .collect::<Vec<Ustr>>();
    let index = schema
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, i))
        .collect::<HashMap<Ustr, usize>>();
    log::debug!("merge: {} streams, {} columns", streams.len(), schema.len());

    let mut pending = streams
        .into_iter()
        .flatten()
        .map(|e| {
            let mut values = vec![Cell::Null; schema.len()];
            for (name, v) in e.fields.iter() {
                values[index[name]] = Cell::from_option(*v);
            }
            Pending {
                time: e.time,
                sources: SourceSet::single(e.source),
                host: Cell::from_option(e.ids.host),
                task_uuid: Cell::from_option(e.ids.task_uuid),
                task_name: Cell::from_option(e.ids.task_name),
                task_number: Cell::from_option(e.ids.task_number),
                values,
            }
        })
        .collect::<Vec<Pending>>();

    pending.sort_by_key(|p| p.time);

    let fillable = schema
        .iter()
        .map(|name| !options.instantaneous.iter().any(|prefix| name.starts_with(prefix.as_str())))
        .collect::<Vec<bool>>();
    forward_fill(&mut pending, &fillable);

    let rows = collapse(pending, &schema)?;
    debug_assert!(rows.windows(2).all(|w| w[0].time < w[1].time));
    log::debug!("merge: {} rows after collapsing", rows.len());

    let timeline = Timeline::from_parts(schema, rows);
    Ok(match options.window {
        Some((start, stop)) => timeline.trim(start, stop),
        None => timeline,
    })
}

// Carry the last seen value of every fillable column forward into nulls.  Identifiers: the task
// name and uuid persist, the host and task number describe only the event they are on.

fn forward_fill(pending: &mut [Pending], fillable: &[bool]) {
    let mut last: Vec<Option<Value>> = vec![None; fillable.len()];
    let mut last_uuid = None;
    let mut last_name = None;
    for p in pending.iter_mut() {
        for (i, cell) in p.values.iter_mut().enumerate() {
            if let Cell::Observed(v) = cell {
                last[i] = Some(*v);
            } else if fillable[i] {
                cell.fill_from(&last[i]);
            }
        }
        if let Cell::Observed(v) = p.task_uuid {
            last_uuid = Some(v);
        }
        if let Cell::Observed(v) = p.task_name {
            last_name = Some(v);
        }
        p.task_uuid.fill_from(&last_uuid);
        p.task_name.fill_from(&last_name);
    }
}

fn collapse(pending: Vec<Pending>, schema: &[Ustr]) -> Result<Vec<Row>, ReconcileError> {
    let merged = pending.into_iter().try_fold(Vec::<Pending>::new(), |mut acc, p| {
        match acc.last_mut() {
            Some(prev) if prev.time == p.time => absorb(prev, p, schema)?,
            _ => acc.push(p),
        }
        Ok::<Vec<Pending>, ReconcileError>(acc)
    })?;
    Ok(merged.into_iter().map(Pending::into_row).collect())
}

fn absorb(prev: &mut Pending, p: Pending, schema: &[Ustr]) -> Result<(), ReconcileError> {
    let t = p.time;
    let conflict = |field: &str, left: String, right: String| ReconcileError::MergeConflict {
        time: t,
        field: field.to_string(),
        left,
        right,
    };
    prev.sources = prev.sources.union(p.sources);
    // The host is a label, not a reading; the first one wins.
    prev.host = prev.host.combine(p.host, |_, _| true).unwrap_or(prev.host);
    prev.task_uuid = prev
        .task_uuid
        .combine(p.task_uuid, |a, b| a == b)
        .map_err(|(a, b)| conflict("task_uuid", a.to_string(), b.to_string()))?;
    prev.task_name = prev
        .task_name
        .combine(p.task_name, |a, b| a == b)
        .map_err(|(a, b)| conflict("task_name", a.to_string(), b.to_string()))?;
    prev.task_number = prev
        .task_number
        .combine(p.task_number, |a, b| a == b)
        .map_err(|(a, b)| conflict("task_number", a.to_string(), b.to_string()))?;
    for (i, (mine, theirs)) in prev.values.iter_mut().zip(p.values).enumerate() {
        *mine = mine
            .combine(theirs, |a, b| a.same(b))
            .map_err(|(a, b)| conflict(schema[i].as_str(), a.to_string(), b.to_string()))?;
    }
    Ok(())
}

/// Check that task numbers never decrease along the timeline.  The first inversion is returned;
/// the timeline is not corrected.

pub fn check_task_order(timeline: &Timeline) -> Result<(), ReconcileError> {
    let mut previous: Option<u32> = None;
    for row in timeline.rows() {
        if let Some(current) = row.ids.task_number {
            if let Some(prev) = previous {
                if current < prev {
                    return Err(ReconcileError::TimelineOrdering {
                        time: row.time,
                        previous: prev,
                        current,
                    });
                }
            }
            previous = Some(current);
        }
    }
    Ok(())
}

/// The first and last time of a stream.

pub fn stream_window(events: &[Event]) -> Option<(Timestamp, Timestamp)> {
    let first = events.iter().map(|e| e.time).min()?;
    let last = events.iter().map(|e| e.time).max()?;
    Some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Sample, Source};
    use chrono::Duration;
    use ustr::ustr;

    fn at(secs: i64) -> Timestamp {
        benchutils::parse_iso("2019-02-11T16:13:00").unwrap().0 + Duration::seconds(secs)
    }

    fn ev(secs: i64, source: Source, fields: &[(&str, i64)]) -> Event {
        let mut e = Sample::new(at(secs), source);
        for (k, v) in fields {
            e.put(k, *v);
        }
        e
    }

    #[test]
    fn test_disjoint_fields_collapse() {
        let a = vec![ev(1, Source::Top, &[("x", 5)])];
        let b = vec![ev(1, Source::Ps, &[("y", 9)])];
        let tl = merge(vec![a, b], &MergeOptions { instantaneous: vec![], window: None }).unwrap();
        assert!(tl.len() == 1);
        let r = &tl.rows()[0];
        assert!(tl.lookup(r, "x") == Some(Value::Int(5)));
        assert!(tl.lookup(r, "y") == Some(Value::Int(9)));
        assert!(r.sources.to_string() == "top+ps");
    }

    #[test]
    fn test_conflict() {
        let a = vec![ev(1, Source::Top, &[("x", 5)])];
        let b = vec![ev(1, Source::Ps, &[("x", 7)])];
        match merge(vec![a, b], &MergeOptions::default()) {
            Err(ReconcileError::MergeConflict { field, left, right, .. }) => {
                assert!(field == "x");
                assert!(left == "5" && right == "7");
            }
            _ => assert!(false),
        }
    }

    #[test]
    fn test_equal_values_do_not_conflict() {
        let a = vec![ev(1, Source::Top, &[("x", 5)])];
        let mut e = Sample::new(at(1), Source::Ps);
        e.put("x", 5.0);
        let tl = merge(vec![a, vec![e]], &MergeOptions::default()).unwrap();
        assert!(tl.len() == 1);
    }

    #[test]
    fn test_forward_fill() {
        let mut s = vec![];
        let mut e = Sample::new(at(1), Source::Syslog);
        e.put("state", "A");
        e.put("top_load", 3);
        s.push(e);
        s.push(Sample::new(at(2), Source::Syslog));
        s.push(Sample::new(at(5), Source::Syslog));
        let tl = merge(vec![s], &MergeOptions::default()).unwrap();
        let states = tl.rows().iter().map(|r| tl.lookup(r, "state")).collect::<Vec<Option<Value>>>();
        assert!(states == vec![Some(Value::from("A")); 3]);
        let loads = tl.rows().iter().map(|r| tl.lookup(r, "top_load")).collect::<Vec<Option<Value>>>();
        assert!(loads == vec![Some(Value::Int(3)), None, None]);
    }

    #[test]
    fn test_schema_complete_and_sorted() {
        let a = vec![ev(3, Source::Top, &[("b", 1)]), ev(1, Source::Top, &[("a", 1)])];
        let b = vec![ev(2, Source::Vmstat, &[("c", 1)]), ev(2, Source::Vmstat, &[("d", 4)])];
        let tl = merge(vec![a, b], &MergeOptions { instantaneous: vec![], window: None }).unwrap();
        assert!(tl.schema() == &[ustr("a"), ustr("b"), ustr("c"), ustr("d")]);
        assert!(tl.rows().iter().all(|r| r.values.len() == 4));
        let times = tl.rows().iter().map(|r| r.time).collect::<Vec<Timestamp>>();
        assert!(times == vec![at(1), at(2), at(3)]);
        // The first row precedes every observation of b, c and d.
        assert!(tl.rows()[0].values[1..].iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_filled_value_yields_to_observed() {
        // x=5 at t=1 is carried to the first event at t=2, which then meets x=7 observed at t=2.
        let a = vec![ev(1, Source::Top, &[("x", 5)]), ev(2, Source::Top, &[("y", 1)])];
        let b = vec![ev(2, Source::Ps, &[("x", 7)])];
        let tl = merge(vec![a, b], &MergeOptions { instantaneous: vec![], window: None }).unwrap();
        assert!(tl.lookup(&tl.rows()[1], "x") == Some(Value::Int(7)));
    }

    #[test]
    fn test_task_identifiers() {
        let mut e1 = ev(1, Source::Baseline, &[]);
        e1.ids = Ids::task(Some(ustr("u1")), Some(ustr("first")), Some(1));
        e1.ids.host = Some(ustr("h1"));
        let e2 = ev(2, Source::Ps, &[("x", 1)]);
        let tl = merge(vec![vec![e1], vec![e2]], &MergeOptions::default()).unwrap();
        let r = &tl.rows()[1];
        assert!(r.ids.task_name == Some(ustr("first")));
        assert!(r.ids.task_uuid == Some(ustr("u1")));
        assert!(r.ids.task_number.is_none());
        assert!(r.ids.host.is_none());
    }

    #[test]
    fn test_window() {
        let a = (0..10).map(|i| ev(i, Source::Ps, &[("x", i)])).collect::<Vec<Event>>();
        let opts = MergeOptions { instantaneous: vec![], window: Some((at(2), at(4))) };
        let tl = merge(vec![a], &opts).unwrap();
        assert!(tl.len() == 3);
        assert!(tl.window() == Some((at(2), at(4))));
    }

    #[test]
    fn test_task_order() {
        let mk = |secs: i64, n: u32| {
            let mut e = ev(secs, Source::Baseline, &[]);
            e.ids.task_number = Some(n);
            e
        };
        let tl = merge(vec![vec![mk(1, 1), mk(2, 2), mk(3, 2)]], &MergeOptions::default()).unwrap();
        assert!(check_task_order(&tl).is_ok());
        let tl = merge(vec![vec![mk(1, 1), mk(2, 3), mk(3, 2)]], &MergeOptions::default()).unwrap();
        assert!(
            check_task_order(&tl)
                == Err(ReconcileError::TimelineOrdering { time: at(3), previous: 3, current: 2 })
        );
    }
}
