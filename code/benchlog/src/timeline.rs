/// The reconciled table.  A `Timeline` is built once by `merge` and then only transformed by methods
/// that consume it and return a new one.
///
/// Invariants:
///
/// - rows are sorted ascending by time and no two rows have the same time
/// - every row has exactly one value slot per schema column, None being an explicit null
/// - the schema is sorted by name and has no duplicates
use crate::event::{Ids, Source, SourceSet, Value};

use benchutils::{format_timestamp, Timestamp};
use ustr::Ustr;

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub time: Timestamp,
    pub sources: SourceSet,
    pub ids: Ids,
    pub values: Vec<Option<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    schema: Vec<Ustr>,
    rows: Vec<Row>,
}

/// Identifier columns, which are not part of the schema but can be looked up by name.

pub const ID_COLUMNS: [&str; 4] = ["host", "task_name", "task_number", "task_uuid"];

impl Timeline {
    pub(crate) fn from_parts(schema: Vec<Ustr>, rows: Vec<Row>) -> Timeline {
        debug_assert!(schema.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(rows.windows(2).all(|w| w[0].time < w[1].time));
        debug_assert!(rows.iter().all(|r| r.values.len() == schema.len()));
        Timeline { schema, rows }
    }

    pub fn schema(&self) -> &[Ustr] {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.schema.binary_search_by(|c| c.as_str().cmp(name)).ok()
    }

    /// Look up a metric or identifier by name.

    pub fn lookup(&self, row: &Row, name: &str) -> Option<Value> {
        match name {
            "host" => row.ids.host.map(Value::Text),
            "task_name" => row.ids.task_name.map(Value::Text),
            "task_uuid" => row.ids.task_uuid.map(Value::Text),
            "task_number" => row.ids.task_number.map(Value::from),
            _ => self.column(name).and_then(|ix| row.values[ix]),
        }
    }

    /// The first and last time in the timeline.

    pub fn window(&self) -> Option<(Timestamp, Timestamp)> {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => Some((first.time, last.time)),
            _ => None,
        }
    }

    /// Keep the rows in [start, stop].

    pub fn trim(mut self, start: Timestamp, stop: Timestamp) -> Timeline {
        self.rows.retain(|r| r.time >= start && r.time <= stop);
        self
    }

    /// Add a column, or replace it if it is already present.  `values` has one entry per row.

    pub fn with_column(mut self, name: Ustr, mut values: Vec<Option<Value>>) -> Timeline {
        assert!(values.len() == self.rows.len());
        match self.schema.binary_search(&name) {
            Ok(ix) => {
                for (row, v) in self.rows.iter_mut().zip(values.drain(..)) {
                    row.values[ix] = v;
                }
            }
            Err(ix) => {
                self.schema.insert(ix, name);
                for (row, v) in self.rows.iter_mut().zip(values.drain(..)) {
                    row.values.insert(ix, v);
                }
            }
        }
        self
    }

    /// Run-level constants: fill every null in the named columns, adding the columns if needed.

    pub fn with_defaults(mut self, defaults: &[(Ustr, Value)]) -> Timeline {
        for (name, v) in defaults {
            let ix = match self.schema.binary_search(name) {
                Ok(ix) => ix,
                Err(ix) => {
                    self.schema.insert(ix, *name);
                    for row in self.rows.iter_mut() {
                        row.values.insert(ix, None);
                    }
                    ix
                }
            };
            for row in self.rows.iter_mut() {
                if row.values[ix].is_none() {
                    row.values[ix] = Some(*v);
                }
            }
        }
        self
    }

    /// The first and last time of rows from `source` where `field` is positive.

    pub fn activity_window(&self, source: Source, field: &str) -> Option<(Timestamp, Timestamp)> {
        let mut active = self.rows.iter().filter(|r| {
            r.sources.contains(source)
                && self
                    .lookup(r, field)
                    .and_then(|v| v.as_f64())
                    .map(|x| x > 0.0)
                    .unwrap_or(false)
        });
        let first = active.next()?;
        let last = active.last().unwrap_or(first);
        Some((first.time, last.time))
    }

    /// One JSON object per row, with `time`, `source`, the identifiers, and every schema column.

    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut obj = serde_json::Map::new();
                obj.insert("time".to_string(), format_timestamp(&r.time).into());
                obj.insert("source".to_string(), r.sources.to_string().into());
                for id in ID_COLUMNS {
                    let v = self.lookup(r, id).map(|v| v.to_json()).unwrap_or(serde_json::Value::Null);
                    obj.insert(id.to_string(), v);
                }
                for (name, v) in self.schema.iter().zip(r.values.iter()) {
                    let v = v.map(|v| v.to_json()).unwrap_or(serde_json::Value::Null);
                    obj.insert(name.to_string(), v);
                }
                serde_json::Value::Object(obj)
            })
            .collect::<Vec<serde_json::Value>>();
        serde_json::Value::Array(rows)
    }
}

#[cfg(test)]
fn timeline_for_tests() -> Timeline {
    use ustr::ustr;
    let t0 = benchutils::parse_iso("2019-02-11T16:13:04").unwrap().0;
    let rows = (0..4)
        .map(|i| Row {
            time: t0 + chrono::Duration::seconds(i),
            sources: SourceSet::single(if i % 2 == 0 { Source::Top } else { Source::Ps }),
            ids: Ids::task(None, None, Some(1)),
            values: vec![Some(Value::Int(i)), if i == 1 { None } else { Some(Value::Int(0)) }],
        })
        .collect::<Vec<Row>>();
    Timeline::from_parts(vec![ustr("a"), ustr("b")], rows)
}

#[test]
fn test_lookup_and_columns() {
    use ustr::ustr;
    let tl = timeline_for_tests();
    assert!(tl.column("b") == Some(1));
    assert!(tl.column("c").is_none());
    let r = &tl.rows()[2];
    assert!(tl.lookup(r, "a") == Some(Value::Int(2)));
    assert!(tl.lookup(r, "task_number") == Some(Value::Int(1)));
    assert!(tl.lookup(r, "host").is_none());

    let tl = tl.with_column(ustr("aa"), vec![None, None, Some(Value::Int(9)), None]);
    assert!(tl.schema() == &[ustr("a"), ustr("aa"), ustr("b")]);
    assert!(tl.lookup(&tl.rows()[2], "aa") == Some(Value::Int(9)));
    assert!(tl.lookup(&tl.rows()[2], "b") == Some(Value::Int(0)));
}

#[test]
fn test_defaults_fill_only_nulls() {
    use ustr::ustr;
    let tl = timeline_for_tests().with_defaults(&[(ustr("b"), Value::Int(7)), (ustr("forks"), Value::Int(5))]);
    assert!(tl.lookup(&tl.rows()[0], "b") == Some(Value::Int(0)));
    assert!(tl.lookup(&tl.rows()[1], "b") == Some(Value::Int(7)));
    assert!(tl.rows().iter().all(|r| tl.lookup(r, "forks") == Some(Value::Int(5))));
}

#[test]
fn test_trim_and_activity() {
    let tl = timeline_for_tests();
    let (first, last) = tl.window().unwrap();
    let (a0, a1) = tl.activity_window(Source::Top, "a").unwrap();
    assert!(a0 == a1 && a0 == first + chrono::Duration::seconds(2));
    assert!(tl.activity_window(Source::Top, "b").is_none());
    let tl = tl.trim(first + chrono::Duration::seconds(1), last);
    assert!(tl.len() == 3);
}

#[test]
fn test_to_json() {
    let tl = timeline_for_tests();
    let j = tl.to_json();
    let first = &j.as_array().unwrap()[1];
    assert!(first["time"] == "2019-02-11T16:13:05.000000");
    assert!(first["source"] == "ps");
    assert!(first["task_number"] == 1);
    assert!(first["b"].is_null());
    assert!(first["host"].is_null());
}
