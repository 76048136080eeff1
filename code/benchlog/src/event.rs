/// The record type that every source parser produces and that the reconciler consumes.
///
/// A sample has a timestamp, the source it came from, a handful of typed identifiers (host and
/// task), and an open map of metric fields.  Field names carry the source as a prefix (`top_*`,
/// `vmstat_*`, ...) except for the strategy and baseline fields, which are unprefixed.
use benchutils::{format_timestamp, Timestamp};
use chrono::FixedOffset;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ustr::{ustr, Ustr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Baseline,
    Top,
    Vmstat,
    Netdev,
    Syslog,
    Perf,
    Ps,
    Cgroup,
}

impl Source {
    pub fn all() -> [Source; 8] {
        [
            Source::Baseline,
            Source::Top,
            Source::Vmstat,
            Source::Netdev,
            Source::Syslog,
            Source::Perf,
            Source::Ps,
            Source::Cgroup,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Source::Baseline => "baseline",
            Source::Top => "top",
            Source::Vmstat => "vmstat",
            Source::Netdev => "netdev",
            Source::Syslog => "syslog",
            Source::Perf => "perf",
            Source::Ps => "ps",
            Source::Cgroup => "cgroup",
        }
    }

    fn bit(&self) -> u16 {
        1 << (*self as u16)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Source, String> {
        Source::all()
            .into_iter()
            .find(|src| src.name() == s)
            .ok_or_else(|| format!("Unknown source '{s}'"))
    }
}

/// The set of sources that contributed to a merged row.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSet(u16);

impl SourceSet {
    pub fn single(src: Source) -> SourceSet {
        SourceSet(src.bit())
    }

    pub fn contains(&self, src: Source) -> bool {
        self.0 & src.bit() != 0
    }

    pub fn union(&self, other: SourceSet) -> SourceSet {
        SourceSet(self.0 | other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Source> + '_ {
        Source::all().into_iter().filter(|src| self.contains(*src))
    }
}

impl fmt::Display for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.iter().map(|s| s.name()).collect::<Vec<&str>>();
        f.write_str(&names.join("+"))
    }
}

/// A metric value.  Integers and floats compare equal if they denote the same number, see `same`.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(Ustr),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(_) => None,
        }
    }

    /// Equality for the purpose of conflict detection: 5 and 5.0 are the same reading.

    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Text(_), _) | (_, Value::Text(_)) => false,
            (Value::Int(a), Value::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(i) => serde_json::Value::from(*i),
            // NaN and infinities are not representable; those become null.
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Text(s) => f.write_str(s.as_str()),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Value {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Value {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Value {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Text(ustr(s))
    }
}

impl From<Ustr> for Value {
    fn from(s: Ustr) -> Value {
        Value::Text(s)
    }
}

/// Metric fields, keyed by name.  An explicit None is a field the source knows about but had no
/// reading for.

pub type Fields = BTreeMap<Ustr, Option<Value>>;

/// Typed identifiers.  `task_number` is 1-based.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ids {
    pub host: Option<Ustr>,
    pub task_uuid: Option<Ustr>,
    pub task_name: Option<Ustr>,
    pub task_number: Option<u32>,
}

impl Ids {
    pub fn task(uuid: Option<Ustr>, name: Option<Ustr>, number: Option<u32>) -> Ids {
        Ids {
            host: None,
            task_uuid: uuid,
            task_name: name,
            task_number: number,
        }
    }
}

/// A timestamp as found in the log, before clock normalization.

#[derive(Debug, Clone, PartialEq)]
pub enum RawTime {
    /// ISO text in the reference frame, or with an explicit offset.
    Iso(String),

    /// ISO text without offset, in the local zone of the machine that wrote the log.
    LocalIso(String),

    /// ISO text without offset, in a known zone.
    IsoIn(String, FixedOffset),

    /// HH:MM:SS with no date and no zone.
    TimeOfDay(String),

    /// UNIX seconds, to be rendered in the local zone.
    Epoch(f64),

    /// UNIX seconds, to be rendered in a known zone.
    EpochIn(f64, FixedOffset),

    /// Already normalized.
    At(Timestamp),
}

impl fmt::Display for RawTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawTime::Iso(s) | RawTime::LocalIso(s) | RawTime::TimeOfDay(s) => f.write_str(s),
            RawTime::IsoIn(s, z) => write!(f, "{s} {z}"),
            RawTime::Epoch(x) => write!(f, "{x}"),
            RawTime::EpochIn(x, z) => write!(f, "{x} {z}"),
            RawTime::At(t) => f.write_str(&format_timestamp(t)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub time: T,
    pub source: Source,
    pub ids: Ids,
    pub fields: Fields,
}

/// A sample straight out of a parser.

pub type RawEvent = Sample<RawTime>;

/// A sample whose timestamp is in the reference frame.

pub type Event = Sample<Timestamp>;

impl<T> Sample<T> {
    pub fn new(time: T, source: Source) -> Sample<T> {
        Sample {
            time,
            source,
            ids: Ids::default(),
            fields: Fields::new(),
        }
    }

    pub fn with_ids(mut self, ids: Ids) -> Sample<T> {
        self.ids = ids;
        self
    }

    pub fn with(mut self, name: &str, v: impl Into<Value>) -> Sample<T> {
        self.put(name, v);
        self
    }

    pub fn put(&mut self, name: &str, v: impl Into<Value>) {
        self.fields.insert(ustr(name), Some(v.into()));
    }

    pub fn put_opt<V: Into<Value>>(&mut self, name: &str, v: Option<V>) {
        self.fields.insert(ustr(name), v.map(|v| v.into()));
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.get(&ustr(name)).copied().flatten()
    }

    pub fn retime<U>(self, time: U) -> Sample<U> {
        Sample {
            time,
            source: self.source,
            ids: self.ids,
            fields: self.fields,
        }
    }
}

/// The output of one parser over one artifact.  `discarded` counts lines that were skipped.

#[derive(Debug, Clone)]
pub struct RawStream {
    pub source: Source,
    pub events: Vec<RawEvent>,
    pub discarded: usize,
}

impl RawStream {
    pub fn new(source: Source) -> RawStream {
        RawStream {
            source,
            events: vec![],
            discarded: 0,
        }
    }
}

#[test]
fn test_value_same() {
    assert!(Value::Int(5).same(&Value::Float(5.0)));
    assert!(!Value::Int(5).same(&Value::Int(7)));
    assert!(!Value::Int(5).same(&Value::from("5")));
    assert!(Value::from("a").same(&Value::Text(ustr("a"))));
    assert!(Value::Float(f64::NAN).to_json().is_null());
    assert!(Value::Float(2.0).to_string() == "2.0");
    assert!(Value::Float(2.25).to_string() == "2.25");
}

#[test]
fn test_source_set() {
    let s = SourceSet::single(Source::Top).union(SourceSet::single(Source::Baseline));
    assert!(s.contains(Source::Top));
    assert!(!s.contains(Source::Ps));
    assert!(s.to_string() == "baseline+top");
    assert!("vmstat".parse::<Source>().unwrap() == Source::Vmstat);
    assert!("nope".parse::<Source>().is_err());
}

#[test]
fn test_sample_fields() {
    let mut e = Sample::new(1.0, Source::Ps).with("ps_cpu", 2.5);
    e.put_opt::<i64>("ps_mem", None);
    assert!(e.get("ps_cpu") == Some(Value::Float(2.5)));
    assert!(e.get("ps_mem").is_none());
    assert!(e.fields.len() == 2);

    let e = Sample::new(1.0, Source::Baseline).with("hosts", 4).with("forks", 20u32);
    assert!(e.get("hosts") == Some(Value::Int(4)));
    assert!(e.get("forks").unwrap().same(&Value::Float(20.0)));
}
