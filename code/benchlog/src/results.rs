/// A results directory, as left behind by a benchmark run, and the pipeline that turns it into one
/// timeline.
///
/// The directory holds some subset of these files; anything missing is skipped:
///
/// ```text
/// <ts>_meta.json, <ts>_host_queue_starts.json, <ts>_concurrent_hosts.json   the strategy
/// baseline.json                                                             the json callback
/// top.log, vmstat.log, netdev.log, syslog.log, ps.log, perf.csv             samplers
/// cgroup_data/*.json                                                        cgroup accounting
/// stdout.log, proc.cpuinfo.txt, proc.meminfo.txt                            run information
/// ```
///
/// The text files are parsed in parallel (with the `parallel` feature).  The JSON files that
/// describe the run are required to be well-formed; the sampler logs are read leniently.
use crate::baseline::parse_baseline;
use crate::cgroup::parse_cgroup;
use crate::clock::{normalize_clock_lenient, ClockReference};
use crate::configs::ReportSettings;
use crate::derive::derive_ratios;
use crate::error::ReconcileError;
use crate::event::{Event, RawStream, Source, Value};
use crate::netdev::parse_netdev;
use crate::perf::parse_perf;
use crate::ps::parse_ps;
use crate::reconcile::{check_task_order, merge, stream_window, MergeOptions};
use crate::runinfo::RunInfo;
use crate::strategy::{
    parse_concurrent_hosts, parse_queue_starts, parse_run_meta, strategy_observations,
    task_host_spans, QueueStart, RunMeta, Snapshot, TaskHostSpan,
};
use crate::syslog::{parse_syslog, SyslogOptions};
use crate::timeline::Timeline;
use crate::top::parse_top;
use crate::vmstat::parse_vmstat;

use anyhow::{bail, Context, Result};
use benchutils::{parse_date, Timestamp};
use chrono::NaiveDate;
use itertools::Itertools;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use ustr::{ustr, Ustr};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Artifact {
    Baseline,
    Top,
    Vmstat,
    Netdev,
    Syslog,
    Ps,
    Perf,
    Cgroup,
}

const ARTIFACTS: [(Artifact, &str); 8] = [
    (Artifact::Baseline, "baseline.json"),
    (Artifact::Top, "top.log"),
    (Artifact::Vmstat, "vmstat.log"),
    (Artifact::Netdev, "netdev.log"),
    (Artifact::Syslog, "syslog.log"),
    (Artifact::Ps, "ps.log"),
    (Artifact::Perf, "perf.csv"),
    (Artifact::Cgroup, "cgroup_data"),
];

/// Everything read from one results directory, with the sampler timestamps still raw.

#[derive(Debug, Clone)]
pub struct LoadedRun {
    pub dir: PathBuf,
    pub meta: Option<RunMeta>,
    pub queue_starts: Vec<QueueStart>,
    pub snapshots: Vec<Snapshot>,
    pub streams: Vec<RawStream>,
    pub info: RunInfo,
}

impl LoadedRun {
    pub fn sources(&self) -> Vec<Source> {
        self.streams.iter().map(|s| s.source).sorted().dedup().collect()
    }

    pub fn task_host_spans(&self) -> Vec<TaskHostSpan> {
        match self.meta {
            Some(ref meta) => task_host_spans(meta, &self.queue_starts, &self.snapshots),
            None => vec![],
        }
    }
}

// The strategy writes its files with a timestamp prefix.  If there is more than one set, the
// last one is the most recent run.
fn find_by_suffix(names: &[String], suffix: &str) -> Option<String> {
    names.iter().filter(|n| n.ends_with(suffix)).max().cloned()
}

fn read_optional(dir: &Path, name: &str) -> Result<Option<String>> {
    let p = dir.join(name);
    if !p.is_file() {
        log::info!("{}: not present", p.display());
        return Ok(None);
    }
    let text = fs::read_to_string(&p).with_context(|| format!("Reading {}", p.display()))?;
    log::info!("{}: {} bytes", p.display(), text.len());
    Ok(Some(text))
}

fn read_cgroup_files(dir: &Path) -> Result<Vec<(String, String)>> {
    let mut files = vec![];
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".json") {
            files.push((name, fs::read_to_string(entry.path())?));
        }
    }
    files.sort();
    Ok(files)
}

struct LoadContext<'a> {
    dir: &'a Path,
    run_start: Option<f64>,
    syslog: SyslogOptions,
}

fn load_artifact(ctx: &LoadContext, artifact: Artifact, name: &str) -> Result<Option<RawStream>> {
    if artifact == Artifact::Cgroup {
        let p = ctx.dir.join(name);
        if !p.is_dir() {
            log::info!("{}: not present", p.display());
            return Ok(None);
        }
        return Ok(Some(parse_cgroup(&read_cgroup_files(&p)?)));
    }
    let Some(text) = read_optional(ctx.dir, name)? else {
        return Ok(None);
    };
    let stream = match artifact {
        Artifact::Baseline => parse_baseline(&text).with_context(|| format!("Parsing {name}"))?,
        Artifact::Top => parse_top(&text),
        Artifact::Vmstat => parse_vmstat(&text),
        Artifact::Netdev => parse_netdev(&text),
        Artifact::Syslog => parse_syslog(&text, ctx.syslog),
        Artifact::Ps => parse_ps(&text),
        Artifact::Perf => match ctx.run_start {
            Some(start) => parse_perf(&text, start),
            None => {
                log::warn!("{name}: no run start time, skipping");
                return Ok(None);
            }
        },
        // Read above
        Artifact::Cgroup => return Ok(None),
    };
    if stream.discarded > 0 {
        log::warn!("{name}: {} lines discarded", stream.discarded);
    }
    Ok(Some(stream))
}

cfg_if::cfg_if! {
    if #[cfg(feature = "parallel")] {
        fn load_artifacts(ctx: &LoadContext, artifacts: &[(Artifact, &str)]) -> Vec<Result<Option<RawStream>>> {
            use rayon::prelude::*;
            artifacts.par_iter().map(|(a, name)| load_artifact(ctx, *a, name)).collect()
        }
    } else {
        fn load_artifacts(ctx: &LoadContext, artifacts: &[(Artifact, &str)]) -> Vec<Result<Option<RawStream>>> {
            artifacts.iter().map(|(a, name)| load_artifact(ctx, *a, name)).collect()
        }
    }
}

pub fn load_results(dir: &Path) -> Result<LoadedRun> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }
    let mut names = vec![];
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().to_string());
    }

    let mut meta = None;
    if let Some(name) = find_by_suffix(&names, "_meta.json") {
        if let Some(text) = read_optional(dir, &name)? {
            meta = Some(parse_run_meta(&text).with_context(|| format!("Parsing {name}"))?);
        }
    }
    let mut queue_starts = vec![];
    if let Some(name) = find_by_suffix(&names, "_host_queue_starts.json") {
        if let Some(text) = read_optional(dir, &name)? {
            queue_starts = parse_queue_starts(&text).with_context(|| format!("Parsing {name}"))?;
        }
    }
    let mut snapshots = vec![];
    if let Some(name) = find_by_suffix(&names, "_concurrent_hosts.json") {
        if let Some(text) = read_optional(dir, &name)? {
            snapshots = parse_concurrent_hosts(&text).with_context(|| format!("Parsing {name}"))?;
        }
    }

    let mut info = RunInfo::new();
    if let Some(text) = read_optional(dir, "stdout.log")? {
        info.read_stdout_log(&text);
    }
    if let Some(text) = read_optional(dir, "proc.cpuinfo.txt")? {
        info.read_cpuinfo(&text);
    }
    if let Some(text) = read_optional(dir, "proc.meminfo.txt")? {
        info.read_meminfo(&text);
    }
    if let Some(ref m) = meta {
        info.forks = info.forks.or(m.forks);
        info.hosts = info.hosts.or(m.hosts);
    }

    // When nothing else numbers the tasks the syslog has to.
    let has_baseline = names.iter().any(|n| n == "baseline.json") || !snapshots.is_empty();
    let ctx = LoadContext {
        dir,
        run_start: meta.as_ref().map(|m| m.start),
        syslog: SyslogOptions {
            number_tasks: !has_baseline,
        },
    };

    let mut streams = vec![];
    if !snapshots.is_empty() {
        match meta {
            Some(ref m) => streams.push(strategy_observations(m, &queue_starts, &snapshots)),
            None => log::warn!("Concurrent-hosts data without a meta file, skipping"),
        }
    }
    for r in load_artifacts(&ctx, &ARTIFACTS) {
        if let Some(stream) = r? {
            streams.push(stream);
        }
    }

    Ok(LoadedRun {
        dir: dir.to_path_buf(),
        meta,
        queue_starts,
        snapshots,
        streams,
        info,
    })
}

// A YYYY-MM-DD somewhere in the directory name, eg results.2019-02-11T16:13:00.
fn date_from_dir_name(dir: &Path) -> Option<NaiveDate> {
    let name = dir.file_name()?.to_string_lossy().to_string();
    let re = Regex::new(r"\d{4}-\d{2}-\d{2}").ok()?;
    parse_date(re.find(&name)?.as_str()).ok()
}

fn normalize_stream(stream: &RawStream, reference: &ClockReference) -> Result<Vec<Event>> {
    let (events, errors) = normalize_clock_lenient(stream.events.clone(), reference);
    if let Some(first) = errors.first() {
        if events.is_empty() {
            let e = ReconcileError::from(first.clone());
            return Err(anyhow::Error::new(e).context(format!("No usable timestamps in {} data", stream.source)));
        }
        log::warn!("{}: {} samples dropped, first error: {first}", stream.source, errors.len());
    }
    Ok(events)
}

/// The clock reference for a run: the reference zone and local zone from the settings, the
/// anchor from the baseline, and the date from the settings, the anchor, or the directory name.

pub fn clock_reference(run: &LoadedRun, settings: &ReportSettings) -> Result<ClockReference> {
    let mut reference = ClockReference::new(settings.timezone);
    reference.local = settings.local_timezone;
    reference.align_hours = settings.align_hours;
    reference.anchor = baseline_window(run, &reference)?.map(|(first, _)| first);
    reference.date = settings
        .date
        .or(reference.anchor.map(|t| t.date()))
        .or_else(|| date_from_dir_name(&run.dir));
    log::debug!("Clock reference: {:?}", reference);
    Ok(reference)
}

// The baseline's own timestamps do not depend on the anchor.
fn baseline_window(run: &LoadedRun, reference: &ClockReference) -> Result<Option<(Timestamp, Timestamp)>> {
    let mut events = vec![];
    for stream in run.streams.iter().filter(|s| s.source == Source::Baseline) {
        events.extend(normalize_stream(stream, reference)?);
    }
    Ok(stream_window(&events))
}

// The baseline numbers the tasks.  Cgroup samples only carry the uuid of their task.
fn task_numbers(run: &LoadedRun) -> HashMap<Ustr, u32> {
    run.streams
        .iter()
        .filter(|s| s.source == Source::Baseline)
        .flat_map(|s| s.events.iter())
        .filter_map(|e| Some((e.ids.task_uuid?, e.ids.task_number?)))
        .collect()
}

fn number_tasks(events: &mut [Event], numbers: &HashMap<Ustr, u32>) {
    for e in events.iter_mut().filter(|e| e.ids.task_number.is_none()) {
        if let Some(n) = e.ids.task_uuid.and_then(|uuid| numbers.get(&uuid)) {
            e.ids.task_number = Some(*n);
        }
    }
}

fn normalize_source(
    stream: &RawStream,
    reference: &ClockReference,
    numbers: &HashMap<Ustr, u32>,
) -> Result<Vec<Event>> {
    let mut events = normalize_stream(stream, reference)?;
    if stream.source == Source::Cgroup {
        number_tasks(&mut events, numbers);
    }
    Ok(events)
}

/// The normalized events of one source.

pub fn source_events(run: &LoadedRun, settings: &ReportSettings, source: Source) -> Result<Vec<Event>> {
    let reference = clock_reference(run, settings)?;
    let numbers = task_numbers(run);
    let mut events = vec![];
    for stream in run.streams.iter().filter(|s| s.source == source) {
        events.extend(normalize_source(stream, &reference, &numbers)?);
    }
    events.sort_by_key(|e| e.time);
    Ok(events)
}

/// Normalize every stream, merge, trim to the run window, apply the run constants, derive the
/// ratios, and check the task order.

pub fn build_timeline(run: &LoadedRun, settings: &ReportSettings) -> Result<Timeline> {
    let reference = clock_reference(run, settings)?;
    let numbers = task_numbers(run);

    let mut streams = vec![];
    for stream in &run.streams {
        let events = normalize_source(stream, &reference, &numbers)?;
        log::debug!("{}: {} events", stream.source, events.len());
        streams.push(events);
    }

    let mut options = MergeOptions {
        instantaneous: settings.instantaneous.clone(),
        window: None,
    };
    if settings.trim {
        options.window = baseline_window(run, &reference)?;
    }
    let mut timeline = merge(streams, &options)?;
    if settings.trim && options.window.is_none() {
        match timeline.activity_window(settings.activity_source, &settings.activity_field) {
            Some((start, stop)) => {
                log::debug!("Trimming to {} activity", settings.activity_source);
                timeline = timeline.trim(start, stop);
            }
            None => log::warn!("No baseline and no activity window, not trimming"),
        }
    }

    let mut defaults = run.info.defaults();
    if let Some(ref meta) = run.meta {
        defaults.push((ustr("run_start"), Value::from(meta.start)));
        defaults.push((ustr("run_stop"), Value::from(meta.stop)));
    }
    let timeline = derive_ratios(timeline.with_defaults(&defaults), &settings.ratios);

    if let Err(e) = check_task_order(&timeline) {
        if settings.strict_order {
            return Err(e.into());
        }
        log::warn!("{e}");
    }
    log::info!("Timeline: {} rows, {} columns", timeline.len(), timeline.schema().len());
    Ok(timeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchutils::{format_timestamp, utc};

    fn settings_for_tests() -> ReportSettings {
        ReportSettings {
            local_timezone: utc(),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_fixture() {
        let run = load_results(Path::new("../tests/benchlog/run1")).unwrap();
        assert!(run.meta.as_ref().map(|m| m.forks) == Some(Some(2)));
        assert!(run.sources() == Source::all().to_vec());
        assert!(run.info.playbook.as_deref() == Some("site.yml"));
        assert!(run.info.cpus_total == Some(2));
        assert!(run.task_host_spans().len() == 3);
    }

    #[test]
    fn test_build_fixture_timeline() {
        let run = load_results(Path::new("../tests/benchlog/run1")).unwrap();
        let timeline = build_timeline(&run, &settings_for_tests()).unwrap();
        let (first, last) = timeline.window().unwrap();
        assert!(format_timestamp(&first) == "2019-02-11T16:13:00.000000");
        assert!(format_timestamp(&last) == "2019-02-11T16:13:20.000000");

        // Every row carries the run constants.
        for r in timeline.rows() {
            assert!(timeline.lookup(r, "forks") == Some(Value::Int(2)));
            assert!(timeline.lookup(r, "cpus_total") == Some(Value::Int(2)));
        }

        // The top sample at 16:13:04 lines up with the EDT vmstat sample.
        let row = timeline
            .rows()
            .iter()
            .find(|r| format_timestamp(&r.time) == "2019-02-11T16:13:04.000000")
            .unwrap();
        assert!(row.sources.contains(Source::Top));
        assert!(row.sources.contains(Source::Vmstat));
        assert!(timeline.lookup(row, "top_tasks") == Some(Value::Int(84)));
        assert!(timeline.lookup(row, "vmstat_free") == Some(Value::Int(1524804)));
        assert!(timeline.lookup(row, "task_name") == Some(Value::from("ping")));
        assert!(timeline.lookup(row, "mem_used_%").is_some());

        let numbers = timeline.rows().iter().filter_map(|r| r.ids.task_number).collect::<Vec<u32>>();
        assert!(numbers.windows(2).all(|w| w[0] <= w[1]));
        assert!(check_task_order(&timeline).is_ok());
    }

    #[test]
    fn test_cgroup_samples_get_task_numbers() {
        let run = load_results(Path::new("../tests/benchlog/run1")).unwrap();
        let settings = settings_for_tests();
        let timeline = build_timeline(&run, &settings).unwrap();
        let cgroup = timeline
            .rows()
            .iter()
            .filter(|r| r.sources.contains(Source::Cgroup))
            .map(|r| (format_timestamp(&r.time), r.ids.task_number))
            .collect::<Vec<(String, Option<u32>)>>();
        assert!(
            cgroup
                == vec![
                    ("2019-02-11T16:13:01.500000".to_string(), Some(1)),
                    ("2019-02-11T16:13:02.500000".to_string(), Some(1)),
                    ("2019-02-11T16:13:07.000000".to_string(), Some(2)),
                ]
        );

        let events = source_events(&run, &settings, Source::Cgroup).unwrap();
        assert!(events.iter().all(|e| e.ids.task_number.is_some()));
    }

    #[test]
    fn test_partial_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("top.log"), crate::top::TOP_FOR_TESTS).unwrap();
        fs::write(dir.path().join("vmstat.log"), crate::vmstat::VMSTAT_FOR_TESTS).unwrap();
        let run = load_results(dir.path()).unwrap();
        assert!(run.meta.is_none());
        assert!(run.sources() == vec![Source::Top, Source::Vmstat]);

        // Without a baseline or a date there is nothing to put the top times of day on.
        assert!(build_timeline(&run, &settings_for_tests()).is_err());

        let settings = ReportSettings {
            date: parse_date("2019-02-11").ok(),
            trim: false,
            ..settings_for_tests()
        };
        let timeline = build_timeline(&run, &settings).unwrap();
        assert!(timeline.len() == 3);
        let events = source_events(&run, &settings, Source::Top).unwrap();
        assert!(events.len() == 2);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("baseline.json"), "[{").unwrap();
        assert!(load_results(dir.path()).is_err());
        assert!(load_results(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_date_from_dir_name() {
        assert!(date_from_dir_name(Path::new("/x/results.2019-02-11T16:13:00.123")) == parse_date("2019-02-11").ok());
        assert!(date_from_dir_name(Path::new("/x/results")).is_none());
    }
}
