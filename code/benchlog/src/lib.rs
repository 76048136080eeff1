/// A playbook benchmark leaves behind a *results directory* with logs from several independent
/// *sources*: the playbook's own timing data, the benchmark strategy's host bookkeeping, and a
/// number of system samplers (`top`, `vmstat`, `/proc/net/dev`, `ps`, `perf`, cgroup accounting)
/// that ran next to it.  Each source has its own format, its own sampling times, and its own idea
/// of what time it is: some write ISO timestamps in a known zone, some write epoch seconds, and
/// `top` writes only a time of day.
///
/// This library reconstructs a single timeline from those logs.  The work breaks down into:
///
/// - Parse each log into a stream of *raw samples*, with the timestamps left as they were found.
///   Malformed lines are counted and skipped.
///
/// - Normalize the clock of each stream into the *reference frame*, the wall-clock time of the
///   reference zone.  The earliest baseline timestamp is the anchor for streams whose frame is
///   not known.
///
/// - Merge the streams: union the fields, sort by time, forward-fill, and collapse samples with
///   equal times into one row, failing if two sources disagree about a value.
///
/// - Trim to the run, add the run constants, and derive percentage columns.
///
/// There is one invariant on the merged timeline: row times are strictly increasing.
mod baseline;
mod cgroup;
mod clock;
mod configs;
mod derive;
mod error;
mod event;
mod netdev;
mod perf;
mod ps;
mod reconcile;
mod results;
mod runinfo;
mod strategy;
mod syslog;
mod timeline;
mod top;
mod vmstat;

// The sample model: where a sample came from, its identifiers, and its fields.

pub use event::Event;
pub use event::Fields;
pub use event::Ids;
pub use event::RawEvent;
pub use event::RawStream;
pub use event::RawTime;
pub use event::Sample;
pub use event::Source;
pub use event::SourceSet;
pub use event::Value;

// Errors surfaced by the reconciler.

pub use error::ReconcileError;

// Move the timestamps of a stream into the reference frame.

pub use clock::normalize_clock;
pub use clock::normalize_clock_lenient;
pub use clock::ClockReference;

// Merge normalized streams into a timeline, and check it.

pub use reconcile::check_task_order;
pub use reconcile::merge;
pub use reconcile::stream_window;
pub use reconcile::MergeOptions;

// The merged table.

pub use timeline::Row;
pub use timeline::Timeline;
pub use timeline::ID_COLUMNS;

// Percentage columns computed from other columns.

pub use derive::derive_ratios;
pub use derive::ratio;
pub use derive::standard_ratios;
pub use derive::Ratio;

// Source parsers.  Each takes the text of one file.

pub use baseline::parse_baseline;
pub use cgroup::parse_cgroup;
pub use netdev::parse_netdev;
pub use perf::parse_perf;
pub use ps::parse_ps;
pub use syslog::parse_syslog;
pub use syslog::SyslogOptions;
pub use top::parse_top;
pub use vmstat::parse_vmstat;

// The benchmark strategy's files, and the per-task, per-host spans computed from them.

pub use strategy::parse_concurrent_hosts;
pub use strategy::parse_queue_starts;
pub use strategy::parse_run_meta;
pub use strategy::strategy_observations;
pub use strategy::task_host_spans;
pub use strategy::QueueStart;
pub use strategy::RunMeta;
pub use strategy::Snapshot;
pub use strategy::TaskHostSpan;

// Run information from stdout.log and the /proc copies.

pub use runinfo::RunInfo;

// Report settings, from a config file and the command line.

pub use configs::parse_report_settings;
pub use configs::read_report_settings;
pub use configs::ReportSettings;

// Load a results directory and run the whole pipeline on it.

pub use results::build_timeline;
pub use results::clock_reference;
pub use results::load_results;
pub use results::source_events;
pub use results::LoadedRun;
