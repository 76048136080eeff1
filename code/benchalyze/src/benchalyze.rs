/// `benchalyze` -- Reconcile the logs of a playbook benchmark run
///
/// Run with --help for brief help.
///
/// Quirks
///
/// The results directory is read once per invocation and every source is parsed even when only
/// one is printed (`parse`), because the clock anchor of the other sources comes from the
/// baseline.
///
/// Settings come from the config file first and are then overridden by the command line.  The
/// boolean flags (--no-align, --no-trim, --strict) can only move a setting away from its default,
/// so a config file that has already done that cannot be undone from the command line.
mod format;
mod metadata;
mod parse;
mod record;
mod report;
mod tasks;

use anyhow::{Context, Result};
use benchlog::{load_results, read_report_settings, ReportSettings, Source};
use benchutils::{parse_date, parse_zone};
use chrono::{FixedOffset, NaiveDate};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log more: -v for progress, -vv for pipeline details (RUST_LOG overrides)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Reconcile all the logs of a run and print the merged timeline
    Report(ReportCmdArgs),

    /// Parse one source of a run and print its events with normalized timestamps
    Parse(ParseCmdArgs),

    /// Print how long each host spent on each task
    Tasks(TasksCmdArgs),

    /// Print the run information: hardware, command line, environment
    Metadata(MetadataCmdArgs),

    /// Run a command with a background process sampler and record the run window
    Record(RecordCmdArgs),
}

#[derive(Args, Debug)]
pub struct ReportCmdArgs {
    #[command(flatten)]
    input_args: InputArgs,

    #[command(flatten)]
    settings_args: SettingsArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    /// Write the timeline as JSON records to this file instead of printing it
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ParseCmdArgs {
    #[command(flatten)]
    input_args: InputArgs,

    #[command(flatten)]
    settings_args: SettingsArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    /// The source to print: baseline, top, vmstat, netdev, syslog, perf, ps, cgroup
    #[arg(long, short)]
    source: Source,
}

#[derive(Args, Debug)]
pub struct TasksCmdArgs {
    #[command(flatten)]
    input_args: InputArgs,

    #[command(flatten)]
    print_args: PrintArgs,
}

#[derive(Args, Debug)]
pub struct MetadataCmdArgs {
    #[command(flatten)]
    input_args: InputArgs,

    #[command(flatten)]
    print_args: PrintArgs,
}

#[derive(Args, Debug)]
pub struct RecordCmdArgs {
    /// Directory to write ps.log and the meta file to (created if needed)
    #[arg(long)]
    results_dir: PathBuf,

    /// The number of forks the job runs with, recorded in the meta file
    #[arg(long)]
    forks: Option<u32>,

    /// The number of hosts the job runs against, recorded in the meta file
    #[arg(long)]
    hosts: Option<u32>,

    /// Milliseconds between process snapshots
    #[arg(long, default_value_t = 100)]
    interval: u64,

    /// The command to run, after `--`
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct InputArgs {
    /// The results directory of the run
    results_dir: PathBuf,
}

#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Read report settings from this JSON file, the options below override it
    #[arg(long)]
    config_file: Option<String>,

    /// Zone of the reference frame, a name like EDT or an offset like +02:00 [default: UTC]
    #[arg(long, value_parser = parse_zone_arg)]
    timezone: Option<FixedOffset>,

    /// Zone of the clock of the controller that wrote the logs [default: this machine's]
    #[arg(long, value_parser = parse_zone_arg)]
    local_timezone: Option<FixedOffset>,

    /// Date (YYYY-MM-DD) for sources that record only the time of day [default: the date of the
    /// first baseline event, or a date in the directory name]
    #[arg(long, value_parser = parse_date_arg)]
    date: Option<NaiveDate>,

    /// Convert unknown-frame timestamps exactly, without rounding the offset to whole hours
    #[arg(long, default_value_t = false)]
    no_align: bool,

    /// Fields with this name prefix are never forward-filled (repeatable) [default: top_]
    #[arg(long)]
    instantaneous: Vec<String>,

    /// Keep the samples outside the run window
    #[arg(long, default_value_t = false)]
    no_trim: bool,

    /// Fail, rather than warn, if task numbers go backwards in time
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Args, Debug, Default)]
pub struct PrintArgs {
    /// Select fields and format for the output [more with --fmt=help]
    #[arg(long)]
    fmt: Option<String>,
}

fn parse_zone_arg(s: &str) -> Result<FixedOffset, String> {
    parse_zone(s).map_err(|e| e.to_string())
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).map_err(|e| e.to_string())
}

fn main() {
    match benchalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {:#}", msg);
            process::exit(1);
        }
    }
}

fn benchalyze() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Commands::Version = cli.command {
        // Syntax:
        //   version-info ::= "benchalyze" "version(" major "." minor "." bugfix ")" "features(" ... ")"
        //
        //  - "features" carries a comma-separated list of enabled features
        cfg_if::cfg_if! {
            if #[cfg(feature = "parallel")] {
                println!("benchalyze version(0.1.0) features(parallel)");
            } else {
                println!("benchalyze version(0.1.0) features()");
            }
        }
        return Ok(());
    }

    let wants_help = match cli.command {
        Commands::Report(ref args) => format::maybe_help(&args.print_args.fmt, report::fmt_help),
        Commands::Parse(ref args) => format::maybe_help(&args.print_args.fmt, parse::fmt_help),
        Commands::Tasks(ref args) => format::maybe_help(&args.print_args.fmt, tasks::fmt_help),
        Commands::Metadata(ref args) => format::maybe_help(&args.print_args.fmt, metadata::fmt_help),
        Commands::Version | Commands::Record(_) => false,
    };
    if wants_help {
        return Ok(());
    }

    let mut stdout = io::stdout();
    match cli.command {
        Commands::Version => {}
        Commands::Record(ref args) => {
            record::record(args)?;
        }
        Commands::Report(ref args) => {
            let settings = report_settings(&args.settings_args)?;
            let run = load_results(&args.input_args.results_dir)?;
            let timeline = benchlog::build_timeline(&run, &settings)?;
            log::info!("{} rows, {} columns", timeline.len(), timeline.schema().len());
            match args.output {
                Some(ref filename) => report::write_json(filename, &timeline)?,
                None => report::print(&mut stdout, &args.print_args, &settings, &timeline)?,
            }
        }
        Commands::Parse(ref args) => {
            let settings = report_settings(&args.settings_args)?;
            let run = load_results(&args.input_args.results_dir)?;
            let events = benchlog::source_events(&run, &settings, args.source)?;
            log::info!("{} {} events", events.len(), args.source);
            parse::print(&mut stdout, &args.print_args, &events)?;
        }
        Commands::Tasks(ref args) => {
            let run = load_results(&args.input_args.results_dir)?;
            tasks::print(&mut stdout, &args.print_args, run.task_host_spans())?;
        }
        Commands::Metadata(ref args) => {
            let run = load_results(&args.input_args.results_dir)?;
            metadata::print(&mut stdout, &args.print_args, &run)?;
        }
    }
    // Ignore errors here, they are common for broken pipelines
    let _ = stdout.flush();
    Ok(())
}

// The config file is read first, the command line overrides it.
fn report_settings(args: &SettingsArgs) -> Result<ReportSettings> {
    let mut settings = match args.config_file {
        Some(ref filename) => {
            read_report_settings(filename).with_context(|| format!("Reading config file {filename}"))?
        }
        None => ReportSettings::default(),
    };
    if let Some(tz) = args.timezone {
        settings.timezone = tz;
    }
    if let Some(tz) = args.local_timezone {
        settings.local_timezone = tz;
    }
    if args.date.is_some() {
        settings.date = args.date;
    }
    if args.no_align {
        settings.align_hours = false;
    }
    if !args.instantaneous.is_empty() {
        settings.instantaneous = args.instantaneous.clone();
    }
    if args.no_trim {
        settings.trim = false;
    }
    if args.strict {
        settings.strict_order = true;
    }
    Ok(settings)
}

#[test]
fn test_cli_parses() {
    use clap::CommandFactory;
    Cli::command().debug_assert();

    let cli = Cli::try_parse_from([
        "benchalyze",
        "report",
        "--timezone",
        "EDT",
        "--instantaneous",
        "top_",
        "--instantaneous",
        "ps_",
        "--no-trim",
        "-vv",
        "--fmt",
        "csv,all",
        "results/2019-02-11",
    ])
    .unwrap();
    assert!(cli.verbose == 2);
    let Commands::Report(args) = cli.command else {
        panic!("Expected report");
    };
    assert!(args.input_args.results_dir == PathBuf::from("results/2019-02-11"));
    assert!(args.print_args.fmt.as_deref() == Some("csv,all"));
    let settings = report_settings(&args.settings_args).unwrap();
    assert!(settings.timezone == FixedOffset::west_opt(4 * 3600).unwrap());
    assert!(settings.instantaneous == vec!["top_".to_string(), "ps_".to_string()]);
    assert!(!settings.trim);
    assert!(settings.align_hours);

    let cli = Cli::try_parse_from(["benchalyze", "parse", "--source", "vmstat", "dir"]).unwrap();
    let Commands::Parse(args) = cli.command else {
        panic!("Expected parse");
    };
    assert!(args.source == Source::Vmstat);
    assert!(Cli::try_parse_from(["benchalyze", "parse", "--source", "sar", "dir"]).is_err());

    let cli = Cli::try_parse_from([
        "benchalyze",
        "record",
        "--results-dir",
        "out",
        "--forks",
        "20",
        "--",
        "ansible-playbook",
        "site.yml",
    ])
    .unwrap();
    let Commands::Record(args) = cli.command else {
        panic!("Expected record");
    };
    assert!(args.forks == Some(20));
    assert!(args.interval == 100);
    assert!(args.command == vec!["ansible-playbook".to_string(), "site.yml".to_string()]);
}

#[test]
fn test_settings_from_config_file() {
    let args = SettingsArgs {
        config_file: Some("../tests/benchlog/settings.json".to_string()),
        strict: true,
        ..Default::default()
    };
    let settings = report_settings(&args).unwrap();
    assert!(settings.timezone == FixedOffset::west_opt(4 * 3600).unwrap());
    assert!(settings.date == NaiveDate::from_ymd_opt(2019, 2, 11));
    assert!(!settings.align_hours);
    assert!(settings.strict_order);

    let args = SettingsArgs {
        config_file: Some("../tests/benchlog/no-such-settings.json".to_string()),
        ..Default::default()
    };
    assert!(report_settings(&args).is_err());
}
