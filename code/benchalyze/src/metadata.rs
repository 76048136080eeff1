use crate::format;
use crate::PrintArgs;

use anyhow::Result;
use benchlog::LoadedRun;
use benchutils::{format_timestamp, from_epoch, utc};
use std::collections::HashMap;
use std::io;

struct Item {
    key: String,
    value: String,
}

pub fn print(output: &mut dyn io::Write, print_args: &PrintArgs, run: &LoadedRun) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = if let Some(ref fmt) = print_args.fmt {
        fmt
    } else {
        FMT_DEFAULTS
    };
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let mut opts = format::standard_options(&others);
    // `metadata` defaults to headerless csv, which reads as key,value lines.
    if !opts.fixed && !opts.csv && !opts.json && !opts.awk {
        opts.csv = true;
        opts.header = false;
    }
    format::format_data(output, &fields, &formatters, &opts, items(run), &false)
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters.keys().cloned().collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: FMT_DEFAULTS.to_string(),
    }
}

const FMT_DEFAULTS: &str = "all";

// The run window and the sources first, then the hardware and command line, then the raw
// environment and meminfo.
fn items(run: &LoadedRun) -> Vec<Item> {
    let mut items = vec![];
    let mut add = |key: &str, value: String| {
        items.push(Item {
            key: key.to_string(),
            value,
        })
    };
    add("results_dir", run.dir.display().to_string());
    if let Some(ref meta) = run.meta {
        for (key, secs) in [("run_start", meta.start), ("run_stop", meta.stop)] {
            match from_epoch(secs, utc()) {
                Ok(t) => add(key, format_timestamp(&t)),
                Err(e) => log::warn!("{key}: {e}"),
            }
        }
        add("run_duration", format!("{:.3}", meta.stop - meta.start));
    }
    add(
        "sources",
        run.sources().iter().map(|s| s.name()).collect::<Vec<&str>>().join("+"),
    );
    for (key, value) in run.info.defaults() {
        add(key.as_str(), value.to_string());
    }
    for (key, value) in &run.info.env {
        add(&format!("env.{key}"), value.clone());
    }
    for (key, value) in &run.info.meminfo {
        add(&format!("meminfo.{key}"), value.to_string());
    }
    items
}

#[allow(clippy::type_complexity)]
fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(LogDatum, LogCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(LogDatum, LogCtx) -> String> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("key".to_string(), &format_key);
    formatters.insert("value".to_string(), &format_value);

    aliases.insert("all".to_string(), vec!["key".to_string(), "value".to_string()]);

    (formatters, aliases)
}

type LogDatum<'a> = &'a Item;
type LogCtx<'a> = &'a bool;

fn format_key(d: LogDatum, _: LogCtx) -> String {
    d.key.clone()
}

fn format_value(d: LogDatum, _: LogCtx) -> String {
    d.value.clone()
}

#[test]
fn test_print_metadata() {
    let run = benchlog::load_results(std::path::Path::new("../tests/benchlog/run1")).unwrap();
    let mut out = Vec::new();
    print(&mut out, &PrintArgs::default(), &run).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines = text.lines().collect::<Vec<&str>>();
    assert!(lines.contains(&"run_start,2019-02-11T16:13:00.000000"));
    assert!(lines.contains(&"run_duration,20.000"));
    assert!(lines.contains(&"forks,2"));
    assert!(lines.contains(&"cpus_total,2"));
    assert!(lines.contains(&"playbook,site.yml"));
    assert!(lines.iter().any(|l| l.starts_with("sources,baseline+")));
    assert!(lines.iter().any(|l| l.starts_with("meminfo.MemTotal,")));

    let print_args = PrintArgs {
        fmt: Some("key,fixed,noheader".to_string()),
    };
    let mut out = Vec::new();
    print(&mut out, &print_args, &run).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.lines().next() == Some("results_dir"));
}
