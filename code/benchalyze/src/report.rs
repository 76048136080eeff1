/// Print the reconciled timeline, or write it as JSON.
///
/// The columns of the timeline are not known until the run has been loaded, so the formatters are
/// built from the timeline's schema rather than being a fixed table.
use crate::format;
use crate::PrintArgs;

use anyhow::{Context, Result};
use benchlog::{ReportSettings, Timeline, Value, ID_COLUMNS};
use benchutils::format_timestamp;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

type RowFormatter = Box<dyn Fn(&usize, &Timeline) -> String>;

const FMT_DEFAULTS: &str = "all";

pub fn print(
    output: &mut dyn io::Write,
    print_args: &PrintArgs,
    settings: &ReportSettings,
    timeline: &Timeline,
) -> Result<()> {
    let (formatters, aliases) = my_formatters(timeline, settings);
    let spec = print_args.fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let mut opts = format::standard_options(&others);
    // The report is usually read by another program, so it defaults to csv with a header.
    if !opts.fixed && !opts.csv && !opts.json && !opts.awk {
        opts.csv = true;
        opts.header = !others.contains("noheader");
    }
    let rows = (0..timeline.len()).collect::<Vec<usize>>();
    format::format_data(output, &fields, &formatters, &opts, rows, timeline)
}

/// The typed records: numbers are numbers and missing values are null.

pub fn write_json(filename: &Path, timeline: &Timeline) -> Result<()> {
    let file = File::create(filename).with_context(|| format!("Creating {}", filename.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &timeline.to_json())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    log::info!("Wrote {} records to {}", timeline.len(), filename.display());
    Ok(())
}

pub fn fmt_help() -> format::Help {
    let settings = ReportSettings::default();
    let mut fields = vec!["time".to_string(), "source".to_string()];
    fields.extend(ID_COLUMNS.iter().map(|s| s.to_string()));
    fields.push("<any column of the timeline>".to_string());
    format::Help {
        fields,
        aliases: vec![
            ("all".to_string(), vec!["time,source,<ids>,<columns>".to_string()]),
            ("ids".to_string(), ID_COLUMNS.iter().map(|s| s.to_string()).collect()),
            ("derived".to_string(), settings.ratios.iter().map(|r| r.name.clone()).collect()),
        ],
        defaults: FMT_DEFAULTS.to_string(),
    }
}

fn my_formatters(
    timeline: &Timeline,
    settings: &ReportSettings,
) -> (HashMap<String, RowFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, RowFormatter> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();

    formatters.insert(
        "time".to_string(),
        Box::new(|ix: &usize, tl: &Timeline| format_timestamp(&tl.rows()[*ix].time)),
    );
    formatters.insert(
        "source".to_string(),
        Box::new(|ix: &usize, tl: &Timeline| tl.rows()[*ix].sources.to_string()),
    );
    let columns = ID_COLUMNS
        .iter()
        .map(|s| s.to_string())
        .chain(timeline.schema().iter().map(|s| s.to_string()))
        .collect::<Vec<String>>();
    for name in &columns {
        let key = name.clone();
        formatters.insert(
            name.clone(),
            Box::new(move |ix: &usize, tl: &Timeline| format_value(tl.lookup(&tl.rows()[*ix], &key))),
        );
    }

    let mut all = vec!["time".to_string(), "source".to_string()];
    all.extend(columns);
    aliases.insert("all".to_string(), all);
    aliases.insert("ids".to_string(), ID_COLUMNS.iter().map(|s| s.to_string()).collect());
    aliases.insert(
        "derived".to_string(),
        settings
            .ratios
            .iter()
            .filter(|r| timeline.column(&r.name).is_some())
            .map(|r| r.name.clone())
            .collect(),
    );

    (formatters, aliases)
}

fn format_value(v: Option<Value>) -> String {
    match v {
        Some(Value::Float(x)) => {
            if x.fract() == 0.0 {
                format!("{x:.0}")
            } else {
                format!("{x:.3}").trim_end_matches('0').trim_end_matches('.').to_string()
            }
        }
        Some(v) => v.to_string(),
        None => "".to_string(),
    }
}

#[cfg(test)]
fn fixture_timeline() -> (ReportSettings, Timeline) {
    let settings = ReportSettings {
        local_timezone: benchutils::utc(),
        ..Default::default()
    };
    let run = benchlog::load_results(Path::new("../tests/benchlog/run1")).unwrap();
    let timeline = benchlog::build_timeline(&run, &settings).unwrap();
    (settings, timeline)
}

#[cfg(test)]
fn render(fmt: &str, settings: &ReportSettings, timeline: &Timeline) -> String {
    let print_args = PrintArgs {
        fmt: Some(fmt.to_string()),
    };
    let mut out = Vec::new();
    print(&mut out, &print_args, settings, timeline).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_format_value() {
    assert!(format_value(None) == "");
    assert!(format_value(Some(Value::Int(12))) == "12");
    assert!(format_value(Some(Value::Float(50.0))) == "50");
    assert!(format_value(Some(Value::Float(33.33333))) == "33.333");
    assert!(format_value(Some(Value::Float(2.5))) == "2.5");
    assert!(format_value(Some(Value::from("ping"))) == "ping");
}

#[test]
fn test_print_report() {
    let (settings, timeline) = fixture_timeline();
    assert!(!timeline.is_empty());

    let text = render("all", &settings, &timeline);
    let lines = text.lines().collect::<Vec<&str>>();
    assert!(lines.len() == timeline.len() + 1);
    assert!(lines[0].starts_with("time,source,host,task_name,task_number,task_uuid,"));

    let text = render("time,task_name,noheader", &settings, &timeline);
    assert!(text.lines().count() == timeline.len());

    let text = render("ids,awk", &settings, &timeline);
    assert!(text.lines().all(|l| l.split(' ').count() == 4));

    let derived = render("derived,csv,header", &settings, &timeline);
    let header = derived.lines().next().unwrap();
    assert!(header.split(',').all(|h| h.ends_with("_%")));
}

#[test]
fn test_write_json() {
    let (_, timeline) = fixture_timeline();
    let dir = tempfile::tempdir().unwrap();
    let filename = dir.path().join("timeline.json");
    write_json(&filename, &timeline).unwrap();
    let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&filename).unwrap()).unwrap();
    let records = v.as_array().unwrap();
    assert!(records.len() == timeline.len());
    assert!(records[0]["time"].is_string());
    assert!(records.iter().all(|r| r.get("task_uuid").is_some()));
}
