use crate::format;
use crate::PrintArgs;

use anyhow::Result;
use benchlog::TaskHostSpan;
use std::collections::HashMap;
use std::io;

pub fn print(output: &mut dyn io::Write, print_args: &PrintArgs, mut spans: Vec<TaskHostSpan>) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = if let Some(ref fmt) = print_args.fmt {
        fmt
    } else {
        FMT_DEFAULTS
    };
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    spans.sort_by(|a, b| {
        a.task_number
            .cmp(&b.task_number)
            .then(a.start.total_cmp(&b.start))
            .then(a.host.cmp(&b.host))
    });
    format::format_data(output, &fields, &formatters, &opts, spans, &false)
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

const FMT_DEFAULTS: &str = "task_number,task_name,host,lag,duration";

type LogDatum<'a> = &'a TaskHostSpan;
type LogCtx<'a> = &'a bool;

#[allow(clippy::type_complexity)]
fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(LogDatum, LogCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(LogDatum, LogCtx) -> String> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("task_number".to_string(), &format_task_number);
    formatters.insert("task_uuid".to_string(), &format_task_uuid);
    formatters.insert("task_name".to_string(), &format_task_name);
    formatters.insert("host".to_string(), &format_host);
    formatters.insert("lag".to_string(), &format_lag);
    formatters.insert("start".to_string(), &format_start);
    formatters.insert("stop".to_string(), &format_stop);
    formatters.insert("duration".to_string(), &format_duration);

    aliases.insert(
        "all".to_string(),
        [
            "task_number",
            "task_uuid",
            "task_name",
            "host",
            "lag",
            "start",
            "stop",
            "duration",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    );
    aliases.insert(
        "times".to_string(),
        ["lag", "start", "stop", "duration"].iter().map(|s| s.to_string()).collect(),
    );

    (formatters, aliases)
}

fn format_task_number(d: LogDatum, _: LogCtx) -> String {
    d.task_number.to_string()
}

fn format_task_uuid(d: LogDatum, _: LogCtx) -> String {
    d.task_uuid.to_string()
}

fn format_task_name(d: LogDatum, _: LogCtx) -> String {
    d.task_name.to_string()
}

fn format_host(d: LogDatum, _: LogCtx) -> String {
    d.host.to_string()
}

// Seconds, to the millisecond.

fn format_lag(d: LogDatum, _: LogCtx) -> String {
    format!("{:.3}", d.lag)
}

fn format_start(d: LogDatum, _: LogCtx) -> String {
    format!("{:.3}", d.start)
}

fn format_stop(d: LogDatum, _: LogCtx) -> String {
    format!("{:.3}", d.stop)
}

fn format_duration(d: LogDatum, _: LogCtx) -> String {
    format!("{:.3}", d.duration)
}

#[test]
fn test_print_tasks() {
    use ustr::ustr;

    let span = |number: u32, host: &str, start: f64, stop: f64| TaskHostSpan {
        task_number: number,
        task_uuid: ustr("525400a6-0421-65e9-9a84-000000000032"),
        task_name: ustr("ping"),
        host: ustr(host),
        lag: start - 1549901580.0,
        start,
        stop,
        duration: stop - start,
    };
    let spans = vec![
        span(2, "node1", 1549901586.1, 1549901590.2),
        span(1, "node2", 1549901581.2, 1549901585.1),
        span(1, "node1", 1549901581.1, 1549901583.1),
    ];

    let mut out = Vec::new();
    print(&mut out, &PrintArgs::default(), spans.clone()).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines = text.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 4);
    assert!(lines[0] == "task_number  task_name  host   lag    duration");
    assert!(lines[1] == "1            ping       node1  1.100  2.000");
    assert!(lines[2] == "1            ping       node2  1.200  3.900");
    assert!(lines[3].starts_with("2 "));

    let print_args = PrintArgs {
        fmt: Some("host,times,csv".to_string()),
    };
    let mut out = Vec::new();
    print(&mut out, &print_args, spans).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.lines().next() == Some("node1,1.100,1549901581.100,1549901583.100,2.000"));
}
