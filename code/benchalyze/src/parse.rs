/// Print the events of one source, after clock normalization but before merging.
use crate::format;
use crate::PrintArgs;

use anyhow::Result;
use benchlog::{Event, Value};
use benchutils::format_timestamp;
use std::collections::{BTreeSet, HashMap};
use std::io;
use ustr::Ustr;

type EventFormatter = Box<dyn Fn(&usize, &[Event]) -> String>;

const FMT_DEFAULTS: &str = "all";

const ID_FIELDS: [&str; 4] = ["host", "task_name", "task_number", "task_uuid"];

pub fn print(output: &mut dyn io::Write, print_args: &PrintArgs, events: &[Event]) -> Result<()> {
    let (formatters, aliases) = my_formatters(events);
    let spec = print_args.fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let mut opts = format::standard_options(&others);
    if !opts.fixed && !opts.csv && !opts.json && !opts.awk {
        opts.csv = true;
        opts.header = !others.contains("noheader");
    }
    let data = (0..events.len()).collect::<Vec<usize>>();
    format::format_data(output, &fields, &formatters, &opts, data, events)
}

pub fn fmt_help() -> format::Help {
    let mut fields = vec!["time".to_string(), "source".to_string()];
    fields.extend(ID_FIELDS.iter().map(|s| s.to_string()));
    fields.push("<any field of the source>".to_string());
    format::Help {
        fields,
        aliases: vec![
            ("all".to_string(), vec!["time,source,<ids>,<fields>".to_string()]),
            ("ids".to_string(), ID_FIELDS.iter().map(|s| s.to_string()).collect()),
            ("fields".to_string(), vec!["<every field of the source>".to_string()]),
        ],
        defaults: FMT_DEFAULTS.to_string(),
    }
}

fn my_formatters(events: &[Event]) -> (HashMap<String, EventFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, EventFormatter> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();

    formatters.insert(
        "time".to_string(),
        Box::new(|ix: &usize, es: &[Event]| format_timestamp(&es[*ix].time)),
    );
    formatters.insert(
        "source".to_string(),
        Box::new(|ix: &usize, es: &[Event]| es[*ix].source.to_string()),
    );
    formatters.insert(
        "host".to_string(),
        Box::new(|ix: &usize, es: &[Event]| format_text(es[*ix].ids.host)),
    );
    formatters.insert(
        "task_name".to_string(),
        Box::new(|ix: &usize, es: &[Event]| format_text(es[*ix].ids.task_name)),
    );
    formatters.insert(
        "task_uuid".to_string(),
        Box::new(|ix: &usize, es: &[Event]| format_text(es[*ix].ids.task_uuid)),
    );
    formatters.insert(
        "task_number".to_string(),
        Box::new(|ix: &usize, es: &[Event]| es[*ix].ids.task_number.map(|n| n.to_string()).unwrap_or_default()),
    );

    // Sources do not all report every field in every event, the union is the column set.
    let names = events
        .iter()
        .flat_map(|e| e.fields.keys().copied())
        .collect::<BTreeSet<Ustr>>();
    for name in &names {
        let key = *name;
        formatters.insert(
            name.to_string(),
            Box::new(move |ix: &usize, es: &[Event]| {
                es[*ix].fields.get(&key).copied().flatten().map(format_value).unwrap_or_default()
            }),
        );
    }

    let field_names = names.iter().map(|s| s.to_string()).collect::<Vec<String>>();
    let mut all = vec!["time".to_string(), "source".to_string()];
    all.extend(ID_FIELDS.iter().map(|s| s.to_string()));
    all.extend(field_names.iter().cloned());
    aliases.insert("all".to_string(), all);
    aliases.insert("ids".to_string(), ID_FIELDS.iter().map(|s| s.to_string()).collect());
    aliases.insert("fields".to_string(), field_names);

    (formatters, aliases)
}

fn format_text(s: Option<Ustr>) -> String {
    s.map(|s| s.to_string()).unwrap_or_default()
}

fn format_value(v: Value) -> String {
    v.to_string()
}

#[test]
fn test_print_events() {
    use benchlog::{Sample, Source};

    let t0 = benchutils::parse_iso("2019-02-11T16:13:04").unwrap().0;
    let mut a = Sample::new(t0, Source::Vmstat).with("vmstat_free", 1524804i64);
    a.ids.task_name = Some(ustr::ustr("ping"));
    let b = Sample::new(t0 + chrono::Duration::seconds(2), Source::Vmstat).with("vmstat_cs", 210i64);
    let events = vec![a, b];

    let print_args = PrintArgs {
        fmt: Some("all".to_string()),
    };
    let mut out = Vec::new();
    print(&mut out, &print_args, &events).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(
        text == "time,source,host,task_name,task_number,task_uuid,vmstat_cs,vmstat_free\n\
                 2019-02-11T16:13:04.000000,vmstat,,ping,,,,1524804\n\
                 2019-02-11T16:13:06.000000,vmstat,,,,,210,\n"
    );

    let print_args = PrintArgs {
        fmt: Some("fields,noheader".to_string()),
    };
    let mut out = Vec::new();
    print(&mut out, &print_args, &events).unwrap();
    assert!(String::from_utf8(out).unwrap() == ",1524804\n210,\n");
}
