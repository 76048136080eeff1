/// Read report settings from a json file.
///
/// The file holds an object { ... } with the following named fields, all optional:
///
///   reference_timezone - string, zone name or offset of the reference frame, default UTC
///   local_timezone - string, zone of the controller's clock, default the zone of this machine
///   reference_date - string, YYYY-MM-DD, the date for sources that only record time of day
///   align_hours - bool, apply the constant-hour alignment to sources of unknown frame, default true
///   instantaneous - array of strings, field name prefixes that are never forward-filled,
///      default ["top_"]
///   trim - bool, trim the timeline to the run window, default true
///   activity_source - string, the source that defines the run window when there is no baseline,
///      default "top"
///   activity_field - string, the field of that source, default "netdev_tx_bytes"
///   strict_order - bool, fail rather than warn when task numbers go backwards, default false
///   ratios - array of objects {name, numerator, denominator, offset?}, derived percentages,
///      default the standard set
///
/// Any field name starting with '#' is reserved for arbitrary comments.
use crate::derive::{standard_ratios, Ratio};
use crate::event::Source;

use anyhow::{bail, Result};
use benchutils::{
    check_known_fields, grab_bool_opt, grab_f64_opt, grab_string, grab_string_opt, grab_strings_opt,
    local_zone, parse_date, parse_zone, utc, JsonFields,
};
use chrono::{FixedOffset, NaiveDate};
use serde_json::Value;
use std::fs;
use std::path;

const KNOWN_FIELDS: [&str; 10] = [
    "reference_timezone",
    "local_timezone",
    "reference_date",
    "align_hours",
    "instantaneous",
    "trim",
    "activity_source",
    "activity_field",
    "strict_order",
    "ratios",
];

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub timezone: FixedOffset,
    pub local_timezone: FixedOffset,
    pub date: Option<NaiveDate>,
    pub align_hours: bool,
    pub instantaneous: Vec<String>,
    pub trim: bool,
    pub activity_source: Source,
    pub activity_field: String,
    pub strict_order: bool,
    pub ratios: Vec<Ratio>,
}

impl Default for ReportSettings {
    fn default() -> ReportSettings {
        ReportSettings {
            timezone: utc(),
            local_timezone: local_zone(),
            date: None,
            align_hours: true,
            instantaneous: vec!["top_".to_string()],
            trim: true,
            activity_source: Source::Top,
            activity_field: "netdev_tx_bytes".to_string(),
            strict_order: false,
            ratios: standard_ratios(),
        }
    }
}

pub fn read_report_settings(filename: &str) -> Result<ReportSettings> {
    let text = fs::read_to_string(path::Path::new(filename))?;
    parse_report_settings(&text)
}

pub fn parse_report_settings(text: &str) -> Result<ReportSettings> {
    let v: Value = serde_json::from_str(text)?;
    let Value::Object(fields) = v else {
        bail!("Expected an object value");
    };
    check_known_fields(&fields, &KNOWN_FIELDS)?;

    let mut settings = ReportSettings::default();
    if let Some(s) = grab_string_opt(&fields, "reference_timezone")? {
        settings.timezone = parse_zone(&s)?;
    }
    if let Some(s) = grab_string_opt(&fields, "local_timezone")? {
        settings.local_timezone = parse_zone(&s)?;
    }
    if let Some(s) = grab_string_opt(&fields, "reference_date")? {
        settings.date = Some(parse_date(&s)?);
    }
    if let Some(b) = grab_bool_opt(&fields, "align_hours")? {
        settings.align_hours = b;
    }
    if let Some(xs) = grab_strings_opt(&fields, "instantaneous")? {
        settings.instantaneous = xs;
    }
    if let Some(b) = grab_bool_opt(&fields, "trim")? {
        settings.trim = b;
    }
    if let Some(s) = grab_string_opt(&fields, "activity_source")? {
        settings.activity_source = match s.parse::<Source>() {
            Ok(src) => src,
            Err(e) => bail!(e),
        };
    }
    if let Some(s) = grab_string_opt(&fields, "activity_field")? {
        settings.activity_field = s;
    }
    if let Some(b) = grab_bool_opt(&fields, "strict_order")? {
        settings.strict_order = b;
    }
    match fields.get("ratios") {
        Some(Value::Array(objs)) => {
            let mut ratios = vec![];
            for obj in objs {
                let Value::Object(fields) = obj else {
                    bail!("Expected an object value in 'ratios'");
                };
                ratios.push(process_ratio(fields)?);
            }
            settings.ratios = ratios;
        }
        Some(_) => bail!("Field 'ratios' must have an array value"),
        None => {}
    }
    Ok(settings)
}

fn process_ratio(fields: &JsonFields) -> Result<Ratio> {
    check_known_fields(fields, &["name", "numerator", "denominator", "offset"])?;
    let name = grab_string(fields, "name")?;
    let numerator = grab_string(fields, "numerator")?;
    let denominator = grab_string(fields, "denominator")?;
    let offset = grab_f64_opt(fields, "offset")?.unwrap_or(0.0);
    Ok(Ratio::new(&name, &numerator, &denominator, offset))
}

#[test]
fn test_parse_report_settings() {
    let s = parse_report_settings(
        r##"{"reference_timezone": "EDT",
            "reference_date": "2019-02-11",
            "#comment": "ignored",
            "instantaneous": ["top_", "ps_"],
            "activity_source": "netdev",
            "strict_order": true,
            "ratios": [{"name": "x_%", "numerator": "a", "denominator": "b", "offset": 1}]}"##,
    )
    .unwrap();
    assert!(s.timezone == FixedOffset::west_opt(4 * 3600).unwrap());
    assert!(s.date == NaiveDate::from_ymd_opt(2019, 2, 11));
    assert!(s.instantaneous == vec!["top_".to_string(), "ps_".to_string()]);
    assert!(s.activity_source == Source::Netdev);
    assert!(s.activity_field == "netdev_tx_bytes");
    assert!(s.strict_order);
    assert!(s.align_hours);
    assert!(s.ratios.len() == 1);
    assert!(s.ratios[0].offset == 1.0);
}

#[test]
fn test_bad_report_settings() {
    assert!(parse_report_settings("[]").is_err());
    assert!(parse_report_settings(r#"{"colour": "red"}"#).is_err());
    assert!(parse_report_settings(r#"{"trim": "yes"}"#).is_err());
    assert!(parse_report_settings(r#"{"reference_timezone": "Mars/Olympus"}"#).is_err());
    assert!(parse_report_settings(r#"{"activity_source": "sar"}"#).is_err());
    assert!(parse_report_settings(r#"{"ratios": [{"name": "x"}]}"#).is_err());
    assert!(parse_report_settings("{}").unwrap().ratios.len() == standard_ratios().len());
}
