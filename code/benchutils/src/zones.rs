// Timezone names as they appear in the headers of `vmstat -t` and friends.  We only know fixed
// offsets; a log captured across a DST change will be off by an hour on one side of it, which the
// hour alignment in the reconciler papers over.

use crate::ClockFormatError;
use chrono::{FixedOffset, Local, Offset};
use regex::Regex;
use std::sync::OnceLock;

// Offsets in minutes east of UTC.

const ABBREVIATIONS: &[(&str, i32)] = &[
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("WET", 0),
    ("WEST", 60),
    ("BST", 60),
    ("CET", 60),
    ("CEST", 120),
    ("EET", 120),
    ("EEST", 180),
    ("MSK", 180),
    ("IST", 330),
    ("JST", 540),
    ("AEST", 600),
    ("AEDT", 660),
    ("NZST", 720),
    ("NZDT", 780),
    ("AST", -240),
    ("EST", -300),
    ("EDT", -240),
    ("CST", -360),
    ("CDT", -300),
    ("MST", -420),
    ("MDT", -360),
    ("PST", -480),
    ("PDT", -420),
    ("AKST", -540),
    ("AKDT", -480),
    ("HST", -600),
];

/// Parse a timezone abbreviation (`UTC`, `EDT`, ...) or a numeric offset (`+02:00`, `-0500`,
/// `+01`, `UTC+02`).  Matching of abbreviations is case-insensitive.

pub fn parse_zone(s: &str) -> Result<FixedOffset, ClockFormatError> {
    let name = s.trim();
    let upper = name.to_ascii_uppercase();
    if let Some((_, minutes)) = ABBREVIATIONS.iter().find(|(abbrev, _)| *abbrev == upper) {
        return FixedOffset::east_opt(minutes * 60).ok_or_else(|| ClockFormatError::Zone(s.to_string()));
    }
    let numeric = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    parse_offset(numeric).ok_or_else(|| ClockFormatError::Zone(s.to_string()))
}

/// Parse `+HH:MM`, `+HHMM` or `+HH`.

pub fn parse_offset(s: &str) -> Option<FixedOffset> {
    static OFFSET: OnceLock<Regex> = OnceLock::new();
    let re = OFFSET.get_or_init(|| Regex::new(r"^([+-])(\d{2}):?(\d{2})?$").unwrap());
    let caps = re.captures(s.trim())?;
    let hours = caps[2].parse::<i32>().ok()?;
    let minutes = match caps.get(3) {
        Some(m) => m.as_str().parse::<i32>().ok()?,
        None => 0,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    let secs = hours * 3600 + minutes * 60;
    if &caps[1] == "-" {
        FixedOffset::west_opt(secs)
    } else {
        FixedOffset::east_opt(secs)
    }
}

/// The offset of the machine we are running on, right now.

pub fn local_zone() -> FixedOffset {
    Local::now().offset().fix()
}

pub fn utc() -> FixedOffset {
    Offset::fix(&chrono::Utc)
}

#[test]
fn test_parse_zone() {
    assert!(parse_zone("UTC").unwrap().local_minus_utc() == 0);
    assert!(parse_zone("edt").unwrap().local_minus_utc() == -4 * 3600);
    assert!(parse_zone("CEST").unwrap().local_minus_utc() == 2 * 3600);
    assert!(parse_zone("IST").unwrap().local_minus_utc() == 5 * 3600 + 30 * 60);
    assert!(parse_zone("+02:00").unwrap().local_minus_utc() == 2 * 3600);
    assert!(parse_zone("-0530").unwrap().local_minus_utc() == -(5 * 3600 + 30 * 60));
    assert!(parse_zone("UTC+1").is_err());
    assert!(parse_zone("UTC+01").unwrap().local_minus_utc() == 3600);
    assert!(parse_zone("Mars/Olympus").is_err());
    assert!(utc().local_minus_utc() == 0);
}
