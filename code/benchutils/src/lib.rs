// Misc utilities useful to both benchlog and benchalyze.

mod dates;
mod json;
mod numbers;
mod zones;

// Types and utilities for manipulating timestamps.  A Timestamp is naive wall-clock time; the frame
// it is in is tracked by the caller.

pub use dates::Timestamp;

// The error for anything about a timestamp that cannot be made sense of.

pub use dates::ClockFormatError;

// Parse an ISO-8601 timestamp with optional fraction and optional offset.

pub use dates::parse_iso;

// Parse HH:MM:SS[.ffffff] and attach it to a date.

pub use dates::parse_time_of_day;

// Parse YYYY-MM-DD.

pub use dates::parse_date;

// UNIX epoch seconds to wall-clock time in a zone.

pub use dates::from_epoch;

// Move a wall-clock time between zones.

pub use dates::convert_zone;

// YYYY-MM-DDTHH:MM:SS.ffffff

pub use dates::format_timestamp;

// Timezone abbreviations and numeric offsets.

pub use zones::local_zone;
pub use zones::parse_offset;
pub use zones::parse_zone;
pub use zones::utc;

// Numeric tokens in text logs.

pub use numbers::is_plain_number;
pub use numbers::parse_float;
pub use numbers::parse_int;

// Field-by-field decoding of JSON objects.

pub use json::check_known_fields;
pub use json::grab_bool_opt;
pub use json::grab_f64_opt;
pub use json::grab_string;
pub use json::grab_string_opt;
pub use json::grab_strings_opt;
pub use json::grab_usize_opt;
pub use json::Fields as JsonFields;
