// Consistency failures of the reconciler.  Parser problems never get this far: malformed lines are
// skipped and counted where they are found.

use benchutils::{format_timestamp, ClockFormatError, Timestamp};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    ClockFormat(#[from] ClockFormatError),

    #[error("Conflicting values for '{field}' at {}: {left} vs {right}", format_timestamp(.time))]
    MergeConflict {
        time: Timestamp,
        field: String,
        left: String,
        right: String,
    },

    #[error("Task order inverted at {}: task {current} follows task {previous}", format_timestamp(.time))]
    TimelineOrdering {
        time: Timestamp,
        previous: u32,
        current: u32,
    },
}
