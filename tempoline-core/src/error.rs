//! Error kinds for the playback scheduling core.
//!
//! Most failure modes this core encounters are recoverable by design (see
//! spec §7): a missing instrument skips scheduling for one cycle, an invalid
//! duration string falls back to a default, an enqueue-in-the-past clamps
//! forward. None of those are modeled as `Result` because they never leave
//! the scheduling loop — they are logged and swallowed at the call site.
//!
//! `ScheduleError` exists only for the handful of conditions spec §7 marks
//! *fatal*: malformed transport configuration rejected at the setter
//! boundary.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ScheduleError {
    #[error("loop_start ({start}) must be < loop_end ({end})")]
    InvalidLoopPoints { start: u64, end: u64 },

    #[error("bpm must be > 0, got {0}")]
    InvalidBpm(f64),

    #[error("ppq must be > 0, got {0}")]
    InvalidPpq(u32),

    #[error("pattern {0} not found in store")]
    MissingPattern(String),

    #[error("instrument {0} has no registered handle")]
    MissingInstrument(String),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
