use thiserror::Error;

/// Error kinds raised by the compression core (spec §7).
///
/// None of these are recovered internally: a `flush` that returns an
/// error leaves the stepper's state untouched and the caller is expected
/// to abort the current motion job and `reset()` every stepper before
/// resuming with a fresh plan.
#[derive(Debug, Error)]
pub enum StepCompressError {
    #[error("invalid sequence i={interval} c={count} a={add}")]
    InvalidSequence { interval: u32, count: u16, add: i16 },

    #[error(
        "point {index} out of range: {value} not in {min}:{max} for i={interval} c={count} a={add}"
    )]
    PointOutOfRange {
        index: u16,
        value: i64,
        min: i64,
        max: i64,
        interval: u32,
        count: u16,
        add: i16,
    },

    #[error("interval overflow at point {index} for i={interval} c={count} a={add}")]
    IntervalOverflow {
        index: u16,
        interval: u32,
        count: u16,
        add: i16,
    },

    /// Raised by the named external transport collaborator (`transport.send_batch`);
    /// the core never constructs this itself, it only propagates it.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Raised by the allocator when growing a queue or history buffer.
    #[error("allocation failed: {0}")]
    MemoryFailure(String),
}

pub type Result<T> = std::result::Result<T, StepCompressError>;
