//! Stepper pulse schedule compression and synchronization core.
//!
//! This crate intentionally avoids any transport- or MCU-specific
//! dependencies: it turns requested step times into the compact
//! `(interval, count, add)` pulse sequences an MCU understands, and
//! leaves sending them anywhere up to the caller's [`compressor::CommandSink`].

pub mod compressor;
pub mod error;
pub mod history;
mod search;
pub mod step_queue;
pub mod synchronizer;
mod verify;

pub use compressor::{
    Command, CommandSink, QueueStep, RawMessage, RecordingSink, SetNextStepDir, StepperCompressor,
};
pub use error::{Result, StepCompressError};
pub use history::{HistoryEntry, HistoryRing, PullHistoryStep};
pub use step_queue::StepQueue;
pub use synchronizer::Synchronizer;
