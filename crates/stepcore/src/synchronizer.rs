//! C7 — the multi-stepper synchronizer: drives every stepper's own
//! `flush(move_clock)`, then repeatedly picks the globally-earliest
//! eligible pending message across all steppers, rewrites its
//! `min_clock` through a shared move-queue-slot-availability heap, and
//! hands the resulting batch to a single shared transport (spec §4.7).

use std::collections::VecDeque;

use crate::compressor::{Command, CommandSink, QueueStep, RecordingSink, SetNextStepDir, StepperCompressor};
use crate::error::Result;

/// A binary min-heap over MCU move-queue slot free times, fixed at
/// `move_queue_depth` entries regardless of how many steppers exist
/// (spec §4.7 `move_clocks[num_move_clocks]`). Exposes `replace_min` so
/// the "pop the minimum, do work, reinsert with a new value" cycle sifts
/// down in place instead of a pop followed by a separate push.
#[derive(Debug)]
struct SlotHeap {
    entries: Vec<u64>,
}

impl SlotHeap {
    fn new(depth: usize) -> Self {
        Self { entries: vec![0u64; depth] }
    }

    fn peek_min(&self) -> u64 {
        self.entries.first().copied().unwrap_or(0)
    }

    /// Replace the root with `clock` and sift it down to restore the
    /// heap invariant. Missing children are never encountered here since
    /// the array is a fixed-size complete tree from construction; a
    /// general port would treat them as `u64::MAX`.
    fn replace_min(&mut self, clock: u64) {
        if self.entries.is_empty() {
            return;
        }
        self.entries[0] = clock;
        let len = self.entries.len();
        let mut i = 0;
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < len && self.entries[left] < self.entries[smallest] {
                smallest = left;
            }
            if right < len && self.entries[right] < self.entries[smallest] {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.entries.swap(i, smallest);
            i = smallest;
        }
    }
}

fn req_clock_of(cmd: &Command) -> u64 {
    match cmd {
        Command::QueueStep(QueueStep { req_clock, .. }) => *req_clock,
        Command::SetNextStepDir(SetNextStepDir { req_clock, .. }) => *req_clock,
        Command::Raw(crate::compressor::RawMessage { req_clock, .. }) => *req_clock,
    }
}

/// A message is eligible to be picked (spec §4.7 step 2) if it doesn't
/// consume an MCU move-queue slot (`min_clock == 0`) or if its
/// `req_clock` has already arrived. `SetNextStepDir`/`Raw` carry no
/// `min_clock` field at all, so they are always eligible.
fn is_eligible(cmd: &Command, move_clock: u64) -> bool {
    match cmd {
        Command::QueueStep(step) => step.min_clock == 0 || step.req_clock <= move_clock,
        _ => true,
    }
}

/// Owns one [`StepperCompressor`] per named stepper, a persistent
/// `req_clock`-ordered pending buffer per stepper, and the shared
/// move-queue-slot heap, and serializes everything onto a single
/// transport (spec C7).
pub struct Synchronizer<S: CommandSink> {
    compressors: Vec<StepperCompressor<RecordingSink>>,
    buffers: Vec<VecDeque<Command>>,
    slots: SlotHeap,
    sink: S,
}

impl<S: CommandSink> Synchronizer<S> {
    /// `move_queue_depth` is the MCU's fixed move-queue capacity (spec
    /// §4.7), independent of how many steppers get registered.
    pub fn new(move_queue_depth: usize, sink: S) -> Self {
        Self {
            compressors: Vec::new(),
            buffers: Vec::new(),
            slots: SlotHeap::new(move_queue_depth),
            sink,
        }
    }

    /// Registers a new stepper and returns the handle used to address it
    /// via [`Synchronizer::stepper_mut`].
    pub fn add_stepper(&mut self, oid: u32, max_error: u32) -> usize {
        let idx = self.compressors.len();
        self.compressors
            .push(StepperCompressor::new(oid, max_error, RecordingSink::default()));
        self.buffers.push(VecDeque::new());
        idx
    }

    pub fn stepper_mut(&mut self, idx: usize) -> &mut StepperCompressor<RecordingSink> {
        &mut self.compressors[idx]
    }

    pub fn stepper_count(&self) -> usize {
        self.compressors.len()
    }

    /// Propagates a new MCU time base to every registered stepper (spec
    /// §4.7 `set_time`).
    pub fn set_time(&mut self, time_offset: f64, mcu_freq: f64) {
        for compressor in &mut self.compressors {
            compressor.set_time(time_offset, mcu_freq);
        }
    }

    /// Flushes every stepper, then repeatedly picks the smallest-
    /// `req_clock` eligible pending message across all steppers,
    /// rewrites its `min_clock` through the shared slot heap, and hands
    /// the resulting batch to the transport (spec §4.7 steps 1-5).
    pub fn flush(&mut self, move_clock: u64) -> Result<()> {
        for compressor in &mut self.compressors {
            compressor.flush(move_clock)?;
        }
        for (buffer, compressor) in self.buffers.iter_mut().zip(self.compressors.iter_mut()) {
            buffer.extend(compressor.sink_mut().commands.drain(..));
        }

        let mut batch = Vec::new();
        loop {
            let mut best: Option<(usize, u64)> = None;
            for (i, buffer) in self.buffers.iter().enumerate() {
                if let Some(front) = buffer.front() {
                    if is_eligible(front, move_clock) {
                        let req = req_clock_of(front);
                        if best.is_none_or(|(_, best_req)| req < best_req) {
                            best = Some((i, req));
                        }
                    }
                }
            }
            let Some((i, _)) = best else { break };
            let mut cmd = self.buffers[i]
                .pop_front()
                .expect("the buffer that won the scan must have a front entry");
            if let Command::QueueStep(step) = &mut cmd {
                let next_avail = self.slots.peek_min();
                if step.min_clock != 0 {
                    self.slots.replace_min(step.min_clock);
                }
                step.min_clock = next_avail;
            }
            batch.push(cmd);
        }

        for cmd in batch {
            self.sink.push(cmd);
        }
        Ok(())
    }

    /// True once every stepper's pending buffer has drained (used by
    /// hosts to decide when a replay/shutdown sequence is complete).
    pub fn is_idle(&self) -> bool {
        self.buffers.iter().all(|buffer| buffer.is_empty())
    }

    /// Direct access to the shared transport, for hosts that need to
    /// inspect what has been emitted so far without draining it.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consumes the synchronizer, handing back its transport (e.g. for a
    /// one-shot replay that prints everything emitted).
    pub fn into_sink(self) -> S {
        self.sink
    }
}
