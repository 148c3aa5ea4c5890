//! C3 (move emitter), C4 (direction-change debounce) and C6 (the
//! per-stepper façade) fused into one type, exactly as the teacher fuses
//! them in `StepCompressor`: `StepperCompressor` owns a [`StepQueue`],
//! a [`HistoryRing`], and the continuity state (`last_interval`,
//! `last_ideal_step_clock`) the two-segment search needs across calls,
//! and drives [`wrap_compress`]/[`check_line`] to turn queued step
//! clocks into [`QueueStep`] commands pushed to a [`CommandSink`].

use crate::error::Result;
use crate::history::{HISTORY_EXPIRE_SECONDS, HistoryEntry, HistoryRing, PullHistoryStep};
use crate::search::{CLOCK_DIFF_MAX, Cursor, StepMove, wrap_compress};
use crate::step_queue::StepQueue;
use crate::verify::check_line;

/// Seconds within which a direction reversal is assumed to be print-head
/// backlash/noise rather than a real direction change (spec §4.4).
const SDS_FILTER_TIME: f64 = 0.000_750;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueStep {
    pub oid: u32,
    pub first_clock: u64,
    pub last_clock: u64,
    pub interval: u32,
    pub count: u16,
    pub add: i16,
    pub req_clock: u64,
    pub min_clock: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetNextStepDir {
    pub oid: u32,
    pub dir: bool,
    pub req_clock: u64,
}

/// An arbitrary pre-encoded message the caller wants ordered alongside
/// this stepper's own commands (spec §4.6 `queue_msg`), e.g. an
/// endstop-query or a kinematic-flush marker that must not be reordered
/// past the steps around it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMessage {
    pub data: Vec<u32>,
    pub req_clock: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    QueueStep(QueueStep),
    SetNextStepDir(SetNextStepDir),
    Raw(RawMessage),
}

/// The named transport collaborator (spec §1): anything that can accept
/// the commands a [`StepperCompressor`] emits. The core never assumes
/// how they reach the MCU.
pub trait CommandSink {
    fn push(&mut self, command: Command);
}

/// An in-memory [`CommandSink`] for tests and offline replay.
#[derive(Default, Debug)]
pub struct RecordingSink {
    pub commands: Vec<Command>,
}

impl CommandSink for RecordingSink {
    fn push(&mut self, command: Command) {
        self.commands.push(command);
    }
}

/// The compression core for a single stepper (spec C6).
pub struct StepperCompressor<S: CommandSink> {
    oid: u32,
    max_error: u32,
    mcu_time_offset: f64,
    mcu_freq: f64,
    last_step_print_time: f64,
    last_step_clock: u64,
    last_interval: u32,
    last_ideal_step_clock: u64,
    sdir: i32,
    invert_sdir: bool,
    next_step_clock: Option<u64>,
    next_step_dir: i32,
    queue: StepQueue,
    last_position: i64,
    history: HistoryRing,
    sink: S,
}

impl<S: CommandSink> StepperCompressor<S> {
    pub fn new(oid: u32, max_error: u32, sink: S) -> Self {
        Self {
            oid,
            max_error,
            mcu_time_offset: 0.0,
            mcu_freq: 1.0,
            last_step_print_time: -0.5,
            last_step_clock: 0,
            last_interval: 0,
            last_ideal_step_clock: 0,
            sdir: -1,
            invert_sdir: false,
            next_step_clock: None,
            next_step_dir: 0,
            queue: StepQueue::new(),
            last_position: 0,
            history: HistoryRing::new(),
            sink,
        }
    }

    pub fn set_time(&mut self, time_offset: f64, mcu_freq: f64) {
        self.mcu_time_offset = time_offset;
        self.mcu_freq = mcu_freq;
        self.calc_last_step_print_time();
        let horizon = (HISTORY_EXPIRE_SECONDS * mcu_freq) as u64;
        self.history
            .expire_history(self.last_step_clock.saturating_sub(horizon));
    }

    pub fn set_invert_sdir(&mut self, invert: bool) {
        if self.invert_sdir != invert {
            self.invert_sdir = invert;
            if self.sdir >= 0 {
                self.sdir ^= 1;
            }
        }
    }

    pub fn get_last_dir(&self) -> bool {
        if self.sdir < 0 { false } else { self.sdir != 0 }
    }

    pub fn set_last_position(&mut self, clock: u64, last_position: i64) -> Result<()> {
        self.flush(u64::MAX)?;
        self.last_position = last_position;
        self.history.push_marker(clock, last_position);
        Ok(())
    }

    pub fn reset(&mut self, last_step_clock: u64) -> Result<()> {
        self.flush(u64::MAX)?;
        self.last_step_clock = last_step_clock;
        self.last_interval = 0;
        self.last_ideal_step_clock = last_step_clock;
        self.sdir = -1;
        self.calc_last_step_print_time();
        Ok(())
    }

    /// Record a requested step (spec C4 entrypoint): `sdir` is the
    /// direction (0/1) of this step, `print_time`/`step_time` place it
    /// on the host clock. A direction reversal inside
    /// [`SDS_FILTER_TIME`] of the still-pending step rolls that pending
    /// step back instead of emitting it.
    pub fn append(&mut self, sdir: i32, print_time: f64, step_time: f64) -> Result<()> {
        let offset = print_time - self.last_step_print_time;
        let rel_sc = (step_time + offset) * self.mcu_freq;
        let step_clock = self.last_step_clock + rel_sc as u64;

        if let Some(prev_clock) = self.next_step_clock {
            if sdir != self.next_step_dir {
                let diff = step_clock as i64 - prev_clock as i64;
                if (diff as f64) < SDS_FILTER_TIME * self.mcu_freq {
                    self.next_step_clock = None;
                    self.next_step_dir = sdir;
                    return Ok(());
                }
            }
            self.queue_append()?;
        }

        self.next_step_clock = Some(step_clock);
        self.next_step_dir = sdir;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if self.next_step_clock.is_some() {
            self.queue_append()?;
        }
        Ok(())
    }

    pub fn flush(&mut self, move_clock: u64) -> Result<()> {
        if matches!(self.next_step_clock, Some(next_clock) if move_clock >= next_clock) {
            self.queue_append()?;
        }
        self.queue_flush(move_clock)
    }

    /// Flush pending steps, then append an arbitrary pre-encoded message
    /// ordered at the current `last_step_clock` (spec §4.6 `queue_msg`).
    pub fn queue_msg(&mut self, data: Vec<u32>) -> Result<()> {
        self.flush(u64::MAX)?;
        self.sink.push(Command::Raw(RawMessage {
            data,
            req_clock: self.last_step_clock,
        }));
        Ok(())
    }

    pub fn find_past_position(&self, clock: u64) -> i64 {
        self.history.find_past_position(self.last_position, clock)
    }

    pub fn extract_old(&self, max: usize, start_clock: u64, end_clock: u64) -> Vec<PullHistoryStep> {
        self.history.extract_old(max, start_clock, end_clock)
    }

    pub fn expire_history(&mut self, end_clock: u64) {
        self.history.expire_history(end_clock)
    }

    pub fn last_position(&self) -> i64 {
        self.last_position
    }

    pub fn last_step_clock(&self) -> u64 {
        self.last_step_clock
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Direct access to the sink, used by the [`Synchronizer`](crate::synchronizer::Synchronizer)
    /// to drain each stepper's buffered commands for the cross-stepper merge.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn calc_last_step_print_time(&mut self) {
        let lsc = self.last_step_clock as f64;
        self.last_step_print_time = self.mcu_time_offset + (lsc - 0.5) / self.mcu_freq;
    }

    fn add_move(&mut self, first_clock: u64, mv: &StepMove) {
        let addfactor = mv.count as u64 * (mv.count as u64 - 1) / 2;
        let ticks = mv.add as i64 * addfactor as i64 + mv.interval as i64 * (mv.count as i64 - 1);
        let last_clock = first_clock + ticks as u64;

        let mut req_clock = self.last_step_clock;
        let min_clock = req_clock;
        if mv.count == 1 && first_clock >= self.last_step_clock + CLOCK_DIFF_MAX {
            req_clock = first_clock;
        }

        self.sink.push(Command::QueueStep(QueueStep {
            oid: self.oid,
            first_clock,
            last_clock,
            interval: mv.interval,
            count: mv.count,
            add: mv.add,
            req_clock,
            min_clock,
        }));
        self.last_step_clock = last_clock;

        let step_count = if self.sdir != 0 {
            mv.count as i32
        } else {
            -(mv.count as i32)
        };
        self.history.push(HistoryEntry {
            first_clock,
            last_clock,
            start_position: self.last_position,
            step_count,
            interval: mv.interval,
            add: mv.add,
        });
        self.last_position += step_count as i64;
    }

    fn queue_flush(&mut self, move_clock: u64) -> Result<()> {
        while self.last_step_clock < move_clock && !self.queue.is_empty() {
            let window = self.queue.view(self.queue.live_len());
            let mv = wrap_compress(
                window,
                self.last_step_clock,
                self.last_ideal_step_clock,
                self.last_interval,
                self.max_error,
            );
            let cursor = Cursor::new(
                window,
                self.last_step_clock,
                self.last_ideal_step_clock,
                self.last_interval,
                self.max_error,
            );
            check_line(&cursor, mv)?;

            let new_last_interval =
                (mv.interval as i64 + mv.add as i64 * (mv.count as i64 - 1)) as u32;
            let new_last_ideal_step_clock = window[mv.count as usize - 1];
            let first_clock = self.last_step_clock + mv.interval as u64;

            self.add_move(first_clock, &mv);
            self.last_interval = new_last_interval;
            self.last_ideal_step_clock = new_last_ideal_step_clock;
            self.queue.advance(mv.count as usize);
        }
        self.calc_last_step_print_time();
        Ok(())
    }

    fn set_next_step_dir(&mut self, sdir: i32) -> Result<()> {
        if self.sdir == sdir {
            return Ok(());
        }
        self.queue_flush(u64::MAX)?;
        self.sdir = sdir;
        let dir = (sdir ^ self.invert_sdir as i32) != 0;
        self.sink.push(Command::SetNextStepDir(SetNextStepDir {
            oid: self.oid,
            dir,
            req_clock: self.last_step_clock,
        }));
        Ok(())
    }

    fn queue_append_far(&mut self) -> Result<()> {
        let step_clock = self
            .next_step_clock
            .take()
            .expect("pending step clock should exist");
        self.queue_flush(step_clock.saturating_sub(CLOCK_DIFF_MAX).saturating_add(1))?;
        if step_clock >= self.last_step_clock + CLOCK_DIFF_MAX {
            let mv = StepMove {
                interval: (step_clock - self.last_step_clock) as u32,
                count: 1,
                add: 0,
            };
            self.add_move(step_clock, &mv);
            self.last_interval = mv.interval;
            self.last_ideal_step_clock = step_clock;
            self.calc_last_step_print_time();
            return Ok(());
        }
        self.queue.push(step_clock);
        Ok(())
    }

    fn queue_append(&mut self) -> Result<()> {
        if self.next_step_dir != self.sdir {
            self.set_next_step_dir(self.next_step_dir)?;
        }
        let step_clock = self
            .next_step_clock
            .take()
            .expect("pending step clock should exist");
        if step_clock >= self.last_step_clock + CLOCK_DIFF_MAX {
            self.next_step_clock = Some(step_clock);
            return self.queue_append_far();
        }
        if let Some(flush_clock) = self.queue.needs_partial_flush() {
            self.queue_flush(flush_clock)?;
        }
        self.queue.push(step_clock);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressor_with_sink() -> StepperCompressor<RecordingSink> {
        let sink = RecordingSink::default();
        let mut sc = StepperCompressor::new(1, 10, sink);
        sc.set_time(0.0, 1000.0);
        sc
    }

    #[test]
    fn compresses_constant_interval() {
        let mut sc = compressor_with_sink();
        for i in 0..5 {
            sc.append(1, 0.0, i as f64 * 0.001).unwrap();
            sc.commit().unwrap();
        }
        sc.flush(u64::MAX).unwrap();
        let sink = sc.into_sink();
        match &sink.commands[0] {
            Command::SetNextStepDir(_) => {}
            _ => panic!("expected direction setup first"),
        }
        let total: u32 = sink
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::QueueStep(step) => Some(step.count as u32),
                _ => None,
            })
            .sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn sds_filter_rolls_back_direction_flip() {
        let mut sc = compressor_with_sink();
        sc.append(0, 0.0, 0.0).unwrap();
        sc.append(1, 0.0, 0.0).unwrap();
        sc.commit().unwrap();
        sc.flush(u64::MAX).unwrap();
        let sink = sc.into_sink();
        let total: u32 = sink
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::QueueStep(step) => Some(step.count as u32),
                _ => None,
            })
            .sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn history_lookup_matches_offset() {
        let mut sc = compressor_with_sink();
        sc.append(1, 0.0, 0.0).unwrap();
        sc.commit().unwrap();
        sc.append(1, 0.0, 0.001).unwrap();
        sc.commit().unwrap();
        sc.flush(u64::MAX).unwrap();
        assert_eq!(sc.last_position(), 2);
        let pos = sc.find_past_position(sc.last_step_clock());
        assert_eq!(pos, 2);
    }

    #[test]
    fn set_last_position_resets_history_origin() {
        let mut sc = compressor_with_sink();
        sc.append(1, 0.0, 0.0).unwrap();
        sc.commit().unwrap();
        sc.flush(u64::MAX).unwrap();
        sc.set_last_position(sc.last_step_clock(), 100).unwrap();
        assert_eq!(sc.last_position(), 100);
    }

    #[test]
    fn queue_msg_is_ordered_at_current_clock() {
        let mut sc = compressor_with_sink();
        sc.append(1, 0.0, 0.0).unwrap();
        sc.commit().unwrap();
        sc.flush(u64::MAX).unwrap();
        let clock_before = sc.last_step_clock();
        sc.queue_msg(vec![42, 7]).unwrap();
        let sink = sc.into_sink();
        match sink.commands.last() {
            Some(Command::Raw(msg)) => {
                assert_eq!(msg.data, vec![42, 7]);
                assert_eq!(msg.req_clock, clock_before);
            }
            other => panic!("expected trailing raw message, got {other:?}"),
        }
    }

    #[test]
    fn far_step_bypasses_compression_window() {
        // A step more than CLOCK_DIFF_MAX beyond `last_step_clock` must be
        // emitted as its own `count == 1` move with `req_clock` pinned to
        // the step's own clock rather than the stale `last_step_clock`
        // (spec §4.3 `flush_far`, concrete scenario 4).
        let mut sc = compressor_with_sink();
        let far_clock = 5 * (1u64 << 28);
        sc.append(1, 0.0, far_clock as f64 / 1000.0).unwrap();
        sc.commit().unwrap();
        sc.flush(u64::MAX).unwrap();

        let sink = sc.into_sink();
        let steps: Vec<&QueueStep> = sink
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::QueueStep(step) => Some(step),
                _ => None,
            })
            .collect();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].count, 1);
        assert_eq!(steps[0].interval as u64, far_clock);
        assert_eq!(steps[0].req_clock, far_clock);
    }
}
