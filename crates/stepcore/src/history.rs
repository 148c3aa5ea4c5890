//! C5 — the history ring: a newest-first log of emitted [`StepMove`]s used
//! to answer "where was the stepper at clock X" queries after the moves
//! that produced that position have already been flushed out of the
//! live queue.
//!
//! Grounded on the teacher's inline `VecDeque<HistoryEntry>` plus
//! `find_past_position` / `extract_old` / `expire_history` in
//! `step_compressor.rs`, pulled out into its own type so the façade in
//! `compressor.rs` composes it rather than inlining it.

use std::collections::VecDeque;

/// Seconds of history kept before aging out (spec §3/§5 `HISTORY_EXPIRE`):
/// `free_history`/`expire_history` is called with `last_step_clock -
/// 30*mcu_freq` on every time update.
pub const HISTORY_EXPIRE_SECONDS: f64 = 30.0;

/// One committed move, kept around for past-position queries and history
/// extraction (spec §5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub first_clock: u64,
    pub last_clock: u64,
    pub start_position: i64,
    pub step_count: i32,
    pub interval: u32,
    pub add: i16,
}

/// A [`HistoryEntry`] as handed back across the host boundary (spec §5
/// `extract_old`); identical in shape but kept as a separate public type
/// so callers don't depend on the ring's internal representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PullHistoryStep {
    pub first_clock: u64,
    pub last_clock: u64,
    pub start_position: i64,
    pub step_count: i32,
    pub interval: u32,
    pub add: i16,
}

impl From<HistoryEntry> for PullHistoryStep {
    fn from(e: HistoryEntry) -> Self {
        PullHistoryStep {
            first_clock: e.first_clock,
            last_clock: e.last_clock,
            start_position: e.start_position,
            step_count: e.step_count,
            interval: e.interval,
            add: e.add,
        }
    }
}

/// Newest-first log of committed moves, plus the position that preceded
/// all of them.
#[derive(Debug, Default)]
pub struct HistoryRing {
    entries: VecDeque<HistoryEntry>,
}

impl HistoryRing {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Record a just-committed move. `start_position` is the position
    /// immediately before this move's first step.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
    }

    /// Marker entry for `set_last_position` (spec §5): a zero-length
    /// segment recording a position reset at `clock`.
    pub fn push_marker(&mut self, clock: u64, position: i64) {
        self.entries.push_front(HistoryEntry {
            first_clock: clock,
            last_clock: clock,
            start_position: position,
            step_count: 0,
            interval: 0,
            add: 0,
        });
    }

    /// Quadratic-formula position inversion (spec §5, invariant I5):
    /// given `clock` falls within `[first_clock, last_clock]` of some
    /// entry, solves `interval*offset + add*offset*(offset-1)/2 = ticks`
    /// for the (non-negative) step offset reached by that clock.
    pub fn find_past_position(&self, fallback: i64, clock: u64) -> i64 {
        let mut last_position = fallback;
        for entry in &self.entries {
            if clock < entry.first_clock {
                last_position = entry.start_position;
                continue;
            }
            if clock >= entry.last_clock {
                return entry.start_position + entry.step_count as i64;
            }

            let interval = entry.interval as i64;
            let add = entry.add as i64;
            let ticks = (clock as i64 - entry.first_clock as i64) + interval;
            let offset = if add == 0 {
                ticks as f64 / interval as f64
            } else {
                let a = 0.5_f64 * add as f64;
                let b = interval as f64 - 0.5_f64 * add as f64;
                let c = -ticks as f64;
                ((b * b - 4.0 * a * c).sqrt() - b) / (2.0 * a)
            } as i64;

            return if entry.step_count < 0 {
                entry.start_position - offset
            } else {
                entry.start_position + offset
            };
        }
        last_position
    }

    /// Copies out (at most `max`) entries overlapping `[start_clock,
    /// end_clock)`, newest first (spec §5 `extract_old`).
    pub fn extract_old(&self, max: usize, start_clock: u64, end_clock: u64) -> Vec<PullHistoryStep> {
        let mut res = Vec::new();
        for entry in &self.entries {
            if start_clock >= entry.last_clock || res.len() >= max {
                break;
            }
            if end_clock <= entry.first_clock {
                continue;
            }
            res.push((*entry).into());
        }
        res
    }

    /// Drops every entry whose `last_clock` is at or before `end_clock`,
    /// oldest (tail) end first (spec §5 `expire_history`).
    pub fn expire_history(&mut self, end_clock: u64) {
        while let Some(back) = self.entries.back() {
            if back.last_clock > end_clock {
                break;
            }
            self.entries.pop_back();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_past_position_within_constant_move() {
        let mut ring = HistoryRing::new();
        ring.push(HistoryEntry {
            first_clock: 1000,
            last_clock: 10_000,
            start_position: 0,
            step_count: 10,
            interval: 1000,
            add: 0,
        });
        assert_eq!(ring.find_past_position(0, 500), 0);
        assert_eq!(ring.find_past_position(0, 5000), 4);
        assert_eq!(ring.find_past_position(0, 10_000), 10);
    }

    #[test]
    fn find_past_position_handles_negative_direction() {
        let mut ring = HistoryRing::new();
        ring.push(HistoryEntry {
            first_clock: 1000,
            last_clock: 10_000,
            start_position: 50,
            step_count: -10,
            interval: 1000,
            add: 0,
        });
        assert_eq!(ring.find_past_position(0, 5000), 46);
    }

    #[test]
    fn expire_history_drops_old_tail_entries() {
        let mut ring = HistoryRing::new();
        for i in 0..3u64 {
            ring.push(HistoryEntry {
                first_clock: i * 1000,
                last_clock: i * 1000 + 500,
                start_position: i as i64,
                step_count: 1,
                interval: 500,
                add: 0,
            });
        }
        assert_eq!(ring.len(), 3);
        ring.expire_history(500);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn extract_old_respects_window_and_max() {
        let mut ring = HistoryRing::new();
        for i in 0..5u64 {
            ring.push(HistoryEntry {
                first_clock: i * 1000,
                last_clock: i * 1000 + 1000,
                start_position: i as i64,
                step_count: 1,
                interval: 1000,
                add: 0,
            });
        }
        let extracted = ring.extract_old(2, 0, 6000);
        assert_eq!(extracted.len(), 2);
    }
}
