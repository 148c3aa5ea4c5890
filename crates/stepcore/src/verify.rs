//! C8 — the verifier: a pure, read-only re-check of a candidate
//! [`StepMove`](crate::search::StepMove) against the same per-step
//! tolerance windows the search used to build it, run once more before
//! the move is ever queued to the MCU (spec §8).
//!
//! Ported near-verbatim from the teacher's `check_line` in
//! `step_compressor.rs`, generalized to read through a [`Cursor`]
//! instead of the compressor's own `queue`/`queue_pos` fields.

use crate::error::{Result, StepCompressError};
use crate::search::{Cursor, StepMove};

/// Re-derive the reproduced position of every step in `mv` and confirm
/// it both lands inside its tolerance window and never lets `interval`
/// reach the MCU's signed-32-bit ceiling (spec §8, invariants I1/I6).
pub(crate) fn check_line(cursor: &Cursor, mv: StepMove) -> Result<()> {
    if mv.count == 0 || (mv.interval == 0 && mv.add == 0 && mv.count > 1) || mv.interval >= 0x8000_0000
    {
        return Err(StepCompressError::InvalidSequence {
            interval: mv.interval,
            count: mv.count,
            add: mv.add,
        });
    }

    let mut interval = mv.interval as i64;
    let mut p: i64 = 0;
    for i in 0..mv.count {
        let point = cursor.point(i as usize);
        p += interval;
        if p < point.minp || p > point.maxp {
            return Err(StepCompressError::PointOutOfRange {
                index: i + 1,
                value: p,
                min: point.minp,
                max: point.maxp,
                interval: mv.interval,
                count: mv.count,
                add: mv.add,
            });
        }
        if interval >= 0x8000_0000 {
            return Err(StepCompressError::IntervalOverflow {
                index: i + 1,
                interval: mv.interval,
                count: mv.count,
                add: mv.add,
            });
        }
        interval += mv.add as i64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_count() {
        let steps = [1000u64];
        let cursor = Cursor::new(&steps, 0, 0, 0, 10);
        let mv = StepMove {
            interval: 1000,
            count: 0,
            add: 0,
        };
        assert!(matches!(
            check_line(&cursor, mv),
            Err(StepCompressError::InvalidSequence { .. })
        ));
    }

    #[test]
    fn rejects_huge_interval() {
        let steps = [1000u64];
        let cursor = Cursor::new(&steps, 0, 0, 0, 10);
        let mv = StepMove {
            interval: 0x8000_0000,
            count: 1,
            add: 0,
        };
        assert!(matches!(
            check_line(&cursor, mv),
            Err(StepCompressError::InvalidSequence { .. })
        ));
    }

    #[test]
    fn accepts_move_within_tolerance() {
        let steps: Vec<u64> = (1..=5).map(|i| i * 1000).collect();
        let cursor = Cursor::new(&steps, 0, 0, 0, 10);
        let mv = StepMove {
            interval: 1000,
            count: 5,
            add: 0,
        };
        assert!(check_line(&cursor, mv).is_ok());
    }

    #[test]
    fn rejects_point_outside_window() {
        let steps: Vec<u64> = (1..=5).map(|i| i * 1000).collect();
        let cursor = Cursor::new(&steps, 0, 0, 0, 10);
        let mv = StepMove {
            interval: 2000,
            count: 5,
            add: 0,
        };
        assert!(matches!(
            check_line(&cursor, mv),
            Err(StepCompressError::PointOutOfRange { .. })
        ));
    }
}
