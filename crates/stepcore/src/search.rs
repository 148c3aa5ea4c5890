//! C2 — the step-move search: per-step tolerance feasibility (`AddRange`),
//! the two-segment least-squares fit (`calc_leastsquares`), the outer
//! driver (`compress_leastsquares`), and the final wrapper
//! (`wrap_compress`) that accounts for the MCU applying `add` *after*
//! the first emitted pulse.
//!
//! Grounded on the teacher's `compress_bisect_add` in
//! `step_compressor.rs` for the general shape (plain `i64` integer math,
//! `idiv_up`/`idiv_down` helpers, the same `Points`/`StepMove` field
//! names) but implementing the spec's two-segment least-squares search
//! rather than the teacher's single-segment bisection — a different
//! algorithm solving the same "maximize covered steps" problem.

pub const CLOCK_DIFF_MAX: u64 = 3 << 28;
const WRAP_WINDOW: usize = 46_000;

/// Signed ceiling division matching C's `(n>=0) ? ceil(n/d) : n/d`.
pub(crate) fn idiv_up(n: i64, d: i64) -> i64 {
    if n >= 0 { (n + d - 1) / d } else { n / d }
}

/// Signed floor division, the `idiv_up` counterpart.
pub(crate) fn idiv_down(n: i64, d: i64) -> i64 {
    if n >= 0 { n / d } else { (n - d + 1) / d }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Points {
    pub minp: i64,
    pub maxp: i64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct StepMove {
    pub interval: u32,
    pub count: u16,
    pub add: i16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct AddMove {
    pub add: i64,
    pub count: i64,
}

/// A borrowed view into a [`StepQueue`](crate::step_queue::StepQueue)'s
/// live window, bounded to `max_count` entries, plus the compressor
/// state the search needs to read (never mutates).
#[derive(Copy, Clone)]
pub(crate) struct Cursor<'a> {
    steps: &'a [u64],
    last_step_clock: u64,
    last_ideal_step_clock: u64,
    last_interval: u32,
    max_error: u32,
}

impl<'a> Cursor<'a> {
    pub fn new(
        steps: &'a [u64],
        last_step_clock: u64,
        last_ideal_step_clock: u64,
        last_interval: u32,
        max_error: u32,
    ) -> Self {
        Self {
            steps,
            last_step_clock,
            last_ideal_step_clock,
            last_interval,
            max_error,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_interval(&self) -> u32 {
        self.last_interval
    }

    /// Tolerance window for the `idx`-th queued step (0-based offset from
    /// the cursor's first live entry). `maxp` is the ideal offset from
    /// `last_step_clock`; `minp` relaxes it by up to `max_error`, never
    /// past the midpoint to the previous queued step.
    pub fn point(&self, idx: usize) -> Points {
        let lsc = self.last_step_clock as i64;
        let point = self.steps[idx] as i64 - lsc;
        let prevpoint = if idx > 0 {
            self.steps[idx - 1] as i64 - lsc
        } else {
            0
        };
        let mut max_error = (point - prevpoint) / 2;
        if max_error > self.max_error as i64 {
            max_error = self.max_error as i64;
        }
        Points {
            minp: point - max_error,
            maxp: point,
        }
    }

    /// The originally-requested inter-step gap at `idx`, used by the
    /// least-squares fit as the "ideal interval" target.
    fn ideal_interval(&self, idx: usize) -> i64 {
        if idx == 0 {
            self.steps[0] as i64 - self.last_ideal_step_clock as i64
        } else {
            self.steps[idx] as i64 - self.steps[idx - 1] as i64
        }
    }

    fn aii(&self, idx: usize) -> i64 {
        self.ideal_interval(idx) - self.last_interval as i64
    }

    /// A cursor as it would read after emitting `mv` covering its first
    /// `mv.count` steps (§4.2.4's `qr_after_move`).
    fn after_move(&self, mv: &StepMove) -> Cursor<'a> {
        let count = mv.count as i64;
        let ticks =
            mv.add as i64 * (count * (count - 1) / 2) + mv.interval as i64 * (count - 1).max(0);
        let last_interval = (mv.interval as i64 + mv.add as i64 * (count - 1)) as u32;
        Cursor {
            steps: &self.steps[mv.count as usize..],
            last_step_clock: self.last_step_clock + mv.interval as u64 + ticks as u64,
            last_ideal_step_clock: self.steps[mv.count as usize - 1],
            last_interval,
            max_error: self.max_error,
        }
    }
}

/// Feasible `add` interval for a single (add,count) segment starting at
/// the cursor, plus the longest run achieved so far (§4.2.1/4.2.2).
#[derive(Copy, Clone, Debug)]
pub(crate) struct AddRange {
    pub minadd: i64,
    pub maxadd: i64,
    pub count: i64,
}

impl AddRange {
    pub fn new() -> Self {
        Self {
            minadd: -0x8000,
            maxadd: 0x7fff,
            count: 0,
        }
    }

    /// Try to extend the feasible segment by one more step. Returns
    /// `false` (and leaves `self` unmodified) when no `add` in
    /// `[minadd, maxadd]` keeps the new step inside its tolerance window.
    pub fn update(&mut self, last_interval: u32, point: Points) -> bool {
        let count1 = self.count + 1;
        let addfactor = count1 * (count1 - 1) / 2;
        let base = last_interval as i64 * count1;

        if addfactor == 0 {
            // First step: no `add` contribution yet, interval alone must land in range.
            if base < point.minp || base > point.maxp {
                return false;
            }
            self.count = count1;
            return true;
        }

        let minadd = idiv_up(point.minp - base, addfactor);
        let maxadd = idiv_down(point.maxp - base, addfactor);
        let new_minadd = self.minadd.max(minadd);
        let new_maxadd = self.maxadd.min(maxadd);
        if new_minadd > new_maxadd {
            return false;
        }
        self.minadd = new_minadd;
        self.maxadd = new_maxadd;
        self.count = count1;
        true
    }

    /// Repeatedly `update` until infeasible; yields the longest single
    /// segment achievable and its feasible `add` range.
    pub fn scan(&mut self, cursor: &Cursor) {
        let last_interval = cursor.last_interval();
        while (self.count as usize) < cursor.len() {
            let point = cursor.point(self.count as usize);
            if !self.update(last_interval, point) {
                break;
            }
        }
    }
}

/// Coefficients of `add1`/`add2` in the reproduced time at step `s`
/// (1-based) of a two-segment move with `count1` steps in segment one.
fn ac1(s: i64, count1: i64) -> i64 {
    if s <= count1 {
        s * (s - 1) / 2
    } else {
        let k = s - count1;
        count1 * (count1 - 1) / 2 + k * count1
    }
}

fn ac2(s: i64, count1: i64) -> i64 {
    if s <= count1 {
        0
    } else {
        let k = s - count1;
        k * (k - 1) / 2
    }
}

/// Solve the 2x2 (or, when `count2 == 0`, 1x1) least-squares normal
/// equations for `(add1, add2)` minimizing the relative squared error
/// of §4.2.3, clamp `add1` to the feasible range, recompute `add2`, then
/// repair `add2` so the final step lands back inside its tolerance
/// window. Returns `None` if no repair keeps the move feasible.
fn solve_segment(
    cursor: &Cursor,
    totalcount: i64,
    count1: i64,
    feasible: &AddRange,
) -> Option<(i64, i64, f64)> {
    let count2 = totalcount - count1;
    let last_interval = cursor.last_interval() as i64;

    let mut var_ac1 = 0.0_f64;
    let mut var_ac2 = 0.0_f64;
    let mut cov12 = 0.0_f64;
    let mut cov1aii = 0.0_f64;
    let mut cov2aii = 0.0_f64;
    for s in 1..=totalcount {
        let a1 = ac1(s, count1) as f64;
        let a2 = ac2(s, count1) as f64;
        let aii = cursor.aii((s - 1) as usize) as f64;
        var_ac1 += a1 * a1;
        var_ac2 += a2 * a2;
        cov12 += a1 * a2;
        cov1aii += a1 * aii;
        cov2aii += a2 * aii;
    }

    let (mut add1, mut add2) = if count2 == 0 {
        let add1 = if var_ac1 > 0.0 { cov1aii / var_ac1 } else { 0.0 };
        (add1, 0.0)
    } else {
        let det = var_ac1 * var_ac2 - cov12 * cov12;
        if det.abs() < 1e-9 {
            let add1 = if var_ac1 > 0.0 { cov1aii / var_ac1 } else { 0.0 };
            (add1, 0.0)
        } else {
            let add1 = (cov1aii * var_ac2 - cov2aii * cov12) / det;
            let add2 = (var_ac1 * cov2aii - cov12 * cov1aii) / det;
            (add1, add2)
        }
    };

    add1 = add1.round();
    if add1 < feasible.minadd as f64 {
        add1 = feasible.minadd as f64;
    }
    if add1 > feasible.maxadd as f64 {
        add1 = feasible.maxadd as f64;
    }

    if count2 > 0 && var_ac2 > 0.0 {
        // Recompute add2 holding the clamped add1 fixed, then repair so the
        // last step of segment two lands back inside its tolerance window.
        add2 = (cov2aii - cov12 * add1) / var_ac2;
    }
    add2 = add2.round();

    if count2 > 0 {
        let last = cursor.point((totalcount - 1) as usize);
        let a1_last = ac1(totalcount, count1) as f64;
        let a2_last = ac2(totalcount, count1) as f64;
        let reached = last_interval as f64 * totalcount as f64 + add1 * a1_last + add2 * a2_last;
        if reached < last.minp as f64 || reached > last.maxp as f64 {
            let gap = if reached < last.minp as f64 {
                last.minp as f64 - reached
            } else {
                last.maxp as f64 - reached
            };
            let addfactor2 = a2_last;
            if addfactor2 != 0.0 {
                let correction = (gap / addfactor2).ceil();
                add2 += correction;
                let reached2 = reached + correction * addfactor2;
                if reached2 < last.minp as f64 || reached2 > last.maxp as f64 {
                    return None;
                }
            } else {
                return None;
            }
        }
    }

    if !(-0x8000..=0x7fff).contains(&(add1 as i64)) || !(-0x8000..=0x7fff).contains(&(add2 as i64))
    {
        return None;
    }

    let dadd1 = add1;
    let dadd2 = add2;
    let err = dadd1 * dadd1 * var_ac1 + dadd2 * dadd2 * var_ac2 + 2.0 * dadd1 * dadd2 * cov12
        - 2.0 * dadd1 * cov1aii
        - 2.0 * dadd2 * cov2aii;

    Some((add1 as i64, add2 as i64, err))
}

/// Two-segment least-squares fit over the cursor's feasible window
/// (§4.2.3/§4.2.4 combined): grows `count1` from 0 up to the longest
/// single-segment run, fitting `(add1, add2)` at every split and keeping
/// the best-scoring feasible one.
pub(crate) fn compress_leastsquares(cursor: &Cursor) -> AddMove {
    let mut feasible = AddRange::new();
    feasible.scan(cursor);
    let count1_max = feasible.count;

    if count1_max == 0 {
        return AddMove { add: 0, count: 0 };
    }

    let mut best_count1 = count1_max;
    let mut best_add1 = feasible.minadd + (feasible.maxadd - feasible.minadd) / 2;
    let mut prev_totalcount = 0i64;

    loop {
        let seg1 = StepMove {
            interval: cursor.last_interval(),
            count: best_count1 as u16,
            add: best_add1 as i16,
        };
        let tail = cursor.after_move(&seg1);
        let mut tail_range = AddRange::new();
        tail_range.scan(&tail);
        let count2 = tail_range.count;
        let totalcount = best_count1 + count2;

        if totalcount <= prev_totalcount {
            return AddMove {
                add: best_add1,
                count: best_count1,
            };
        }
        prev_totalcount = totalcount;

        let mut range_at_count1 = AddRange::new();
        let mut best_seen: Option<(i64, i64, f64)> = None;
        let mut best_split = count1_max;
        for count1 in 1..=count1_max.min(totalcount) {
            let point = cursor.point((count1 - 1) as usize);
            if !range_at_count1.update(cursor.last_interval(), point) {
                break;
            }
            if let Some((a1, _a2, err)) = solve_segment(cursor, totalcount, count1, &range_at_count1)
            {
                let better = match best_seen {
                    None => true,
                    // First-seen wins ties (spec §4.2.3): strict `<` so a
                    // later, larger split never overwrites an equal-error
                    // earlier one.
                    Some((_, _, best_err)) => err < best_err,
                };
                if better {
                    best_seen = Some((a1, count1, err));
                    best_split = count1;
                }
            }
        }

        match best_seen {
            Some((a1, _count1, _)) => {
                best_count1 = best_split;
                best_add1 = a1;
            }
            None => {
                return AddMove {
                    add: best_add1,
                    count: best_count1,
                };
            }
        }
    }
}

/// §4.2.5 — wraps [`compress_leastsquares`] so that the move emitted to
/// the MCU carries the first step's `add` folded into the starting
/// interval (the MCU applies `add` only *after* the first pulse).
pub(crate) fn wrap_compress(steps: &[u64], last_step_clock: u64, last_ideal_step_clock: u64, last_interval: u32, max_error: u32) -> StepMove {
    let window = &steps[..steps.len().min(WRAP_WINDOW)];
    let cursor = Cursor::new(window, last_step_clock, last_ideal_step_clock, last_interval, max_error);

    let am1 = compress_leastsquares(&cursor);

    // `seg1_interval` is always the *actual* first-pulse gap (never the
    // bare `last_interval` carry): when `count==1` the MCU never applies
    // `add`, so a single-step segment's real interval is `last_interval +
    // add`, folded in up front rather than left for the caller to infer.
    let (seg1_interval, seg1_count, seg1_add) = if am1.count == 0 {
        // Nothing satisfies even a single step against `last_interval`
        // (e.g. a cold start with `last_interval == 0`): seed one step
        // wherever the tolerance window allows, to be extended below.
        let target = cursor.point(0).maxp - last_interval as i64 - max_error as i64 / 2;
        (target.max(1), 1i64, 0i64)
    } else if am1.count == 1 {
        (last_interval as i64 + am1.add, 1i64, 0i64)
    } else {
        (last_interval as i64 + am1.add, am1.count, am1.add)
    };

    if seg1_count == 1 && window.len() > 1 {
        let seg1 = StepMove {
            interval: seg1_interval as u32,
            count: 1,
            add: 0,
        };
        let tail = cursor.after_move(&seg1);
        let am2 = compress_leastsquares(&tail);
        if (-0x8000..=0x7fff).contains(&am2.add) {
            return StepMove {
                interval: seg1_interval as u32,
                count: (am2.count + 1) as u16,
                add: am2.add as i16,
            };
        }
    }

    StepMove {
        interval: seg1_interval as u32,
        count: seg1_count as u16,
        add: seg1_add as i16,
    }
}
