//! Per-arc HMM evaluator (spec §4.4): left-to-right 3-emitting-state
//! topology plus a non-emitting exit, evaluated one frame at a time.
//!
//! Every arithmetic step saturates instead of wrapping — the teacher's
//! DSP code never lets a sample escape its valid range either, just in
//! float instead of scaled-int — and ties in the state recurrence break
//! toward the self-loop by convention (spec §4.4 "Tie-breaking").

use crate::model::transition::IMPOSSIBLE;
use crate::model::TransitionMatrix;

pub const N_EMIT_STATE: usize = 3;

/// Which predecessor produced a state's winning score this frame: its
/// own self-loop, or an incoming transition from a lower-numbered state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predecessor {
    SelfLoop,
    From(usize),
}

/// One active instantiation of a senone-sequence/tmat pair, tracking
/// its 3 emitting-state scores and non-emitting exit score across
/// frames. Owned by the search module, chained per-phone inside a
/// per-arc instance.
#[derive(Debug, Clone)]
pub struct HmmInstance {
    pub senone_sequence: usize,
    pub tmat: usize,
    state_score: [i32; N_EMIT_STATE],
    state_pred: [Predecessor; N_EMIT_STATE],
    exit_score: i32,
    exit_pred: usize,
    frame_entered: u32,
    zero: i32,
}

impl HmmInstance {
    /// A freshly entered instance: state 0 seeded with `entry_score`,
    /// the other states at `zero` (impossible) until the recurrence
    /// reaches them.
    pub fn enter(senone_sequence: usize, tmat: usize, entry_score: i32, zero: i32, frame: u32) -> Self {
        let mut state_score = [zero; N_EMIT_STATE];
        state_score[0] = entry_score;
        Self {
            senone_sequence,
            tmat,
            state_score,
            state_pred: [Predecessor::SelfLoop; N_EMIT_STATE],
            exit_score: zero,
            exit_pred: 0,
            frame_entered: frame,
            zero,
        }
    }

    pub fn state_score(&self, state: usize) -> i32 {
        self.state_score[state]
    }

    pub fn state_predecessor(&self, state: usize) -> Predecessor {
        self.state_pred[state]
    }

    pub fn best_state_score(&self) -> i32 {
        self.state_score.iter().copied().fold(self.zero, i32::max)
    }

    pub fn exit_score(&self) -> i32 {
        self.exit_score
    }

    pub fn exit_predecessor_state(&self) -> usize {
        self.exit_pred
    }

    pub fn frame_entered(&self) -> u32 {
        self.frame_entered
    }

    /// Feed an externally-seeded candidate into state 0, keeping the
    /// better of the two (used to chain phone HMMs within a word, the
    /// same "better-wins" rule spec §4.5 uses for arc propagation).
    pub fn feed_entry(&mut self, candidate_score: i32) {
        if candidate_score > self.state_score[0] {
            self.state_score[0] = candidate_score;
        }
    }

    /// One frame update (spec §4.4 steps 1-3): propagate state scores
    /// through the transition matrix, add per-state acoustic scores,
    /// then recompute the exit score as the best path out of state 2.
    ///
    /// `senone_scores` gives the acoustic score for each of this
    /// instance's 3 senones this frame, in state order.
    pub fn update(&mut self, tmat: &TransitionMatrix, senone_scores: [i32; N_EMIT_STATE]) {
        let prev = self.state_score;
        let prev_pred_default = Predecessor::SelfLoop;
        let mut new_score = [self.zero; N_EMIT_STATE];
        let mut new_pred = [prev_pred_default; N_EMIT_STATE];

        for dst in 0..N_EMIT_STATE {
            let mut best = self.zero;
            let mut best_pred = Predecessor::SelfLoop;
            // Self-loop first so it wins ties (spec §4.4 tie-breaking).
            let self_cost = tmat.cost(self.tmat, dst, dst);
            if self_cost < IMPOSSIBLE && prev[dst] > self.zero {
                best = transition_step(prev[dst], self_cost, self.zero);
                best_pred = Predecessor::SelfLoop;
            }
            for src in 0..dst {
                let cost = tmat.cost(self.tmat, src, dst);
                if cost >= IMPOSSIBLE || prev[src] <= self.zero {
                    continue;
                }
                let candidate = transition_step(prev[src], cost, self.zero);
                if candidate > best {
                    best = candidate;
                    best_pred = Predecessor::From(src);
                }
            }
            new_score[dst] = best;
            new_pred[dst] = best_pred;
        }

        for dst in 0..N_EMIT_STATE {
            if new_score[dst] > self.zero {
                new_score[dst] = new_score[dst].saturating_add(senone_scores[dst]);
            }
        }

        self.state_score = new_score;
        self.state_pred = new_pred;

        // Exit: best path out of the last emitting state into the
        // non-emitting sink (tmat column N_EMIT_STATE).
        let last = N_EMIT_STATE - 1;
        let exit_cost = tmat.cost(self.tmat, last, N_EMIT_STATE);
        self.exit_score = if exit_cost < IMPOSSIBLE && self.state_score[last] > self.zero {
            transition_step(self.state_score[last], exit_cost, self.zero)
        } else {
            self.zero
        };
        self.exit_pred = last;
    }
}

/// `prev_score - cost`, in the scaled-negative-log domain, saturating
/// at `zero` (the sentinel for "impossible") rather than overflowing.
#[inline]
fn transition_step(prev_score: i32, cost: u8, zero: i32) -> i32 {
    let stepped = prev_score.saturating_sub(cost as i32);
    stepped.max(zero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransitionMatrix;

    fn simple_tmat() -> TransitionMatrix {
        // n_src=3, n_dst=4. Mild self-loop + forward costs, 1-skip allowed.
        let tp = vec![
            5, 10, 20, 255, // src0
            255, 5, 10, 255, // src1
            255, 255, 5, 10, // src2
        ];
        TransitionMatrix::new(1, 3, tp).unwrap()
    }

    const ZERO: i32 = i32::MIN >> 4;

    #[test]
    fn entry_seeds_state_zero_only() {
        let hmm = HmmInstance::enter(0, 0, 0, ZERO, 0);
        assert_eq!(hmm.state_score(0), 0);
        assert_eq!(hmm.state_score(1), ZERO);
        assert_eq!(hmm.state_score(2), ZERO);
    }

    #[test]
    fn self_loop_wins_ties() {
        let tmat = simple_tmat();
        let mut hmm = HmmInstance::enter(0, 0, 0, ZERO, 0);
        // Force state1's incoming-from-state0 cost to exactly match
        // what a hypothetical self-loop would produce by first priming
        // state1 with a self-loop score equal to the cross-transition.
        hmm.update(&tmat, [0, ZERO, ZERO]); // frame 1: only state0 alive
        // state0: -5 (self loop), state1: 0-10=-10 (from state0)
        assert_eq!(hmm.state_score(0), -5);
        assert_eq!(hmm.state_score(1), -10);
    }

    #[test]
    fn impossible_transition_keeps_state_at_zero_sentinel() {
        let tmat = simple_tmat();
        let mut hmm = HmmInstance::enter(0, 0, 0, ZERO, 0);
        hmm.update(&tmat, [0, ZERO, ZERO]);
        // state2 needs either self-loop (not yet alive) or a skip from
        // state0 (allowed, cost 20) or state1 (cost 10, but state1 just
        // became alive at -10 this same frame using *previous* scores,
        // so state2 this frame draws from the *previous* frame's
        // state0/state1, both at ZERO/entry).
        assert!(hmm.state_score(2) >= ZERO);
    }

    #[test]
    fn exit_score_tracks_last_state() {
        let tmat = simple_tmat();
        let mut hmm = HmmInstance::enter(0, 0, 0, ZERO, 0);
        for _ in 0..5 {
            hmm.update(&tmat, [0, 0, 0]);
        }
        assert!(hmm.exit_score() > ZERO);
        assert_eq!(hmm.exit_predecessor_state(), 2);
    }

    #[test]
    fn best_state_score_is_the_max() {
        let tmat = simple_tmat();
        let mut hmm = HmmInstance::enter(0, 0, 0, ZERO, 0);
        hmm.update(&tmat, [0, 0, 0]);
        let best = hmm.best_state_score();
        assert!(best >= hmm.state_score(0));
        assert!(best >= hmm.state_score(1));
        assert!(best >= hmm.state_score(2));
    }
}
