//! HMM transition matrices (spec §3, §4.4, §6).
//!
//! One matrix per base phone; each is `n_src` emitting states by
//! `n_dst = n_src + 1` columns (the extra column is the non-emitting
//! exit state), stored as 8-bit quantized costs where `255` means
//! "impossible". Construction enforces the two topology invariants
//! spec §7 calls out as a *model* error: the matrix must be
//! upper-triangular (no backward arcs) and must skip at most one state
//! at a time (`original_source/src/tmat.c`'s `tmat_chk_uppertri` /
//! `tmat_chk_1skip`).

use crate::error::DecoderError;

pub const IMPOSSIBLE: u8 = 255;

pub struct TransitionMatrix {
    n_tmat: usize,
    n_src: usize,
    n_dst: usize,
    /// flattened `[tmat][src][dst]`
    tp: Vec<u8>,
}

impl TransitionMatrix {
    /// `tp` must be `n_tmat * n_src * (n_src + 1)` bytes, laid out
    /// matrix-major / src / dst.
    pub fn new(n_tmat: usize, n_src: usize, tp: Vec<u8>) -> Result<Self, DecoderError> {
        let n_dst = n_src + 1;
        let expected = n_tmat * n_src * n_dst;
        if tp.len() != expected {
            return Err(DecoderError::Model(format!(
                "transition matrix array length mismatch: expected {expected}, got {}",
                tp.len()
            )));
        }
        let m = Self { n_tmat, n_src, n_dst, tp };
        m.check_uppertri()?;
        m.check_1skip()?;
        Ok(m)
    }

    #[inline]
    fn at(&self, tmat: usize, src: usize, dst: usize) -> u8 {
        self.tp[(tmat * self.n_src + src) * self.n_dst + dst]
    }

    fn check_uppertri(&self) -> Result<(), DecoderError> {
        for t in 0..self.n_tmat {
            for dst in 0..self.n_src {
                for src in (dst + 1)..self.n_src {
                    if self.at(t, src, dst) < IMPOSSIBLE {
                        return Err(DecoderError::Model(format!(
                            "transition matrix {t} has a backward arc tp[{src}][{dst}]={}",
                            self.at(t, src, dst)
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_1skip(&self) -> Result<(), DecoderError> {
        for t in 0..self.n_tmat {
            for src in 0..self.n_src {
                let mut dst = src + 3;
                while dst <= self.n_src {
                    if self.at(t, src, dst) < IMPOSSIBLE {
                        return Err(DecoderError::Model(format!(
                            "transition matrix {t} skips more than one state: tp[{src}][{dst}]={}",
                            self.at(t, src, dst)
                        )));
                    }
                    dst += 1;
                }
            }
        }
        Ok(())
    }

    pub fn n_tmat(&self) -> usize {
        self.n_tmat
    }

    pub fn n_src(&self) -> usize {
        self.n_src
    }

    /// Transition cost `src -> dst` for the given matrix, in 8-bit
    /// quantized scaled-log units (255 == impossible).
    pub fn cost(&self, tmat: usize, src: usize, dst: usize) -> u8 {
        self.at(tmat, src, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_3state_tp() -> Vec<u8> {
        // n_src = 3, n_dst = 4. Left-to-right, single-state skip.
        // state0: self-loop, ->1, ->2(skip), exit impossible
        // state1: impossible back, self-loop, ->2, exit impossible
        // state2: impossible back x2, self-loop, ->exit
        vec![
            10, 20, 60, 255, // src0: [dst0,dst1,dst2,dst3]
            255, 10, 20, 255, // src1
            255, 255, 10, 30, // src2
        ]
    }

    #[test]
    fn accepts_valid_topology() {
        let tm = TransitionMatrix::new(1, 3, valid_3state_tp()).unwrap();
        assert_eq!(tm.cost(0, 0, 0), 10);
        assert_eq!(tm.cost(0, 2, 3), 30);
    }

    #[test]
    fn rejects_backward_arc() {
        let mut tp = valid_3state_tp();
        tp[4] = 50; // src1 -> dst0, a backward arc
        assert!(TransitionMatrix::new(1, 3, tp).is_err());
    }

    #[test]
    fn rejects_multistep_skip() {
        let mut tp = valid_3state_tp();
        tp[3] = 40; // src0 -> dst3 (exit), skipping two states
        assert!(TransitionMatrix::new(1, 3, tp).is_err());
    }

    #[test]
    fn rejects_length_mismatch() {
        assert!(TransitionMatrix::new(1, 3, vec![0; 10]).is_err());
    }
}
