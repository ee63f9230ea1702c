//! Mixture weight table (spec §4.3, §6).
//!
//! Stored per `[senone][stream][density]` as scaled negative-log `i32`s
//! (via [`crate::logmath::LogMath`]), floored at construction
//! (`mixwfloor`, default `1e-7`). An optional 4-bit quantized
//! representation ("weighted by mixture weights (optionally 4-bit
//! quantized via a shared codebook)", spec §4.3 step 4) dequantizes
//! through a small shared codebook instead of storing one `i32` per
//! leaf.

use crate::error::DecoderError;
use crate::logmath::LogMath;

enum Weights {
    Full(Vec<i32>),
    Quantized4Bit {
        /// 16-entry codebook of representative scaled-log weights.
        codebook: [i32; 16],
        /// One nibble (stored as a byte 0..=15) per leaf.
        indices: Vec<u8>,
    },
}

pub struct MixtureWeights {
    n_senone: usize,
    n_stream: usize,
    n_density: usize,
    weights: Weights,
}

impl MixtureWeights {
    /// `raw` is `[senone][stream][density]` float mixture weights
    /// (un-normalized is fine; each value is independently floored and
    /// converted). Length must be exactly `n_senone*n_stream*n_density`.
    pub fn from_floats(
        lm: &LogMath,
        n_senone: usize,
        n_stream: usize,
        n_density: usize,
        raw: &[f32],
        floor: f32,
    ) -> Result<Self, DecoderError> {
        let expected = n_senone * n_stream * n_density;
        if raw.len() != expected {
            return Err(DecoderError::Model(format!(
                "mixture weight array length mismatch: expected {expected}, got {}",
                raw.len()
            )));
        }
        let weights: Vec<i32> = raw
            .iter()
            .map(|&w| lm.log(w.max(floor) as f64))
            .collect();
        Ok(Self {
            n_senone,
            n_stream,
            n_density,
            weights: Weights::Full(weights),
        })
    }

    /// Quantize an already-built [`MixtureWeights::Full`] table to 4
    /// bits per leaf via a shared 16-entry codebook built by uniform
    /// quantiles of the observed values. Returns an error if `self` is
    /// already quantized.
    pub fn quantize_4bit(&self) -> Result<Self, DecoderError> {
        let full = match &self.weights {
            Weights::Full(v) => v,
            Weights::Quantized4Bit { .. } => {
                return Err(DecoderError::Model("already quantized".into()))
            }
        };
        let mut sorted = full.clone();
        sorted.sort_unstable();
        let mut codebook = [0i32; 16];
        for (i, slot) in codebook.iter_mut().enumerate() {
            let idx = (i * (sorted.len().saturating_sub(1))) / 15.max(1);
            *slot = sorted[idx.min(sorted.len() - 1)];
        }
        let indices: Vec<u8> = full
            .iter()
            .map(|&v| nearest_codeword(&codebook, v))
            .collect();
        Ok(Self {
            n_senone: self.n_senone,
            n_stream: self.n_stream,
            n_density: self.n_density,
            weights: Weights::Quantized4Bit { codebook, indices },
        })
    }

    fn index(&self, senone: usize, stream: usize, density: usize) -> usize {
        (senone * self.n_stream + stream) * self.n_density + density
    }

    pub fn weight(&self, senone: usize, stream: usize, density: usize) -> i32 {
        let idx = self.index(senone, stream, density);
        match &self.weights {
            Weights::Full(v) => v[idx],
            Weights::Quantized4Bit { codebook, indices } => codebook[indices[idx] as usize],
        }
    }

    pub fn n_senone(&self) -> usize {
        self.n_senone
    }

    pub fn n_stream(&self) -> usize {
        self.n_stream
    }

    pub fn n_density(&self) -> usize {
        self.n_density
    }
}

fn nearest_codeword(codebook: &[i32; 16], value: i32) -> u8 {
    let mut best_idx = 0usize;
    let mut best_dist = i64::MAX;
    for (i, &c) in codebook.iter().enumerate() {
        let dist = (c as i64 - value as i64).abs();
        if dist < best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }
    best_idx as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_and_converts() {
        let lm = LogMath::default_base();
        let raw = vec![0.5, 0.0, 1.0, 1e-10];
        let mw = MixtureWeights::from_floats(&lm, 1, 1, 4, &raw, 1e-7).unwrap();
        // weight 1.0 should be the best (closest to logb(1) == 0).
        assert!(mw.weight(0, 0, 2) >= mw.weight(0, 0, 0));
        // flooring must prevent -infinity for the zero entries.
        assert!(mw.weight(0, 0, 1) > lm.zero());
        assert!(mw.weight(0, 0, 3) > lm.zero());
    }

    #[test]
    fn rejects_length_mismatch() {
        let lm = LogMath::default_base();
        let raw = vec![0.5; 3];
        assert!(MixtureWeights::from_floats(&lm, 1, 1, 4, &raw, 1e-7).is_err());
    }

    #[test]
    fn quantize_4bit_preserves_ordering_approximately() {
        let lm = LogMath::default_base();
        let raw: Vec<f32> = (1..=32).map(|i| i as f32 / 32.0).collect();
        let mw = MixtureWeights::from_floats(&lm, 1, 1, 32, &raw, 1e-7).unwrap();
        let q = mw.quantize_4bit().unwrap();
        let full_best = mw.weight(0, 0, 31);
        let q_best = q.weight(0, 0, 31);
        // Quantized weight for the largest input should still be among
        // the higher scores (not the worst).
        let full_worst = mw.weight(0, 0, 0);
        let q_worst = q.weight(0, 0, 0);
        assert!(q_best >= q_worst);
        assert!((full_best - full_worst) != 0);
    }
}
