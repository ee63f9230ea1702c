//! Acoustic scorer (spec §4.3): feature vector + active-senone list →
//! integer negative-log score per active senone.
//!
//! Both PTM and semi-continuous models are scored by the same
//! `AcousticScorer`, which differs only in how senones map onto
//! codebooks (one-per-phone vs. a single shared codebook) — mirrors the
//! teacher's single `ChannelProcessor` owning several swappable DSP
//! stages rather than duplicating the stage's driving loop per variant.

pub mod active;
pub mod topn;

pub use active::ActiveSenoneList;
pub use topn::{TopN, TopNEntry};

use crate::error::DecoderError;
use crate::logmath::LogMath;
use crate::model::{GaussianParams, MixtureWeights, ScorerKind};

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// `topn` (default 4).
    pub topn: usize,
    /// `ds`, frame downsample ratio (default 1, meaning every frame).
    pub downsample: usize,
    /// `aw`, acoustic scaling divisor (default 1.0).
    pub acoustic_scale: f32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self { topn: 4, downsample: 1, acoustic_scale: 1.0 }
    }
}

/// One top-N cache per (codebook, stream) pair.
struct Cache {
    per_stream: Vec<TopN>,
}

pub struct AcousticScorer {
    logmath: LogMath,
    cfg: ScorerConfig,
    senone_codebook: Vec<usize>,
    caches: Vec<Cache>,
    frame_count: u64,
}

impl AcousticScorer {
    fn new_raw(
        logmath: LogMath,
        cfg: ScorerConfig,
        gaussians: &GaussianParams,
        senone_codebook: Vec<usize>,
    ) -> Self {
        let caches = (0..gaussians.n_codebooks())
            .map(|_| Cache {
                per_stream: (0..gaussians.n_streams()).map(|_| TopN::new(cfg.topn)).collect(),
            })
            .collect();
        Self { logmath, cfg, senone_codebook, caches, frame_count: 0 }
    }

    /// PTM model: `senone_codebook[senone]` gives the codebook (one per
    /// context-independent base phone) that senone's mixture belongs to.
    pub fn new_ptm(
        logmath: LogMath,
        cfg: ScorerConfig,
        gaussians: &GaussianParams,
        senone_codebook: Vec<usize>,
    ) -> Result<Self, DecoderError> {
        if gaussians.kind() != ScorerKind::Ptm {
            return Err(DecoderError::Model("gaussian table is not a PTM model".into()));
        }
        Ok(Self::new_raw(logmath, cfg, gaussians, senone_codebook))
    }

    /// Semi-continuous model: every senone shares codebook 0.
    pub fn new_semi_continuous(
        logmath: LogMath,
        cfg: ScorerConfig,
        gaussians: &GaussianParams,
        n_senone: usize,
    ) -> Result<Self, DecoderError> {
        if gaussians.kind() != ScorerKind::SemiContinuous {
            return Err(DecoderError::Model("gaussian table is not a semi-continuous model".into()));
        }
        Ok(Self::new_raw(logmath, cfg, gaussians, vec![0; n_senone]))
    }

    pub fn start_utterance(&mut self) {
        self.frame_count = 0;
        for cache in &mut self.caches {
            for topn in &mut cache.per_stream {
                topn.clear();
            }
        }
    }

    /// Score one frame (spec §4.3 steps 1-4). `feature` is one slice per
    /// stream. `active` lists the senones that need a score this frame.
    /// Returns one score per entry of `active`, same order, each a
    /// non-positive `i32` clamped to the 16-bit signed range.
    pub fn score_frame(
        &mut self,
        gaussians: &GaussianParams,
        mixw: &MixtureWeights,
        feature: &[Vec<f32>],
        active: &[usize],
    ) -> Result<Vec<i32>, DecoderError> {
        if feature.len() != gaussians.n_streams() {
            return Err(DecoderError::State(format!(
                "expected {} feature streams, got {}",
                gaussians.n_streams(),
                feature.len()
            )));
        }
        for &s in active {
            if s >= self.senone_codebook.len() {
                return Err(DecoderError::State(format!("active senone {s} out of range")));
            }
        }

        let do_full = self.cfg.downsample <= 1 || self.frame_count % self.cfg.downsample as u64 == 0;
        if do_full {
            let mut active_codebooks: Vec<usize> =
                active.iter().map(|&s| self.senone_codebook[s]).collect();
            active_codebooks.sort_unstable();
            active_codebooks.dedup();
            for cb in active_codebooks {
                for s in 0..gaussians.n_streams() {
                    self.rescan_codebook_stream(gaussians, cb, s, &feature[s]);
                }
            }
        }
        self.frame_count += 1;

        let zero = self.logmath.zero();
        let mut out = Vec::with_capacity(active.len());
        for &senone in active {
            let cb = self.senone_codebook[senone];
            let mut total = 0i32;
            for s in 0..gaussians.n_streams() {
                let mut stream_mix = zero;
                // spec §4.3 step 3: normalize the stream's codebook scores
                // by subtracting the best before log-adding, so every
                // weighted term stays non-positive and fits an 8-bit range.
                let densities: Vec<(usize, i32)> = self.caches[cb].per_stream[s]
                    .iter()
                    .map(|entry| (entry.density, self.logmath.ln_to_log(entry.score as f64)))
                    .collect();
                let best_logb = densities.iter().map(|&(_, v)| v).max();
                if let Some(best_logb) = best_logb {
                    for (density, density_logb) in densities {
                        let normalized = (density_logb - best_logb).clamp(-255, 0);
                        let w = mixw.weight(senone, s, density);
                        stream_mix = self.logmath.add(stream_mix, normalized.saturating_add(w));
                    }
                }
                total = total.saturating_add(stream_mix);
            }
            let scaled = (total as f32 / self.cfg.acoustic_scale) as i32;
            out.push(scaled.clamp(i16::MIN as i32, i16::MAX as i32));
        }
        Ok(out)
    }

    /// Warm-start from the previous frame's top-N, then scan the rest
    /// of the codebook pruning by the running worst-of-top-N threshold.
    fn rescan_codebook_stream(&mut self, gaussians: &GaussianParams, cb: usize, s: usize, x: &[f32]) {
        let topn = &mut self.caches[cb].per_stream[s];
        let previous: Vec<TopNEntry> = topn.iter().copied().collect();
        topn.clear();
        for e in &previous {
            let score = gaussians.log_density(cb, s, e.density, x);
            topn.insert(TopNEntry { density: e.density, score });
        }
        // No precomputed bound lets us skip the density evaluation
        // itself, so every remaining codeword is scored; the running
        // worst-of-top-N threshold only gates whether it's kept.
        let seen: std::collections::HashSet<usize> = previous.iter().map(|e| e.density).collect();
        for d in 0..gaussians.n_density() {
            if seen.contains(&d) {
                continue;
            }
            let score = gaussians.log_density(cb, s, d, x);
            topn.insert(TopNEntry { density: d, score });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScorerKind;

    fn semi_model() -> (LogMath, GaussianParams, MixtureWeights) {
        let lm = LogMath::default_base();
        let means = vec![0.0, 0.0, 5.0, 5.0, -5.0, -5.0];
        let vars = vec![1.0; 6];
        let gaussians = GaussianParams::new(ScorerKind::SemiContinuous, 1, 3, vec![2], means, vars).unwrap();
        // 2 senones, 1 stream, 3 densities each.
        let raw = vec![0.8, 0.1, 0.1, 0.1, 0.1, 0.8];
        let mixw = MixtureWeights::from_floats(&lm, 2, 1, 3, &raw, 1e-7).unwrap();
        (lm, gaussians, mixw)
    }

    #[test]
    fn senone_favoring_the_matching_density_scores_higher() {
        let (lm, gaussians, mixw) = semi_model();
        let mut scorer = AcousticScorer::new_semi_continuous(
            lm,
            ScorerConfig::default(),
            &gaussians,
            2,
        )
        .unwrap();
        scorer.start_utterance();
        // Feature vector near density 1 (mean 5,5): senone 0 (weight
        // concentrated on density 0) should score worse than a senone
        // that favors density 1 would, and the returned scores must be
        // non-positive.
        let feature = vec![vec![4.9f32, 5.1f32]];
        let scores = scorer.score_frame(&gaussians, &mixw, &feature, &[0, 1]).unwrap();
        assert_eq!(scores.len(), 2);
        for s in &scores {
            assert!(*s <= 0);
        }
    }

    #[test]
    fn rejects_wrong_stream_count() {
        let (lm, gaussians, mixw) = semi_model();
        let mut scorer =
            AcousticScorer::new_semi_continuous(lm, ScorerConfig::default(), &gaussians, 2).unwrap();
        let feature = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        assert!(scorer.score_frame(&gaussians, &mixw, &feature, &[0]).is_err());
    }

    #[test]
    fn downsampling_reuses_previous_topn() {
        let (lm, gaussians, mixw) = semi_model();
        let cfg = ScorerConfig { topn: 2, downsample: 2, acoustic_scale: 1.0 };
        let mut scorer = AcousticScorer::new_semi_continuous(lm, cfg, &gaussians, 2).unwrap();
        scorer.start_utterance();
        let f1 = vec![vec![0.0f32, 0.0f32]];
        let f2 = vec![vec![100.0f32, 100.0f32]];
        let s1 = scorer.score_frame(&gaussians, &mixw, &f1, &[0, 1]).unwrap();
        // Frame 2 is skipped (downsample ratio 2), so despite a wildly
        // different feature vector the cached top-N (and thus scores)
        // should be identical to frame 1's.
        let s2 = scorer.score_frame(&gaussians, &mixw, &f2, &[0, 1]).unwrap();
        assert_eq!(s1, s2);
    }
}
