//! Gaussian codebook parameters shared by both scorer variants (spec §4.3).
//!
//! The core never parses acoustic-model files (out of scope); these
//! tables are built directly from already-decoded float arrays, the
//! same shape a sphinx `mean`/`var` reader would hand over after
//! reading the binary header described in spec §6.

use crate::error::DecoderError;

/// Which acoustic-scorer variant a set of Gaussian parameters is meant
/// for (spec §4.3: "the choice is dictated by the loaded model").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerKind {
    /// One codebook per context-independent phone.
    Ptm,
    /// One global codebook shared by all senones.
    SemiContinuous,
}

/// Means, variances, and precomputed log-determinants for one or more
/// Gaussian codebooks, indexed `[codebook][stream][density]` with a
/// flattened `[veclen]` feature vector at each leaf.
pub struct GaussianParams {
    kind: ScorerKind,
    n_codebooks: usize,
    n_streams: usize,
    n_density: usize,
    stream_veclen: Vec<usize>,
    /// flattened as codebook-major, then stream, then density, then veclen
    means: Vec<f32>,
    variances: Vec<f32>,
    /// One log-determinant-ish normalizing term per (codebook, stream, density):
    /// `-0.5 * sum(ln(var_i)) - 0.5 * veclen * ln(2*pi)`.
    dets: Vec<f32>,
    stream_offsets: Vec<usize>,
}

impl GaussianParams {
    /// `means`/`variances` must be exactly
    /// `n_codebooks * n_streams * n_density * sum(stream_veclen)` long,
    /// laid out codebook-major / stream / density / veclen.
    pub fn new(
        kind: ScorerKind,
        n_codebooks: usize,
        n_density: usize,
        stream_veclen: Vec<usize>,
        means: Vec<f32>,
        variances: Vec<f32>,
    ) -> Result<Self, DecoderError> {
        if stream_veclen.is_empty() {
            return Err(DecoderError::Model("at least one feature stream is required".into()));
        }
        let n_streams = stream_veclen.len();
        let mut stream_offsets = Vec::with_capacity(n_streams + 1);
        let mut acc = 0usize;
        for &v in &stream_veclen {
            if v == 0 {
                return Err(DecoderError::Model("stream veclen must be > 0".into()));
            }
            stream_offsets.push(acc);
            acc += v;
        }
        stream_offsets.push(acc);
        let total_veclen = acc;
        let expected = n_codebooks * n_streams * n_density * total_veclen;
        if means.len() != expected || variances.len() != expected {
            return Err(DecoderError::Model(format!(
                "mean/variance array length mismatch: expected {expected}, got {} / {}",
                means.len(),
                variances.len()
            )));
        }
        if kind == ScorerKind::SemiContinuous && n_codebooks != 1 {
            return Err(DecoderError::Model(
                "semi-continuous models must have exactly one codebook".into(),
            ));
        }

        let mut dets = vec![0.0f32; n_codebooks * n_streams * n_density];
        let ln_2pi = (2.0 * std::f64::consts::PI) as f32;
        for cb in 0..n_codebooks {
            for s in 0..n_streams {
                let veclen = stream_veclen[s];
                for d in 0..n_density {
                    let base = ((cb * n_streams + s) * n_density + d) * total_veclen
                        + stream_offsets[s];
                    let mut sum_ln_var = 0.0f32;
                    for i in 0..veclen {
                        let var = variances[base + i].max(1e-10);
                        sum_ln_var += var.ln();
                    }
                    let det_idx = (cb * n_streams + s) * n_density + d;
                    dets[det_idx] = -0.5 * sum_ln_var - 0.5 * (veclen as f32) * ln_2pi.ln();
                }
            }
        }

        Ok(Self {
            kind,
            n_codebooks,
            n_streams,
            n_density,
            stream_veclen,
            means,
            variances,
            dets,
            stream_offsets,
        })
    }

    pub fn kind(&self) -> ScorerKind {
        self.kind
    }

    pub fn n_codebooks(&self) -> usize {
        self.n_codebooks
    }

    pub fn n_streams(&self) -> usize {
        self.n_streams
    }

    pub fn n_density(&self) -> usize {
        self.n_density
    }

    pub fn stream_veclen(&self, stream: usize) -> usize {
        self.stream_veclen[stream]
    }

    fn leaf_base(&self, codebook: usize, stream: usize, density: usize) -> usize {
        let total_veclen = *self.stream_offsets.last().unwrap();
        ((codebook * self.n_streams + stream) * self.n_density + density) * total_veclen
            + self.stream_offsets[stream]
    }

    pub fn mean(&self, codebook: usize, stream: usize, density: usize) -> &[f32] {
        let base = self.leaf_base(codebook, stream, density);
        &self.means[base..base + self.stream_veclen[stream]]
    }

    pub fn variance(&self, codebook: usize, stream: usize, density: usize) -> &[f32] {
        let base = self.leaf_base(codebook, stream, density);
        &self.variances[base..base + self.stream_veclen[stream]]
    }

    pub fn det(&self, codebook: usize, stream: usize, density: usize) -> f32 {
        self.dets[(codebook * self.n_streams + stream) * self.n_density + density]
    }

    /// Mahalanobis-distance-based log-density (unnormalized natural log,
    /// i.e. `ln N(x; mean, var)`), evaluated in feature-stream-major
    /// order as spec §4.3 step 2 describes. Clamped to a wide negative
    /// bound to avoid overflow on pathological inputs.
    pub fn log_density(&self, codebook: usize, stream: usize, density: usize, x: &[f32]) -> f32 {
        const CLAMP: f32 = -1.0e6;
        let mean = self.mean(codebook, stream, density);
        let var = self.variance(codebook, stream, density);
        let mut mahalanobis = 0.0f32;
        for i in 0..x.len() {
            let diff = x[i] - mean[i];
            mahalanobis += (diff * diff) / var[i].max(1e-10);
        }
        let val = self.det(codebook, stream, density) - 0.5 * mahalanobis;
        val.max(CLAMP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_codebook() -> GaussianParams {
        // 1 codebook, 1 stream (veclen 2), 2 densities.
        let means = vec![0.0, 0.0, 5.0, 5.0];
        let vars = vec![1.0, 1.0, 1.0, 1.0];
        GaussianParams::new(ScorerKind::SemiContinuous, 1, 2, vec![2], means, vars).unwrap()
    }

    #[test]
    fn closer_density_scores_higher() {
        let g = single_codebook();
        let near_origin = [0.1, -0.1];
        let d0 = g.log_density(0, 0, 0, &near_origin);
        let d1 = g.log_density(0, 0, 1, &near_origin);
        assert!(d0 > d1, "density near origin should score higher: {d0} vs {d1}");
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let means = vec![0.0; 3];
        let vars = vec![1.0; 4];
        let res = GaussianParams::new(ScorerKind::SemiContinuous, 1, 2, vec![2], means, vars);
        assert!(res.is_err());
    }

    #[test]
    fn ptm_allows_multiple_codebooks() {
        let means = vec![0.0; 2 * 1 * 2 * 2];
        let vars = vec![1.0; 2 * 1 * 2 * 2];
        let g = GaussianParams::new(ScorerKind::Ptm, 2, 2, vec![2], means, vars).unwrap();
        assert_eq!(g.n_codebooks(), 2);
    }

    #[test]
    fn semi_continuous_rejects_multiple_codebooks() {
        let means = vec![0.0; 2 * 1 * 2 * 2];
        let vars = vec![1.0; 2 * 1 * 2 * 2];
        let res = GaussianParams::new(ScorerKind::SemiContinuous, 2, 2, vec![2], means, vars);
        assert!(res.is_err());
    }
}
