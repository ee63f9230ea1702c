//! PCM → per-frame MFCC (spec §4.1).
//!
//! Framing discipline (overlap carry, frame-count law) follows the
//! ring-buffered streaming style of the teacher's `dsp/dtln_denoiser.rs`
//! (shift-and-append frame buffer, FFT plans built once at
//! construction); the per-frame signal-processing algorithm itself
//! follows `original_source/src/fe_sigproc.c`.

use crate::error::DecoderError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// DCT-II variant used to go from log mel-filterbank energies to
/// cepstral coefficients (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DctType {
    /// Unnormalized, matches the original sphinx "legacy" transform.
    Legacy,
    /// Unitary/orthogonal DCT-II.
    Unitary,
    /// HTK-style: `sqrt(2/N)` scaling, `sqrt(1/2)` on coefficient 0.
    Htk,
}

#[derive(Debug, Clone)]
pub struct FeatureExtractorConfig {
    pub sample_rate: f32,
    pub frame_rate: f32,
    pub window_length_sec: f32,
    pub fft_size: Option<usize>,
    pub alpha: f32,
    pub ncep: usize,
    pub nfilt: usize,
    pub lowerf: f32,
    pub upperf: f32,
    pub transform: DctType,
    pub remove_dc: bool,
    pub round_filters: bool,
    pub unit_area: bool,
    pub dither: bool,
    pub seed: Option<u64>,
    pub lifter_val: f32,
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000.0,
            frame_rate: 100.0,
            window_length_sec: 0.025625,
            fft_size: None,
            alpha: 0.97,
            ncep: 13,
            nfilt: 40,
            lowerf: 133.33,
            upperf: 6855.5,
            transform: DctType::Legacy,
            remove_dc: false,
            round_filters: true,
            unit_area: false,
            dither: false,
            seed: None,
            lifter_val: 0.0,
        }
    }
}

struct MelFilterbank {
    /// first spectral bin each filter touches
    spec_start: Vec<usize>,
    /// per-filter triangular weights, one slice per filter
    weights: Vec<Vec<f32>>,
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

impl MelFilterbank {
    fn new(cfg: &FeatureExtractorConfig, fft_size: usize) -> Result<Self, DecoderError> {
        if cfg.nfilt == 0 {
            return Err(DecoderError::Configuration("nfilt must be > 0".into()));
        }
        if cfg.upperf > cfg.sample_rate / 2.0 {
            return Err(DecoderError::Configuration(format!(
                "upperf {} exceeds Nyquist {}",
                cfg.upperf,
                cfg.sample_rate / 2.0
            )));
        }
        let mel_min = hz_to_mel(cfg.lowerf);
        let mel_max = hz_to_mel(cfg.upperf);
        let melbw = (mel_max - mel_min) / (cfg.nfilt as f32 + 1.0);
        let fft_freq = cfg.sample_rate / fft_size as f32;
        let nyq_bin = fft_size / 2;

        let mut spec_start = Vec::with_capacity(cfg.nfilt);
        let mut weights = Vec::with_capacity(cfg.nfilt);

        for i in 0..cfg.nfilt {
            let left_hz = mel_to_hz(mel_min + (i as f32) * melbw);
            let center_hz = mel_to_hz(mel_min + (i as f32 + 1.0) * melbw);
            let right_hz = mel_to_hz(mel_min + (i as f32 + 2.0) * melbw);

            let to_bin = |hz: f32| -> f32 {
                let b = hz / fft_freq;
                if cfg.round_filters {
                    b.round()
                } else {
                    b
                }
            };
            let left_bin = to_bin(left_hz);
            let center_bin = to_bin(center_hz);
            let right_bin = to_bin(right_hz).min(nyq_bin as f32);

            let start = left_bin.floor().max(0.0) as usize;
            let end = (right_bin.ceil() as usize).min(nyq_bin);
            let mut filt = Vec::with_capacity(end.saturating_sub(start) + 1);
            let mut area = 0.0f32;
            for bin in start..=end.max(start) {
                let hz = bin as f32 * fft_freq;
                let w = if hz <= left_bin * fft_freq || hz >= right_bin * fft_freq {
                    0.0
                } else if hz <= center_bin * fft_freq {
                    let denom = (center_bin - left_bin) * fft_freq;
                    if denom.abs() < 1e-9 {
                        1.0
                    } else {
                        (hz - left_bin * fft_freq) / denom
                    }
                } else {
                    let denom = (right_bin - center_bin) * fft_freq;
                    if denom.abs() < 1e-9 {
                        1.0
                    } else {
                        (right_bin * fft_freq - hz) / denom
                    }
                };
                filt.push(w.max(0.0));
                area += w.max(0.0);
            }
            if cfg.unit_area && area > 1e-9 {
                for w in filt.iter_mut() {
                    *w /= area;
                }
            }
            spec_start.push(start);
            weights.push(filt);
        }

        Ok(Self { spec_start, weights })
    }

    fn n_filters(&self) -> usize {
        self.weights.len()
    }

    /// Apply all filters to a magnitude(-squared) spectrum, producing
    /// one energy value per filter.
    fn apply(&self, spectrum: &[f32], out: &mut [f32]) {
        for (i, filt) in self.weights.iter().enumerate() {
            let start = self.spec_start[i];
            let mut sum = 0.0f32;
            for (j, &w) in filt.iter().enumerate() {
                let bin = start + j;
                if bin < spectrum.len() {
                    sum += w * spectrum[bin];
                }
            }
            out[i] = sum;
        }
    }
}

/// Precomputed DCT-II basis of shape `[ncep][nfilt]`, plus any
/// per-coefficient scaling the chosen variant applies.
struct DctTable {
    basis: Vec<Vec<f32>>,
    lifter: Vec<f32>,
}

impl DctTable {
    fn new(ncep: usize, nfilt: usize, transform: DctType, lifter_val: f32) -> Self {
        let mut basis = vec![vec![0.0f32; nfilt]; ncep];
        let freq_step = PI / nfilt as f32;
        for i in 0..ncep {
            for j in 0..nfilt {
                let angle = (i as f32) * (j as f32 + 0.5) * freq_step;
                basis[i][j] = angle.cos();
            }
        }
        match transform {
            DctType::Legacy => {}
            DctType::Unitary => {
                let scale0 = (1.0 / nfilt as f32).sqrt();
                let scale = (2.0 / nfilt as f32).sqrt();
                for (i, row) in basis.iter_mut().enumerate() {
                    let s = if i == 0 { scale0 } else { scale };
                    for v in row.iter_mut() {
                        *v *= s;
                    }
                }
            }
            DctType::Htk => {
                let scale = (2.0 / nfilt as f32).sqrt();
                for (i, row) in basis.iter_mut().enumerate() {
                    let s = if i == 0 { scale * (0.5f32).sqrt() } else { scale };
                    for v in row.iter_mut() {
                        *v *= s;
                    }
                }
            }
        }

        let lifter = if lifter_val > 0.0 {
            (0..ncep)
                .map(|i| 1.0 + (lifter_val / 2.0) * ((i as f32) * PI / lifter_val).sin())
                .collect()
        } else {
            vec![1.0; ncep]
        };

        Self { basis, lifter }
    }

    fn apply(&self, log_energies: &[f32], out: &mut [f32]) {
        for (i, row) in self.basis.iter().enumerate() {
            let mut sum = 0.0f32;
            for (j, &b) in row.iter().enumerate() {
                sum += b * log_energies[j];
            }
            out[i] = sum * self.lifter[i];
        }
    }
}

const LOG_FLOOR: f32 = 1e-8;

/// Streaming PCM -> MFCC extractor. One instance per utterance's
/// lifetime (reset via `start`, not reallocated, per spec §3
/// "Ownership").
pub struct FeatureExtractor {
    cfg: FeatureExtractorConfig,
    frame_size: usize,
    frame_shift: usize,
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    melfb: MelFilterbank,
    dct: DctTable,
    rng: Option<StdRng>,

    overflow: Vec<f32>,
    preemph_prior: f32,

    // scratch, reused across frames to avoid per-frame allocation
    frame_buf: Vec<f32>,
    fft_buf: Vec<Complex<f32>>,
    spectrum_buf: Vec<f32>,
    mel_energies: Vec<f32>,
}

impl FeatureExtractor {
    pub fn new(cfg: FeatureExtractorConfig) -> Result<Self, DecoderError> {
        if cfg.sample_rate <= 0.0 || cfg.frame_rate <= 0.0 {
            return Err(DecoderError::Configuration(
                "sample_rate and frame_rate must be positive".into(),
            ));
        }
        let frame_size = (cfg.window_length_sec * cfg.sample_rate).round() as usize;
        let frame_shift = (cfg.sample_rate / cfg.frame_rate).round() as usize;
        if frame_size == 0 || frame_shift == 0 {
            return Err(DecoderError::Configuration(
                "window length / frame rate produce a zero-length frame or shift".into(),
            ));
        }
        let fft_size = match cfg.fft_size {
            Some(n) if n >= frame_size && n.is_power_of_two() => n,
            Some(n) => {
                return Err(DecoderError::Configuration(format!(
                    "fft_size {n} must be a power of two >= frame_size {frame_size}"
                )))
            }
            None => frame_size.next_power_of_two(),
        };

        let melfb = MelFilterbank::new(&cfg, fft_size)?;
        let dct = DctTable::new(cfg.ncep, cfg.nfilt, cfg.transform, cfg.lifter_val);
        let window = make_hamming(frame_size);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let rng = cfg.seed.map(StdRng::seed_from_u64);

        Ok(Self {
            frame_size,
            frame_shift,
            fft_size,
            fft,
            window,
            melfb,
            dct,
            rng,
            overflow: Vec::with_capacity(frame_size),
            preemph_prior: 0.0,
            frame_buf: vec![0.0; fft_size],
            fft_buf: vec![Complex::new(0.0, 0.0); fft_size],
            spectrum_buf: vec![0.0; fft_size / 2 + 1],
            mel_energies: vec![0.0; cfg.nfilt],
            cfg,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frame_shift(&self) -> usize {
        self.frame_shift
    }

    pub fn ncep(&self) -> usize {
        self.cfg.ncep
    }

    /// Number of full frames producible from `n` accumulated samples
    /// (spec §4.1 frame-count law, testable property 6).
    pub fn frame_count(n: usize, window: usize, shift: usize) -> usize {
        if n >= window {
            1 + (n - window) / shift
        } else {
            0
        }
    }

    /// Reset overlap state at the start of an utterance (spec §4.1 "start").
    pub fn start(&mut self) {
        self.overflow.clear();
        self.preemph_prior = 0.0;
    }

    /// Consume `samples`, returning as many full MFCC frames as can be
    /// formed. Retains the trailing overlap for the next call.
    /// `full_utterance` is accepted for symmetry with the composer's
    /// CMN modes but doesn't change framing here.
    pub fn process(&mut self, samples: &[f32], _full_utterance: bool) -> Vec<Vec<f32>> {
        let mut combined = std::mem::take(&mut self.overflow);
        combined.extend_from_slice(samples);

        let n_frames = Self::frame_count(combined.len(), self.frame_size, self.frame_shift);
        let mut out = Vec::with_capacity(n_frames);
        for f in 0..n_frames {
            let start = f * self.frame_shift;
            let frame_samples = &combined[start..start + self.frame_size];
            out.push(self.compute_frame(frame_samples));
        }

        let consumed = if n_frames > 0 {
            n_frames * self.frame_shift
        } else {
            0
        };
        self.overflow = combined[consumed..].to_vec();
        out
    }

    /// Flush any trailing overflow as one final zero-padded frame
    /// (spec §4.1 "end").
    pub fn end(&mut self) -> Option<Vec<f32>> {
        if self.overflow.is_empty() {
            return None;
        }
        let mut padded = self.overflow.clone();
        padded.resize(self.frame_size, 0.0);
        let out = self.compute_frame(&padded);
        self.overflow.clear();
        self.preemph_prior = 0.0;
        Some(out)
    }

    fn dither_sample(&mut self, x: f32) -> f32 {
        if !self.cfg.dither {
            return x;
        }
        if let Some(rng) = self.rng.as_mut() {
            x + rng.gen_range(-0.5..0.5)
        } else {
            x
        }
    }

    fn compute_frame(&mut self, samples: &[f32]) -> Vec<f32> {
        debug_assert_eq!(samples.len(), self.frame_size);

        let mut mean = 0.0f32;
        if self.cfg.remove_dc {
            mean = samples.iter().sum::<f32>() / samples.len() as f32;
        }

        for (i, &s) in samples.iter().enumerate() {
            let x = self.dither_sample(s - mean);
            let y = x - self.cfg.alpha * self.preemph_prior;
            self.preemph_prior = x;
            self.frame_buf[i] = y * self.window[i];
        }
        for v in self.frame_buf[self.frame_size..].iter_mut() {
            *v = 0.0;
        }

        for (i, &v) in self.frame_buf.iter().enumerate() {
            self.fft_buf[i] = Complex::new(v, 0.0);
        }
        self.fft.process(&mut self.fft_buf);

        for i in 0..self.spectrum_buf.len() {
            self.spectrum_buf[i] = self.fft_buf[i].norm_sqr();
        }

        self.melfb.apply(&self.spectrum_buf, &mut self.mel_energies);
        for e in self.mel_energies.iter_mut() {
            *e = e.max(LOG_FLOOR).ln();
        }

        let mut cep = vec![0.0f32; self.cfg.ncep];
        self.dct.apply(&self.mel_energies, &mut cep);
        cep
    }
}

fn make_hamming(n: usize) -> Vec<f32> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f32 / (n as f32 - 1.0)).cos())
        .collect()
}
