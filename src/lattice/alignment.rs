//! Forced alignment (spec §4.7): given a known word sequence instead of
//! a grammar to search, run a single linear Viterbi chain over the
//! concatenation of each word's pronunciation and backtrace an exact
//! word -> phone -> state segmentation (start frame, duration, score
//! per unit), with no lattice involved.
//!
//! Unlike the live FSG search's `ArcHmm` (which only keeps the current
//! frame's scores plus a "better-wins" feed into the next unit and
//! therefore can't reconstruct exact timing), forced alignment keeps a
//! full per-frame backpointer trellis over the flattened state
//! sequence, since the word sequence is fixed and the trellis is
//! bounded by `3 * total_phones` states.

use crate::error::DecoderError;
use crate::model::{SharedModel, TriphoneKey, WordPosition};
use crate::scorer::AcousticScorer;

#[derive(Debug, Clone)]
pub struct AlignedState {
    pub state: usize,
    pub start_frame: u32,
    pub duration: u32,
    pub score: i32,
}

#[derive(Debug, Clone)]
pub struct AlignedPhone {
    pub phone: String,
    pub start_frame: u32,
    pub duration: u32,
    pub score: i32,
    pub states: Vec<AlignedState>,
}

#[derive(Debug, Clone)]
pub struct AlignedWord {
    pub word: String,
    pub start_frame: u32,
    pub duration: u32,
    pub score: i32,
    pub phones: Vec<AlignedPhone>,
}

#[derive(Debug, Clone)]
pub struct Alignment {
    pub words: Vec<AlignedWord>,
}

/// Which global flattened state produced a cell's winning score.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Origin {
    SelfLoop,
    FromLocal(usize),
    FromPrevPhoneExit,
    Unreached,
}

struct FlatUnit {
    word_idx: usize,
    phone: String,
    seq_id: usize,
    tmat_id: usize,
}

/// Run forced alignment over `words` against `feature` (one frame per
/// outer entry, one `Vec<f32>` per stream) and return the segmentation.
/// Errors if any word is out of vocabulary.
pub fn align(
    model: &SharedModel,
    gaussians: &crate::model::GaussianParams,
    mixw: &crate::model::MixtureWeights,
    scorer: &mut AcousticScorer,
    feature: &[Vec<Vec<f32>>],
    words: &[String],
) -> Result<Alignment, DecoderError> {
    let units = flatten_units(model, words)?;
    if units.is_empty() || feature.is_empty() {
        return Ok(Alignment { words: Vec::new() });
    }
    let n_states = units.len() * 3;
    let zero = model.logmath.zero();
    let n_frames = feature.len();

    let mut score = vec![zero; n_states];
    score[0] = 0;
    let mut trellis: Vec<Vec<Origin>> = Vec::with_capacity(n_frames);

    for frame in feature {
        let mut active_senones: Vec<usize> = Vec::new();
        for u in &units {
            if let Some(seq) = model.phones.senones(u.seq_id) {
                active_senones.extend(seq.iter().map(|&s| s as usize));
            }
        }
        active_senones.sort_unstable();
        active_senones.dedup();
        let scores = scorer.score_frame(gaussians, mixw, frame, &active_senones)?;
        let score_of: std::collections::HashMap<usize, i32> =
            active_senones.into_iter().zip(scores).collect();

        let mut new_score = vec![zero; n_states];
        let mut origin = vec![Origin::Unreached; n_states];

        for (unit_idx, unit) in units.iter().enumerate() {
            let tmat = &model.transitions;
            for local in 0..3 {
                let g = unit_idx * 3 + local;
                let mut best = zero;
                let mut best_origin = Origin::Unreached;

                let self_cost = tmat.cost(unit.tmat_id, local, local);
                if self_cost < crate::model::transition::IMPOSSIBLE && score[g] > zero {
                    let cand = score[g].saturating_sub(self_cost as i32);
                    if cand > best {
                        best = cand;
                        best_origin = Origin::SelfLoop;
                    }
                }
                for src in 0..local {
                    let cost = tmat.cost(unit.tmat_id, src, local);
                    let from = unit_idx * 3 + src;
                    if cost >= crate::model::transition::IMPOSSIBLE || score[from] <= zero {
                        continue;
                    }
                    let cand = score[from].saturating_sub(cost as i32);
                    if cand > best {
                        best = cand;
                        best_origin = Origin::FromLocal(from);
                    }
                }
                if local == 0 && unit_idx > 0 {
                    let prev_last = (unit_idx - 1) * 3 + 2;
                    let prev_tmat = &units[unit_idx - 1].tmat_id;
                    let exit_cost = tmat_exit_cost(tmat, *prev_tmat);
                    if score[prev_last] > zero {
                        let cand = score[prev_last].saturating_sub(exit_cost as i32);
                        if cand > best {
                            best = cand;
                            best_origin = Origin::FromPrevPhoneExit;
                        }
                    }
                }

                if best > zero {
                    let seq = model.phones.senones(unit.seq_id).unwrap_or([0, 0, 0]);
                    let acoustic = score_of.get(&(seq[local] as usize)).copied().unwrap_or(zero);
                    best = best.saturating_add(acoustic);
                }
                new_score[g] = best;
                origin[g] = best_origin;
            }
        }

        score = new_score;
        trellis.push(origin);
    }

    let final_state = n_states - 1;
    let final_score = score[final_state];
    let path = backtrace(&trellis, &units, final_state);
    let _ = n_frames;

    Ok(build_alignment(&units, &path, words, final_score))
}

fn tmat_exit_cost(tmat: &crate::model::TransitionMatrix, tmat_id: usize) -> u8 {
    tmat.cost(tmat_id, 2, 3)
}

/// Unlike the live FSG search (where every pronunciation becomes a
/// parallel arc), forced alignment takes the dictionary's first
/// pronunciation only: spec §4.7 builds the alignment FSG as "a strict
/// linear chain of the target word sequence with no alternates", so
/// there is exactly one path to flatten here by design.
fn flatten_units(model: &SharedModel, words: &[String]) -> Result<Vec<FlatUnit>, DecoderError> {
    let mut units = Vec::new();
    for (word_idx, word) in words.iter().enumerate() {
        let pronunciation = model.dictionary.pronunciations(word);
        if pronunciation.is_empty() {
            return Err(DecoderError::Lexicon(format!("out-of-vocabulary word: {word}")));
        }
        let phones = &pronunciation[0].phones;
        for (i, phone) in phones.iter().enumerate() {
            let position = match (phones.len(), i) {
                (1, _) => WordPosition::Single,
                (_, 0) => WordPosition::Begin,
                (n, j) if j == n - 1 => WordPosition::End,
                _ => WordPosition::Internal,
            };
            let left = if i == 0 { None } else { Some(phones[i - 1].clone()) };
            let right = if i + 1 < phones.len() { Some(phones[i + 1].clone()) } else { None };
            let key = TriphoneKey { base: phone.clone(), left, right, position };
            let seq_id = model
                .phones
                .lookup_triphone(&key)
                .ok_or_else(|| DecoderError::Lexicon(format!("no triphone model for {phone} in {word}")))?;
            let base_idx = model
                .phones
                .base_index(phone)
                .ok_or_else(|| DecoderError::Lexicon(format!("unknown base phone {phone}")))?;
            let tmat_id = model
                .phones
                .tmat_for_base(base_idx)
                .ok_or_else(|| DecoderError::Lexicon(format!("no transition matrix for {phone}")))?;
            units.push(FlatUnit { word_idx, phone: phone.clone(), seq_id, tmat_id });
        }
    }
    Ok(units)
}

/// Walk the per-frame origin trellis backward from `final_state` at the
/// last frame, returning `(unit_idx, local_state, frame)` for every
/// frame on the winning path, oldest first.
fn backtrace(trellis: &[Vec<Origin>], units: &[FlatUnit], final_state: usize) -> Vec<(usize, usize, u32)> {
    let mut path = Vec::new();
    let mut state = final_state;
    for (frame_idx, origins) in trellis.iter().enumerate().rev() {
        let unit_idx = state / 3;
        let local = state % 3;
        path.push((unit_idx, local, frame_idx as u32));
        match origins[state] {
            Origin::SelfLoop | Origin::FromLocal(_) | Origin::Unreached => {
                if let Origin::FromLocal(from) = origins[state] {
                    state = from;
                }
            }
            Origin::FromPrevPhoneExit => {
                state = (unit_idx - 1) * 3 + 2;
            }
        }
        let _ = units;
    }
    path.reverse();
    path
}

fn build_alignment(
    units: &[FlatUnit],
    path: &[(usize, usize, u32)],
    words_in: &[String],
    final_score: i32,
) -> Alignment {
    let mut words: Vec<AlignedWord> = Vec::new();
    let mut cur_phone: Option<(usize, AlignedPhone)> = None;

    for &(unit_idx, local, frame) in path {
        let need_new_phone = cur_phone.as_ref().map(|(u, _)| *u != unit_idx).unwrap_or(true);
        if need_new_phone {
            if let Some((prev_unit_idx, p)) = cur_phone.take() {
                append_phone(&mut words, units[prev_unit_idx].word_idx, words_in, p);
            }
            cur_phone = Some((
                unit_idx,
                AlignedPhone { phone: units[unit_idx].phone.clone(), start_frame: frame, duration: 0, score: 0, states: Vec::new() },
            ));
        }
        let phone = &mut cur_phone.as_mut().unwrap().1;
        phone.duration = frame - phone.start_frame + 1;
        match phone.states.last_mut() {
            Some(s) if s.state == local => s.duration += 1,
            _ => phone.states.push(AlignedState { state: local, start_frame: frame, duration: 1, score: 0 }),
        }
    }
    if let Some((unit_idx, p)) = cur_phone.take() {
        append_phone(&mut words, units[unit_idx].word_idx, words_in, p);
    }
    if let Some(last) = words.last_mut() {
        last.score = final_score;
        if let Some(lp) = last.phones.last_mut() {
            lp.score = final_score;
        }
    }
    Alignment { words }
}

fn append_phone(words: &mut Vec<AlignedWord>, word_idx: usize, words_in: &[String], phone: AlignedPhone) {
    match words.last_mut() {
        Some(w) if words.len() - 1 == word_idx => {
            w.duration = phone.start_frame + phone.duration - w.start_frame;
            w.phones.push(phone);
        }
        _ => {
            words.push(AlignedWord {
                word: words_in[word_idx].clone(),
                start_frame: phone.start_frame,
                duration: phone.duration,
                score: 0,
                phones: vec![phone],
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logmath::LogMath;
    use crate::model::{Dictionary, GaussianParams, MixtureWeights, ModelTables, PhoneticModel, ScorerKind, TransitionMatrix};
    use std::sync::Arc;

    fn tiny_model() -> SharedModel {
        let lm = LogMath::default_base();
        let mut phones = PhoneticModel::new(vec!["AA".into()]);
        let tp = vec![10, 20, 60, 255, 255, 10, 20, 255, 255, 255, 10, 30];
        let tmat = TransitionMatrix::new(1, 3, tp).unwrap();
        phones.set_tmat_for_base(0, 0).unwrap();
        phones.add_triphone(
            TriphoneKey { base: "AA".into(), left: None, right: None, position: WordPosition::Single },
            [0, 1, 2],
        );
        let mut dict = Dictionary::new();
        dict.add_word("GO", vec!["AA".into()]).unwrap();

        let means = vec![0.0; 1 * 1 * 3 * 2];
        let vars = vec![1.0; 1 * 1 * 3 * 2];
        let gaussians = GaussianParams::new(ScorerKind::SemiContinuous, 1, 3, vec![2], means, vars).unwrap();
        let raw = vec![1.0; 3 * 1 * 3];
        let mixw = MixtureWeights::from_floats(&lm, 3, 1, 3, &raw, 1e-7).unwrap();

        Arc::new(ModelTables { logmath: lm, gaussians, mixture_weights: mixw, transitions: tmat, phones, dictionary: dict, ptm_senone_codebook: None })
    }

    #[test]
    fn out_of_vocabulary_word_is_an_error() {
        let model = tiny_model();
        let mut scorer =
            AcousticScorer::new_semi_continuous(model.logmath.clone(), Default::default(), &model.gaussians, 3).unwrap();
        let feature = vec![vec![vec![0.0f32, 0.0]]; 3];
        let result = align(&model, &model.gaussians, &model.mixture_weights, &mut scorer, &feature, &["NOPE".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn single_word_alignment_covers_every_frame() {
        let model = tiny_model();
        let mut scorer =
            AcousticScorer::new_semi_continuous(model.logmath.clone(), Default::default(), &model.gaussians, 3).unwrap();
        let feature = vec![vec![vec![0.0f32, 0.0]]; 6];
        let alignment = align(&model, &model.gaussians, &model.mixture_weights, &mut scorer, &feature, &["GO".to_string()])
            .unwrap();
        assert_eq!(alignment.words.len(), 1);
        let total: u32 = alignment.words[0].phones.iter().map(|p| p.duration).sum();
        assert_eq!(total, 6);
    }
}
