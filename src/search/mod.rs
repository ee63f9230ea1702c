//! FSG token-passing Viterbi search (spec §4.5) — the center of the
//! system. One [`FsgSearch`] owns the active-HMM population, the beam
//! thresholds, and the growing backpointer table for one utterance.

pub mod backpointer;
pub mod fsg;

pub use backpointer::{BackpointerEntry, BackpointerTable};
pub use fsg::Fsg;

use crate::error::DecoderError;
use crate::hmm::HmmInstance;
use crate::model::SharedModel;
use crate::scorer::AcousticScorer;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Started,
    Active,
    Finished,
}

#[derive(Debug, Clone)]
pub struct BeamConfig {
    /// Probabilities in `(0, 1]`; converted to scaled-log deltas at
    /// construction. Smaller = tighter pruning.
    pub beam: f64,
    pub wbeam: f64,
    pub pbeam: f64,
    pub maxhmmpf: usize,
    pub lw: f64,
    pub wip: f64,
    /// `fsgusealtpron`: when `false`, only a word's first dictionary
    /// pronunciation is instantiated per arc, matching PocketSphinx's
    /// option of the same name; when `true` (the default), every
    /// pronunciation runs as its own parallel variant (spec §3).
    pub use_alt_pron: bool,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            beam: 1e-48,
            wbeam: 7e-29,
            pbeam: 1e-48,
            maxhmmpf: 30_000,
            lw: 6.5,
            wip: 0.65,
            use_alt_pron: true,
        }
    }
}

/// One FSG arc's running HMM. Every pronunciation of the arc's word
/// runs as its own chain of per-phone 3-state HMMs ("parallel arcs
/// sharing the arc's log-probability", spec §3), entry feeding forward
/// phone-to-phone the same way word-exits feed the next arc; the arc's
/// exit/best-state scores are the max across its pronunciation variants.
struct ArcHmm {
    variants: Vec<Vec<HmmInstance>>,
    seeded_by: Option<usize>,
    seeded_frame: u32,
}

impl ArcHmm {
    fn exit_score(&self) -> i32 {
        self.variants
            .iter()
            .map(|v| v.last().map(|p| p.exit_score()).unwrap_or(i32::MIN))
            .fold(i32::MIN, i32::max)
    }

    fn best_state_score(&self) -> i32 {
        self.variants
            .iter()
            .flat_map(|v| v.iter().map(|p| p.best_state_score()))
            .fold(i32::MIN, i32::max)
    }

    fn entry_score(&self) -> i32 {
        self.variants.first().and_then(|v| v.first()).map(|p| p.state_score(0)).unwrap_or(i32::MIN)
    }
}

pub struct FsgSearch {
    model: SharedModel,
    fsg: Fsg,
    state: SearchState,
    beam: BeamConfig,
    beam_logb: i32,
    wbeam_logb: i32,
    pbeam_logb: i32,
    active: HashMap<usize, ArcHmm>,
    bp: BackpointerTable,
    frame_idx: u32,
    zero: i32,
    /// Words added at runtime via `Decoder::add_word`, consulted before
    /// the shared, immutable model dictionary (spec §6 `add_word`).
    extra_words: HashMap<String, Vec<String>>,
}

impl FsgSearch {
    pub fn new(model: SharedModel, fsg: Fsg, beam: BeamConfig) -> Self {
        let lm = &model.logmath;
        let beam_logb = lm.log(beam.beam);
        let wbeam_logb = lm.log(beam.wbeam);
        let pbeam_logb = lm.log(beam.pbeam);
        let start = fsg.start_state();
        Self {
            model,
            fsg,
            state: SearchState::Idle,
            beam,
            beam_logb,
            wbeam_logb,
            pbeam_logb,
            active: HashMap::new(),
            bp: BackpointerTable::new(start),
            frame_idx: 0,
            zero: lm.zero(),
            extra_words: HashMap::new(),
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Register a runtime pronunciation, consulted ahead of the shared
    /// model dictionary by every subsequent `seed_arc` lookup.
    pub fn add_word(&mut self, word: &str, phones: Vec<String>) -> Result<(), DecoderError> {
        for phone in &phones {
            if self.model.phones.base_index(phone).is_none() {
                return Err(DecoderError::Lexicon(format!("unknown phone {phone} in pronunciation for {word}")));
            }
        }
        self.extra_words.insert(word.to_string(), phones);
        Ok(())
    }

    pub fn backpointers(&self) -> &BackpointerTable {
        &self.bp
    }

    pub fn fsg(&self) -> &Fsg {
        &self.fsg
    }

    /// `Idle`/`Finished` -> `Started` (spec §4.5 state machine).
    pub fn start(&mut self) -> Result<(), DecoderError> {
        if self.state != SearchState::Idle && self.state != SearchState::Finished {
            return Err(DecoderError::State("start() requires Idle or Finished".into()));
        }
        self.active.clear();
        self.bp = BackpointerTable::new(self.fsg.start_state());
        self.frame_idx = 0;
        self.state = SearchState::Started;
        let mut seeded = HashSet::new();
        self.seed_from_state(self.fsg.start_state(), 0, self.bp.root(), 0, &mut seeded);
        self.state = SearchState::Active;
        Ok(())
    }

    /// Seed every word-labeled arc reachable from `fsg_state` via its
    /// precomputed epsilon closure (spec §4.5 "at most one hop"). Arc
    /// indices actually (re-)seeded are added to `seeded`, so the caller
    /// can restrict step (e)'s prune to just this frame's fresh entries.
    fn seed_from_state(
        &mut self,
        fsg_state: usize,
        entry_score: i32,
        backpointer: usize,
        frame: u32,
        seeded: &mut HashSet<usize>,
    ) {
        let closure = self.fsg.epsilon_closure(fsg_state).to_vec();
        let arcs: Vec<usize> = closure.iter().flat_map(|&s| self.fsg.out_arcs(s).to_vec()).collect();
        for arc_idx in arcs {
            let t = self.fsg.transition(arc_idx).clone();
            if t.word.is_none() {
                continue; // already folded into the epsilon closure
            }
            let cost = self.fsg.arc_cost(&self.model.logmath, arc_idx, self.beam.lw, self.beam.wip);
            let candidate = entry_score.saturating_add(cost);
            if self.seed_arc(arc_idx, &t.word, candidate, backpointer, frame) {
                seeded.insert(arc_idx);
            }
        }
    }

    /// Seed (or re-seed, "better-wins") one arc's HMM chain. With
    /// `use_alt_pron` set (the default), every pronunciation of the
    /// arc's word becomes its own parallel instantiation sharing the
    /// arc's entry score and cost (spec §3 "alternate pronunciations ...
    /// added as parallel arcs sharing the arc's log-probability"); with
    /// it cleared, only the first dictionary pronunciation runs, like
    /// PocketSphinx's `fsgusealtpron` option. All surviving variants run
    /// side by side under the same arc slot, and the arc's exit/best-state scores
    /// are the max across them. Returns whether the arc ended up
    /// (re-)seeded.
    fn seed_arc(
        &mut self,
        arc_idx: usize,
        word: &Option<String>,
        candidate: i32,
        backpointer: usize,
        frame: u32,
    ) -> bool {
        let word = word.as_ref().expect("seed_arc is only called for word-labeled arcs");
        let pronunciations: Vec<Vec<String>> = if let Some(p) = self.extra_words.get(word) {
            vec![p.clone()]
        } else {
            let pronunciation = self.model.dictionary.pronunciations(word);
            if pronunciation.is_empty() {
                return false; // unknown word on this arc; caller validates at set_fsg time
            }
            if self.beam.use_alt_pron {
                pronunciation.iter().map(|p| p.phones.clone()).collect()
            } else {
                vec![pronunciation[0].phones.clone()]
            }
        };

        if let Some(existing) = self.active.get(&arc_idx) {
            // "better-wins": a newer seed this same frame only replaces
            // the running one if strictly better.
            if existing.seeded_frame == frame && candidate <= existing.entry_score() {
                return false;
            }
        }

        let variants: Vec<Vec<HmmInstance>> = pronunciations
            .iter()
            .filter_map(|phones| self.instantiate_pronunciation(phones, candidate, frame))
            .collect();
        if variants.is_empty() {
            return false;
        }

        self.active.insert(arc_idx, ArcHmm { variants, seeded_by: Some(backpointer), seeded_frame: frame });
        true
    }

    /// Build the per-phone HMM chain for one pronunciation, entering
    /// the first phone at `candidate` and every later phone closed
    /// (spec §4.5 "seed"). `None` if any phone lacks a triphone/tmat
    /// entry for this context.
    fn instantiate_pronunciation(&self, phones: &[String], candidate: i32, frame: u32) -> Option<Vec<HmmInstance>> {
        let mut seq_ids = Vec::with_capacity(phones.len());
        let mut tmat_ids = Vec::with_capacity(phones.len());
        for (i, phone) in phones.iter().enumerate() {
            let position = match (phones.len(), i) {
                (1, _) => crate::model::WordPosition::Single,
                (_, 0) => crate::model::WordPosition::Begin,
                (n, j) if j == n - 1 => crate::model::WordPosition::End,
                _ => crate::model::WordPosition::Internal,
            };
            let left = if i == 0 { None } else { Some(phones[i - 1].clone()) };
            let right = if i + 1 < phones.len() { Some(phones[i + 1].clone()) } else { None };
            let key = crate::model::TriphoneKey { base: phone.clone(), left, right, position };
            let seq_id = self.model.phones.lookup_triphone(&key)?;
            let base_idx = self.model.phones.base_index(phone)?;
            let tmat_id = self.model.phones.tmat_for_base(base_idx)?;
            seq_ids.push(seq_id);
            tmat_ids.push(tmat_id);
        }

        let mut instances = Vec::with_capacity(phones.len());
        for i in 0..phones.len() {
            let score = if i == 0 { candidate } else { self.zero };
            instances.push(HmmInstance::enter(seq_ids[i], tmat_ids[i], score, self.zero, frame));
        }
        Some(instances)
    }

    /// One frame of the main loop (spec §4.5 a-e).
    pub fn step(
        &mut self,
        gaussians: &crate::model::GaussianParams,
        mixw: &crate::model::MixtureWeights,
        scorer: &mut AcousticScorer,
        feature: &[Vec<f32>],
    ) -> Result<(), DecoderError> {
        if self.state != SearchState::Active {
            return Err(DecoderError::State("step() requires the search to be Active".into()));
        }

        // (a) HMM update: gather active senones across all live arcs.
        let mut active_senones: HashSet<usize> = HashSet::new();
        for arc in self.active.values() {
            for variant in &arc.variants {
                for phone in variant {
                    if let Some(seq) = self.model.phones.senones(phone.senone_sequence) {
                        active_senones.extend(seq.iter().map(|&s| s as usize));
                    }
                }
            }
        }
        let mut sorted_active: Vec<usize> = active_senones.into_iter().collect();
        sorted_active.sort_unstable();
        let scores = scorer.score_frame(gaussians, mixw, feature, &sorted_active)?;
        let score_of: HashMap<usize, i32> = sorted_active.into_iter().zip(scores).collect();

        let mut global_best = self.zero;
        let mut best_exit = self.zero;
        for arc in self.active.values_mut() {
            for variant in &mut arc.variants {
                let prev_exits: Vec<i32> = variant.iter().map(|p| p.exit_score()).collect();
                for i in 0..variant.len() {
                    if i > 0 {
                        variant[i].feed_entry(prev_exits[i - 1]);
                    }
                    let seq = self.model.phones.senones(variant[i].senone_sequence).unwrap_or([0, 0, 0]);
                    let senone_scores = [
                        score_of.get(&(seq[0] as usize)).copied().unwrap_or(self.zero),
                        score_of.get(&(seq[1] as usize)).copied().unwrap_or(self.zero),
                        score_of.get(&(seq[2] as usize)).copied().unwrap_or(self.zero),
                    ];
                    variant[i].update(&self.model.transitions, senone_scores);
                }
            }
            global_best = global_best.max(arc.best_state_score());
            best_exit = best_exit.max(arc.exit_score());
        }

        // (b) Beam prune: general HMM beam, adaptively widened if
        // maxhmmpf is exceeded.
        let mut threshold = global_best.saturating_add(self.beam_logb);
        if self.active.len() > self.beam.maxhmmpf {
            let mut bests: Vec<i32> = self.active.values().map(|a| a.best_state_score()).collect();
            bests.sort_unstable_by(|a, b| b.cmp(a));
            threshold = threshold.max(bests[self.beam.maxhmmpf.min(bests.len()) - 1]);
        }
        self.active.retain(|_, arc| arc.best_state_score() >= threshold);

        // (c) Word exits: exit-state score against the word-exit beam.
        let wexit_threshold = best_exit.saturating_add(self.wbeam_logb);
        self.bp.begin_frame(self.frame_idx);
        let mut new_entries = Vec::new();
        for (&arc_idx, arc) in self.active.iter() {
            if arc.exit_score() >= wexit_threshold && arc.exit_score() > self.zero {
                let t = self.fsg.transition(arc_idx);
                new_entries.push((
                    t.word.clone(),
                    self.frame_idx,
                    arc.exit_score(),
                    arc.seeded_by,
                    t.to,
                ));
            }
        }
        let mut created = Vec::new();
        for (word, frame, score, predecessor, fsg_state) in new_entries {
            let idx = self.bp.push(BackpointerEntry { word, frame, score, predecessor, fsg_state });
            created.push(idx);
        }

        // (d) Arc propagation from every word exit created this frame.
        let mut newly_seeded: HashSet<usize> = HashSet::new();
        for &bp_idx in &created {
            let entry = self.bp.get(bp_idx).clone();
            self.seed_from_state(entry.fsg_state, entry.score, bp_idx, self.frame_idx + 1, &mut newly_seeded);
        }

        // (e) Phone-transition prune against threshold (3), restricted to
        // the arcs freshly seeded in step (d) — arcs that already
        // survived step (b) this frame aren't pruned a second time
        // against a threshold meant only for fresh entries.
        let pthreshold = best_exit.saturating_add(self.pbeam_logb);
        self.active.retain(|idx, arc| !newly_seeded.contains(idx) || arc.best_state_score() >= pthreshold);

        self.frame_idx += 1;
        Ok(())
    }

    /// Force every active arc to exit, accepting only paths whose final
    /// FSG state is accepting (spec §4.5 "Finish").
    pub fn finish(&mut self) -> Result<Option<usize>, DecoderError> {
        if self.state != SearchState::Active && self.state != SearchState::Started {
            return Err(DecoderError::State("end() requires Active or Started".into()));
        }
        self.bp.begin_frame(self.frame_idx);
        let mut best: Option<(i32, usize)> = None;
        let forced: Vec<(Option<String>, u32, i32, Option<usize>, usize)> = self
            .active
            .iter()
            .map(|(&arc_idx, arc)| {
                let t = self.fsg.transition(arc_idx);
                (t.word.clone(), self.frame_idx, arc.exit_score(), arc.seeded_by, t.to)
            })
            .collect();
        for (word, frame, score, predecessor, fsg_state) in forced {
            let idx = self.bp.push(BackpointerEntry { word, frame, score, predecessor, fsg_state });
            if self.fsg.is_final(fsg_state) {
                if best.map(|(s, _)| score > s).unwrap_or(true) {
                    best = Some((score, idx));
                }
            }
        }
        self.state = SearchState::Finished;
        Ok(best.map(|(_, idx)| idx))
    }
}
