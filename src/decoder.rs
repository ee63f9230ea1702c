//! Public decoder lifecycle API (spec §6): the façade that wires the
//! feature extractor, composer, acoustic scorer, and FSG search into one
//! start → process → end → hyp/seg_iter/nbest/lattice flow.
//!
//! Binary model-file loading stays an external collaborator (spec §1):
//! callers hand `init`/`reinit` an already-built [`SharedModel`], the
//! same contract the rest of this crate assumes. JSGF parsing is
//! likewise external — `set_jsgf` takes an injected [`JsgfCompiler`]
//! rather than compiling grammars itself.

use crate::config::{self, DecoderConfig};
use crate::error::DecoderError;
use crate::feature::{CmnMode, DctType, FeatureComposer, FeatureComposerConfig, FeatureExtractor, FeatureExtractorConfig};
use crate::lattice::nbest::{self, NBestHypothesis};
use crate::lattice::{posterior, FillerPenalties, Lattice};
use crate::logsink::{Level, LogSink};
use crate::model::{GaussianParams, ScorerKind, SharedModel};
use crate::scorer::{AcousticScorer, ScorerConfig};
use crate::search::{BeamConfig, Fsg, FsgSearch};
use std::collections::HashSet;
use std::sync::Arc;

pub type SharedLattice = Arc<Lattice>;

/// Compiles JSGF grammar text into an [`Fsg`] (spec §1: JSGF parsing is
/// an external collaborator). Registered once at construction; calling
/// `set_jsgf` without one installed is a configuration error.
pub trait JsgfCompiler: Send {
    fn compile(&self, name: &str, text: &str, toprule: Option<&str>) -> Result<Fsg, DecoderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Model and feature stack loaded, but no grammar installed yet.
    Idle,
    /// A grammar is installed; `start` may be called.
    Ready,
    Started,
    Ended,
}

/// One word segment of the 1-best hypothesis (spec §6 `seg_iter`).
///
/// `ascr`/`lscr` are not tracked as separate quantities in the
/// backpointer table (only their sum survives as the entry's score), so
/// `ascr` here carries the combined acoustic+language score for the
/// segment and `lscr` is always `0` — see `DESIGN.md`'s "Pragmatic
/// deviations" note.
#[derive(Debug, Clone)]
pub struct WordSegment {
    pub word: String,
    pub start_frame: u32,
    pub end_frame: u32,
    pub ascr: i32,
    pub lscr: i32,
    pub posterior: i32,
}

/// Explicit iterator over the 1-best segmentation (Design Notes: "do not
/// rely on auto-destruct on end-of-sequence" — the caller drops this
/// when done rather than relying on a destructor side effect).
pub struct SegIter {
    segments: Vec<WordSegment>,
    pos: usize,
}

impl Iterator for SegIter {
    type Item = WordSegment;
    fn next(&mut self) -> Option<Self::Item> {
        let item = self.segments.get(self.pos)?.clone();
        self.pos += 1;
        Some(item)
    }
}

/// Explicit iterator over N-best hypotheses.
pub struct NBestIter {
    hyps: Vec<NBestHypothesis>,
    pos: usize,
}

impl Iterator for NBestIter {
    type Item = NBestHypothesis;
    fn next(&mut self) -> Option<Self::Item> {
        let item = self.hyps.get(self.pos).cloned()?;
        self.pos += 1;
        Some(item)
    }
}

/// One decoder instance: owns per-utterance state (feature/search/
/// lattice); the model tables it decodes against are shared (spec §3
/// "Ownership").
pub struct Decoder {
    model: SharedModel,
    config: DecoderConfig,
    jsgf_compiler: Option<Box<dyn JsgfCompiler>>,
    sink: LogSink,

    extractor: Option<FeatureExtractor>,
    composer: Option<FeatureComposer>,
    scorer: Option<AcousticScorer>,
    search: Option<FsgSearch>,

    /// Text of the most recently `set_fsg`'d grammar, replayed by
    /// `reinit` (spec §9 open question 1: "most recent `set_*` wins").
    fsg_source: Option<String>,
    /// `(name, text)` of the most recently `set_jsgf`'d grammar, applied
    /// after `fsg_source` on `reinit` so JSGF wins when both are present.
    jsgf_source: Option<(String, String)>,
    /// Words added via `add_word`, replayed onto every newly installed
    /// search (spec §6 `add_word`).
    pending_words: Vec<(String, Vec<String>)>,

    stage: Stage,
    lattice: Option<SharedLattice>,
    z: Option<i32>,
    segments: Option<Vec<WordSegment>>,
    hyp: Option<(String, i32)>,
}

impl Decoder {
    /// Load `config` against `model` (spec §6 `init`). `jsgf_compiler`
    /// is the constructor-injected dependency `set_jsgf` delegates to;
    /// `None` is a valid default until one is registered.
    pub fn init(
        config: DecoderConfig,
        model: SharedModel,
        jsgf_compiler: Option<Box<dyn JsgfCompiler>>,
    ) -> Result<Self, DecoderError> {
        config.validate()?;
        let mut decoder = Self {
            model,
            config,
            jsgf_compiler,
            sink: LogSink::new(),
            extractor: None,
            composer: None,
            scorer: None,
            search: None,
            fsg_source: None,
            jsgf_source: None,
            pending_words: Vec::new(),
            stage: Stage::Idle,
            lattice: None,
            z: None,
            segments: None,
            hyp: None,
        };
        decoder.rebuild_feature_stack()?;
        Ok(decoder)
    }

    /// Rebuild everything from a new config (spec §6 `reinit`), then
    /// re-apply whichever grammar was most recently installed — FSG
    /// before JSGF, per spec §9 open question 1.
    pub fn reinit(&mut self, config: DecoderConfig) -> Result<(), DecoderError> {
        config.validate()?;
        self.config = config;
        self.rebuild_feature_stack()?;
        self.search = None;
        self.stage = Stage::Idle;
        self.invalidate_utterance_outputs();

        if let Some(text) = self.fsg_source.clone() {
            let fsg = Fsg::from_text(&text)?;
            self.install_fsg(fsg)?;
        }
        if let Some((name, text)) = self.jsgf_source.clone() {
            self.set_jsgf(&name, &text)?;
        }
        Ok(())
    }

    /// Rebuild only the feature extractor/composer/scorer (spec §6
    /// `reinit_feat`); the installed grammar and search are untouched.
    pub fn reinit_feat(&mut self, config: DecoderConfig) -> Result<(), DecoderError> {
        config.validate()?;
        self.config.feature = config.feature;
        self.config.composer = config.composer;
        self.config.scoring = config.scoring;
        self.rebuild_feature_stack()
    }

    /// Install a new FSG search, replacing any existing one (spec §6
    /// `set_fsg`). `name` is accepted for API parity with the spec's
    /// table but the grammar's own embedded name (`fsg.name()`) is what
    /// gets persisted for `reinit` replay.
    pub fn set_fsg(&mut self, _name: &str, fsg: Fsg) -> Result<(), DecoderError> {
        self.fsg_source = Some(fsg.to_text());
        self.install_fsg(fsg)
    }

    /// Compile `text` via the registered [`JsgfCompiler`] and install
    /// the result (spec §6 `set_jsgf`).
    pub fn set_jsgf(&mut self, name: &str, text: &str) -> Result<(), DecoderError> {
        let toprule = self.config.grammar.toprule.clone();
        let fsg = {
            let compiler = self
                .jsgf_compiler
                .as_ref()
                .ok_or_else(|| DecoderError::Configuration("no jsgf compiler installed".into()))?;
            compiler.compile(name, text, toprule.as_deref())?
        };
        self.jsgf_source = Some((name.to_string(), text.to_string()));
        self.install_fsg(fsg)
    }

    fn install_fsg(&mut self, mut fsg: Fsg) -> Result<(), DecoderError> {
        self.add_filler_self_loops(&mut fsg)?;
        let beam = beam_config_from(&self.config);
        let mut search = FsgSearch::new(self.model.clone(), fsg, beam);
        for (word, phones) in self.pending_words.clone() {
            search.add_word(&word, phones)?;
        }
        self.search = Some(search);
        self.stage = Stage::Ready;
        self.invalidate_utterance_outputs();
        Ok(())
    }

    /// Extend the dictionary with a runtime pronunciation (spec §6
    /// `add_word`). `phone_string` is space-separated, matching the
    /// dictionary's own line format. If `update`, the change also takes
    /// effect on the currently installed search immediately; otherwise
    /// it's deferred until the next `start()` (which replays every
    /// pending word onto the search before seeding).
    pub fn add_word(&mut self, word: &str, phone_string: &str, update: bool) -> Result<(), DecoderError> {
        let phones: Vec<String> = phone_string.split_whitespace().map(str::to_string).collect();
        if phones.is_empty() {
            return Err(DecoderError::Lexicon(format!("word '{word}' has no phones")));
        }
        for phone in &phones {
            if self.model.phones.base_index(phone).is_none() {
                return Err(DecoderError::Lexicon(format!("unknown phone {phone} in pronunciation for {word}")));
            }
        }
        self.pending_words.retain(|(w, _)| w != word);
        self.pending_words.push((word.to_string(), phones.clone()));
        if update {
            if let Some(search) = self.search.as_mut() {
                search.add_word(word, phones)?;
            }
        }
        Ok(())
    }

    /// Reset per-utterance state (spec §6 `start`).
    pub fn start(&mut self) -> Result<(), DecoderError> {
        if self.search.is_none() {
            return Err(DecoderError::State("decoder not configured: no grammar installed".into()));
        }
        for (word, phones) in self.pending_words.clone() {
            self.search.as_mut().unwrap().add_word(&word, phones)?;
        }
        self.search.as_mut().unwrap().start()?;
        self.extractor.as_mut().unwrap().start();
        self.composer.as_mut().unwrap().start();
        self.scorer.as_mut().unwrap().start_utterance();
        self.invalidate_utterance_outputs();
        self.stage = Stage::Started;
        Ok(())
    }

    /// Decode `samples`, returning the number of frames advanced (spec
    /// §6 `process`).
    pub fn process(&mut self, samples: &[f32], full_utterance: bool) -> Result<u32, DecoderError> {
        if self.stage != Stage::Started {
            return Err(DecoderError::State("process() requires start()".into()));
        }
        let cepstra = self.extractor.as_mut().unwrap().process(samples, full_utterance);
        let composed = self.composer.as_mut().unwrap().process(&cepstra)?;
        let advanced = self.feed_frames(&composed)?;
        self.sink.drain();
        Ok(advanced)
    }

    /// Finalize the utterance's search and lattice (spec §6 `end`).
    pub fn end(&mut self) -> Result<(), DecoderError> {
        if self.stage != Stage::Started {
            return Err(DecoderError::State("end() requires start()".into()));
        }
        if let Some(last_cep) = self.extractor.as_mut().unwrap().end() {
            let composed = self.composer.as_mut().unwrap().process(&[last_cep])?;
            self.feed_frames(&composed)?;
        }
        let tail = self.composer.as_mut().unwrap().end()?;
        self.feed_frames(&tail)?;

        let best = self.search.as_mut().unwrap().finish()?;
        self.stage = Stage::Ended;
        self.finalize_lattice(best);
        self.sink.drain();
        Ok(())
    }

    /// 1-best hypothesis and its score (spec §6 `hyp`). After `end`
    /// this is the finalized best path; during `process` it's the best
    /// backpointer entry seen so far, by raw score.
    pub fn hyp(&self) -> Result<(String, i32), DecoderError> {
        if let Some(h) = &self.hyp {
            return Ok(h.clone());
        }
        if self.stage == Stage::Started {
            if let Some(idx) = self.best_partial_entry() {
                let search = self.search.as_ref().unwrap();
                let bp = search.backpointers();
                let trace = bp.trace(idx);
                let words: Vec<String> = trace.iter().skip(1).filter_map(|&i| bp.get(i).word.clone()).collect();
                return Ok((words.join(" "), bp.get(idx).score));
            }
        }
        Err(DecoderError::State("no hypothesis yet".into()))
    }

    /// Iterate the 1-best word segmentation (spec §6 `seg_iter`).
    pub fn seg_iter(&self) -> Result<SegIter, DecoderError> {
        let segments = self
            .segments
            .clone()
            .ok_or_else(|| DecoderError::State("no hypothesis yet".into()))?;
        Ok(SegIter { segments, pos: 0 })
    }

    /// Iterate up to `n` N-best hypotheses over the finalized lattice
    /// (spec §6 `nbest`).
    pub fn nbest(&self, n: usize) -> Result<NBestIter, DecoderError> {
        let lattice = self.lattice.as_ref().ok_or_else(|| DecoderError::State("no lattice".into()))?;
        let hyps = nbest::nbest(lattice, n);
        Ok(NBestIter { hyps, pos: 0 })
    }

    /// A retain-counted handle to the finalized lattice (spec §6
    /// `lattice`): plain `Arc` clone/drop (Design Notes: "keep exactly
    /// this semantics").
    pub fn lattice(&self) -> Result<SharedLattice, DecoderError> {
        self.lattice.clone().ok_or_else(|| DecoderError::State("no lattice".into()))
    }

    /// Register a callback for warnings raised on the hot path (e.g.
    /// the posterior `Z`-clamp). Drained after every `process`/`end`.
    pub fn set_log_callback(&mut self, callback: Box<dyn FnMut(Level, &str) + Send>) {
        self.sink.set_callback(callback);
    }

    fn best_partial_entry(&self) -> Option<usize> {
        let bp = self.search.as_ref()?.backpointers();
        (1..bp.len()).max_by_key(|&i| bp.get(i).score)
    }

    fn feed_frames(&mut self, composed: &[Vec<f32>]) -> Result<u32, DecoderError> {
        let mut advanced = 0u32;
        for frame in composed {
            let streams = split_streams(frame, &self.model.gaussians);
            self.search.as_mut().unwrap().step(
                &self.model.gaussians,
                &self.model.mixture_weights,
                self.scorer.as_mut().unwrap(),
                &streams,
            )?;
            advanced += 1;
        }
        Ok(advanced)
    }

    fn invalidate_utterance_outputs(&mut self) {
        self.lattice = None;
        self.z = None;
        self.segments = None;
        self.hyp = None;
    }

    /// Build the lattice from the finished search, rescore, compute
    /// posteriors, and derive the 1-best segmentation and hyp string —
    /// all of spec §6 `end`'s "finalize search and lattice".
    fn finalize_lattice(&mut self, best: Option<usize>) {
        self.invalidate_utterance_outputs();
        let Some(best_idx) = best else { return };

        let search = self.search.as_ref().unwrap();
        let penalties = self.filler_penalties();
        let mut lattice = Lattice::from_backpointers(search.backpointers(), best_idx, &penalties);

        let ascale = self.config.grammar.ascale;
        posterior::rescore(&mut lattice, &self.model.logmath, ascale);
        let beam_logb = self.model.logmath.log(self.config.search.beam);
        posterior::compute_posteriors(&mut lattice, &self.model.logmath, ascale, beam_logb, &mut self.sink);

        let links = posterior::best_path_links(&lattice);
        let lm = &self.model.logmath;
        let z = lattice
            .in_links
            .get(lattice.final_node)
            .into_iter()
            .flatten()
            .fold(lm.zero(), |acc, &l| lm.add(acc, lattice.links[l].alpha));

        let mut segments = Vec::with_capacity(links.len());
        for &link_idx in &links {
            let link = &lattice.links[link_idx];
            let node = &lattice.nodes[link.to];
            let Some(word) = node.word.clone() else { continue };
            let posterior_score = link.alpha.saturating_add(link.beta).saturating_sub(z);
            segments.push(WordSegment {
                word,
                start_frame: node.start_frame,
                end_frame: link.end_frame,
                ascr: link.ascr,
                lscr: 0,
                posterior: posterior_score,
            });
        }

        let entry = search.backpointers().get(best_idx);
        let hyp_string = segments.iter().map(|s| s.word.clone()).collect::<Vec<_>>().join(" ");
        self.hyp = Some((hyp_string, entry.score));
        self.z = Some(z);
        self.segments = Some(segments);
        self.lattice = Some(Arc::new(lattice));
    }

    /// Insert silence and filler self-loops on every state of a freshly
    /// built grammar (spec §3's FSG invariant). `<sil>` always gets a
    /// self-loop, at `silprob`; every other bracketed dictionary entry
    /// additionally does if `fsgusefiller` is set, at `fillprob` — the
    /// same naming convention `filler_penalties` uses to classify them.
    fn add_filler_self_loops(&self, fsg: &mut Fsg) -> Result<(), DecoderError> {
        let grammar = &self.config.grammar;
        if !self.model.dictionary.pronunciations("<sil>").is_empty() {
            fsg.add_silence("<sil>", None, grammar.silprob)?;
        }
        if grammar.fsgusefiller {
            for w in self.model.dictionary.words() {
                if w.starts_with('<') && w.ends_with('>') && w != "<sil>" && w != "<s>" && w != "</s>" {
                    fsg.add_silence(w.clone(), None, grammar.fillprob)?;
                }
            }
        }
        Ok(())
    }

    /// Silence/filler word sets and log-domain penalties for lattice
    /// construction (spec §4.6 "Filler-word treatment"): `<sil>` is
    /// always silence; any other bracketed dictionary entry is a filler.
    fn filler_penalties(&self) -> FillerPenalties {
        let lm = &self.model.logmath;
        let mut silence_words = HashSet::new();
        silence_words.insert("<sil>".to_string());
        let mut filler_words = HashSet::new();
        for w in self.model.dictionary.words() {
            if w.starts_with('<') && w.ends_with('>') && w != "<sil>" && w != "<s>" && w != "</s>" {
                filler_words.insert(w.clone());
            }
        }
        FillerPenalties {
            silence_words,
            filler_words,
            silence_penalty: lm.log(self.config.grammar.silprob),
            filler_penalty: lm.log(self.config.grammar.fillprob),
        }
    }

    fn rebuild_feature_stack(&mut self) -> Result<(), DecoderError> {
        let extractor = FeatureExtractor::new(feature_extractor_config(&self.config.feature))?;
        if self.config.composer.ceplen > extractor.ncep() {
            return Err(DecoderError::Configuration(
                "ceplen exceeds ncep produced by the feature extractor".into(),
            ));
        }
        let expected_veclen: usize =
            (0..self.model.gaussians.n_streams()).map(|s| self.model.gaussians.stream_veclen(s)).sum();
        let produced_veclen = self.config.composer.ceplen * 3;
        if produced_veclen != expected_veclen {
            return Err(DecoderError::Configuration(format!(
                "composed feature width {produced_veclen} does not match the acoustic model's expected {expected_veclen}"
            )));
        }
        let composer = FeatureComposer::new(composer_config(&self.config.composer))?;
        let scorer = build_scorer(&self.model, &self.config.scoring)?;

        self.extractor = Some(extractor);
        self.composer = Some(composer);
        self.scorer = Some(scorer);
        Ok(())
    }
}

fn beam_config_from(config: &DecoderConfig) -> BeamConfig {
    BeamConfig {
        beam: config.search.beam,
        wbeam: config.search.wbeam,
        pbeam: config.search.pbeam,
        maxhmmpf: config.search.maxhmmpf,
        lw: config.grammar.lw,
        wip: config.grammar.wip,
        use_alt_pron: config.grammar.fsgusealtpron,
    }
}

fn build_scorer(model: &SharedModel, cfg: &config::ScoringConfig) -> Result<AcousticScorer, DecoderError> {
    let scfg = ScorerConfig { topn: cfg.topn, downsample: cfg.ds as usize, acoustic_scale: cfg.aw as f32 };
    match model.gaussians.kind() {
        ScorerKind::SemiContinuous => {
            let n_senone = model.mixture_weights.n_senone();
            AcousticScorer::new_semi_continuous(model.logmath.clone(), scfg, &model.gaussians, n_senone)
        }
        ScorerKind::Ptm => {
            let codebook = model
                .ptm_senone_codebook
                .clone()
                .ok_or_else(|| DecoderError::Model("PTM model is missing its senone->codebook map".into()))?;
            AcousticScorer::new_ptm(model.logmath.clone(), scfg, &model.gaussians, codebook)
        }
    }
}

/// Split one composed feature vector into one slice per acoustic-model
/// stream. Single-stream models (the common case) take the whole
/// vector; multi-stream models split by the gaussians' configured
/// `stream_veclen`, mirroring the `svspec` subvector-split option.
fn split_streams(frame: &[f32], gaussians: &GaussianParams) -> Vec<Vec<f32>> {
    let n_streams = gaussians.n_streams();
    if n_streams <= 1 {
        return vec![frame.to_vec()];
    }
    let mut out = Vec::with_capacity(n_streams);
    let mut offset = 0;
    for s in 0..n_streams {
        let len = gaussians.stream_veclen(s);
        out.push(frame[offset..offset + len].to_vec());
        offset += len;
    }
    out
}

fn feature_extractor_config(cfg: &config::FeatureConfig) -> FeatureExtractorConfig {
    FeatureExtractorConfig {
        sample_rate: cfg.samprate as f32,
        frame_rate: cfg.frate as f32,
        window_length_sec: cfg.wlen as f32,
        fft_size: cfg.nfft,
        alpha: cfg.alpha,
        ncep: cfg.ncep,
        nfilt: cfg.nfilt,
        lowerf: cfg.lowerf,
        upperf: cfg.upperf,
        transform: convert_dct_type(cfg.transform),
        remove_dc: cfg.remove_dc,
        round_filters: true,
        unit_area: false,
        dither: cfg.dither,
        seed: cfg.seed,
        lifter_val: 0.0,
    }
}

/// `config::DctType` names its variants after the spec's literal option
/// strings (`"legacy" | "dct" | "htk"`); `feature::extractor::DctType`
/// names the middle one `Unitary` after what it actually computes. Same
/// transform, two naming conventions for two different audiences.
fn convert_dct_type(t: config::DctType) -> DctType {
    match t {
        config::DctType::Legacy => DctType::Legacy,
        config::DctType::Dct => DctType::Unitary,
        config::DctType::Htk => DctType::Htk,
    }
}

fn composer_config(cfg: &config::FeatureComposerConfig) -> FeatureComposerConfig {
    FeatureComposerConfig {
        ceplen: cfg.ceplen,
        cmn: convert_cmn_mode(cfg.cmn),
        cmn_init: cfg.cmninit.clone(),
        allow_growth: true,
    }
}

fn convert_cmn_mode(m: config::CmnMode) -> CmnMode {
    match m {
        config::CmnMode::Live => CmnMode::Live,
        config::CmnMode::Batch => CmnMode::Batch,
        config::CmnMode::None => CmnMode::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logmath::LogMath;
    use crate::model::{Dictionary, GaussianParams as Gp, MixtureWeights, ModelTables, PhoneticModel, ScorerKind as Sk, TransitionMatrix, TriphoneKey, WordPosition};

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

        let means = vec![0.0; 3 * 2];
        let vars = vec![1.0; 3 * 2];
        let gaussians = Gp::new(Sk::SemiContinuous, 1, 3, vec![2], means, vars).unwrap();
        let raw = vec![1.0; 3 * 1 * 3];
        let mixw = MixtureWeights::from_floats(&lm, 3, 1, 3, &raw, 1e-7).unwrap();

        Arc::new(ModelTables {
            logmath: lm,
            gaussians,
            mixture_weights: mixw,
            transitions: tmat,
            phones,
            dictionary: dict,
            ptm_senone_codebook: None,
        })
    }

    fn tiny_config() -> DecoderConfig {
        let mut cfg = DecoderConfig::default();
        cfg.feature.ncep = 2;
        cfg.feature.nfilt = 4;
        cfg.feature.upperf = 4000.0;
        cfg.feature.samprate = 8000.0;
        cfg.composer.ceplen = 2;
        cfg.composer.cmn = config::CmnMode::None;
        cfg
    }

    fn linear_fsg() -> Fsg {
        let mut fsg = Fsg::new("go", 2, 0).unwrap();
        fsg.set_final(1, true).unwrap();
        fsg.add_transition(0, 1, 0.0, Some("GO".into())).unwrap();
        fsg
    }

    #[test]
    fn process_before_start_is_an_error() {
        let model = tiny_model();
        let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
        decoder.set_fsg("go", linear_fsg()).unwrap();
        assert!(decoder.process(&[0.0; 100], false).is_err());
    }

    #[test]
    fn start_without_a_grammar_is_an_error() {
        let model = tiny_model();
        let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
        assert!(decoder.start().is_err());
    }

    #[test]
    fn full_utterance_produces_a_hypothesis() {
        let model = tiny_model();
        let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
        decoder.set_fsg("go", linear_fsg()).unwrap();
        decoder.start().unwrap();
        let samples = vec![0.0f32; 4000];
        decoder.process(&samples, false).unwrap();
        decoder.end().unwrap();
        let (hyp, _score) = decoder.hyp().unwrap();
        assert_eq!(hyp, "GO");
        let segs: Vec<_> = decoder.seg_iter().unwrap().collect();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].word, "GO");
    }

    #[test]
    fn set_jsgf_without_compiler_is_a_configuration_error() {
        let model = tiny_model();
        let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
        let err = decoder.set_jsgf("go", "#JSGF V1.0; grammar go; public <go> = go;").unwrap_err();
        assert!(matches!(err, DecoderError::Configuration(_)));
    }

    #[test]
    fn add_word_rejects_unknown_phone() {
        let model = tiny_model();
        let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
        assert!(decoder.add_word("STOP", "Z Z", false).is_err());
    }

    #[test]
    fn reinit_replays_the_installed_fsg() {
        let model = tiny_model();
        let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
        decoder.set_fsg("go", linear_fsg()).unwrap();
        decoder.reinit(tiny_config()).unwrap();
        // The replayed grammar should still accept the same utterance.
        decoder.start().unwrap();
        decoder.process(&vec![0.0f32; 4000], false).unwrap();
        decoder.end().unwrap();
        assert_eq!(decoder.hyp().unwrap().0, "GO");
    }
}
