//! Integration tests for the public `Decoder` lifecycle, exercised the
//! way a caller outside the crate would: build a tiny model and grammar,
//! then drive `init`/`set_fsg`/`start`/`process`/`end`.

use fsg_recognizer::model::{
    Dictionary, GaussianParams, MixtureWeights, ModelTables, PhoneticModel, ScorerKind,
    TransitionMatrix, TriphoneKey, WordPosition,
};
use fsg_recognizer::{Decoder, DecoderConfig, DecoderError, Fsg, JsgfCompiler, LogMath, SharedModel};
use std::sync::Arc;

fn tiny_model() -> SharedModel {
    let lm = LogMath::default_base();
    let mut phones = PhoneticModel::new(vec!["AA".into(), "B".into()]);
    let tp = vec![10, 20, 60, 255, 255, 10, 20, 255, 255, 255, 10, 30];
    let tmat = TransitionMatrix::new(1, 3, tp).unwrap();
    phones.set_tmat_for_base(0, 0).unwrap();
    phones.set_tmat_for_base(1, 0).unwrap();
    phones.add_triphone(
        TriphoneKey { base: "AA".into(), left: None, right: None, position: WordPosition::Single },
        [0, 1, 2],
    );
    phones.add_triphone(
        TriphoneKey { base: "B".into(), left: None, right: None, position: WordPosition::Single },
        [0, 1, 2],
    );

    let mut dict = Dictionary::new();
    dict.add_word("GO", vec!["AA".into()]).unwrap();
    dict.add_word("BACK", vec!["B".into()]).unwrap();
    dict.add_word("<sil>", vec!["AA".into()]).unwrap();

    let means = vec![0.0; 3 * 2];
    let vars = vec![1.0; 3 * 2];
    let gaussians = GaussianParams::new(ScorerKind::SemiContinuous, 1, 3, vec![2], means, vars).unwrap();
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
    cfg.composer.cmn = fsg_recognizer::config::CmnMode::None;
    cfg
}

/// Two-word grammar with a single branch point: "GO" or "BACK".
fn branching_fsg() -> Fsg {
    let mut fsg = Fsg::new("choice", 2, 0).unwrap();
    fsg.set_final(1, true).unwrap();
    fsg.add_transition(0, 1, 0.0, Some("GO".into())).unwrap();
    fsg.add_transition(0, 1, 0.0, Some("BACK".into())).unwrap();
    fsg
}

struct EchoJsgfCompiler;

impl JsgfCompiler for EchoJsgfCompiler {
    fn compile(&self, name: &str, _text: &str, _toprule: Option<&str>) -> Result<Fsg, DecoderError> {
        let mut fsg = Fsg::new(name, 2, 0)?;
        fsg.set_final(1, true)?;
        fsg.add_transition(0, 1, 0.0, Some("GO".into()))?;
        Ok(fsg)
    }
}

#[test]
fn a_full_utterance_yields_a_hypothesis_and_segmentation() {
    let model = tiny_model();
    let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
    decoder.set_fsg("choice", branching_fsg()).unwrap();
    decoder.start().unwrap();
    decoder.process(&vec![0.0f32; 4000], false).unwrap();
    decoder.end().unwrap();

    let (hyp, _score) = decoder.hyp().unwrap();
    assert!(hyp == "GO" || hyp == "BACK");

    let segs: Vec<_> = decoder.seg_iter().unwrap().collect();
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].word, hyp);
}

#[test]
fn nbest_and_lattice_are_available_after_end() {
    let model = tiny_model();
    let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
    decoder.set_fsg("choice", branching_fsg()).unwrap();
    decoder.start().unwrap();
    decoder.process(&vec![0.0f32; 4000], false).unwrap();
    decoder.end().unwrap();

    let hyps: Vec<_> = decoder.nbest(5).unwrap().collect();
    assert!(!hyps.is_empty());

    let lattice = decoder.lattice().unwrap();
    assert!(!lattice.nodes.is_empty());
}

#[test]
fn lattice_and_nbest_are_unavailable_before_end() {
    let model = tiny_model();
    let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
    decoder.set_fsg("choice", branching_fsg()).unwrap();
    assert!(decoder.lattice().is_err());
    assert!(decoder.nbest(5).is_err());
}

#[test]
fn set_jsgf_delegates_to_the_injected_compiler() {
    let model = tiny_model();
    let mut decoder = Decoder::init(tiny_config(), model, Some(Box::new(EchoJsgfCompiler))).unwrap();
    decoder.set_jsgf("go", "#JSGF V1.0; grammar go; public <go> = go;").unwrap();
    decoder.start().unwrap();
    decoder.process(&vec![0.0f32; 4000], false).unwrap();
    decoder.end().unwrap();
    assert_eq!(decoder.hyp().unwrap().0, "GO");
}

#[test]
fn pure_silence_on_a_grammar_with_no_real_words_yields_no_real_word_hyp() {
    // Spec scenario S4: a grammar whose only accepted path is the
    // silence self-loop `install_fsg` inserts automatically (the
    // dictionary here carries `<sil>`). Decoding silence should never
    // surface "GO"/"BACK" in the hypothesis.
    let model = tiny_model();
    let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
    let mut fsg = Fsg::new("silence_only", 1, 0).unwrap();
    fsg.set_final(0, true).unwrap();
    decoder.set_fsg("silence_only", fsg).unwrap();

    decoder.start().unwrap();
    decoder.process(&vec![0.0f32; 4000], false).unwrap();
    decoder.end().unwrap();

    let (hyp, _score) = decoder.hyp().unwrap();
    assert!(!hyp.split_whitespace().any(|w| w == "GO" || w == "BACK"));
}

#[test]
fn add_word_with_an_unknown_dictionary_entry_is_usable_once_added() {
    let model = tiny_model();
    let mut decoder = Decoder::init(tiny_config(), model, None).unwrap();
    decoder.add_word("STOP", "AA", false).unwrap();

    let mut fsg = Fsg::new("stop", 2, 0).unwrap();
    fsg.set_final(1, true).unwrap();
    fsg.add_transition(0, 1, 0.0, Some("STOP".into())).unwrap();
    decoder.set_fsg("stop", fsg).unwrap();

    decoder.start().unwrap();
    decoder.process(&vec![0.0f32; 4000], false).unwrap();
    decoder.end().unwrap();
    assert_eq!(decoder.hyp().unwrap().0, "STOP");
}
