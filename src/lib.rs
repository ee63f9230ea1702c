//! Offline, embeddable FSG/JSGF-grammar-constrained speech recognizer
//! (spec §1 "Overview"): feature extraction, GMM acoustic scoring, and
//! token-passing Viterbi search over a finite-state grammar, with word
//! lattice construction, N-best extraction, and forced alignment built
//! on top of a finished search.
//!
//! Binary model-file parsing and JSGF compilation are explicitly out of
//! scope (spec §1) — both are external collaborators the public API
//! takes as already-built values or injected trait objects.

pub mod config;
pub mod decoder;
pub mod error;
pub mod feature;
pub mod hmm;
pub mod lattice;
pub mod logmath;
pub mod logsink;
pub mod model;
pub mod pool;
pub mod scorer;
pub mod search;

pub use config::DecoderConfig;
pub use decoder::{Decoder, JsgfCompiler, NBestIter, SegIter, SharedLattice, WordSegment};
pub use error::DecoderError;
pub use logmath::LogMath;
pub use model::{ModelTables, SharedModel};
pub use search::Fsg;
