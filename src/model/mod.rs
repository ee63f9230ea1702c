//! Immutable, shared acoustic/lexical model tables (spec §3 "Model
//! tables"). Built once, shared by reference count across decoder
//! instances (spec §3 "Ownership"; spec §5 "Sharing").
//!
//! Binary model-*file* parsing is explicitly out of scope (spec §1);
//! every type here is constructed from already-decoded Rust values.

pub mod cursor;
pub mod dict;
pub mod gaussian;
pub mod mixture;
pub mod phone;
pub mod transition;

pub use dict::Dictionary;
pub use gaussian::{GaussianParams, ScorerKind};
pub use mixture::MixtureWeights;
pub use phone::{PhoneticModel, TriphoneKey, WordPosition};
pub use transition::TransitionMatrix;

use crate::logmath::LogMath;
use std::sync::Arc;

/// The full set of immutable model tables a decoder needs, bundled
/// behind one `Arc` handle so constructing a second decoder against
/// the same model is O(1) (spec §5 "Sharing").
pub struct ModelTables {
    pub logmath: LogMath,
    pub gaussians: GaussianParams,
    pub mixture_weights: MixtureWeights,
    pub transitions: TransitionMatrix,
    pub phones: PhoneticModel,
    pub dictionary: Dictionary,
    /// Senone -> codebook map for a PTM model (one codebook per
    /// context-independent base phone). `None` for semi-continuous
    /// models, which share a single codebook across every senone.
    pub ptm_senone_codebook: Option<Vec<usize>>,
}

pub type SharedModel = Arc<ModelTables>;
