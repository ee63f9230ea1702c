//! Error taxonomy for the decoder core (spec §7).
//!
//! Every recoverable failure the core can report is a [`DecoderError`]
//! variant; the caller's next attempt succeeds or fails independently
//! of a prior error (there is no sticky error state). Internal
//! invariant violations are not represented here — they panic, per
//! the "fatal, indicates a bug" contract in spec §7.

use thiserror::Error;

/// Recoverable error kinds returned from the public decoder API.
#[derive(Debug, Error)]
pub enum DecoderError {
    /// Unknown option, out-of-range value, missing required file,
    /// incompatible sample rate. Reported synchronously from
    /// `init`/`reinit`; never occurs mid-utterance.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed model data or a topology violation (back-arc or
    /// multi-step skip in a transition matrix). Fatal at load: the
    /// decoder that produced this is not usable.
    #[error("model error: {0}")]
    Model(String),

    /// Word with an unknown phone on `add_word`, or a pronunciation
    /// collision. Other decoder state is unaffected.
    #[error("lexicon error: {0}")]
    Lexicon(String),

    /// Operation invoked from a state the lifecycle state machine
    /// does not permit (e.g. `process` before `start`). Decoder state
    /// is unchanged.
    #[error("state error: {0}")]
    State(String),

    /// Feature ring full with growth disabled, or the backpointer
    /// table hit its implementation cap.
    #[error("resource saturation: {0}")]
    ResourceSaturation(String),
}

pub type Result<T> = std::result::Result<T, DecoderError>;
