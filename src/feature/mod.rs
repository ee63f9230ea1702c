//! PCM → MFCC feature extraction and dynamic-feature composition
//! (spec §4.1, §4.2).

pub mod compose;
pub mod extractor;

pub use compose::{CmnMode, FeatureComposer, FeatureComposerConfig};
pub use extractor::{DctType, FeatureExtractor, FeatureExtractorConfig};
