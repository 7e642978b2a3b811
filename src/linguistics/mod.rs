//! Emergent linguistics: transcript -> crystallized lexicon -> proto-language

pub mod crystallizer;
pub mod lexicon;
pub mod normalize;
pub mod proto_language;
pub mod telemetry;
pub mod transcript;

pub use crystallizer::{Crystallizer, CrystallizerState, PassReport};
pub use lexicon::{Category, Lexicon, LexiconEntry, LexiconStats};
pub use proto_language::{generate, GenerateOptions, VocabularyItem};
pub use telemetry::{EmergenceSample, EmergenceState, EmergenceTelemetry};
pub use transcript::{Transcript, Utterance};
