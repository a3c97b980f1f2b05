//! Deterministic state-stepping kernel for a simulated construct.
//!
//! One [`session::ConstructSession`] owns all mutable state for a simulated
//! session: the current construct record, bounded history, the perception
//! layer, and the whisper runtime. [`session::ConstructSession::step`]
//! advances the construct exactly one step per call and is the only entry
//! point that mutates the session.

pub mod bloom;
pub mod defaults;
pub mod export;
pub mod perception;
pub mod ritual;
pub mod sealed;
pub mod session;
pub mod signal;
pub mod wave;
pub mod whisper;

pub use export::{export_soft_bloom, ExportError, SoftBloomExport};
pub use perception::{PerceptionLayer, PerceptionSnapshot};
pub use sealed::{extract_payload, seal_payload, verify_envelope, SealedEnvelope, SealedInputError};
pub use session::{ConstructSession, LastSelection, StepError, SILENCE_GLYPH};
pub use whisper::{PatternStatus, WhisperError, WhisperPatternRegistry, WhisperRuntime};
