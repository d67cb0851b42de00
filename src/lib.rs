//! Phonetic posteriorgram (PPG) inference.
//!
//! Audio is resampled to the canonical rate, turned into a named input
//! representation, and run through a cached phoneme classifier. The result is
//! a per-frame distribution over [`phonemes::PHONEMES`].

pub mod audio;
pub mod batch;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod paths;
pub mod phonemes;
pub mod representation;
pub mod tensor;
pub mod types;

pub use batch::{BatchOrchestrator, BatchReport, CancellationToken, FailurePolicy};
pub use config::PipelineConfig;
pub use engine::InferenceEngine;
pub use error::{PpgError, Result};
pub use types::{AudioBuffer, Device, FeatureTensor, ModelIdentity};
