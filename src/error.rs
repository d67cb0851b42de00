use std::path::PathBuf;

use thiserror::Error;

use crate::model::KeyMismatch;
use crate::types::Device;

/// Convenient alias for results returned by the pipeline.
pub type Result<T> = std::result::Result<T, PpgError>;

#[derive(Debug, Error)]
pub enum PpgError {
    #[error("failed to load audio from {path}: {reason}")]
    AudioLoad { path: PathBuf, reason: String },

    #[error("invalid audio buffer: {0}")]
    InvalidAudio(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(PathBuf),

    #[error("checkpoint {path} could not be parsed: {source}")]
    CheckpointCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The parameter names still disagree with the model after stripping
    /// the distributed-training prefix.
    #[error(
        "checkpoint does not match the model: direct load failed ({direct}); \
         load after stripping `{prefix}` failed ({remapped})"
    )]
    CheckpointIncompatible {
        prefix: &'static str,
        direct: KeyMismatch,
        remapped: KeyMismatch,
    },

    #[error("parameter `{name}` has shape {found:?}, model expects {expected:?}")]
    ParameterShape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("unknown representation `{0}`")]
    UnknownRepresentation(String),

    #[error("representation `{name}` produced {found} channels but declares {declared}")]
    RepresentationContract {
        name: String,
        declared: usize,
        found: usize,
    },

    #[error("model expects {expected} input channels, representation `{name}` provides {found}")]
    InputWidthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("feature extraction failed: {0}")]
    Extraction(String),

    #[error("device {0} is unavailable")]
    DeviceUnavailable(Device),

    #[error("{inputs} input paths but {outputs} output paths")]
    ArityMismatch { inputs: usize, outputs: usize },

    #[error("failed to process {input}: {source}")]
    BatchFile {
        input: PathBuf,
        #[source]
        source: Box<PpgError>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("ppg file {path} could not be read: {source}")]
    TensorLoad {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "representation `{name}` produced {found} frames, expected {expected} \
         (one per hop)"
    )]
    FrameCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PpgError {
    pub(crate) fn audio_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::AudioLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
