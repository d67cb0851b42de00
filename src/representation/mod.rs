//! Named input representations and the registry that dispatches to them.

mod mel;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{PpgError, Result};
use crate::types::{AudioBuffer, FeatureTensor};

pub use mel::MelExtractor;

/// Turns canonical-rate mono audio into `frames × input_channels` features.
///
/// Implementations should produce `sample_count / hop_size` frames (within
/// one) for the hop size they were configured with.
pub trait FeatureExtractor: Send + Sync {
    /// Declared feature width.
    fn input_channels(&self) -> usize;

    fn extract(&self, audio: &AudioBuffer) -> Result<FeatureTensor>;
}

/// Adapts a closure into a [`FeatureExtractor`].
pub struct FnExtractor<F> {
    channels: usize,
    extract: F,
}

impl<F> FeatureExtractor for FnExtractor<F>
where
    F: Fn(&AudioBuffer) -> Result<FeatureTensor> + Send + Sync,
{
    fn input_channels(&self) -> usize {
        self.channels
    }

    fn extract(&self, audio: &AudioBuffer) -> Result<FeatureTensor> {
        (self.extract)(audio)
    }
}

pub fn extractor_fn<F>(channels: usize, extract: F) -> FnExtractor<F>
where
    F: Fn(&AudioBuffer) -> Result<FeatureTensor> + Send + Sync,
{
    FnExtractor { channels, extract }
}

/// A registered representation.
#[derive(Clone)]
pub struct RepresentationSpec {
    pub name: String,
    pub input_channels: usize,
    pub extractor: Arc<dyn FeatureExtractor>,
}

impl fmt::Debug for RepresentationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepresentationSpec")
            .field("name", &self.name)
            .field("input_channels", &self.input_channels)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepresentationRegistry {
    specs: BTreeMap<String, RepresentationSpec>,
}

impl RepresentationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the representations computed in-crate (`mel`).
    pub fn with_builtins(config: &PipelineConfig) -> Result<Self> {
        let mut registry = Self::new();
        let bands = config.input_channels(MelExtractor::NAME).ok_or_else(|| {
            PpgError::Config(format!(
                "no input width declared for `{}`",
                MelExtractor::NAME
            ))
        })?;
        registry.register(MelExtractor::NAME, MelExtractor::new(config, bands)?);
        Ok(registry)
    }

    /// Bind `name` to `extractor`, replacing any previous binding.
    pub fn register<E>(&mut self, name: impl Into<String>, extractor: E)
    where
        E: FeatureExtractor + 'static,
    {
        let name = name.into();
        let spec = RepresentationSpec {
            name: name.clone(),
            input_channels: extractor.input_channels(),
            extractor: Arc::new(extractor),
        };
        self.specs.insert(name, spec);
    }

    pub fn get(&self, name: &str) -> Result<&RepresentationSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| PpgError::UnknownRepresentation(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.keys().map(String::as_str).collect()
    }

    /// Run the named extractor and check its output width.
    pub fn extract(&self, name: &str, audio: &AudioBuffer) -> Result<FeatureTensor> {
        let spec = self.get(name)?;
        let features = spec.extractor.extract(audio)?;
        if features.channel_count() != spec.input_channels {
            return Err(PpgError::RepresentationContract {
                name: spec.name.clone(),
                declared: spec.input_channels,
                found: features.channel_count(),
            });
        }
        Ok(features)
    }
}
