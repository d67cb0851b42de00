//! Audio to PPG inference: resample, extract, classify.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::{decode_audio, Resampler};
use crate::cache::ModelCache;
use crate::checkpoint;
use crate::config::PipelineConfig;
use crate::error::{PpgError, Result};
use crate::model::{ConvStack, ConvStackConfig, PhonemeModel};
use crate::paths::pair_paths;
use crate::representation::{FeatureExtractor, RepresentationRegistry};
use crate::tensor;
use crate::types::{expected_frames, AudioBuffer, FeatureTensor, ModelIdentity};

/// Builds a ready-to-run model (parameters loaded, device placed) for an identity.
pub type ModelFactory =
    Arc<dyn Fn(&ModelIdentity) -> Result<Box<dyn PhonemeModel>> + Send + Sync>;

/// The default factory: a [`ConvStack`] shaped by `config`, loaded from the
/// identity's checkpoint.
pub fn conv_stack_factory(config: &PipelineConfig) -> Result<ModelFactory> {
    let shape = ConvStackConfig::from_pipeline(config)?;
    Ok(Arc::new(move |identity: &ModelIdentity| {
        let mut model = ConvStack::new(shape);
        let state = checkpoint::load(identity.checkpoint())?;
        let outcome = checkpoint::apply(&mut model, state)?;
        debug!(?outcome, checkpoint = %identity.checkpoint.display(), "checkpoint applied");
        model.place(identity.device)?;
        Ok(Box::new(model) as Box<dyn PhonemeModel>)
    }))
}

/// Shared entry point for PPG inference.
///
/// The engine is `Sync`. The resampler and the cached model each sit behind
/// a mutex: concurrent callers resample one at a time and run lookup plus
/// forward pass one at a time, while decoding and feature extraction
/// proceed in parallel.
pub struct InferenceEngine {
    config: PipelineConfig,
    registry: RepresentationRegistry,
    resampler: Mutex<Resampler>,
    models: Mutex<ModelCache<Box<dyn PhonemeModel>>>,
    factory: ModelFactory,
}

impl InferenceEngine {
    /// Engine with the built-in representations and the default model.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let registry = RepresentationRegistry::with_builtins(&config)?;
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: PipelineConfig, registry: RepresentationRegistry) -> Result<Self> {
        config.validate()?;
        let factory = conv_stack_factory(&config)?;
        let engine = Self {
            config,
            registry,
            resampler: Mutex::new(Resampler::new()),
            models: Mutex::new(ModelCache::new()),
            factory,
        };
        engine.check_declared_width(&engine.config.representation)?;
        Ok(engine)
    }

    /// Replace the model constructor. Drops any cached model.
    pub fn with_model_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ModelIdentity) -> Result<Box<dyn PhonemeModel>> + Send + Sync + 'static,
    {
        self.factory = Arc::new(factory);
        self.models.get_mut().clear();
        self
    }

    /// Register an extra representation. Its width must agree with the
    /// configured width for `name`, when one is configured.
    pub fn register_representation<E>(&mut self, name: &str, extractor: E) -> Result<()>
    where
        E: FeatureExtractor + 'static,
    {
        if let Some(declared) = self.config.input_channels(name) {
            if declared != extractor.input_channels() {
                return Err(PpgError::RepresentationContract {
                    name: name.to_string(),
                    declared,
                    found: extractor.input_channels(),
                });
            }
        }
        self.registry.register(name, extractor);
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &RepresentationRegistry {
        &self.registry
    }

    /// Identity of the currently cached model, if any.
    pub fn cached_identity(&self) -> Option<ModelIdentity> {
        self.models.lock().identity().cloned()
    }

    /// Compute the PPG (`frames × phoneme classes`) of `audio`.
    ///
    /// Multi-channel audio is averaged to mono; any sample rate is accepted
    /// and converted to the canonical one.
    pub fn from_audio(
        &self,
        audio: AudioBuffer,
        identity: &ModelIdentity,
        representation: &str,
    ) -> Result<FeatureTensor> {
        self.registry.get(representation)?;
        if audio.is_empty() {
            return Err(PpgError::InvalidAudio("audio contains no samples".into()));
        }

        let mono = audio.to_mono();
        let resampled = self
            .resampler
            .lock()
            .resample(mono, self.config.sample_rate)?;
        let features = self.registry.extract(representation, &resampled)?;
        let expected = expected_frames(resampled.frames(), self.config.hop_size);
        let features = align_frames(representation, features, expected)?;
        debug!(
            representation,
            frames = features.frame_count(),
            channels = features.channel_count(),
            "features extracted"
        );

        let mut models = self.models.lock();
        let model = models.acquire(identity, |id| (self.factory)(id))?;
        if model.input_channels() != features.channel_count() {
            return Err(PpgError::InputWidthMismatch {
                name: representation.to_string(),
                expected: model.input_channels(),
                found: features.channel_count(),
            });
        }
        model.forward(&features)
    }

    /// Decode `path` and compute its PPG with the configured representation.
    pub fn from_file(&self, path: impl AsRef<Path>, identity: &ModelIdentity) -> Result<FeatureTensor> {
        let audio = decode_audio(path)?;
        self.from_audio(audio, identity, &self.config.representation)
    }

    /// Compute the PPG of `input` and write it to `output`.
    pub fn from_file_to_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        identity: &ModelIdentity,
    ) -> Result<()> {
        let ppg = self.from_file(input.as_ref(), identity)?;
        tensor::save(output.as_ref(), &ppg)
    }

    /// Sequentially process `inputs`, stopping at the first failure.
    ///
    /// Outputs pair with inputs by position; when omitted they are derived
    /// with [`crate::paths::default_output_path`]. Returns the written paths.
    pub fn from_files_to_files(
        &self,
        inputs: &[PathBuf],
        outputs: Option<&[PathBuf]>,
        identity: &ModelIdentity,
    ) -> Result<Vec<PathBuf>> {
        let pairs = pair_paths(inputs, outputs)?;
        info!(files = pairs.len(), "computing ppgs");
        let mut written = Vec::with_capacity(pairs.len());
        for (input, output) in pairs {
            self.from_file_to_file(&input, &output, identity)
                .map_err(|err| PpgError::BatchFile {
                    input: input.clone(),
                    source: Box::new(err),
                })?;
            written.push(output);
        }
        Ok(written)
    }

    fn check_declared_width(&self, name: &str) -> Result<()> {
        let spec = self.registry.get(name)?;
        let declared = self.config.model_input_channels()?;
        if spec.input_channels != declared {
            return Err(PpgError::RepresentationContract {
                name: name.to_string(),
                declared,
                found: spec.input_channels,
            });
        }
        Ok(())
    }
}

/// Snap `features` to `expected` frames, tolerating a one-frame disagreement.
fn align_frames(name: &str, features: FeatureTensor, expected: usize) -> Result<FeatureTensor> {
    let found = features.frame_count();
    if found.abs_diff(expected) > 1 {
        return Err(PpgError::FrameCount {
            name: name.to_string(),
            expected,
            found,
        });
    }
    Ok(features.fit_frames(expected))
}
