use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::error::{PpgError, Result};
use crate::phonemes::PHONEMES;

const CHECKPOINT_ENV: &str = "PPGS_CHECKPOINT";
const DEFAULT_CHECKPOINT: &str = "checkpoints/default.json";

/// Constants the pipeline is parameterised by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Canonical sample rate every input is resampled to.
    pub sample_rate: u32,
    /// Audio samples advanced per output frame.
    pub hop_size: usize,
    /// FFT window of spectral representations.
    pub window_size: usize,
    pub phoneme_count: usize,
    /// Representation used by file-based entry points.
    pub representation: String,
    /// Declared input width of each known representation.
    pub input_channels: BTreeMap<String, usize>,
    pub hidden_channels: usize,
    pub hidden_layers: usize,
    pub kernel_size: usize,
    pub num_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let input_channels = [("mel".to_string(), 80), ("w2v2fb".to_string(), 768)]
            .into_iter()
            .collect();
        Self {
            sample_rate: 16_000,
            hop_size: 160,
            window_size: 1024,
            phoneme_count: PHONEMES.len(),
            representation: "mel".to_string(),
            input_channels,
            hidden_channels: 512,
            hidden_layers: 1,
            kernel_size: 5,
            num_workers: 8,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|err| PpgError::Config(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("sample_rate", self.sample_rate as usize),
            ("hop_size", self.hop_size),
            ("window_size", self.window_size),
            ("phoneme_count", self.phoneme_count),
            ("hidden_channels", self.hidden_channels),
            ("kernel_size", self.kernel_size),
            ("num_workers", self.num_workers),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(PpgError::Config(format!("{name} must be positive")));
        }
        if self.kernel_size % 2 == 0 {
            return Err(PpgError::Config(format!(
                "kernel_size must be odd, got {}",
                self.kernel_size
            )));
        }
        if self.input_channels(&self.representation).is_none() {
            return Err(PpgError::Config(format!(
                "no input width declared for representation `{}`",
                self.representation
            )));
        }
        Ok(())
    }

    pub fn input_channels(&self, representation: &str) -> Option<usize> {
        self.input_channels.get(representation).copied()
    }

    /// Input width of the default representation.
    pub fn model_input_channels(&self) -> Result<usize> {
        self.input_channels(&self.representation).ok_or_else(|| {
            PpgError::Config(format!(
                "no input width declared for representation `{}`",
                self.representation
            ))
        })
    }

    pub fn with_representation(mut self, name: impl Into<String>, channels: usize) -> Self {
        let name = name.into();
        self.input_channels.insert(name.clone(), channels);
        self.representation = name;
        self
    }
}

/// Locations of bundled assets.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub assets_root: PathBuf,
}

impl AppConfig {
    pub fn from_override(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let root = match path {
            Some(custom) => canonicalize_dir(&custom)?,
            None => default_assets_root()?,
        };
        Ok(Self { assets_root: root })
    }

    /// `$PPGS_CHECKPOINT` if set, otherwise the bundled default checkpoint.
    pub fn default_checkpoint(&self) -> PathBuf {
        std::env::var_os(CHECKPOINT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.assets_root.join(DEFAULT_CHECKPOINT))
    }
}

fn canonicalize_dir(path: &Path) -> anyhow::Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("failed to resolve assets directory at {:?}", path))?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(anyhow!("assets path {:?} is not a directory", canonical))
    }
}

fn default_assets_root() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("unable to resolve current executable path")?;
    exe.ancestors()
        .find_map(|dir| {
            let candidate = dir.join("assets");
            candidate.is_dir().then_some(candidate)
        })
        .ok_or_else(|| anyhow!("could not locate default assets directory alongside binary"))
}
