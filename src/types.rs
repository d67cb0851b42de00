//! Core types shared across the PPG pipeline

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ndarray::{Array2, Axis};

use crate::error::{PpgError, Result};

/// Decoded audio: interleaved samples in [-1.0, 1.0]
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32, channels: u16) -> Result<Self> {
        let samples = samples.into();
        if sample_rate == 0 {
            return Err(PpgError::InvalidAudio("sample rate must be positive".into()));
        }
        if channels == 0 {
            return Err(PpgError::InvalidAudio("channel count must be positive".into()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(PpgError::InvalidAudio(format!(
                "{} samples cannot be split into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    pub fn mono(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Result<Self> {
        Self::new(samples, sample_rate, 1)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// True when both buffers point at the same sample storage.
    pub fn shares_samples_with(&self, other: &AudioBuffer) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }

    /// Average all channels into one. Mono input is returned as-is.
    pub fn to_mono(&self) -> AudioBuffer {
        if self.channels == 1 {
            return self.clone();
        }
        let channels = self.channels as usize;
        let mixed: Vec<f32> = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        AudioBuffer {
            samples: mixed.into(),
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    /// Split interleaved samples into one vector per channel.
    pub fn deinterleave(&self) -> Vec<Vec<f32>> {
        let channels = self.channels as usize;
        (0..channels)
            .map(|ch| {
                self.samples
                    .iter()
                    .skip(ch)
                    .step_by(channels)
                    .copied()
                    .collect()
            })
            .collect()
    }

    /// Inverse of [`AudioBuffer::deinterleave`]. All channels must share a length.
    pub fn from_channels(channels: &[Vec<f32>], sample_rate: u32) -> Result<Self> {
        let count = channels.len();
        let frames = channels.first().map_or(0, Vec::len);
        if channels.iter().any(|c| c.len() != frames) {
            return Err(PpgError::InvalidAudio("channel lengths differ".into()));
        }
        let mut interleaved = Vec::with_capacity(frames * count);
        for i in 0..frames {
            interleaved.extend(channels.iter().map(|c| c[i]));
        }
        let count = u16::try_from(count)
            .map_err(|_| PpgError::InvalidAudio(format!("too many channels: {count}")))?;
        Self::new(interleaved, sample_rate, count)
    }
}

/// Number of frames a representation yields for `samples` at hop `hop_size`.
pub fn expected_frames(samples: usize, hop_size: usize) -> usize {
    if hop_size == 0 {
        0
    } else {
        samples / hop_size
    }
}

/// Per-frame features, `frame_count × channel_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    data: Array2<f32>,
}

impl FeatureTensor {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn zeros(frames: usize, channels: usize) -> Self {
        Self::new(Array2::zeros((frames, channels)))
    }

    pub fn frame_count(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn channel_count(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn into_inner(self) -> Array2<f32> {
        self.data
    }

    /// `channel_count × frame_count` copy, the layout PPG files are stored in.
    pub fn class_major(&self) -> Array2<f32> {
        self.data.t().to_owned()
    }

    pub fn from_class_major(data: Array2<f32>) -> Self {
        Self::new(data.reversed_axes().as_standard_layout().into_owned())
    }

    /// Nearest-neighbour resampling along time to exactly `frames` rows.
    pub fn fit_frames(self, frames: usize) -> Self {
        let source = self.frame_count();
        if source == frames {
            return self;
        }
        let channels = self.channel_count();
        if source == 0 {
            return Self::zeros(frames, channels);
        }
        let data = Array2::from_shape_fn((frames, channels), |(i, c)| {
            let src = (i * source / frames).min(source - 1);
            self.data[[src, c]]
        });
        Self::new(data)
    }
}

/// Where a model's parameters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    Accelerator(usize),
}

impl Device {
    /// `None` selects the CPU, as the `--gpu` flag does when omitted.
    pub fn from_index(index: Option<usize>) -> Self {
        index.map_or(Device::Cpu, Device::Accelerator)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(index) => write!(f, "accelerator:{index}"),
        }
    }
}

/// Identifies one loaded model instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelIdentity {
    pub checkpoint: PathBuf,
    pub device: Device,
}

impl ModelIdentity {
    pub fn new(checkpoint: impl Into<PathBuf>, device: Device) -> Self {
        Self {
            checkpoint: checkpoint.into(),
            device,
        }
    }

    pub fn cpu(checkpoint: impl Into<PathBuf>) -> Self {
        Self::new(checkpoint, Device::Cpu)
    }

    pub fn checkpoint(&self) -> &Path {
        &self.checkpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rejects_ragged_interleaving() {
        assert!(AudioBuffer::new(vec![0.0; 5], 16_000, 2).is_err());
        assert!(AudioBuffer::new(vec![0.0; 4], 0, 1).is_err());
    }

    #[test]
    fn downmixes_stereo_by_averaging() {
        let stereo = AudioBuffer::new(vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 8_000, 2).unwrap();
        let mono = stereo.to_mono();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.samples(), &[0.5, 0.5, 0.0]);
    }

    #[test]
    fn mono_downmix_shares_storage() {
        let mono = AudioBuffer::mono(vec![0.1, 0.2], 16_000).unwrap();
        assert!(mono.to_mono().shares_samples_with(&mono));
    }

    #[test]
    fn channel_split_roundtrips() {
        let stereo = AudioBuffer::new(vec![1.0, 2.0, 3.0, 4.0], 8_000, 2).unwrap();
        let split = stereo.deinterleave();
        assert_eq!(split, vec![vec![1.0, 3.0], vec![2.0, 4.0]]);
        let joined = AudioBuffer::from_channels(&split, 8_000).unwrap();
        assert_eq!(joined.samples(), stereo.samples());
    }

    #[test]
    fn fit_frames_repeats_nearest_rows() {
        let tensor = FeatureTensor::new(array![[1.0, 10.0], [2.0, 20.0]]);
        let stretched = tensor.fit_frames(4);
        assert_eq!(
            stretched.data(),
            &array![[1.0, 10.0], [1.0, 10.0], [2.0, 20.0], [2.0, 20.0]]
        );
    }

    #[test]
    fn class_major_is_a_transpose() {
        let tensor = FeatureTensor::new(array![[0.25, 0.75], [0.5, 0.5], [1.0, 0.0]]);
        let stored = tensor.class_major();
        assert_eq!(stored.dim(), (2, 3));
        assert_eq!(FeatureTensor::from_class_major(stored), tensor);
    }

    #[test]
    fn device_index_selects_accelerator() {
        assert_eq!(Device::from_index(None), Device::Cpu);
        assert_eq!(Device::from_index(Some(1)), Device::Accelerator(1));
        assert_eq!(Device::Accelerator(1).to_string(), "accelerator:1");
    }
}
