use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::spectrum;
use aus::WindowType;
use ndarray::Array2;

use super::FeatureExtractor;
use crate::config::PipelineConfig;
use crate::error::{PpgError, Result};
use crate::types::{expected_frames, AudioBuffer, FeatureTensor};

const MIN_FREQ: f64 = 20.0;
const LOG_FLOOR: f64 = 1e-5;

/// Log-mel spectrogram aligned to one frame per hop.
#[derive(Debug, Clone)]
pub struct MelExtractor {
    sample_rate: u32,
    window_size: usize,
    hop_size: usize,
    bands: usize,
}

impl MelExtractor {
    pub const NAME: &'static str = "mel";

    pub fn new(config: &PipelineConfig, bands: usize) -> Result<Self> {
        if bands == 0 || config.window_size < 2 || config.hop_size == 0 {
            return Err(PpgError::Config(
                "mel extraction needs positive bands, window and hop".into(),
            ));
        }
        Ok(Self {
            sample_rate: config.sample_rate,
            window_size: config.window_size,
            hop_size: config.hop_size,
            bands,
        })
    }

    fn spectrogram(&self, samples: &[f32]) -> Vec<Vec<f64>> {
        // Centre the first window on sample 0 and keep at least one window.
        let pad = (self.window_size - self.hop_size.min(self.window_size)) / 2;
        let mut audio = vec![0.0f64; pad];
        audio.extend(samples.iter().map(|&s| s as f64));
        audio.resize((audio.len() + pad).max(self.window_size), 0.0);

        let stft = spectrum::rstft(&audio, self.window_size, self.hop_size, WindowType::Hanning);
        let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
        let power = analysis::make_power_spectrogram(&magnitude);

        let freqs = spectrum::rfftfreq(self.window_size, self.sample_rate);
        let filterbank = MelFilterbank::new(
            MIN_FREQ,
            self.sample_rate as f64 / 2.0,
            self.bands,
            &freqs,
            true,
        );
        analysis::mel::make_mel_spectrogram(&power, &filterbank)
    }
}

impl FeatureExtractor for MelExtractor {
    fn input_channels(&self) -> usize {
        self.bands
    }

    fn extract(&self, audio: &AudioBuffer) -> Result<FeatureTensor> {
        if audio.sample_rate() != self.sample_rate {
            return Err(PpgError::Extraction(format!(
                "mel expects {} Hz audio, got {} Hz",
                self.sample_rate,
                audio.sample_rate()
            )));
        }
        let mono = audio.to_mono();
        let frames = expected_frames(mono.frames(), self.hop_size);
        if frames == 0 {
            return Ok(FeatureTensor::zeros(0, self.bands));
        }

        let mel = self.spectrogram(mono.samples());
        let rows = mel.len();
        if mel.iter().any(|row| row.len() != self.bands) {
            return Err(PpgError::Extraction(format!(
                "mel filterbank returned rows of unexpected width (wanted {})",
                self.bands
            )));
        }
        let data = Array2::from_shape_fn((rows, self.bands), |(t, b)| {
            mel[t][b].max(LOG_FLOOR).ln() as f32
        });
        Ok(FeatureTensor::new(data).fit_frames(frames))
    }
}
