//! Band-limited resampling with a cached sinc interpolator.

use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};
use tracing::debug;

use crate::error::{PpgError, Result};
use crate::types::AudioBuffer;

/// Input frames handed to the interpolator per call.
const CHUNK_SIZE: usize = 1024;

fn interpolation_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Converts audio between sample rates, reusing the last interpolator it built.
///
/// The interpolator's size does not depend on the rate ratio, so arbitrary
/// header rates (44 101 Hz, 7 999 Hz) cost the same as common ones.
#[derive(Default)]
pub struct Resampler {
    cached: Option<CachedSinc>,
    builds: usize,
}

struct CachedSinc {
    source_rate: u32,
    target_rate: u32,
    inner: SincFixedIn<f32>,
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("cached_rates", &self.cached_rates())
            .field("builds", &self.builds)
            .finish()
    }
}

impl Resampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `audio` itself when it is already at `target_rate`.
    pub fn resample(&mut self, audio: AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
        if target_rate == 0 {
            return Err(PpgError::InvalidAudio("target sample rate must be positive".into()));
        }
        if audio.sample_rate() == target_rate {
            return Ok(audio);
        }
        let source_rate = audio.sample_rate();
        let sinc = self.interpolator_for(source_rate, target_rate)?;
        let channels = audio
            .deinterleave()
            .iter()
            .map(|channel| resample_channel(sinc, channel, source_rate, target_rate))
            .collect::<Result<Vec<_>>>()?;
        AudioBuffer::from_channels(&channels, target_rate)
    }

    /// Number of interpolators constructed so far.
    pub fn kernel_builds(&self) -> usize {
        self.builds
    }

    /// `(source, target)` rates of the cached interpolator.
    pub fn cached_rates(&self) -> Option<(u32, u32)> {
        self.cached.as_ref().map(|c| (c.source_rate, c.target_rate))
    }

    fn interpolator_for(&mut self, source_rate: u32, target_rate: u32) -> Result<&mut SincFixedIn<f32>> {
        let reusable = self
            .cached
            .as_ref()
            .is_some_and(|c| c.source_rate == source_rate && c.target_rate == target_rate);
        if !reusable {
            debug!(source_rate, target_rate, "building resampling interpolator");
            let inner = SincFixedIn::<f32>::new(
                target_rate as f64 / source_rate as f64,
                1.0,
                interpolation_parameters(),
                CHUNK_SIZE,
                1,
            )
            .map_err(|err| PpgError::Resample(err.to_string()))?;
            self.builds += 1;
            self.cached = Some(CachedSinc {
                source_rate,
                target_rate,
                inner,
            });
        }
        match self.cached.as_mut() {
            Some(cached) => Ok(&mut cached.inner),
            None => Err(PpgError::Resample("interpolator cache is empty".into())),
        }
    }
}

/// Resample one channel, compensating the interpolator's delay so output
/// sample `i` lines up with input time `i / target_rate`.
fn resample_channel(
    sinc: &mut SincFixedIn<f32>,
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>> {
    let resample_err = |err: rubato::ResampleError| PpgError::Resample(err.to_string());
    sinc.reset();
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let target_len = (samples.len() as u64 * target_rate as u64).div_ceil(source_rate as u64) as usize;
    let delay = sinc.output_delay();
    let mut output = Vec::with_capacity(target_len + delay + CHUNK_SIZE);

    let mut pos = 0;
    while samples.len() - pos >= sinc.input_frames_next() {
        let next = sinc.input_frames_next();
        let chunk = [&samples[pos..pos + next]];
        let out = sinc.process(&chunk[..], None).map_err(resample_err)?;
        output.extend_from_slice(&out[0]);
        pos += next;
    }
    if pos < samples.len() {
        let chunk = [&samples[pos..]];
        let out = sinc
            .process_partial(Some(&chunk[..]), None)
            .map_err(resample_err)?;
        output.extend_from_slice(&out[0]);
    }
    // Flush the delay line with silence.
    while output.len() < target_len + delay {
        let out = sinc
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(resample_err)?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(target_len, 0.0);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    /// Unit-amplitude sine at `freq`: RMS near 1/sqrt(2), two zero crossings per cycle.
    fn assert_tone(samples: &[f32], freq: f32, rate: u32) {
        let rms = (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
        assert_abs_diff_eq!(rms, std::f32::consts::FRAC_1_SQRT_2, epsilon = 0.02);

        let crossings = samples
            .windows(2)
            .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
            .count() as f32;
        let expected = 2.0 * freq * samples.len() as f32 / rate as f32;
        assert!((crossings - expected).abs() <= 3.0, "{crossings} crossings, want {expected}");
    }

    #[test]
    fn same_rate_is_a_no_op() {
        let audio = AudioBuffer::mono(sine(440.0, 16_000, 1600), 16_000).unwrap();
        let mut resampler = Resampler::new();
        let out = resampler.resample(audio.clone(), 16_000).unwrap();
        assert!(out.shares_samples_with(&audio));
        assert_eq!(resampler.kernel_builds(), 0);
        assert_eq!(resampler.cached_rates(), None);
    }

    #[test]
    fn output_length_follows_rate_ratio() {
        let mut resampler = Resampler::new();
        let audio = AudioBuffer::mono(vec![0.0; 4410], 44_100).unwrap();
        let out = resampler.resample(audio, 16_000).unwrap();
        assert_eq!(out.frames(), 1600);
        assert_eq!(out.sample_rate(), 16_000);
    }

    #[test]
    fn kernel_is_reused_for_repeated_source_rate() {
        let mut resampler = Resampler::new();
        for _ in 0..3 {
            let audio = AudioBuffer::mono(vec![0.1; 480], 48_000).unwrap();
            resampler.resample(audio, 16_000).unwrap();
        }
        assert_eq!(resampler.kernel_builds(), 1);

        let audio = AudioBuffer::mono(vec![0.1; 441], 44_100).unwrap();
        resampler.resample(audio, 16_000).unwrap();
        assert_eq!(resampler.kernel_builds(), 2);
        assert_eq!(resampler.cached_rates(), Some((44_100, 16_000)));
    }

    #[test]
    fn odd_header_rates_resample_without_blowing_up() {
        let mut resampler = Resampler::new();
        let audio = AudioBuffer::mono(sine(220.0, 44_101, 44_101), 44_101).unwrap();
        let out = resampler.resample(audio, 16_000).unwrap();
        assert_eq!(out.frames(), 16_000);
        assert_eq!(resampler.cached_rates(), Some((44_101, 16_000)));
        assert_tone(&out.samples()[200..15_800], 220.0, 16_000);

        let short = AudioBuffer::mono(vec![0.1; 441], 44_101).unwrap();
        assert_eq!(resampler.resample(short, 16_000).unwrap().frames(), 160);
        assert_eq!(resampler.kernel_builds(), 1);
    }

    #[test]
    fn preserves_low_frequency_tone() {
        let mut resampler = Resampler::new();
        let audio = AudioBuffer::mono(sine(220.0, 48_000, 48_000), 48_000).unwrap();
        let out = resampler.resample(audio, 16_000).unwrap();
        assert_tone(&out.samples()[200..15_800], 220.0, 16_000);
    }

    #[test]
    fn resamples_each_channel_independently() {
        let mut resampler = Resampler::new();
        let frames = 800;
        let mut interleaved = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            interleaved.extend([0.5, -0.25]);
        }
        let audio = AudioBuffer::new(interleaved, 8_000, 2).unwrap();
        let out = resampler.resample(audio, 16_000).unwrap();
        assert_eq!(out.channels(), 2);
        assert_eq!(out.frames(), 1600);
        let channels = out.deinterleave();
        assert!(channels[0][100..1500].iter().all(|s| (s - 0.5).abs() < 2e-2));
        assert!(channels[1][100..1500].iter().all(|s| (s + 0.25).abs() < 2e-2));
    }
}
