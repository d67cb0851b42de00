use std::path::Path;

use crate::error::{PpgError, Result};
use crate::types::AudioBuffer;

/// Write an [`AudioBuffer`] as 16-bit PCM WAV, keeping its channel layout.
pub fn encode_audio<P: AsRef<Path>>(audio: &AudioBuffer, path: P) -> Result<()> {
    let path = path.as_ref();
    let write_err = |err: hound::Error| PpgError::Write {
        path: path.to_path_buf(),
        source: match err {
            hound::Error::IoError(io) => io,
            other => std::io::Error::other(other.to_string()),
        },
    };

    let spec = hound::WavSpec {
        channels: audio.channels(),
        sample_rate: audio.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(write_err)?;
    for &sample in audio.samples() {
        let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(scaled).map_err(write_err)?;
    }
    writer.finalize().map_err(write_err)
}
