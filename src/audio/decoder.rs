use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{PpgError, Result};
use crate::types::AudioBuffer;

/// Decode an audio file to interleaved f32 samples, keeping its channel layout.
///
/// Missing, undecodable, and zero-length files are all reported as
/// [`PpgError::AudioLoad`].
pub fn decode_audio<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let fail = |reason: &dyn std::fmt::Display| PpgError::audio_load(path, reason);

    let file = std::fs::File::open(path).map_err(|err| fail(&err))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probe_result = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| fail(&format!("unrecognised format: {err}")))?;
    let mut format = probe_result.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| fail(&"no audio tracks found"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| fail(&"sample rate not specified"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| fail(&format!("no decoder: {err}")))?;

    let mut samples = Vec::new();
    let mut channels = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(fail(&format!("failed to read packet: {err}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                warn!(path = %path.display(), error = err, "skipping corrupt packet");
                continue;
            }
            Err(err) => return Err(fail(&format!("failed to decode packet: {err}"))),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() || channels == 0 {
        return Err(fail(&"file contains no samples"));
    }
    debug!(
        path = %path.display(),
        sample_rate,
        channels,
        frames = samples.len() / channels,
        "decoded audio"
    );
    let channels = u16::try_from(channels).map_err(|_| fail(&"too many channels"))?;
    AudioBuffer::new(samples, sample_rate, channels).map_err(|err| fail(&err))
}
