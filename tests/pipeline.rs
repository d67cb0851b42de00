use std::collections::BTreeMap;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use anyhow::Result;
use approx::assert_abs_diff_eq;
use ndarray::{Array2, Axis};
use ppgs::checkpoint::{self, CheckpointState, DISTRIBUTED_PREFIX};
use ppgs::model::{ConvStack, ConvStackConfig};
use ppgs::phonemes::PHONEMES;
use ppgs::representation::{extractor_fn, RepresentationRegistry};
use ppgs::types::expected_frames;
use ppgs::{tensor, AudioBuffer, FeatureTensor, InferenceEngine, ModelIdentity, PipelineConfig, PpgError};

const SAMPLE_RATE: u32 = 16_000;
const HOP: usize = 160;

fn small_config() -> PipelineConfig {
    PipelineConfig {
        hidden_channels: 8,
        ..PipelineConfig::default()
    }
}

/// Deterministic non-trivial parameters for `config`.
fn trained_state(config: &PipelineConfig) -> Result<BTreeMap<String, ndarray::ArrayD<f32>>> {
    let model = ConvStack::new(ConvStackConfig::from_pipeline(config)?);
    let mut params = model.state();
    for (offset, tensor) in params.values_mut().enumerate() {
        for (i, value) in tensor.iter_mut().enumerate() {
            *value = (((i * 31 + offset * 7) % 17) as f32 - 8.0) * 0.02;
        }
    }
    Ok(params)
}

fn write_checkpoint(dir: &Path, name: &str, config: &PipelineConfig, prefix: &str) -> Result<PathBuf> {
    let params = trained_state(config)?
        .into_iter()
        .map(|(key, value)| (format!("{prefix}{key}"), value))
        .collect();
    let path = dir.join(name);
    checkpoint::save(&path, &CheckpointState::new(params))?;
    Ok(path)
}

fn sine_wave(frequency: f32, rate: u32, seconds: f32) -> Vec<f32> {
    let total = (rate as f32 * seconds) as usize;
    (0..total)
        .map(|index| (2.0 * PI * frequency * index as f32 / rate as f32).sin() * 0.5)
        .collect()
}

/// Frame-energy features, 768 channels wide, one frame per hop.
fn w2v2fb_registry(config: &PipelineConfig) -> Result<RepresentationRegistry> {
    let mut registry = RepresentationRegistry::with_builtins(config)?;
    registry.register(
        "w2v2fb",
        extractor_fn(768, |audio: &AudioBuffer| {
            let frames = expected_frames(audio.frames(), HOP);
            let samples = audio.samples();
            let energy: Vec<f32> = (0..frames)
                .map(|f| samples[f * HOP..(f + 1) * HOP].iter().map(|s| s * s).sum::<f32>())
                .collect();
            Ok(FeatureTensor::new(Array2::from_shape_fn((frames, 768), |(f, c)| {
                energy[f] * (c as f32 + 1.0) / 768.0
            })))
        }),
    );
    Ok(registry)
}

fn assert_rows_are_distributions(ppg: &FeatureTensor) {
    for row in ppg.data().axis_iter(Axis(0)) {
        assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-4);
    }
}

#[test]
fn one_second_through_registered_representation() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = small_config().with_representation("w2v2fb", 768);
    let ckpt = write_checkpoint(dir.path(), "ckpt.json", &config, "")?;
    let engine = InferenceEngine::with_registry(config.clone(), w2v2fb_registry(&config)?)?;

    let audio = AudioBuffer::mono(sine_wave(220.0, SAMPLE_RATE, 1.0), SAMPLE_RATE)?;
    let ppg = engine.from_audio(audio, &ModelIdentity::cpu(&ckpt), "w2v2fb")?;

    assert_eq!(ppg.class_major().dim(), (PHONEMES.len(), 100));
    assert_rows_are_distributions(&ppg);
    Ok(())
}

#[test]
fn prefixed_checkpoint_matches_plain_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = small_config();
    let plain = write_checkpoint(dir.path(), "plain.json", &config, "")?;
    let wrapped = write_checkpoint(dir.path(), "wrapped.json", &config, DISTRIBUTED_PREFIX)?;
    let engine = InferenceEngine::new(config)?;

    let audio = AudioBuffer::mono(sine_wave(330.0, SAMPLE_RATE, 0.5), SAMPLE_RATE)?;
    let direct = engine.from_audio(audio.clone(), &ModelIdentity::cpu(&plain), "mel")?;
    let remapped = engine.from_audio(audio, &ModelIdentity::cpu(&wrapped), "mel")?;

    assert_eq!(direct, remapped);
    assert_eq!(direct.frame_count(), 50);
    Ok(())
}

#[test]
fn checkpoint_for_another_architecture_is_incompatible() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let deeper = PipelineConfig {
        hidden_layers: 3,
        ..small_config()
    };
    let ckpt = write_checkpoint(dir.path(), "deeper.json", &deeper, DISTRIBUTED_PREFIX)?;
    let engine = InferenceEngine::new(small_config())?;

    let audio = AudioBuffer::mono(sine_wave(330.0, SAMPLE_RATE, 0.2), SAMPLE_RATE)?;
    let err = engine
        .from_audio(audio, &ModelIdentity::cpu(&ckpt), "mel")
        .unwrap_err();
    match err {
        PpgError::CheckpointIncompatible { direct, remapped, .. } => {
            assert_eq!(direct.missing.len(), 6);
            assert_eq!(remapped.unexpected.len(), 4);
            assert!(remapped.missing.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn stereo_at_another_rate_is_mixed_and_resampled() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = small_config();
    let ckpt = write_checkpoint(dir.path(), "ckpt.json", &config, "")?;
    let engine = InferenceEngine::new(config)?;

    let left = sine_wave(220.0, 44_100, 1.0);
    let right = sine_wave(440.0, 44_100, 1.0);
    let stereo = AudioBuffer::from_channels(&[left, right], 44_100)?;
    let ppg = engine.from_audio(stereo, &ModelIdentity::cpu(&ckpt), "mel")?;

    assert_eq!(ppg.frame_count(), 100);
    assert_eq!(ppg.channel_count(), PHONEMES.len());
    assert_rows_are_distributions(&ppg);
    Ok(())
}

#[test]
fn files_to_files_writes_class_major_outputs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = small_config();
    let ckpt = write_checkpoint(dir.path(), "ckpt.json", &config, "")?;
    let engine = InferenceEngine::new(config)?;

    let mut inputs = Vec::new();
    for (name, seconds) in [("a.wav", 0.5), ("b.wav", 0.25)] {
        let path = dir.path().join(name);
        write_wav(&path, &sine_wave(300.0, SAMPLE_RATE, seconds))?;
        inputs.push(path);
    }
    let outputs = vec![dir.path().join("out/a.ppg"), dir.path().join("out/b.ppg")];

    let written = engine.from_files_to_files(&inputs, Some(outputs.as_slice()), &ModelIdentity::cpu(&ckpt))?;
    assert_eq!(written, outputs);
    assert_eq!(tensor::load(&outputs[0])?.class_major().dim(), (40, 50));
    assert_eq!(tensor::load(&outputs[1])?.class_major().dim(), (40, 25));

    let err = engine
        .from_files_to_files(&inputs, Some(&outputs[..1]), &ModelIdentity::cpu(&ckpt))
        .unwrap_err();
    assert!(matches!(err, PpgError::ArityMismatch { inputs: 2, outputs: 1 }));
    Ok(())
}

fn write_wav(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
