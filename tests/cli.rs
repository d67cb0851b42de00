use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use ppgs::checkpoint::{self, CheckpointState};
use ppgs::model::{ConvStack, ConvStackConfig};
use ppgs::{tensor, PipelineConfig};
use predicates::prelude::*;

struct Fixture {
    dir: tempfile::TempDir,
    config: PathBuf,
    checkpoint: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PipelineConfig {
            hidden_channels: 4,
            ..PipelineConfig::default()
        };
        let config = dir.path().join("pipeline.json");
        fs::write(&config, serde_json::to_string(&pipeline).unwrap()).unwrap();

        let model = ConvStack::new(ConvStackConfig::from_pipeline(&pipeline).unwrap());
        let checkpoint = dir.path().join("ckpt.json");
        checkpoint::save(&checkpoint, &CheckpointState::new(model.state())).unwrap();

        Self {
            dir,
            config,
            checkpoint,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("ppgs").unwrap();
        cmd.env("RUST_LOG", "warn")
            .arg("--config")
            .arg(&self.config)
            .arg("--checkpoint")
            .arg(&self.checkpoint);
        cmd
    }
}

fn write_tone(path: &Path, seconds: f32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22_050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..(22_050.0 * seconds) as usize {
        let t = i as f32 / 22_050.0;
        let sample = (2.0 * std::f32::consts::PI * 180.0 * t).sin() * 0.3;
        writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn directory_inputs_get_sibling_outputs() {
    let fixture = Fixture::new();
    let clips = fixture.path("clips");
    write_tone(&clips.join("one.wav"), 0.5);
    write_tone(&clips.join("nested/two.wav"), 0.3);
    fs::write(clips.join("readme.txt"), "not audio").unwrap();

    fixture
        .command()
        .arg("--input-paths")
        .arg(&clips)
        .args(["--num-workers", "2"])
        .assert()
        .success();

    let one = tensor::load(clips.join("one.ppg")).unwrap();
    assert_eq!(one.class_major().dim(), (40, 50));
    assert!(clips.join("nested/two.ppg").exists());
    assert!(!clips.join("readme.ppg").exists());
}

#[test]
fn explicit_outputs_must_match_inputs() {
    let fixture = Fixture::new();
    write_tone(&fixture.path("a.wav"), 0.2);
    write_tone(&fixture.path("b.wav"), 0.2);

    fixture
        .command()
        .arg("--input-paths")
        .arg(fixture.path("a.wav"))
        .arg(fixture.path("b.wav"))
        .arg("--output-paths")
        .arg(fixture.path("a.ppg"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("output paths"));
}

#[test]
fn missing_checkpoint_fails() {
    let fixture = Fixture::new();
    write_tone(&fixture.path("a.wav"), 0.2);

    Command::cargo_bin("ppgs")
        .unwrap()
        .arg("--input-paths")
        .arg(fixture.path("a.wav"))
        .arg("--config")
        .arg(&fixture.config)
        .arg("--checkpoint")
        .arg(fixture.path("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("checkpoint not found"));
    assert!(!fixture.path("a.ppg").exists());
}

#[test]
fn keep_going_writes_good_files_and_exits_non_zero() {
    let fixture = Fixture::new();
    write_tone(&fixture.path("good.wav"), 0.2);
    fs::write(fixture.path("bad.wav"), b"RIFF garbage").unwrap();

    fixture
        .command()
        .arg("--input-paths")
        .arg(fixture.path("bad.wav"))
        .arg(fixture.path("good.wav"))
        .arg("--keep-going")
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 2 files failed"));
    assert!(fixture.path("good.ppg").exists());
    assert!(!fixture.path("bad.ppg").exists());
}

#[test]
fn accelerator_request_is_rejected() {
    let fixture = Fixture::new();
    write_tone(&fixture.path("a.wav"), 0.2);

    fixture
        .command()
        .arg("--input-paths")
        .arg(fixture.path("a.wav"))
        .args(["--gpu", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("accelerator:0"));
}
