//! Checkpoint loading, including recovery of distributed-training artifacts.
//!
//! A checkpoint is a JSON envelope whose `model` key holds the parameter
//! mapping; other top-level keys (optimizer state, step counters) are ignored.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PpgError, Result};
use crate::model::{KeyMismatch, ParameterMap, PhonemeModel};

/// Prefix added to every parameter name by data-parallel training wrappers.
pub const DISTRIBUTED_PREFIX: &str = "module.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub model: ParameterMap,
}

impl CheckpointState {
    pub fn new(model: ParameterMap) -> Self {
        Self { model }
    }
}

/// How [`apply`] bound the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Direct,
    /// Bound after stripping [`DISTRIBUTED_PREFIX`].
    Remapped,
}

pub fn load(path: impl AsRef<Path>) -> Result<CheckpointState> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(PpgError::CheckpointNotFound(path.to_path_buf()))
        }
        Err(err) => return Err(err.into()),
    };
    let state: CheckpointState =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            PpgError::CheckpointCorrupt {
                path: path.to_path_buf(),
                source,
            }
        })?;
    debug!(path = %path.display(), parameters = state.model.len(), "checkpoint loaded");
    Ok(state)
}

pub fn save(path: impl AsRef<Path>, state: &CheckpointState) -> Result<()> {
    let path = path.as_ref();
    let write_err = |source: std::io::Error| PpgError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, state).map_err(|err| write_err(err.into()))?;
    writer.flush().map_err(write_err)
}

/// Bind `state` onto `model`.
///
/// The key sets are compared before binding. Only a key-set mismatch leads
/// to the single remap-and-retry; shape errors surface immediately.
pub fn apply<M>(model: &mut M, state: CheckpointState) -> Result<ApplyOutcome>
where
    M: PhonemeModel + ?Sized,
{
    let expected = model.parameter_shapes();
    let Some(direct) = KeyMismatch::between(expected.keys(), state.model.keys()) else {
        model.load_parameters(state.model)?;
        return Ok(ApplyOutcome::Direct);
    };

    warn!(
        %direct,
        prefix = DISTRIBUTED_PREFIX,
        "checkpoint keys do not match the model; retrying with prefix stripped"
    );
    let params = match strip_prefix(state.model) {
        Ok(params) => params,
        Err(remapped) => {
            return Err(PpgError::CheckpointIncompatible {
                prefix: DISTRIBUTED_PREFIX,
                direct,
                remapped,
            })
        }
    };
    if let Some(remapped) = KeyMismatch::between(expected.keys(), params.keys()) {
        return Err(PpgError::CheckpointIncompatible {
            prefix: DISTRIBUTED_PREFIX,
            direct,
            remapped,
        });
    }
    model.load_parameters(params)?;
    Ok(ApplyOutcome::Remapped)
}

/// Remove [`DISTRIBUTED_PREFIX`] from every key carrying it.
///
/// A stripped name that collides with a key already present is an error;
/// the prefixed duplicates are reported as unexpected.
pub fn strip_prefix(params: ParameterMap) -> std::result::Result<ParameterMap, KeyMismatch> {
    let mut stripped = ParameterMap::new();
    let mut collisions = Vec::new();
    for (name, tensor) in params {
        let key = match name.strip_prefix(DISTRIBUTED_PREFIX) {
            Some(key) => key.to_string(),
            None => name,
        };
        if stripped.contains_key(&key) {
            collisions.push(format!("{DISTRIBUTED_PREFIX}{key}"));
            continue;
        }
        stripped.insert(key, tensor);
    }
    if collisions.is_empty() {
        Ok(stripped)
    } else {
        Err(KeyMismatch {
            missing: Vec::new(),
            unexpected: collisions,
        })
    }
}
