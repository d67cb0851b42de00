//! Input discovery and output path derivation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PpgError, Result};
use crate::tensor::TENSOR_EXTENSION;

/// Extensions searched for when a directory is given without explicit ones.
pub const DEFAULT_EXTENSIONS: [&str; 4] = ["wav", "flac", "mp3", "ogg"];

/// `input` with its extension replaced by [`TENSOR_EXTENSION`].
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension(TENSOR_EXTENSION)
}

/// Pair inputs with outputs by position.
///
/// Without `outputs` every output is [`default_output_path`] of its input.
pub fn pair_paths(
    inputs: &[PathBuf],
    outputs: Option<&[PathBuf]>,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    match outputs {
        Some(outputs) if outputs.len() != inputs.len() => Err(PpgError::ArityMismatch {
            inputs: inputs.len(),
            outputs: outputs.len(),
        }),
        Some(outputs) => Ok(inputs.iter().cloned().zip(outputs.iter().cloned()).collect()),
        None => Ok(inputs
            .iter()
            .map(|input| (input.clone(), default_output_path(input)))
            .collect()),
    }
}

/// Expand directories into the audio files they contain.
///
/// Files are kept in the order given; each directory contributes its matches
/// sorted by path. Extension matching ignores case.
pub fn resolve_inputs<S: AsRef<str>>(paths: &[PathBuf], extensions: &[S]) -> Result<Vec<PathBuf>> {
    let extensions: Vec<String> = if extensions.is_empty() {
        DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    } else {
        extensions
            .iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect()
    };

    let mut resolved = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            collect_matching(path, &extensions, &mut found)?;
            found.sort();
            resolved.extend(found);
        } else if path.is_file() {
            resolved.push(path.clone());
        } else {
            return Err(PpgError::audio_load(path, "path does not exist"));
        }
    }
    Ok(resolved)
}

fn collect_matching(dir: &Path, extensions: &[String], found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_matching(&path, extensions, found)?;
        } else if has_extension(&path, extensions) {
            found.push(path);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
