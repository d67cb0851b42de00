//! PPG files: the class-major `[classes, frames]` matrix as ndarray JSON.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{PpgError, Result};
use crate::types::FeatureTensor;

/// Extension of output files derived from input paths.
pub const TENSOR_EXTENSION: &str = "ppg";

/// Write `ppg` to `path`, creating parent directories.
///
/// Data goes to a temporary file beside `path` and is renamed into place, so
/// an interrupted write never leaves a truncated output behind.
pub fn save(path: impl AsRef<Path>, ppg: &FeatureTensor) -> Result<()> {
    let path = path.as_ref();
    let write_err = |source: std::io::Error| PpgError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(write_err)?;

    let mut staged = NamedTempFile::new_in(&parent).map_err(write_err)?;
    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        serde_json::to_writer(&mut writer, &ppg.class_major())
            .map_err(|err| write_err(err.into()))?;
        writer.flush().map_err(write_err)?;
    }
    staged.persist(path).map_err(|err| write_err(err.error))?;
    debug!(path = %path.display(), frames = ppg.frame_count(), "wrote ppg");
    Ok(())
}

pub fn load(path: impl AsRef<Path>) -> Result<FeatureTensor> {
    let path = path.as_ref();
    let load_err = |source: serde_json::Error| PpgError::TensorLoad {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|err| load_err(serde_json::Error::io(err)))?;
    let class_major: Array2<f32> =
        serde_json::from_reader(BufReader::new(file)).map_err(load_err)?;
    Ok(FeatureTensor::from_class_major(class_major))
}
