//! Phoneme classifiers the engine runs features through.

mod conv;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ndarray::ArrayD;

use crate::error::{PpgError, Result};
use crate::types::{Device, FeatureTensor};

pub use conv::{ConvStack, ConvStackConfig};

/// Parameter name to tensor, the payload of a checkpoint.
pub type ParameterMap = BTreeMap<String, ArrayD<f32>>;

/// A classifier mapping `frames × input_channels` features to
/// `frames × output_channels` class probabilities.
pub trait PhonemeModel: Send {
    fn input_channels(&self) -> usize;

    fn output_channels(&self) -> usize;

    /// Every parameter the model expects, with its shape.
    fn parameter_shapes(&self) -> BTreeMap<String, Vec<usize>>;

    /// Replace all parameters. Implementations must leave the model untouched
    /// on error.
    fn load_parameters(&mut self, params: ParameterMap) -> std::result::Result<(), BindError>;

    fn forward(&self, features: &FeatureTensor) -> Result<FeatureTensor>;

    /// Move parameters to `device`. Only the CPU is available to this backend.
    fn place(&mut self, device: Device) -> Result<()> {
        match device {
            Device::Cpu => Ok(()),
            other => Err(PpgError::DeviceUnavailable(other)),
        }
    }
}

/// Parameter names that disagree between a model and a state mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyMismatch {
    /// Expected by the model, absent from the state.
    pub missing: Vec<String>,
    /// Present in the state, unknown to the model.
    pub unexpected: Vec<String>,
}

impl KeyMismatch {
    /// `None` when both key sets are identical.
    pub fn between<'a>(
        expected: impl IntoIterator<Item = &'a String>,
        provided: impl IntoIterator<Item = &'a String>,
    ) -> Option<Self> {
        let expected: BTreeSet<&String> = expected.into_iter().collect();
        let provided: BTreeSet<&String> = provided.into_iter().collect();
        let missing: Vec<String> = expected.difference(&provided).map(|k| k.to_string()).collect();
        let unexpected: Vec<String> = provided.difference(&expected).map(|k| k.to_string()).collect();
        if missing.is_empty() && unexpected.is_empty() {
            None
        } else {
            Some(Self {
                missing,
                unexpected,
            })
        }
    }
}

impl fmt::Display for KeyMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 4;
        let list = |keys: &[String]| {
            let mut shown = keys.iter().take(SHOWN).cloned().collect::<Vec<_>>().join(", ");
            if keys.len() > SHOWN {
                shown.push_str(&format!(", ... {} more", keys.len() - SHOWN));
            }
            shown
        };
        write!(
            f,
            "{} missing keys [{}], {} unexpected keys [{}]",
            self.missing.len(),
            list(&self.missing),
            self.unexpected.len(),
            list(&self.unexpected)
        )
    }
}

/// Why a parameter mapping could not be bound to a model.
#[derive(Debug, Clone, PartialEq)]
pub enum BindError {
    /// The key sets differ. Recoverable by renaming keys.
    Keys(KeyMismatch),
    /// A key matched but its tensor does not fit.
    Shape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

impl From<BindError> for PpgError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Keys(mismatch) => PpgError::Config(format!(
                "parameters do not match the model: {mismatch}"
            )),
            BindError::Shape {
                name,
                expected,
                found,
            } => PpgError::ParameterShape {
                name,
                expected,
                found,
            },
        }
    }
}
