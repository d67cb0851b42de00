use std::collections::BTreeMap;

use ndarray::{s, Array1, Array2, Array3, ArrayD, Axis, Ix1, Ix3};

use super::{BindError, KeyMismatch, ParameterMap, PhonemeModel};
use crate::config::PipelineConfig;
use crate::error::{PpgError, Result};
use crate::types::FeatureTensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvStackConfig {
    pub input_channels: usize,
    pub hidden_channels: usize,
    pub output_channels: usize,
    pub hidden_layers: usize,
    pub kernel_size: usize,
}

impl ConvStackConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            input_channels: config.model_input_channels()?,
            hidden_channels: config.hidden_channels,
            output_channels: config.phoneme_count,
            hidden_layers: config.hidden_layers,
            kernel_size: config.kernel_size,
        })
    }
}

/// One-dimensional convolution over time with `same` zero padding.
#[derive(Debug, Clone)]
struct Conv1d {
    /// `out × in × kernel`
    weight: Array3<f32>,
    bias: Array1<f32>,
}

impl Conv1d {
    fn zeros(input: usize, output: usize, kernel: usize) -> Self {
        Self {
            weight: Array3::zeros((output, input, kernel)),
            bias: Array1::zeros(output),
        }
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let (frames, channels) = x.dim();
        let (out, _, kernel) = self.weight.dim();
        let pad = kernel / 2;

        let mut padded = Array2::<f32>::zeros((frames + kernel - 1, channels));
        padded.slice_mut(s![pad..pad + frames, ..]).assign(x);

        let mut y = Array2::<f32>::zeros((frames, out));
        for k in 0..kernel {
            let tap = self.weight.index_axis(Axis(2), k);
            y += &padded.slice(s![k..k + frames, ..]).dot(&tap.t());
        }
        y += &self.bias;
        y
    }
}

/// Convolutional phoneme classifier: input projection, `hidden_layers`
/// hidden convolutions with ReLU, output projection and a softmax over
/// classes.
///
/// Parameters are named `input_layer.*`, `layers.{i}.*` and `output_layer.*`,
/// each with a `weight` of shape `[out, in, kernel]` and a `bias` of `[out]`.
#[derive(Debug, Clone)]
pub struct ConvStack {
    config: ConvStackConfig,
    input_layer: Conv1d,
    layers: Vec<Conv1d>,
    output_layer: Conv1d,
}

impl ConvStack {
    /// A zero-initialised stack; load a checkpoint before use.
    pub fn new(config: ConvStackConfig) -> Self {
        let ConvStackConfig {
            input_channels,
            hidden_channels,
            output_channels,
            hidden_layers,
            kernel_size,
        } = config;
        Self {
            config,
            input_layer: Conv1d::zeros(input_channels, hidden_channels, kernel_size),
            layers: (0..hidden_layers)
                .map(|_| Conv1d::zeros(hidden_channels, hidden_channels, kernel_size))
                .collect(),
            output_layer: Conv1d::zeros(hidden_channels, output_channels, kernel_size),
        }
    }

    pub fn config(&self) -> ConvStackConfig {
        self.config
    }

    /// Current parameters, keyed as [`PhonemeModel::parameter_shapes`].
    pub fn state(&self) -> ParameterMap {
        self.named_layers()
            .flat_map(|(prefix, layer)| {
                [
                    (format!("{prefix}.weight"), layer.weight.clone().into_dyn()),
                    (format!("{prefix}.bias"), layer.bias.clone().into_dyn()),
                ]
            })
            .collect()
    }

    fn named_layers(&self) -> impl Iterator<Item = (String, &Conv1d)> {
        std::iter::once(("input_layer".to_string(), &self.input_layer))
            .chain(
                self.layers
                    .iter()
                    .enumerate()
                    .map(|(i, layer)| (format!("layers.{i}"), layer)),
            )
            .chain(std::iter::once((
                "output_layer".to_string(),
                &self.output_layer,
            )))
    }
}

fn take_weight(params: &mut ParameterMap, name: &str) -> std::result::Result<Array3<f32>, BindError> {
    take(params, name)?
        .into_dimensionality::<Ix3>()
        .map_err(|_| unreachable_shape(name))
}

fn take_bias(params: &mut ParameterMap, name: &str) -> std::result::Result<Array1<f32>, BindError> {
    take(params, name)?
        .into_dimensionality::<Ix1>()
        .map_err(|_| unreachable_shape(name))
}

fn take(params: &mut ParameterMap, name: &str) -> std::result::Result<ArrayD<f32>, BindError> {
    params.remove(name).ok_or_else(|| {
        BindError::Keys(KeyMismatch {
            missing: vec![name.to_string()],
            unexpected: Vec::new(),
        })
    })
}

// Shapes are checked before any tensor is taken.
fn unreachable_shape(name: &str) -> BindError {
    BindError::Shape {
        name: name.to_string(),
        expected: Vec::new(),
        found: Vec::new(),
    }
}

impl PhonemeModel for ConvStack {
    fn input_channels(&self) -> usize {
        self.config.input_channels
    }

    fn output_channels(&self) -> usize {
        self.config.output_channels
    }

    fn parameter_shapes(&self) -> BTreeMap<String, Vec<usize>> {
        self.state()
            .into_iter()
            .map(|(name, tensor)| (name, tensor.shape().to_vec()))
            .collect()
    }

    fn load_parameters(&mut self, mut params: ParameterMap) -> std::result::Result<(), BindError> {
        let expected = self.parameter_shapes();
        if let Some(mismatch) = KeyMismatch::between(expected.keys(), params.keys()) {
            return Err(BindError::Keys(mismatch));
        }
        for (name, shape) in &expected {
            let found = params[name].shape();
            if found != shape.as_slice() {
                return Err(BindError::Shape {
                    name: name.clone(),
                    expected: shape.clone(),
                    found: found.to_vec(),
                });
            }
        }

        let mut load = |prefix: &str| -> std::result::Result<Conv1d, BindError> {
            Ok(Conv1d {
                weight: take_weight(&mut params, &format!("{prefix}.weight"))?,
                bias: take_bias(&mut params, &format!("{prefix}.bias"))?,
            })
        };
        let input_layer = load("input_layer")?;
        let layers = (0..self.layers.len())
            .map(|i| load(&format!("layers.{i}")))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let output_layer = load("output_layer")?;

        self.input_layer = input_layer;
        self.layers = layers;
        self.output_layer = output_layer;
        Ok(())
    }

    fn forward(&self, features: &FeatureTensor) -> Result<FeatureTensor> {
        if features.channel_count() != self.config.input_channels {
            return Err(PpgError::InputWidthMismatch {
                name: "features".to_string(),
                expected: self.config.input_channels,
                found: features.channel_count(),
            });
        }
        let mut x = self.input_layer.forward(features.data());
        x.mapv_inplace(relu);
        for layer in &self.layers {
            x = layer.forward(&x);
            x.mapv_inplace(relu);
        }
        let mut logits = self.output_layer.forward(&x);
        softmax_rows(&mut logits);
        Ok(FeatureTensor::new(logits))
    }
}

fn relu(v: f32) -> f32 {
    v.max(0.0)
}

fn softmax_rows(logits: &mut Array2<f32>) {
    for mut row in logits.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
}
