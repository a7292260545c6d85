//! Dense layers with a closed set of activations.

use crate::error::{EngineError, Result};
use crate::graph::MAX_LAYER_WIDTH;
use crate::tensor::TensorBuffer;
use serde::{Deserialize, Serialize};

/// Activation applied after the affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// `max(0, x)`
    Relu,
    /// `1 / (1 + exp(-x))`
    Sigmoid,
}

impl Activation {
    /// Apply the activation to a pre-activation value.
    #[inline]
    #[must_use]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Relu => x.max(0.0),
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }

    /// Wire tag used in the artifact payload.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Relu => 0,
            Self::Sigmoid => 1,
        }
    }

    /// Decode a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Relu),
            1 => Some(Self::Sigmoid),
            _ => None,
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relu => write!(f, "relu"),
            Self::Sigmoid => write!(f, "sigmoid"),
        }
    }
}

/// One affine + activation stage.
///
/// Weights are stored row-major: row `j` holds the weights feeding output `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    input_dim: usize,
    output_dim: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
    activation: Activation,
}

impl DenseLayer {
    /// Create a layer from its parameters.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] if the weight count is not
    /// `output_dim * input_dim`, the bias count is not `output_dim`, or either
    /// dimension exceeds the buffer capacity.
    pub fn new(
        input_dim: usize,
        output_dim: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
        activation: Activation,
    ) -> Result<Self> {
        for dim in [input_dim, output_dim] {
            if dim == 0 || dim > MAX_LAYER_WIDTH {
                return Err(EngineError::DimensionMismatch {
                    expected: MAX_LAYER_WIDTH,
                    actual: dim,
                });
            }
        }
        if weights.len() != input_dim * output_dim {
            return Err(EngineError::DimensionMismatch {
                expected: input_dim * output_dim,
                actual: weights.len(),
            });
        }
        if bias.len() != output_dim {
            return Err(EngineError::DimensionMismatch {
                expected: output_dim,
                actual: bias.len(),
            });
        }

        Ok(Self {
            input_dim,
            output_dim,
            weights,
            bias,
            activation,
        })
    }

    /// Input width.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Output width.
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Activation kind.
    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Row-major weight matrix.
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Bias vector.
    #[must_use]
    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    /// Number of weights plus biases.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    /// Evaluate the layer on `input`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] if `input.len() != input_dim`.
    pub fn evaluate(&self, input: &TensorBuffer) -> Result<TensorBuffer> {
        let mut output = TensorBuffer::zeros(self.output_dim)?;
        self.evaluate_into(input, &mut output)?;
        Ok(output)
    }

    /// Evaluate the layer on `input`, writing into a reused `output` buffer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] if `input.len() != input_dim`.
    pub fn evaluate_into(&self, input: &TensorBuffer, output: &mut TensorBuffer) -> Result<()> {
        if input.len() != self.input_dim {
            return Err(EngineError::DimensionMismatch {
                expected: self.input_dim,
                actual: input.len(),
            });
        }
        self.forward(input.as_slice(), output.output_slice(self.output_dim));
        Ok(())
    }

    /// Unchecked kernel. `input` and `output` must already have the layer's widths.
    #[inline]
    pub(crate) fn forward(&self, input: &[f32], output: &mut [f32]) {
        for ((out, row), &b) in output
            .iter_mut()
            .zip(self.weights.chunks_exact(self.input_dim))
            .zip(&self.bias)
        {
            let z = row.iter().zip(input).fold(b, |acc, (&w, &x)| acc + w * x);
            *out = self.activation.apply(z);
        }
    }
}
