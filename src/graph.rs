//! Fixed-topology autoencoder graph.
//!
//! ```text
//! input [1] ─▶ Dense(8, relu) ─▶ Dense(4, relu) ─▶ Dense(8, relu) ─▶ Dense(1, sigmoid)
//!              encoder           bottleneck        decoder           output
//! ```
//!
//! The topology is fixed when the model is exported. Loaded layers are checked
//! against it once, after which evaluation cannot fail.

use crate::artifact::LayerSpec;
use crate::error::{EngineError, Result};
use crate::layer::{Activation, DenseLayer};
use crate::tensor::TensorBuffer;

/// Number of input features.
pub const INPUT_DIM: usize = 1;

/// Widest layer in the topology; sizes every [`TensorBuffer`].
pub const MAX_LAYER_WIDTH: usize = 8;

/// Number of dense stages.
pub const DEPTH: usize = 4;

/// Shape of one stage of the fixed topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerShape {
    /// Input width
    pub input_dim: usize,
    /// Output width
    pub output_dim: usize,
    /// Activation kind
    pub activation: Activation,
}

impl LayerShape {
    const fn new(input_dim: usize, output_dim: usize, activation: Activation) -> Self {
        Self {
            input_dim,
            output_dim,
            activation,
        }
    }
}

impl std::fmt::Display for LayerShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dense({}→{}, {})",
            self.input_dim, self.output_dim, self.activation
        )
    }
}

/// Encoder, bottleneck, decoder, output.
pub const TOPOLOGY: [LayerShape; DEPTH] = [
    LayerShape::new(INPUT_DIM, 8, Activation::Relu),
    LayerShape::new(8, 4, Activation::Relu),
    LayerShape::new(4, 8, Activation::Relu),
    LayerShape::new(8, INPUT_DIM, Activation::Sigmoid),
];

/// A validated autoencoder.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoencoderGraph {
    layers: [DenseLayer; DEPTH],
}

impl AutoencoderGraph {
    /// Build a graph from layer descriptors, as decoded from an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GraphLoad`] if the descriptors do not chain or do
    /// not match [`TOPOLOGY`], or contain non-finite parameters. Returns
    /// [`EngineError::DimensionMismatch`] if a descriptor's parameter counts
    /// disagree with its own dimensions.
    pub fn from_specs(specs: &[LayerSpec]) -> Result<Self> {
        validate_shapes(specs.iter().map(LayerSpec::shape))?;

        let layers = specs
            .iter()
            .map(|spec| {
                DenseLayer::new(
                    spec.input_dim,
                    spec.output_dim,
                    spec.weights.clone(),
                    spec.bias.clone(),
                    spec.activation,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_layers(layers)
    }

    /// Build a graph from already constructed layers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GraphLoad`] on any topology mismatch, any
    /// non-finite parameter, or parameters large enough that the
    /// reconstruction of 0, 0.5 or 1 is not finite.
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self> {
        validate_shapes(layers.iter().map(|layer| LayerShape {
            input_dim: layer.input_dim(),
            output_dim: layer.output_dim(),
            activation: layer.activation(),
        }))?;

        for (i, layer) in layers.iter().enumerate() {
            let finite = layer
                .weights()
                .iter()
                .chain(layer.bias())
                .all(|v| v.is_finite());
            if !finite {
                return Err(EngineError::graph_load(format!(
                    "layer {i} contains non-finite parameters"
                )));
            }
        }

        let layers: [DenseLayer; DEPTH] = layers.try_into().map_err(|rest: Vec<DenseLayer>| {
            EngineError::graph_load(format!("expected {DEPTH} layers, found {}", rest.len()))
        })?;

        let graph = Self { layers };
        for x in [0.0, 0.5, 1.0] {
            let y = graph.reconstruct_value(x);
            if !y.is_finite() {
                return Err(EngineError::graph_load(format!(
                    "reconstruction of {x} is {y}; parameters overflow"
                )));
            }
        }
        Ok(graph)
    }

    /// The validated layers, in evaluation order.
    #[must_use]
    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Total number of weights and biases.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::parameter_count).sum()
    }

    /// Reconstruct a single scaled input.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] if `input` does not hold
    /// exactly one element.
    pub fn reconstruct(&self, input: &TensorBuffer) -> Result<TensorBuffer> {
        if input.len() != INPUT_DIM {
            return Err(EngineError::DimensionMismatch {
                expected: INPUT_DIM,
                actual: input.len(),
            });
        }

        let mut front = *input;
        let mut back = TensorBuffer::zeros(MAX_LAYER_WIDTH)?;
        for layer in &self.layers {
            layer.evaluate_into(&front, &mut back)?;
            std::mem::swap(&mut front, &mut back);
        }
        Ok(front)
    }

    /// Reconstruct a scaled value without bounds checks or allocation.
    ///
    /// The output lies in `[0, 1]` as long as every hidden activation stays
    /// finite; extreme weights can still overflow to NaN for some inputs.
    #[must_use]
    pub fn reconstruct_value(&self, scaled: f32) -> f32 {
        let mut front = TensorBuffer::scalar(scaled);
        let mut back = TensorBuffer::scalar(0.0);
        for layer in &self.layers {
            layer.forward(front.as_slice(), back.output_slice(layer.output_dim()));
            std::mem::swap(&mut front, &mut back);
        }
        front.as_slice().first().copied().unwrap_or(f32::NAN)
    }
}

fn validate_shapes(shapes: impl ExactSizeIterator<Item = LayerShape>) -> Result<()> {
    if shapes.len() != DEPTH {
        return Err(EngineError::graph_load(format!(
            "expected {DEPTH} layers, found {}",
            shapes.len()
        )));
    }

    let shapes: Vec<LayerShape> = shapes.collect();

    // Chaining is checked before the fixed shape so a corrupted artifact gets
    // the more specific message.
    for (i, pair) in shapes.windows(2).enumerate() {
        if pair[0].output_dim != pair[1].input_dim {
            return Err(EngineError::graph_load(format!(
                "layer {i} outputs {} values but layer {} expects {}",
                pair[0].output_dim,
                i + 1,
                pair[1].input_dim
            )));
        }
    }

    for (i, (actual, expected)) in shapes.iter().zip(TOPOLOGY.iter()).enumerate() {
        if actual != expected {
            return Err(EngineError::graph_load(format!(
                "layer {i} is {actual}, expected {expected}"
            )));
        }
    }

    Ok(())
}
