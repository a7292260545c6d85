//! Deterministic models and readings for tests, benchmarks and demos.
//!
//! Everything here is seeded, so the same seed always yields the same layers
//! and the same readings on every platform.

use crate::artifact::{LayerSpec, ModelArtifact};
use crate::calibrate::{calibrate_artifact, DEFAULT_PERCENTILE};
use crate::error::Result;
use crate::graph::TOPOLOGY;
use crate::scaler::ScalingParams;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Hash a name to a deterministic u64 seed.
///
/// Uses BLAKE3 for consistent cross-platform hashing.
#[must_use]
pub fn hash_name_to_seed(name: &str) -> u64 {
    let hash = blake3::hash(name.as_bytes());
    let bytes = hash.as_bytes();
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Generate `n` readings uniformly spread around `center`.
#[must_use]
pub fn generate_readings(seed: u64, n: usize, center: f32, spread: f32) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| center + rng.gen_range(-1.0f32..=1.0) * spread)
        .collect()
}

/// Randomly initialized layers for the fixed topology.
///
/// Weights use Glorot-uniform initialization, biases start at zero.
#[must_use]
pub fn random_layers(seed: u64) -> Vec<LayerSpec> {
    let mut rng = StdRng::seed_from_u64(seed);
    TOPOLOGY
        .iter()
        .map(|shape| {
            let limit = (6.0 / (shape.input_dim + shape.output_dim) as f32).sqrt();
            let weights = (0..shape.input_dim * shape.output_dim)
                .map(|_| rng.gen_range(-limit..=limit))
                .collect();
            LayerSpec::new(
                shape.input_dim,
                shape.output_dim,
                shape.activation,
                weights,
                vec![0.0; shape.output_dim],
            )
        })
        .collect()
}

/// Layers that reconstruct every input to exactly `0.5`.
///
/// The output stage has zero weights and bias, so its sigmoid always sees 0.
#[must_use]
pub fn midpoint_layers() -> Vec<LayerSpec> {
    let mut layers = random_layers(0);
    if let Some(output) = layers.last_mut() {
        output.weights.fill(0.0);
        output.bias.fill(0.0);
    }
    layers
}

/// Layers approximating the identity around the middle of the scaled range.
///
/// The scaled input is routed through the first unit of each hidden layer,
/// then the output computes `sigmoid(4x - 2)`. That maps 0.5 to exactly 0.5
/// with unit slope there, and the error grows toward 0 and 1.
#[must_use]
pub fn passthrough_layers() -> Vec<LayerSpec> {
    TOPOLOGY
        .iter()
        .enumerate()
        .map(|(i, shape)| {
            let mut weights = vec![0.0; shape.input_dim * shape.output_dim];
            let mut bias = vec![0.0; shape.output_dim];
            if i + 1 == TOPOLOGY.len() {
                weights[0] = 4.0;
                bias[0] = -2.0;
            } else {
                weights[0] = 1.0;
            }
            LayerSpec::new(
                shape.input_dim,
                shape.output_dim,
                shape.activation,
                weights,
                bias,
            )
        })
        .collect()
}

/// A demo current-sensor model: readings in amps, normal around 5 A.
///
/// The threshold is calibrated on seeded normal readings, the same way the
/// training pipeline derives it.
///
/// # Errors
///
/// Propagates calibration errors; none occur for the built-in layers.
pub fn demo_artifact(name: &str) -> Result<ModelArtifact> {
    let mut artifact = ModelArtifact {
        name: Some(name.to_string()),
        scaling: vec![ScalingParams { min: 0.0, max: 10.0 }],
        threshold: None,
        layers: passthrough_layers(),
    };

    let readings = generate_readings(hash_name_to_seed(name), 1000, 5.0, 1.5);
    let report = calibrate_artifact(&artifact, &readings, DEFAULT_PERCENTILE)?;
    artifact.threshold = Some(report.threshold);
    Ok(artifact)
}
