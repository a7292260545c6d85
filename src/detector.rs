//! Threshold-based anomaly detection over the autoencoder.
//!
//! An [`AnomalyDetector`] owns everything inference needs: the validated
//! graph, the scaler and the threshold. It is built once at startup and never
//! mutated, so one instance can be shared by reference across threads.

use crate::artifact::ModelArtifact;
use crate::error::{EngineError, Result};
use crate::graph::AutoencoderGraph;
use crate::scaler::{Scaler, ScalingParams};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, trace, warn};

/// Companion parameters supplied alongside an artifact.
///
/// Values set here take precedence over those embedded in the artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorOptions {
    /// Anomaly threshold override
    pub threshold: Option<f32>,
    /// Scaling bounds override
    pub scaling: Option<ScalingParams>,
}

impl DetectorOptions {
    /// Override the anomaly threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Override the scaling bounds.
    #[must_use]
    pub fn with_scaling(mut self, min: f32, max: f32) -> Self {
        self.scaling = Some(ScalingParams { min, max });
        self
    }

    /// Parse options from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Serialization`] on malformed JSON or unknown keys.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read options from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if the file cannot be read, or
    /// [`EngineError::Serialization`] if it cannot be parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Result of classifying one reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    /// Reading as supplied
    pub raw: f32,
    /// Reading after min-max scaling and clamping
    pub scaled: f32,
    /// Whether the reading was outside the training range
    pub clamped: bool,
    /// Autoencoder output for `scaled`
    pub reconstructed: f32,
    /// `|reconstructed - scaled|`
    pub error: f32,
    /// `error > threshold`
    pub is_anomaly: bool,
}

/// Anomaly classifier for single-feature readings.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    name: String,
    graph: AutoencoderGraph,
    scaler: Scaler,
    threshold: f32,
}

impl AnomalyDetector {
    /// Build a detector from a decoded artifact.
    ///
    /// # Errors
    ///
    /// See [`AnomalyDetector::with_options`].
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self> {
        Self::with_options(artifact, &DetectorOptions::default())
    }

    /// Build a detector, letting `options` override embedded parameters.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GraphLoad`] or [`EngineError::DimensionMismatch`]
    /// if the layers do not form the fixed autoencoder, and
    /// [`EngineError::Configuration`] if the scaling bounds are invalid or no
    /// valid threshold is available.
    pub fn with_options(artifact: &ModelArtifact, options: &DetectorOptions) -> Result<Self> {
        let graph = AutoencoderGraph::from_specs(&artifact.layers)?;

        let scaler = match options.scaling {
            Some(params) => Scaler::try_from(params)?,
            None => artifact.scaler()?,
        };

        let threshold = options
            .threshold
            .or(artifact.threshold)
            .ok_or_else(|| {
                EngineError::configuration(
                    "no anomaly threshold in artifact or options; calibrate first",
                )
            })?;
        Self::new(artifact.name(), graph, scaler, threshold)
    }

    /// Assemble a detector from parts.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if `threshold` is negative or
    /// not finite.
    pub fn new(
        name: impl Into<String>,
        graph: AutoencoderGraph,
        scaler: Scaler,
        threshold: f32,
    ) -> Result<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(EngineError::configuration(format!(
                "threshold must be finite and non-negative, got {threshold}"
            )));
        }

        let detector = Self {
            name: name.into(),
            graph,
            scaler,
            threshold,
        };
        info!(
            model = %detector.name,
            threshold = detector.threshold,
            min = detector.scaler.min(),
            max = detector.scaler.max(),
            parameters = detector.graph.parameter_count(),
            "anomaly detector loaded"
        );
        Ok(detector)
    }

    /// Decode an embedded artifact and build a detector from it.
    ///
    /// # Errors
    ///
    /// Decoding errors from [`ModelArtifact::from_bytes`] plus those of
    /// [`AnomalyDetector::from_artifact`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_artifact(&ModelArtifact::from_bytes(bytes)?)
    }

    /// Read an artifact file and build a detector from it.
    ///
    /// # Errors
    ///
    /// I/O and decoding errors plus those of [`AnomalyDetector::from_artifact`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_artifact(&ModelArtifact::from_path(path)?)
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Anomaly threshold.
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Input scaler.
    #[must_use]
    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }

    /// Autoencoder graph.
    #[must_use]
    pub fn graph(&self) -> &AutoencoderGraph {
        &self.graph
    }

    /// Classify one raw reading.
    ///
    /// Out-of-range readings are clamped to the training bounds before
    /// reconstruction. A NaN reading cannot be scaled and is reported as an
    /// anomaly with infinite error, as is a reading whose reconstruction
    /// overflows.
    #[must_use]
    pub fn classify(&self, raw: f32) -> Classification {
        if raw.is_nan() {
            warn!(model = %self.name, "NaN reading classified as anomaly");
            return Classification {
                raw,
                scaled: f32::NAN,
                clamped: false,
                reconstructed: f32::NAN,
                error: f32::INFINITY,
                is_anomaly: true,
            };
        }

        let scaled = self.scaler.normalize(raw);
        let reconstructed = self.graph.reconstruct_value(scaled);
        let error = if reconstructed.is_finite() {
            (reconstructed - scaled).abs()
        } else {
            warn!(model = %self.name, raw, scaled, "reconstruction is not finite");
            f32::INFINITY
        };
        let is_anomaly = error > self.threshold;

        trace!(raw, scaled, reconstructed, error, is_anomaly, "classified reading");
        Classification {
            raw,
            scaled,
            clamped: !self.scaler.contains(raw),
            reconstructed,
            error,
            is_anomaly,
        }
    }

    /// Classify a sequence of readings.
    pub fn classify_all<'a, I>(&'a self, readings: I) -> impl Iterator<Item = Classification> + 'a
    where
        I: IntoIterator<Item = f32>,
        I::IntoIter: 'a,
    {
        readings.into_iter().map(move |raw| self.classify(raw))
    }
}
