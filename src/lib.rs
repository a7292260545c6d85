//! # anomaly-edge
//!
//! On-device anomaly detection for single-feature sensor readings, using a
//! small dense autoencoder exported from a training pipeline.
//!
//! A reading is min-max scaled, reconstructed by the autoencoder, and flagged
//! as anomalous when the reconstruction error exceeds a threshold calibrated
//! on normal data:
//!
//! ```text
//! raw ─▶ Scaler ─▶ AutoencoderGraph ─▶ |reconstructed - scaled| > threshold ─▶ anomaly?
//! ```
//!
//! ## Modules
//!
//! - **artifact**: the binary model container embedded with `include_bytes!()`
//! - **detector**: the [`AnomalyDetector`](detector::AnomalyDetector) built once at startup
//! - **graph** / **layer** / **tensor**: allocation-free fixed-topology evaluation
//! - **calibrate**: percentile thresholds from normal readings
//! - **fixture**: deterministic models and readings for tests and demos

pub mod artifact;
pub mod calibrate;
pub mod detector;
pub mod error;
pub mod fixture;
pub mod graph;
pub mod layer;
pub mod quantize;
pub mod scaler;
pub mod tensor;

pub use error::{EngineError, Result};

/// Re-exports for convenient access
pub mod prelude {
    pub use crate::artifact::{ArtifactBuilder, ArtifactHeader, LayerSpec, ModelArtifact};
    pub use crate::calibrate::{
        calibrate, calibrate_artifact, CalibrationReport, DEFAULT_PERCENTILE,
    };
    pub use crate::detector::{AnomalyDetector, Classification, DetectorOptions};
    pub use crate::error::{EngineError, Result};
    pub use crate::graph::{AutoencoderGraph, TOPOLOGY};
    pub use crate::layer::{Activation, DenseLayer};
    pub use crate::quantize::WeightEncoding;
    pub use crate::scaler::{Scaler, ScalingParams};
    pub use crate::tensor::TensorBuffer;
}
