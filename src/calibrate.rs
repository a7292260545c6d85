//! Threshold calibration from normal readings.
//!
//! The anomaly threshold is a high percentile of the reconstruction error on
//! data known to be normal. Calibration runs once, either before export (the
//! threshold is then embedded in the artifact) or at first boot from a
//! calibration set.

use crate::artifact::ModelArtifact;
use crate::error::{EngineError, Result};
use crate::graph::AutoencoderGraph;
use crate::scaler::Scaler;
use serde::Serialize;
use tracing::debug;

/// Percentile used when none is given.
pub const DEFAULT_PERCENTILE: f32 = 95.0;

/// Outcome of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationReport {
    /// Derived anomaly threshold
    pub threshold: f32,
    /// Percentile the threshold was taken at
    pub percentile: f32,
    /// Mean reconstruction error over the set
    pub mean_error: f32,
    /// Largest reconstruction error over the set
    pub max_error: f32,
    /// Number of readings
    pub samples: usize,
}

/// Percentile of `values` with linear interpolation between closest ranks.
///
/// # Errors
///
/// Returns [`EngineError::Configuration`] if `values` is empty or `p` is not
/// within `[0, 100]`.
pub fn percentile(values: &[f32], p: f32) -> Result<f32> {
    if values.is_empty() {
        return Err(EngineError::configuration(
            "cannot take a percentile of an empty set",
        ));
    }
    if !(0.0..=100.0).contains(&p) {
        return Err(EngineError::configuration(format!(
            "percentile must be within [0, 100], got {p}"
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);

    let rank = f64::from(p) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    let (a, b) = (f64::from(sorted[lo]), f64::from(sorted[hi]));

    Ok((a + (b - a) * frac) as f32)
}

/// Reconstruction error of every reading.
///
/// # Errors
///
/// Returns [`EngineError::Configuration`] if a reading is not finite.
pub fn reconstruction_errors(
    graph: &AutoencoderGraph,
    scaler: &Scaler,
    readings: &[f32],
) -> Result<Vec<f32>> {
    readings
        .iter()
        .enumerate()
        .map(|(i, &raw)| {
            if !raw.is_finite() {
                return Err(EngineError::configuration(format!(
                    "calibration reading {i} is not finite"
                )));
            }
            let scaled = scaler.normalize(raw);
            Ok((graph.reconstruct_value(scaled) - scaled).abs())
        })
        .collect()
}

/// Derive a threshold from normal readings.
///
/// # Errors
///
/// Returns [`EngineError::Configuration`] on an empty set, a non-finite
/// reading, or a percentile outside `[0, 100]`.
pub fn calibrate(
    graph: &AutoencoderGraph,
    scaler: &Scaler,
    readings: &[f32],
    p: f32,
) -> Result<CalibrationReport> {
    let errors = reconstruction_errors(graph, scaler, readings)?;
    let threshold = percentile(&errors, p)?;

    let sum: f64 = errors.iter().map(|&e| f64::from(e)).sum();
    let report = CalibrationReport {
        threshold,
        percentile: p,
        mean_error: (sum / errors.len() as f64) as f32,
        max_error: errors.iter().copied().fold(0.0, f32::max),
        samples: errors.len(),
    };

    debug!(
        threshold = report.threshold,
        percentile = report.percentile,
        mean_error = report.mean_error,
        max_error = report.max_error,
        samples = report.samples,
        "calibrated anomaly threshold"
    );
    Ok(report)
}

/// Calibrate straight from a decoded artifact, ignoring any embedded threshold.
///
/// # Errors
///
/// Returns the graph and scaling errors of loading the artifact, plus those
/// of [`calibrate`].
pub fn calibrate_artifact(
    artifact: &ModelArtifact,
    readings: &[f32],
    p: f32,
) -> Result<CalibrationReport> {
    let graph = AutoencoderGraph::from_specs(&artifact.layers)?;
    let scaler = artifact.scaler()?;
    calibrate(&graph, &scaler, readings, p)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::fixture::{midpoint_layers, passthrough_layers};

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0).unwrap(), 1.0);
        assert_eq!(percentile(&values, 50.0).unwrap(), 3.0);
        assert_eq!(percentile(&values, 100.0).unwrap(), 5.0);
        // rank = 0.95 * 4 = 3.8
        assert!((percentile(&values, 95.0).unwrap() - 4.8).abs() < 1e-6);
    }

    #[test]
    fn test_percentile_ignores_input_order() {
        let a = percentile(&[5.0, 1.0, 4.0, 2.0, 3.0], 25.0).unwrap();
        assert_eq!(a, 2.0);
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile(&[0.7], 95.0).unwrap(), 0.7);
    }

    #[test]
    fn test_percentile_rejects_bad_input() {
        assert!(percentile(&[], 95.0).is_err());
        assert!(percentile(&[1.0], 101.0).is_err());
        assert!(percentile(&[1.0], -1.0).is_err());
        assert!(percentile(&[1.0], f32::NAN).is_err());
    }

    #[test]
    fn test_calibrate_midpoint_model() {
        let graph = AutoencoderGraph::from_specs(&midpoint_layers()).unwrap();
        let scaler = Scaler::new(0.0, 4.0).unwrap();

        // Scaled: 0.5, 0.25, 0.75, 0.0 → errors 0, 0.25, 0.25, 0.5
        let report = calibrate(&graph, &scaler, &[2.0, 1.0, 3.0, 0.0], 50.0).unwrap();
        assert_eq!(report.samples, 4);
        assert_eq!(report.threshold, 0.25);
        assert_eq!(report.mean_error, 0.25);
        assert_eq!(report.max_error, 0.5);
    }

    #[test]
    fn test_calibrate_rejects_non_finite_reading() {
        let graph = AutoencoderGraph::from_specs(&passthrough_layers()).unwrap();
        let scaler = Scaler::new(0.0, 1.0).unwrap();
        let err = calibrate(&graph, &scaler, &[0.5, f32::NAN], DEFAULT_PERCENTILE).unwrap_err();
        assert!(err.to_string().contains("reading 1 is not finite"));
    }

    #[test]
    fn test_calibrate_rejects_empty_set() {
        let graph = AutoencoderGraph::from_specs(&passthrough_layers()).unwrap();
        let scaler = Scaler::new(0.0, 1.0).unwrap();
        assert!(calibrate(&graph, &scaler, &[], DEFAULT_PERCENTILE).is_err());
    }

    #[test]
    fn test_calibrate_artifact_requires_valid_graph() {
        let mut layers = passthrough_layers();
        layers.truncate(2);
        let artifact = ModelArtifact {
            scaling: vec![crate::scaler::ScalingParams { min: 0.0, max: 1.0 }],
            layers,
            ..Default::default()
        };
        let err = calibrate_artifact(&artifact, &[0.5], DEFAULT_PERCENTILE).unwrap_err();
        assert!(err.is_graph_load());
    }
}
