//! Min-max scaling of raw sensor readings.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Training-time bounds of one input feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingParams {
    /// Smallest value seen during training
    pub min: f32,
    /// Largest value seen during training
    pub max: f32,
}

/// Validated min-max scaler.
///
/// Unlike the training-time scaler, [`Scaler::normalize`] clamps its output to
/// `[0, 1]` so that readings outside the training range never push the
/// autoencoder into regions it was not trained on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaler {
    min: f32,
    max: f32,
    range: f32,
}

impl Scaler {
    /// Create a scaler from training bounds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] unless both bounds are finite and
    /// `max > min`.
    pub fn new(min: f32, max: f32) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(EngineError::configuration(format!(
                "scaling bounds must be finite, got min={min} max={max}"
            )));
        }
        // Also rejects bounds so far apart that the range overflows.
        let range = max - min;
        if range <= 0.0 || !range.is_finite() {
            return Err(EngineError::configuration(format!(
                "scaling requires max > min, got min={min} max={max}"
            )));
        }
        Ok(Self { min, max, range })
    }

    /// Learn bounds from a set of readings.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if `readings` is empty, contains a
    /// non-finite value, or has zero range.
    pub fn fit(readings: &[f32]) -> Result<Self> {
        if readings.is_empty() {
            return Err(EngineError::configuration(
                "cannot fit scaler on an empty set",
            ));
        }
        if let Some(bad) = readings.iter().find(|v| !v.is_finite()) {
            return Err(EngineError::configuration(format!(
                "cannot fit scaler on non-finite reading {bad}"
            )));
        }
        let (min, max) = readings
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Self::new(min, max)
    }

    /// Lower training bound.
    #[must_use]
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Upper training bound.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Bounds as plain parameters.
    #[must_use]
    pub fn params(&self) -> ScalingParams {
        ScalingParams {
            min: self.min,
            max: self.max,
        }
    }

    /// Map a raw reading into `[0, 1]`.
    ///
    /// NaN passes through unchanged; callers decide how to treat it.
    #[inline]
    #[must_use]
    pub fn normalize(&self, raw: f32) -> f32 {
        ((raw - self.min) / self.range).clamp(0.0, 1.0)
    }

    /// Map a scaled value back to the raw range.
    #[inline]
    #[must_use]
    pub fn denormalize(&self, scaled: f32) -> f32 {
        scaled * self.range + self.min
    }

    /// Whether `raw` lies inside the training bounds.
    #[must_use]
    pub fn contains(&self, raw: f32) -> bool {
        (self.min..=self.max).contains(&raw)
    }
}

impl TryFrom<ScalingParams> for Scaler {
    type Error = EngineError;

    fn try_from(params: ScalingParams) -> Result<Self> {
        Self::new(params.min, params.max)
    }
}
