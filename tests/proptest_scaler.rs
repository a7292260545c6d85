//! Property-based tests for min-max scaling.

#![allow(clippy::disallowed_methods)]

use anomaly_edge::scaler::Scaler;
use proptest::prelude::*;

/// Strategy for valid training bounds.
fn bounds() -> impl Strategy<Value = (f32, f32)> {
    (-1_000.0f32..1_000.0, 0.01f32..500.0).prop_map(|(min, width)| (min, min + width))
}

proptest! {
    /// Property: readings inside the training range scale into [0, 1]
    #[test]
    fn in_range_readings_scale_to_unit_interval(
        (min, max) in bounds(),
        t in 0.0f32..=1.0,
    ) {
        let scaler = Scaler::new(min, max).unwrap();
        let raw = min + (max - min) * t;
        let scaled = scaler.normalize(raw);
        prop_assert!((0.0..=1.0).contains(&scaled));
    }

    /// Property: denormalize inverts normalize inside the training range
    #[test]
    fn denormalize_inverts_normalize(
        (min, max) in bounds(),
        t in 0.0f32..=1.0,
    ) {
        let scaler = Scaler::new(min, max).unwrap();
        let raw = (min + (max - min) * t).clamp(min, max);
        let back = scaler.denormalize(scaler.normalize(raw));
        let tolerance = 1e-4 * (max - min).max(min.abs()).max(1.0);
        prop_assert!((back - raw).abs() <= tolerance, "{} -> {}", raw, back);
    }

    /// Property: any finite reading, however far out, scales into [0, 1]
    #[test]
    fn any_finite_reading_is_clamped(
        (min, max) in bounds(),
        raw in prop::num::f32::NORMAL,
    ) {
        let scaler = Scaler::new(min, max).unwrap();
        let scaled = scaler.normalize(raw);
        prop_assert!((0.0..=1.0).contains(&scaled));
        if raw < min {
            prop_assert_eq!(scaled, 0.0);
        }
        if raw > max {
            prop_assert_eq!(scaled, 1.0);
        }
    }

    /// Property: bounds with max <= min are always rejected
    #[test]
    fn inverted_bounds_rejected(a in -1_000.0f32..1_000.0, b in -1_000.0f32..1_000.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(Scaler::new(hi, lo).is_err());
        prop_assert!(Scaler::new(lo, lo).is_err());
    }

    /// Property: a fitted scaler contains every reading it was fitted on
    #[test]
    fn fit_covers_all_readings(readings in prop::collection::vec(-100.0f32..100.0, 2..50)) {
        prop_assume!(readings.iter().any(|&r| r != readings[0]));
        let scaler = Scaler::fit(&readings).unwrap();
        for &r in &readings {
            prop_assert!(scaler.contains(r));
        }
    }
}
