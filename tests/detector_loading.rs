//! Startup loading and shared use of a detector.

#![allow(clippy::disallowed_methods)]

use anomaly_edge::prelude::*;
use anomaly_edge::fixture::{demo_artifact, generate_readings, passthrough_layers, random_layers};
use std::sync::Arc;
use tempfile::tempdir;

fn demo_bytes() -> Vec<u8> {
    ArtifactBuilder::from_artifact(demo_artifact("integration").unwrap())
        .with_compression(true)
        .build()
        .unwrap()
}

#[test]
fn loads_from_embedded_bytes() {
    let bytes = demo_bytes();
    let detector = AnomalyDetector::from_bytes(&bytes).unwrap();

    assert_eq!(detector.name(), "integration");
    assert!(!detector.classify(5.0).is_anomaly);
    assert!(detector.classify(9.8).is_anomaly);
    assert!(detector.classify(0.3).is_anomaly);
}

#[test]
fn loads_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("current_sensor.aemd");
    std::fs::write(&path, demo_bytes()).unwrap();

    let detector = AnomalyDetector::from_path(&path).unwrap();
    assert_eq!(detector.scaler().max(), 10.0);
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let err = AnomalyDetector::from_path(dir.path().join("absent.aemd")).unwrap_err();
    assert!(matches!(err, EngineError::Io(_)));
}

#[test]
fn non_chaining_artifact_fails_with_graph_load() {
    let mut layers = passthrough_layers();
    // Decoder reads 5 bottleneck values, but the bottleneck only has 4.
    layers[2] = LayerSpec::new(5, 8, Activation::Relu, vec![0.0; 40], vec![0.0; 8]);

    let bytes = ArtifactBuilder::new()
        .with_scaling(0.0, 10.0)
        .with_threshold(0.05)
        .with_layers(layers)
        .build()
        .unwrap();

    // The container itself is well-formed; the graph is not.
    assert!(ModelArtifact::from_bytes(&bytes).is_ok());
    let err = AnomalyDetector::from_bytes(&bytes).unwrap_err();
    assert!(err.is_graph_load(), "{err}");
}

#[test]
fn wrong_topology_fails_with_graph_load() {
    let layers = vec![
        LayerSpec::new(1, 4, Activation::Relu, vec![0.1; 4], vec![0.0; 4]),
        LayerSpec::new(4, 1, Activation::Sigmoid, vec![0.1; 4], vec![0.0; 1]),
    ];
    let artifact = ModelArtifact {
        scaling: vec![ScalingParams { min: 0.0, max: 1.0 }],
        threshold: Some(0.1),
        layers,
        ..Default::default()
    };
    assert!(AnomalyDetector::from_artifact(&artifact)
        .unwrap_err()
        .is_graph_load());
}

#[test]
fn threshold_can_be_supplied_at_first_boot() {
    // Exported without a threshold: calibrate from a normal set, then load.
    let mut artifact = demo_artifact("first-boot").unwrap();
    artifact.threshold = None;
    assert!(AnomalyDetector::from_artifact(&artifact).is_err());

    let normal = generate_readings(7, 500, 5.0, 1.0);
    let report = calibrate_artifact(&artifact, &normal, DEFAULT_PERCENTILE).unwrap();
    let options = DetectorOptions::default().with_threshold(report.threshold);
    let detector = AnomalyDetector::with_options(&artifact, &options).unwrap();

    let flagged = detector
        .classify_all(normal.iter().copied())
        .filter(|c| c.is_anomaly)
        .count();
    // Roughly the top 5% of the calibration set lies above its 95th percentile.
    assert!(flagged <= 30, "{flagged} flagged");
}

#[test]
fn companion_parameters_from_json_file() {
    let dir = tempdir().unwrap();
    let params = dir.path().join("params.json");
    std::fs::write(&params, r#"{"threshold": 0.5, "scaling": {"min": 0.0, "max": 2.0}}"#).unwrap();

    let artifact = ModelArtifact {
        layers: random_layers(3),
        ..Default::default()
    };
    let options = DetectorOptions::from_path(&params).unwrap();
    let detector = AnomalyDetector::with_options(&artifact, &options).unwrap();
    assert_eq!(detector.threshold(), 0.5);
    assert_eq!(detector.classify(1.0).scaled, 0.5);
}

#[test]
fn shared_across_threads_without_locking() {
    let detector = Arc::new(AnomalyDetector::from_bytes(&demo_bytes()).unwrap());
    let readings = generate_readings(11, 256, 5.0, 4.0);
    let expected: Vec<Classification> = detector.classify_all(readings.iter().copied()).collect();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let detector = Arc::clone(&detector);
            let readings = &readings;
            let expected = &expected;
            scope.spawn(move || {
                let got: Vec<Classification> =
                    detector.classify_all(readings.iter().copied()).collect();
                assert_eq!(&got, expected);
            });
        }
    });
}

#[test]
fn quantized_demo_classifies_like_full_precision() {
    let full = AnomalyDetector::from_bytes(&demo_bytes()).unwrap();
    let quantized_bytes = ArtifactBuilder::from_artifact(demo_artifact("integration").unwrap())
        .with_encoding(WeightEncoding::Q8_0)
        .build()
        .unwrap();
    let quantized = AnomalyDetector::from_bytes(&quantized_bytes).unwrap();

    for raw in [1.0, 3.0, 5.0, 7.0, 9.5] {
        let (a, b) = (full.classify(raw), quantized.classify(raw));
        assert!((a.error - b.error).abs() < 1e-3, "{raw}: {} vs {}", a.error, b.error);
    }
}
