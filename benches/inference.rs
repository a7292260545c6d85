//! Inference performance benchmarks.

#![allow(clippy::disallowed_methods)]

use anomaly_edge::artifact::{ArtifactBuilder, ModelArtifact};
use anomaly_edge::detector::AnomalyDetector;
use anomaly_edge::fixture::{demo_artifact, generate_readings};
use anomaly_edge::quantize::WeightEncoding;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn demo_bytes(encoding: WeightEncoding, compressed: bool) -> Vec<u8> {
    ArtifactBuilder::from_artifact(demo_artifact("benchmark-model").unwrap())
        .with_encoding(encoding)
        .with_compression(compressed)
        .build()
        .unwrap()
}

fn benchmark_classify(c: &mut Criterion) {
    let detector = AnomalyDetector::from_bytes(&demo_bytes(WeightEncoding::F32, false)).unwrap();

    c.bench_function("classify_single", |b| {
        b.iter(|| black_box(detector.classify(black_box(5.3))));
    });

    let readings = generate_readings(1, 1024, 5.0, 3.0);
    c.bench_function("classify_1024", |b| {
        b.iter(|| {
            detector
                .classify_all(readings.iter().copied())
                .filter(|r| r.is_anomaly)
                .count()
        });
    });
}

fn benchmark_artifact_parsing(c: &mut Criterion) {
    let plain = demo_bytes(WeightEncoding::F32, false);
    let packed = demo_bytes(WeightEncoding::Q8_0, true);

    c.bench_function("parse_artifact_f32", |b| {
        b.iter(|| ModelArtifact::from_bytes(black_box(&plain)).unwrap());
    });
    c.bench_function("parse_artifact_q8_compressed", |b| {
        b.iter(|| ModelArtifact::from_bytes(black_box(&packed)).unwrap());
    });
    c.bench_function("load_detector", |b| {
        b.iter(|| AnomalyDetector::from_bytes(black_box(&plain)).unwrap());
    });
}

criterion_group!(benches, benchmark_classify, benchmark_artifact_parsing);
criterion_main!(benches);
