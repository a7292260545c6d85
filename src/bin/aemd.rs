//! Inspect, calibrate and exercise anomaly model artifacts.
//!
//! # Run
//!
//! ```bash
//! aemd demo current_sensor.aemd
//! aemd inspect current_sensor.aemd
//! aemd classify current_sensor.aemd 4.9 5.2 9.8
//! aemd calibrate current_sensor.aemd --readings current_reading.csv --output calibrated.aemd
//! ```

use anomaly_edge::prelude::*;
use anomaly_edge::fixture::demo_artifact;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aemd")]
#[command(about = "Anomaly model artifact tool")]
#[command(version)]
struct Args {
    /// Show debug logs (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Display artifact header, layers and embedded parameters
    Inspect {
        /// Path to the artifact
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Print the decoded artifact as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify raw readings
    Classify {
        /// Path to the artifact
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Raw sensor readings
        #[arg(value_name = "READING", required = true, allow_negative_numbers = true)]
        readings: Vec<f32>,

        /// Threshold override
        #[arg(long)]
        threshold: Option<f32>,

        /// JSON file with companion threshold/scaling parameters
        #[arg(long, value_name = "JSON")]
        params: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Derive a threshold from normal readings and embed it
    Calibrate {
        /// Path to the artifact
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// CSV of normal readings, one per line in the first column
        #[arg(long, value_name = "CSV")]
        readings: PathBuf,

        /// Error percentile used as the threshold
        #[arg(long, default_value_t = DEFAULT_PERCENTILE)]
        percentile: f32,

        /// Where to write the calibrated artifact
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,
    },

    /// Write a demo current-sensor artifact
    Demo {
        /// Where to write the artifact
        #[arg(value_name = "OUT")]
        output: PathBuf,

        /// Store weights as Q8_0
        #[arg(long)]
        quantize: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse readings from CSV text. A non-numeric first line is treated as a header.
fn parse_readings(text: &str) -> Result<Vec<f32>> {
    let mut readings = Vec::new();
    let mut seen_line = false;
    for (i, line) in text.lines().enumerate() {
        let field = line.split(',').next().unwrap_or("").trim();
        if field.is_empty() {
            continue;
        }
        let first = !seen_line;
        seen_line = true;
        match field.parse::<f32>() {
            Ok(value) => readings.push(value),
            Err(_) if first => {}
            Err(e) => {
                return Err(EngineError::Serialization(format!(
                    "line {}: {field:?}: {e}",
                    i + 1
                )))
            }
        }
    }
    Ok(readings)
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let bytes = std::fs::read(path)?;
    let header = ModelArtifact::inspect(&bytes)?;
    let artifact = ModelArtifact::from_bytes(&bytes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifact)?);
        return Ok(());
    }

    println!("=== Anomaly Model ===\n");
    println!("Name:        {}", artifact.name());
    println!("Size:        {} bytes", bytes.len());
    println!("Version:     {}.{}", header.version.0, header.version.1);
    println!("Compressed:  {}", if header.compressed { "yes" } else { "no" });
    println!("Quantized:   {}", if header.quantized { "yes" } else { "no" });
    println!("Parameters:  {}", artifact.parameter_count());
    match artifact.threshold {
        Some(t) => println!("Threshold:   {t}"),
        None => println!("Threshold:   (not embedded)"),
    }
    for (i, s) in artifact.scaling.iter().enumerate() {
        println!("Scaling[{i}]:  [{}, {}]", s.min, s.max);
    }

    println!("\nLayers:");
    for (i, layer) in artifact.layers.iter().enumerate() {
        println!("  {i}: {} ({})", layer.shape(), layer.encoding);
    }

    match AutoencoderGraph::from_specs(&artifact.layers) {
        Ok(_) => println!("\nTopology:    ok"),
        Err(e) => println!("\nTopology:    {e}"),
    }
    Ok(())
}

fn classify(
    path: &Path,
    readings: &[f32],
    threshold: Option<f32>,
    params: Option<&Path>,
    json: bool,
) -> Result<()> {
    let artifact = ModelArtifact::from_path(path)?;
    let mut options = match params {
        Some(p) => DetectorOptions::from_path(p)?,
        None => DetectorOptions::default(),
    };
    if let Some(t) = threshold {
        options = options.with_threshold(t);
    }
    let detector = AnomalyDetector::with_options(&artifact, &options)?;

    let results: Vec<Classification> = detector.classify_all(readings.iter().copied()).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("threshold: {}\n", detector.threshold());
    println!("{:>12} {:>8} {:>8} {:>10}  status", "reading", "scaled", "recon", "error");
    for r in &results {
        let status = if r.is_anomaly { "ANOMALY" } else { "normal" };
        let note = if r.clamped { " (clamped)" } else { "" };
        println!(
            "{:>12.4} {:>8.4} {:>8.4} {:>10.6}  {status}{note}",
            r.raw, r.scaled, r.reconstructed, r.error
        );
    }
    Ok(())
}

fn calibrate_file(path: &Path, readings_path: &Path, percentile: f32, output: &Path) -> Result<()> {
    let bytes = std::fs::read(path)?;
    let header = ModelArtifact::inspect(&bytes)?;
    let artifact = ModelArtifact::from_bytes(&bytes)?;
    let readings = parse_readings(&std::fs::read_to_string(readings_path)?)?;
    let report = calibrate_artifact(&artifact, &readings, percentile)?;

    ArtifactBuilder::from_artifact(artifact)
        .with_threshold(report.threshold)
        .with_compression(header.compressed)
        .write_to(output)?;

    println!("Samples:        {}", report.samples);
    println!("Mean error:     {}", report.mean_error);
    println!("Max error:      {}", report.max_error);
    println!("Threshold (p{}): {}", report.percentile, report.threshold);
    println!("Wrote:          {}", output.display());
    Ok(())
}

fn demo(output: &Path, quantize: bool) -> Result<()> {
    let artifact = demo_artifact("demo-current-sensor")?;
    let encoding = if quantize {
        WeightEncoding::Q8_0
    } else {
        WeightEncoding::F32
    };
    ArtifactBuilder::from_artifact(artifact)
        .with_encoding(encoding)
        .with_compression(true)
        .write_to(output)?;
    println!("Wrote demo artifact to {}", output.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Inspect { path, json } => inspect(&path, json),
        Command::Classify {
            path,
            readings,
            threshold,
            params,
            json,
        } => classify(&path, &readings, threshold, params.as_deref(), json),
        Command::Calibrate {
            path,
            readings,
            percentile,
            output,
        } => calibrate_file(&path, &readings, percentile, &output),
        Command::Demo { output, quantize } => demo(&output, quantize),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_readings_skips_header() {
        let readings = parse_readings("current\n4.9\n5.1\n\n5.3\n").unwrap();
        assert_eq!(readings, vec![4.9, 5.1, 5.3]);
    }

    #[test]
    fn test_parse_readings_skips_header_after_blank_lines() {
        let readings = parse_readings("\n  \ncurrent,time\n4.9,0\n5.1,1\n").unwrap();
        assert_eq!(readings, vec![4.9, 5.1]);
    }

    #[test]
    fn test_parse_readings_accepts_only_one_header() {
        let err = parse_readings("\ncurrent\namps\n4.9\n").unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");
    }

    #[test]
    fn test_parse_readings_uses_first_column() {
        let readings = parse_readings("1.5,ignored\n2.5,x\n").unwrap();
        assert_eq!(readings, vec![1.5, 2.5]);
    }

    #[test]
    fn test_parse_readings_rejects_garbage_after_header() {
        let err = parse_readings("current\n4.9\nabc\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_cli_args_parse_classify() {
        let args =
            Args::try_parse_from(["aemd", "classify", "model.aemd", "4.5", "-1.0", "--json"])
                .unwrap();
        match args.command {
            Command::Classify { readings, json, .. } => {
                assert_eq!(readings, vec![4.5, -1.0]);
                assert!(json);
            }
            _ => panic!("expected classify"),
        }
    }

    #[test]
    fn test_cli_args_default_percentile() {
        let args = Args::try_parse_from([
            "aemd",
            "calibrate",
            "model.aemd",
            "--readings",
            "r.csv",
            "-o",
            "out.aemd",
        ])
        .unwrap();
        match args.command {
            Command::Calibrate { percentile, .. } => assert_eq!(percentile, DEFAULT_PERCENTILE),
            _ => panic!("expected calibrate"),
        }
    }

    #[test]
    fn test_demo_then_calibrate_roundtrip() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("demo.aemd");
        let csv = dir.path().join("normal.csv");
        let out = dir.path().join("calibrated.aemd");

        demo(&model, true).unwrap();
        std::fs::write(&csv, "current\n5.0\n5.2\n4.8\n5.1\n").unwrap();
        calibrate_file(&model, &csv, 100.0, &out).unwrap();

        let detector = AnomalyDetector::from_path(&out).unwrap();
        assert!(!detector.classify(5.0).is_anomaly);
        assert!(detector.classify(9.9).is_anomaly);
    }
}
