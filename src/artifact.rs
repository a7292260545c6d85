//! Model artifact container.
//!
//! The exported autoencoder, its scaling bounds and its anomaly threshold
//! travel together in one binary blob, typically embedded with
//! `include_bytes!()`:
//!
//! ```ignore
//! use anomaly_edge::detector::AnomalyDetector;
//!
//! static MODEL: &[u8] = include_bytes!("../models/current_sensor.aemd");
//!
//! fn main() -> anomaly_edge::Result<()> {
//!     let detector = AnomalyDetector::from_bytes(MODEL)?;
//!     println!("anomaly: {}", detector.classify(4.2).is_anomaly);
//!     Ok(())
//! }
//! ```
//!
//! # Layout
//!
//! A 32-byte header followed by the stored payload. All numbers are
//! little-endian.
//!
//! ```text
//! [0-3]   magic "AEMD"
//! [4-5]   version (major, minor)
//! [6]     flags: 0x01 zlib-compressed payload, 0x02 quantized layers
//! [7]     reserved
//! [8-11]  uncompressed payload size (u32)
//! [12-27] BLAKE3 digest of the stored payload, truncated to 16 bytes
//! [28-31] reserved
//! ```
//!
//! The payload holds the name, the scaling bounds, the optional threshold and
//! the layer descriptors, in that order.

use crate::error::{EngineError, Result};
use crate::graph::{LayerShape, INPUT_DIM, MAX_LAYER_WIDTH};
use crate::layer::Activation;
use crate::quantize::{dequantize_q8_0, quantize_q8_0, WeightEncoding};
use crate::scaler::{Scaler, ScalingParams};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// Artifact magic bytes.
pub const ARTIFACT_MAGIC: &[u8; 4] = b"AEMD";

/// Fixed header size.
pub const HEADER_SIZE: usize = 32;

/// Version written by [`ArtifactBuilder`].
pub const FORMAT_VERSION: (u8, u8) = (1, 0);

const FLAG_COMPRESSED: u8 = 0x01;
const FLAG_QUANTIZED: u8 = 0x02;
const CHECKSUM_LEN: usize = 16;

/// Decoded artifact header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactHeader {
    /// Format version (major, minor)
    pub version: (u8, u8),
    /// Payload is zlib-compressed
    pub compressed: bool,
    /// At least one layer is stored quantized
    pub quantized: bool,
    /// Uncompressed payload size in bytes
    pub payload_size: usize,
    /// Stored (possibly compressed) payload size in bytes
    pub stored_size: usize,
    /// Truncated BLAKE3 digest of the stored payload
    pub checksum: [u8; CHECKSUM_LEN],
}

impl ArtifactHeader {
    /// Parse and validate the header of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidFormat`] if the data is too short, the
    /// magic bytes do not match, or the major version is unsupported.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(EngineError::invalid_format(format!(
                "data too short: {} bytes, minimum {HEADER_SIZE} required",
                bytes.len()
            )));
        }

        if &bytes[0..4] != ARTIFACT_MAGIC {
            return Err(EngineError::invalid_format(format!(
                "invalid magic bytes: expected AEMD, got {:?}",
                &bytes[0..4]
            )));
        }

        let version = (bytes[4], bytes[5]);
        if version.0 != FORMAT_VERSION.0 {
            return Err(EngineError::invalid_format(format!(
                "unsupported format version {}.{}",
                version.0, version.1
            )));
        }

        let flags = bytes[6];
        let payload_size = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&bytes[12..12 + CHECKSUM_LEN]);

        Ok(Self {
            version,
            compressed: flags & FLAG_COMPRESSED != 0,
            quantized: flags & FLAG_QUANTIZED != 0,
            payload_size,
            stored_size: bytes.len() - HEADER_SIZE,
            checksum,
        })
    }
}

/// One dense layer as stored in an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Input width
    pub input_dim: usize,
    /// Output width
    pub output_dim: usize,
    /// Activation kind
    pub activation: Activation,
    /// Storage encoding for the weights
    #[serde(default)]
    pub encoding: WeightEncoding,
    /// Row-major `output_dim x input_dim` weights
    pub weights: Vec<f32>,
    /// `output_dim` biases
    pub bias: Vec<f32>,
}

impl LayerSpec {
    /// Create a full-precision layer descriptor.
    #[must_use]
    pub fn new(
        input_dim: usize,
        output_dim: usize,
        activation: Activation,
        weights: Vec<f32>,
        bias: Vec<f32>,
    ) -> Self {
        Self {
            input_dim,
            output_dim,
            activation,
            encoding: WeightEncoding::F32,
            weights,
            bias,
        }
    }

    /// Set the storage encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: WeightEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Declared shape.
    #[must_use]
    pub fn shape(&self) -> LayerShape {
        LayerShape {
            input_dim: self.input_dim,
            output_dim: self.output_dim,
            activation: self.activation,
        }
    }
}

/// A decoded model artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Model name
    pub name: Option<String>,
    /// Per-feature scaling bounds
    pub scaling: Vec<ScalingParams>,
    /// Anomaly threshold, if it was exported with the model
    pub threshold: Option<f32>,
    /// Layer descriptors in evaluation order
    pub layers: Vec<LayerSpec>,
}

impl ModelArtifact {
    /// Decode an artifact from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidFormat`] if the header is invalid, the
    /// checksum does not match, decompression fails, or the payload is
    /// truncated or malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = ArtifactHeader::parse(bytes)?;
        let stored = &bytes[HEADER_SIZE..];

        let digest = blake3::hash(stored);
        if digest.as_bytes()[..CHECKSUM_LEN] != header.checksum {
            return Err(EngineError::invalid_format("payload checksum mismatch"));
        }

        let payload = if header.compressed {
            decompress(stored, header.payload_size)?
        } else {
            stored.to_vec()
        };

        if payload.len() != header.payload_size {
            return Err(EngineError::invalid_format(format!(
                "payload is {} bytes, header declares {}",
                payload.len(),
                header.payload_size
            )));
        }

        let artifact = decode_payload(&payload)?;
        debug!(
            name = artifact.name(),
            version = ?header.version,
            compressed = header.compressed,
            quantized = header.quantized,
            layers = artifact.layers.len(),
            "decoded model artifact"
        );
        Ok(artifact)
    }

    /// Read and decode an artifact file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`ModelArtifact::from_bytes`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Parse only the header.
    ///
    /// # Errors
    ///
    /// Same as [`ArtifactHeader::parse`].
    pub fn inspect(bytes: &[u8]) -> Result<ArtifactHeader> {
        ArtifactHeader::parse(bytes)
    }

    /// Model name, or `"unnamed"`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Scaler for the single input feature.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] unless exactly one valid pair of
    /// scaling bounds is present.
    pub fn scaler(&self) -> Result<Scaler> {
        match self.scaling.as_slice() {
            [params] => Scaler::try_from(*params),
            other => Err(EngineError::configuration(format!(
                "expected scaling bounds for {INPUT_DIM} feature, found {}",
                other.len()
            ))),
        }
    }

    /// Total number of weights and biases.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.len() + l.bias.len())
            .sum()
    }

    /// Whether any layer is stored quantized.
    #[must_use]
    pub fn is_quantized(&self) -> bool {
        self.layers
            .iter()
            .any(|l| l.encoding != WeightEncoding::F32)
    }
}

/// Builder for artifact bytes.
///
/// Used by export tooling, calibration, and tests.
#[derive(Debug, Default)]
pub struct ArtifactBuilder {
    artifact: ModelArtifact,
    compressed: bool,
}

impl ArtifactBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a decoded artifact, e.g. to embed a recalibrated threshold.
    #[must_use]
    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self {
            artifact,
            compressed: false,
        }
    }

    /// Set the model name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.artifact.name = Some(name.into());
        self
    }

    /// Append scaling bounds for the next input feature.
    #[must_use]
    pub fn with_scaling(mut self, min: f32, max: f32) -> Self {
        self.artifact.scaling.push(ScalingParams { min, max });
        self
    }

    /// Embed the anomaly threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.artifact.threshold = Some(threshold);
        self
    }

    /// Append a layer.
    #[must_use]
    pub fn with_layer(mut self, layer: LayerSpec) -> Self {
        self.artifact.layers.push(layer);
        self
    }

    /// Append several layers.
    #[must_use]
    pub fn with_layers(mut self, layers: impl IntoIterator<Item = LayerSpec>) -> Self {
        self.artifact.layers.extend(layers);
        self
    }

    /// Store every layer with `encoding`.
    #[must_use]
    pub fn with_encoding(mut self, encoding: WeightEncoding) -> Self {
        for layer in &mut self.artifact.layers {
            layer.encoding = encoding;
        }
        self
    }

    /// Enable zlib compression of the payload.
    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compressed = enabled;
        self
    }

    /// Encode the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidFormat`] if the payload exceeds the
    /// 4 GiB size field or a descriptor's weight count disagrees with its
    /// dimensions, and [`EngineError::Io`] if compression fails.
    pub fn build(&self) -> Result<Vec<u8>> {
        let payload = encode_payload(&self.artifact)?;
        let payload_size = u32::try_from(payload.len())
            .map_err(|_| EngineError::invalid_format("payload exceeds 4 GiB"))?;

        let stored = if self.compressed {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(&payload)?;
            encoder.finish()?
        } else {
            payload
        };

        let mut flags = 0u8;
        if self.compressed {
            flags |= FLAG_COMPRESSED;
        }
        if self.artifact.is_quantized() {
            flags |= FLAG_QUANTIZED;
        }

        let mut bytes = Vec::with_capacity(HEADER_SIZE + stored.len());
        bytes.extend_from_slice(ARTIFACT_MAGIC);
        bytes.push(FORMAT_VERSION.0);
        bytes.push(FORMAT_VERSION.1);
        bytes.push(flags);
        bytes.push(0);
        bytes.extend_from_slice(&payload_size.to_le_bytes());
        bytes.extend_from_slice(&blake3::hash(&stored).as_bytes()[..CHECKSUM_LEN]);
        bytes.resize(HEADER_SIZE, 0);
        bytes.extend_from_slice(&stored);

        Ok(bytes)
    }

    /// Encode the artifact and write it to `path`.
    ///
    /// # Errors
    ///
    /// Same as [`ArtifactBuilder::build`], plus write failures.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.build()?)?;
        Ok(())
    }
}

fn decompress(stored: &[u8], payload_size: usize) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    // One byte past the declared size is enough to detect an oversized payload.
    ZlibDecoder::new(stored)
        .take(payload_size as u64 + 1)
        .read_to_end(&mut payload)
        .map_err(|e| EngineError::invalid_format(format!("decompression failed: {e}")))?;
    Ok(payload)
}

fn encode_payload(artifact: &ModelArtifact) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();

    let name = artifact.name.as_deref().unwrap_or("").as_bytes();
    put_len(&mut bytes, name.len())?;
    bytes.extend_from_slice(name);

    put_len(&mut bytes, artifact.scaling.len())?;
    for params in &artifact.scaling {
        bytes.extend_from_slice(&params.min.to_le_bytes());
        bytes.extend_from_slice(&params.max.to_le_bytes());
    }

    match artifact.threshold {
        Some(threshold) => {
            bytes.push(1);
            bytes.extend_from_slice(&threshold.to_le_bytes());
        }
        None => {
            bytes.push(0);
            bytes.extend_from_slice(&0f32.to_le_bytes());
        }
    }

    put_len(&mut bytes, artifact.layers.len())?;
    for layer in &artifact.layers {
        if layer.weights.len() != layer.input_dim * layer.output_dim
            || layer.bias.len() != layer.output_dim
        {
            return Err(EngineError::invalid_format(format!(
                "layer {}x{} has {} weights and {} biases",
                layer.output_dim,
                layer.input_dim,
                layer.weights.len(),
                layer.bias.len()
            )));
        }

        bytes.push(layer.activation.tag());
        bytes.push(layer.encoding.tag());
        put_len(&mut bytes, layer.output_dim)?;
        put_len(&mut bytes, layer.input_dim)?;
        match layer.encoding {
            WeightEncoding::F32 => {
                for w in &layer.weights {
                    bytes.extend_from_slice(&w.to_le_bytes());
                }
            }
            WeightEncoding::Q8_0 => bytes.extend_from_slice(&quantize_q8_0(&layer.weights)),
        }
        for b in &layer.bias {
            bytes.extend_from_slice(&b.to_le_bytes());
        }
    }

    Ok(bytes)
}

fn put_len(bytes: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| EngineError::invalid_format(format!("length {len} exceeds u32")))?;
    bytes.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn decode_payload(payload: &[u8]) -> Result<ModelArtifact> {
    let mut reader = PayloadReader::new(payload);

    let name_len = reader.read_len()?;
    let name = String::from_utf8(reader.take(name_len)?.to_vec())
        .map_err(|_| EngineError::invalid_format("model name is not valid UTF-8"))?;

    let scaling_count = reader.read_len()?;
    let mut scaling = Vec::new();
    for _ in 0..scaling_count {
        let min = reader.read_f32()?;
        let max = reader.read_f32()?;
        scaling.push(ScalingParams { min, max });
    }

    let has_threshold = reader.read_u8()?;
    let threshold_value = reader.read_f32()?;
    let threshold = match has_threshold {
        0 => None,
        1 => Some(threshold_value),
        other => {
            return Err(EngineError::invalid_format(format!(
                "invalid threshold marker {other}"
            )))
        }
    };

    let layer_count = reader.read_len()?;
    let mut layers = Vec::new();
    for index in 0..layer_count {
        let activation_tag = reader.read_u8()?;
        let activation = Activation::from_tag(activation_tag).ok_or_else(|| {
            EngineError::invalid_format(format!(
                "layer {index}: unknown activation tag {activation_tag}"
            ))
        })?;
        let encoding_tag = reader.read_u8()?;
        let encoding = WeightEncoding::from_tag(encoding_tag).ok_or_else(|| {
            EngineError::invalid_format(format!(
                "layer {index}: unknown weight encoding {encoding_tag}"
            ))
        })?;
        let output_dim = reader.read_len()?;
        let input_dim = reader.read_len()?;
        if output_dim > MAX_LAYER_WIDTH || input_dim > MAX_LAYER_WIDTH {
            return Err(EngineError::invalid_format(format!(
                "layer {index}: {output_dim}x{input_dim} exceeds width {MAX_LAYER_WIDTH}"
            )));
        }
        let count = output_dim * input_dim;

        let weights = match encoding {
            WeightEncoding::F32 => reader.read_f32s(count)?,
            WeightEncoding::Q8_0 => {
                let len = encoding.encoded_len(count).ok_or_else(|| {
                    EngineError::invalid_format(format!("layer {index}: weight length overflows"))
                })?;
                let data = reader.take(len)?;
                dequantize_q8_0(data, count)?
            }
        };
        let bias = reader.read_f32s(output_dim)?;

        layers.push(LayerSpec {
            input_dim,
            output_dim,
            activation,
            encoding,
            weights,
            bias,
        });
    }

    reader.finish()?;

    Ok(ModelArtifact {
        name: (!name.is_empty()).then_some(name),
        scaling,
        threshold,
        layers,
    })
}

/// Bounds-checked little-endian cursor over a payload.
struct PayloadReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                EngineError::invalid_format(format!(
                    "truncated payload: need {n} bytes at offset {}",
                    self.offset
                ))
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_len(&mut self) -> Result<usize> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    fn read_f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f32s(&mut self, count: usize) -> Result<Vec<f32>> {
        let len = count
            .checked_mul(4)
            .ok_or_else(|| EngineError::invalid_format("tensor length overflows"))?;
        Ok(self
            .take(len)?
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn finish(self) -> Result<()> {
        if self.offset == self.bytes.len() {
            Ok(())
        } else {
            Err(EngineError::invalid_format(format!(
                "{} trailing bytes after layers",
                self.bytes.len() - self.offset
            )))
        }
    }
}
