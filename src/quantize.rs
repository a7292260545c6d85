//! Q8_0 weight quantization.
//!
//! Weights are split into blocks of [`BLOCK_SIZE`]; each block stores one
//! `f32` scale followed by 32 signed bytes. The last block is zero-padded.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Weights per quantization block.
pub const BLOCK_SIZE: usize = 32;

/// Encoded size of one block: scale + values.
pub const BLOCK_BYTES: usize = 4 + BLOCK_SIZE;

/// How a layer's weights are stored in an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightEncoding {
    /// Full-precision little-endian `f32`
    #[default]
    F32,
    /// 8-bit blocks with a per-block scale
    Q8_0,
}

impl WeightEncoding {
    /// Wire tag used in the artifact payload.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::F32 => 0,
            Self::Q8_0 => 1,
        }
    }

    /// Decode a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::F32),
            1 => Some(Self::Q8_0),
            _ => None,
        }
    }

    /// Encoded byte length of `count` weights, or `None` if it overflows.
    #[must_use]
    pub fn encoded_len(self, count: usize) -> Option<usize> {
        match self {
            Self::F32 => count.checked_mul(4),
            Self::Q8_0 => count.div_ceil(BLOCK_SIZE).checked_mul(BLOCK_BYTES),
        }
    }
}

impl std::fmt::Display for WeightEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::Q8_0 => write!(f, "q8_0"),
        }
    }
}

/// Quantize weights to Q8_0 blocks.
#[must_use]
pub fn quantize_q8_0(weights: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(weights.len().div_ceil(BLOCK_SIZE) * BLOCK_BYTES);

    for block in weights.chunks(BLOCK_SIZE) {
        let abs_max = block.iter().map(|&w| w.abs()).fold(0.0_f32, f32::max);
        let scale = if abs_max > 0.0 { abs_max / 127.0 } else { 1.0 };
        let inv_scale = 1.0 / scale;

        bytes.extend_from_slice(&scale.to_le_bytes());
        for &w in block {
            let q = (w * inv_scale).round().clamp(-128.0, 127.0) as i8;
            bytes.push(q as u8);
        }
        bytes.resize(bytes.len() + BLOCK_SIZE - block.len(), 0);
    }

    bytes
}

/// Dequantize `count` weights from Q8_0 blocks, dropping block padding.
///
/// # Errors
///
/// Returns [`EngineError::InvalidFormat`] if `data` is not exactly the encoded
/// length of `count` weights, or a block scale is not finite.
pub fn dequantize_q8_0(data: &[u8], count: usize) -> Result<Vec<f32>> {
    let expected = WeightEncoding::Q8_0.encoded_len(count).ok_or_else(|| {
        EngineError::invalid_format(format!("q8_0 length of {count} weights overflows"))
    })?;
    if data.len() != expected {
        return Err(EngineError::invalid_format(format!(
            "q8_0 data is {} bytes, expected {expected} for {count} weights",
            data.len()
        )));
    }

    let mut weights = Vec::with_capacity(count);
    for block in data.chunks_exact(BLOCK_BYTES) {
        let scale = f32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        if !scale.is_finite() {
            return Err(EngineError::invalid_format("q8_0 block scale is not finite"));
        }
        let remaining = count - weights.len();
        weights.extend(
            block[4..]
                .iter()
                .take(remaining)
                .map(|&q| f32::from(q as i8) * scale),
        );
    }

    Ok(weights)
}
