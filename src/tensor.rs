//! Fixed-capacity numeric buffers.
//!
//! Storage is inline, sized to the widest layer of the autoencoder, so a
//! buffer never touches the heap and can live on the stack of an inference
//! call.

use crate::error::{EngineError, Result};
use crate::graph::MAX_LAYER_WIDTH;

/// A fixed-capacity sequence of `f32` values.
///
/// The active length is set at construction and can only change through
/// layer evaluation, which writes a full layer output. Capacity never changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorBuffer {
    data: [f32; MAX_LAYER_WIDTH],
    len: usize,
}

impl TensorBuffer {
    /// Create a zero-filled buffer with `len` active elements.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Index`] if `len` exceeds the buffer capacity.
    pub fn zeros(len: usize) -> Result<Self> {
        if len > MAX_LAYER_WIDTH {
            return Err(EngineError::Index {
                index: len,
                len: MAX_LAYER_WIDTH,
            });
        }
        Ok(Self {
            data: [0.0; MAX_LAYER_WIDTH],
            len,
        })
    }

    /// Create a buffer holding a copy of `values`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Index`] if `values` does not fit.
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        let mut buffer = Self::zeros(values.len())?;
        buffer.data[..values.len()].copy_from_slice(values);
        Ok(buffer)
    }

    /// Create a single-element buffer.
    #[must_use]
    pub fn scalar(value: f32) -> Self {
        let mut data = [0.0; MAX_LAYER_WIDTH];
        data[0] = value;
        Self { data, len: 1 }
    }

    /// Number of active elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer has no active elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of elements the buffer can hold.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        MAX_LAYER_WIDTH
    }

    /// Read the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Index`] if `index` is outside the active length.
    pub fn get(&self, index: usize) -> Result<f32> {
        self.as_slice()
            .get(index)
            .copied()
            .ok_or(EngineError::Index {
                index,
                len: self.len,
            })
    }

    /// Write `value` at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Index`] if `index` is outside the active length.
    pub fn set(&mut self, index: usize, value: f32) -> Result<()> {
        let len = self.len;
        let slot = self
            .as_mut_slice()
            .get_mut(index)
            .ok_or(EngineError::Index { index, len })?;
        *slot = value;
        Ok(())
    }

    /// The active elements.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data[..self.len]
    }

    /// The active elements, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data[..self.len]
    }

    /// Set the active length for a layer output and hand out the slice to fill.
    ///
    /// Callers guarantee `len <= MAX_LAYER_WIDTH`; layers enforce this when
    /// they are constructed.
    pub(crate) fn output_slice(&mut self, len: usize) -> &mut [f32] {
        self.len = len.min(MAX_LAYER_WIDTH);
        &mut self.data[..self.len]
    }
}
