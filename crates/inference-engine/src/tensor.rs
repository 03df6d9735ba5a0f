//! Opaque tensor handle
//!
//! The service never interprets tensor contents. A tensor is an element type
//! name, a shape and a byte buffer; the first dimension is the batch
//! dimension.

use std::fmt;
use std::sync::Arc;
use bytes::Bytes;

use common::types::ValueType;
use storage_adapter::Stored;

#[derive(Debug, PartialEq, Eq)]
struct TensorData {
    dtype: String,
    shape: Vec<usize>,
    data: Bytes,
}

/// Cheaply clonable tensor handle
#[derive(Clone, PartialEq, Eq)]
pub struct Tensor {
    inner: Arc<TensorData>,
}

impl Tensor {
    /// Creates a tensor
    pub fn new(dtype: impl Into<String>, shape: Vec<usize>, data: impl Into<Bytes>) -> Self {
        Self {
            inner: Arc::new(TensorData {
                dtype: dtype.into().to_uppercase(),
                shape,
                data: data.into(),
            }),
        }
    }

    /// Element type name
    pub fn dtype(&self) -> &str {
        &self.inner.dtype
    }

    /// Shape
    pub fn shape(&self) -> &[usize] {
        &self.inner.shape
    }

    /// Raw contents
    pub fn data(&self) -> &Bytes {
        &self.inner.data
    }

    /// Size of the batch dimension (1 for scalars)
    pub fn batch_size(&self) -> usize {
        self.inner.shape.first().copied().unwrap_or(1)
    }

    /// Returns true if both tensors can be stacked along the batch dimension
    pub fn is_batch_compatible(&self, other: &Tensor) -> bool {
        let ours = self.shape();
        let theirs = other.shape();

        self.dtype() == other.dtype()
            && ours.len() == theirs.len()
            && ours.iter().skip(1).eq(theirs.iter().skip(1))
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.inner.dtype)
            .field("shape", &self.inner.shape)
            .field("bytes", &self.inner.data.len())
            .finish()
    }
}

impl Stored for Tensor {
    const VALUE_TYPE: ValueType = ValueType::Tensor;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_compatibility() {
        let a = Tensor::new("float", vec![1, 3], vec![0u8; 12]);
        let b = Tensor::new("FLOAT", vec![4, 3], vec![0u8; 48]);
        let c = Tensor::new("FLOAT", vec![1, 4], vec![0u8; 16]);
        let d = Tensor::new("INT8", vec![1, 3], vec![0u8; 3]);

        assert!(a.is_batch_compatible(&b));
        assert!(!a.is_batch_compatible(&c));
        assert!(!a.is_batch_compatible(&d));
        assert_eq!(b.batch_size(), 4);
    }

    #[test]
    fn test_scalar_batch_size() {
        let scalar = Tensor::new("FLOAT", vec![], vec![0u8; 4]);
        assert_eq!(scalar.batch_size(), 1);
        assert_eq!(scalar.dtype(), "FLOAT");
    }
}
