use std::fmt;
use std::ptr::NonNull;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stable handle naming one operand of the computation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TensorId(pub u32);

impl TensorId {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for TensorId {
    fn from(value: u32) -> Self {
        TensorId(value)
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Element types of planned tensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Bool,
    BFloat16,
    Float16,
}

impl DataType {
    /// Get the size of one element in bytes
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::Float32 => 4,
            DataType::Float64 => 8,
            DataType::Int8 => 1,
            DataType::Int16 => 2,
            DataType::Int32 => 4,
            DataType::Int64 => 8,
            DataType::Uint8 => 1,
            DataType::Uint16 => 2,
            DataType::Uint32 => 4,
            DataType::Uint64 => 8,
            DataType::Bool => 1,
            DataType::BFloat16 => 2,
            DataType::Float16 => 2,
        }
    }
}

/// Non-owning address into a pool's backing allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPtr(NonNull<u8>);

// SAFETY: a BufferPtr is only an address. Reading or writing through it is
// the kernel's business and is bounded by the owning pool's lifetime.
unsafe impl Send for BufferPtr {}
unsafe impl Sync for BufferPtr {}

impl BufferPtr {
    pub fn new(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    pub fn as_non_null(&self) -> NonNull<u8> {
        self.0
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.0.as_ptr()
    }

    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// Binding state of a tensor's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Bound {
        buffer: BufferPtr,
        /// Pool generation the address was produced in
        generation: u64,
    },
}

/// Tensor metadata plus its bound buffer
#[derive(Debug)]
pub struct Tensor {
    size_bytes: usize,
    dynamic: bool,
    binding: RwLock<Binding>,
}

impl Tensor {
    /// Create a static tensor of the given byte size
    pub fn new(size_bytes: usize) -> Self {
        Self {
            size_bytes,
            dynamic: false,
            binding: RwLock::new(Binding::Unbound),
        }
    }

    /// Create a static tensor sized from its shape and element type
    pub fn with_shape(shape: &[usize], data_type: DataType) -> Result<Self> {
        let size_bytes = shape
            .iter()
            .try_fold(data_type.size_in_bytes(), |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                Error::InvalidShape(format!(
                    "Integer overflow calculating size for shape {:?} of {:?}",
                    shape, data_type
                ))
            })?;
        Ok(Self::new(size_bytes))
    }

    /// Create a tensor whose shape is only known at execution time
    pub fn dynamic() -> Self {
        Self {
            size_bytes: 0,
            dynamic: true,
            binding: RwLock::new(Binding::Unbound),
        }
    }

    pub fn total_size(&self) -> usize {
        self.size_bytes
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn binding(&self) -> Binding {
        match self.binding.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.binding(), Binding::Bound { .. })
    }

    /// Bound address regardless of generation
    pub fn buffer(&self) -> Option<NonNull<u8>> {
        match self.binding() {
            Binding::Bound { buffer, .. } => Some(buffer.as_non_null()),
            Binding::Unbound => None,
        }
    }

    pub(crate) fn set_buffer(&self, buffer: BufferPtr, generation: u64) {
        self.store(Binding::Bound { buffer, generation });
    }

    pub(crate) fn unbind(&self) {
        self.store(Binding::Unbound);
    }

    fn store(&self, binding: Binding) {
        match self.binding.write() {
            Ok(mut guard) => *guard = binding,
            Err(poisoned) => *poisoned.into_inner() = binding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_from_shape() {
        let tensor = Tensor::with_shape(&[2, 3, 4], DataType::Float32).unwrap();
        assert_eq!(tensor.total_size(), 96);
        assert!(!tensor.is_dynamic());

        let scalar = Tensor::with_shape(&[], DataType::Int64).unwrap();
        assert_eq!(scalar.total_size(), 8);
    }

    #[test]
    fn test_size_overflow_is_rejected() {
        let result = Tensor::with_shape(&[usize::MAX, 2], DataType::Float16);
        let err = result.unwrap_err();
        assert!(matches!(err, Error::InvalidShape(_)));
        assert!(err.is_precondition_violation());
        assert!(!err.is_resource_exhaustion());
    }

    #[test]
    fn test_binding_state() {
        let tensor = Tensor::new(16);
        assert!(!tensor.is_bound());
        assert_eq!(tensor.buffer(), None);

        let mut storage = [0u8; 16];
        let ptr = BufferPtr::new(NonNull::new(storage.as_mut_ptr()).unwrap());
        tensor.set_buffer(ptr, 3);
        assert_eq!(tensor.binding(), Binding::Bound { buffer: ptr, generation: 3 });
        assert_eq!(tensor.buffer(), Some(ptr.as_non_null()));

        tensor.unbind();
        assert!(!tensor.is_bound());
    }

    #[test]
    fn test_tensor_id_display() {
        assert_eq!(TensorId(12).to_string(), "#12");
        assert_eq!(TensorId::from(4).value(), 4);
    }
}
