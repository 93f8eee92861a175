use bytes::Bytes;
use smallvec::SmallVec;

use crate::{DType, Element, ServeError};

#[derive(Clone, Debug, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda {
        device_id: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn scalar() -> Self {
        Self(SmallVec::new())
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    /// Element count; a rank-0 shape holds one element.
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>()
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
}

#[derive(Clone, Debug)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
}

/// Owns the storage for a tensor. Fixed-width elements are packed
/// little-endian; strings are kept as owned values.
#[derive(Clone, Debug)]
pub enum TensorStorage {
    CpuBytes(Bytes),
    Strings(Vec<String>),
}

/// Dense, row-major tensor on the host.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub storage: TensorStorage,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, bytes: Bytes) -> Self {
        Self {
            desc: TensorDesc { dtype, shape },
            storage: TensorStorage::CpuBytes(bytes),
        }
    }

    pub fn from_vec<T: Element>(shape: Shape, data: Vec<T>) -> Result<Self, ServeError> {
        ensure_numel(data.len(), &shape)?;
        let mut bytes = Vec::with_capacity(data.len() * std::mem::size_of::<T>());
        for value in data {
            value.write_le(&mut bytes);
        }
        Ok(Self::from_cpu_bytes(T::DTYPE, shape, Bytes::from(bytes)))
    }

    pub fn from_strings(shape: Shape, data: Vec<String>) -> Result<Self, ServeError> {
        ensure_numel(data.len(), &shape)?;
        Ok(Self {
            desc: TensorDesc {
                dtype: DType::String,
                shape,
            },
            storage: TensorStorage::Strings(data),
        })
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.desc.shape
    }

    /// Number of elements actually held by the storage.
    pub fn len(&self) -> usize {
        match &self.storage {
            TensorStorage::Strings(values) => values.len(),
            TensorStorage::CpuBytes(bytes) => self
                .desc
                .dtype
                .byte_size()
                .map_or(0, |size| bytes.len() / size),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reinterprets the same elements under a new shape.
    pub fn reshape(mut self, shape: Shape) -> Result<Self, ServeError> {
        ensure_numel(self.len(), &shape)?;
        self.desc.shape = shape;
        Ok(self)
    }

    /// Decodes fixed-width elements. Fails if `T` is not the tensor's dtype.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, ServeError> {
        let TensorStorage::CpuBytes(bytes) = &self.storage else {
            return Err(dtype_mismatch(T::DTYPE, self.desc.dtype));
        };
        if T::DTYPE != self.desc.dtype {
            return Err(dtype_mismatch(T::DTYPE, self.desc.dtype));
        }
        Ok(bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(T::read_le)
            .collect())
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match &self.storage {
            TensorStorage::Strings(values) => Some(values),
            TensorStorage::CpuBytes(_) => None,
        }
    }
}

fn ensure_numel(numel: usize, shape: &Shape) -> Result<(), ServeError> {
    if numel != shape.numel() {
        return Err(ServeError::ShapeMismatch {
            numel,
            shape: shape.dims().to_vec(),
        });
    }
    Ok(())
}

fn dtype_mismatch(requested: DType, actual: DType) -> ServeError {
    ServeError::Unexpected(format!(
        "requested {requested} elements from a {actual} tensor"
    ))
}
