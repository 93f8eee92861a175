use crate::{DType, ServeError, Shape};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IOName(pub String);

impl IOName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IOName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IOName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Engine-reported name, type and shape of one model input or output.
///
/// The type is kept as the engine's own name (`tensor(float)`) and only
/// resolved against the dtype table when a value is coerced, so a model with
/// an exotic IO type still loads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: IOName,
    pub engine_type: String,
    pub dims: Vec<Option<usize>>, // None = dynamic
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, dtype: DType, dims: Vec<Option<usize>>) -> Self {
        Self::with_engine_type(name, dtype.engine_name(), dims)
    }

    pub fn with_engine_type(
        name: impl Into<String>,
        engine_type: impl Into<String>,
        dims: Vec<Option<usize>>,
    ) -> Self {
        Self {
            name: IOName(name.into()),
            engine_type: engine_type.into(),
            dims,
        }
    }

    pub fn dtype(&self) -> Result<DType, ServeError> {
        DType::from_engine_name(&self.engine_type)
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Concrete shape with every dynamic dimension pinned to 1.
    ///
    /// This is lossy on purpose: a payload of 6 elements against `[None, 3]`
    /// does not become `[2, 3]`, it fails to reshape.
    pub fn resolved_shape(&self) -> Shape {
        Shape(self.dims.iter().map(|d| d.unwrap_or(1)).collect())
    }
}

/// Descriptors reported once at load time. Count and order never change.
#[derive(Clone, Debug, Default)]
pub struct ModelSpec {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}
