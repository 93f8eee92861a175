use half::f16;

use crate::ServeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    F32,
    F64,
    I8,
    U8,
    I16,
    U16,
    I32,
    I64,
    U64,
    Bool,
    String,
}

/// Engine type name <-> dtype, in the order ONNX Runtime reports them.
const ENGINE_NAMES: [(&str, DType); 12] = [
    ("tensor(float16)", DType::F16),
    ("tensor(float)", DType::F32),
    ("tensor(double)", DType::F64),
    ("tensor(int32)", DType::I32),
    ("tensor(int8)", DType::I8),
    ("tensor(uint8)", DType::U8),
    ("tensor(int16)", DType::I16),
    ("tensor(uint16)", DType::U16),
    ("tensor(int64)", DType::I64),
    ("tensor(uint64)", DType::U64),
    ("tensor(bool)", DType::Bool),
    ("tensor(string)", DType::String),
];

impl DType {
    pub const ALL: [DType; 12] = [
        DType::F16,
        DType::F32,
        DType::F64,
        DType::I8,
        DType::U8,
        DType::I16,
        DType::U16,
        DType::I32,
        DType::I64,
        DType::U64,
        DType::Bool,
        DType::String,
    ];

    pub fn from_engine_name(name: &str) -> Result<Self, ServeError> {
        ENGINE_NAMES
            .iter()
            .find(|(engine, _)| *engine == name)
            .map(|(_, dtype)| *dtype)
            .ok_or_else(|| ServeError::UnsupportedDType(name.to_string()))
    }

    pub fn engine_name(self) -> &'static str {
        ENGINE_NAMES
            .iter()
            .find(|(_, dtype)| *dtype == self)
            .map(|(engine, _)| *engine)
            .unwrap_or("tensor(undefined)")
    }

    /// Short element name, e.g. `float32`.
    pub fn name(self) -> &'static str {
        match self {
            DType::F16 => "float16",
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::I8 => "int8",
            DType::U8 => "uint8",
            DType::I16 => "int16",
            DType::U16 => "uint16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::U64 => "uint64",
            DType::Bool => "bool",
            DType::String => "string",
        }
    }

    /// Byte width of one element; `None` for variable-width strings.
    pub fn byte_size(self) -> Option<usize> {
        match self {
            DType::I8 | DType::U8 | DType::Bool => Some(1),
            DType::F16 | DType::I16 | DType::U16 => Some(2),
            DType::F32 | DType::I32 => Some(4),
            DType::F64 | DType::I64 | DType::U64 => Some(8),
            DType::String => None,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-width element stored little-endian in `TensorStorage::CpuBytes`.
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_element!(
    f16 => F16,
    f32 => F32,
    f64 => F64,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    i64 => I64,
    u64 => U64,
);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(u8::from(self));
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}
