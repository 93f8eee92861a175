use half::f16;
use serde_json::{Number, Value};

use crate::{DType, Element, ServeError, Tensor};

/// Element types with a JSON rendering.
pub trait JsonElement: Element {
    fn to_json(self) -> Value;
}

macro_rules! json_integer {
    ($($ty:ty),* $(,)?) => {
        $(
            impl JsonElement for $ty {
                fn to_json(self) -> Value {
                    Value::from(self)
                }
            }
        )*
    };
}

json_integer!(i8, u8, i16, u16, i32, i64, u64, bool);

impl JsonElement for f16 {
    fn to_json(self) -> Value {
        float_value(&self.to_string())
    }
}

impl JsonElement for f32 {
    fn to_json(self) -> Value {
        float_value(&self.to_string())
    }
}

impl JsonElement for f64 {
    fn to_json(self) -> Value {
        Number::from_f64(self).map_or(Value::Null, Value::Number)
    }
}

/// Reparses the narrow float's shortest text so `0.1f32` renders as `0.1`.
/// Non-finite values have no JSON form and become `null`.
fn float_value(text: &str) -> Value {
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

/// Nested arrays following the tensor's shape; a rank-0 tensor is a bare
/// scalar.
pub fn tensor_to_json(tensor: &Tensor) -> Result<Value, ServeError> {
    let elements = match tensor.dtype() {
        DType::F16 => elements::<f16>(tensor)?,
        DType::F32 => elements::<f32>(tensor)?,
        DType::F64 => elements::<f64>(tensor)?,
        DType::I8 => elements::<i8>(tensor)?,
        DType::U8 => elements::<u8>(tensor)?,
        DType::I16 => elements::<i16>(tensor)?,
        DType::U16 => elements::<u16>(tensor)?,
        DType::I32 => elements::<i32>(tensor)?,
        DType::I64 => elements::<i64>(tensor)?,
        DType::U64 => elements::<u64>(tensor)?,
        DType::Bool => elements::<bool>(tensor)?,
        DType::String => tensor
            .as_strings()
            .ok_or_else(|| ServeError::Unexpected("string tensor without strings".into()))?
            .iter()
            .cloned()
            .map(Value::String)
            .collect(),
    };

    let dims = tensor.shape().dims();
    if elements.len() != tensor.shape().numel() {
        return Err(ServeError::ShapeMismatch {
            numel: elements.len(),
            shape: dims.to_vec(),
        });
    }
    let mut elements = elements.into_iter();
    Ok(nest(&mut elements, dims))
}

fn elements<T: JsonElement>(tensor: &Tensor) -> Result<Vec<Value>, ServeError> {
    Ok(tensor.to_vec::<T>()?.into_iter().map(T::to_json).collect())
}

fn nest(elements: &mut impl Iterator<Item = Value>, dims: &[usize]) -> Value {
    match dims.split_first() {
        None => elements.next().unwrap_or(Value::Null),
        Some((&len, rest)) => Value::Array((0..len).map(|_| nest(elements, rest)).collect()),
    }
}
