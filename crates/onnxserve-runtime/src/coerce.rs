use half::f16;
use onnxserve_core::{DType, Element, ServeError, Shape, Tensor, TensorSpec};
use serde_json::Value;

use crate::InputValue;

/// Turns one raw input value into a tensor of the declared dtype and shape.
///
/// Dynamic dimensions resolve to 1 (see [`TensorSpec::resolved_shape`]).
/// Pre-built tensors are only reshaped; JSON is flattened row-major and
/// converted element by element.
pub fn coerce(value: InputValue, spec: &TensorSpec) -> Result<Tensor, ServeError> {
    let dtype = spec.dtype()?;
    let shape = spec.resolved_shape();

    let tensor = match value {
        InputValue::Tensor(tensor) if tensor.dtype() == dtype => tensor,
        InputValue::Tensor(tensor) => {
            return Err(ServeError::invalid_value(
                spec.name.as_str(),
                format!("expected a {dtype} tensor, got {}", tensor.dtype()),
            ))
        }
        InputValue::Json(value) => tensor_from_json(&value, dtype, spec.name.as_str())?,
    };

    tensor.reshape(shape)
}

/// Builds a flat (rank-1) tensor from a scalar or nested JSON array.
pub fn tensor_from_json(value: &Value, dtype: DType, input: &str) -> Result<Tensor, ServeError> {
    let mut flat = Flattener::new(input);
    flat.visit(value, 0)?;
    let leaves = flat.leaves;
    let shape = Shape::from_slice(&[leaves.len()]);

    match dtype {
        DType::F16 => build(shape, &leaves, input, to_f16),
        DType::F32 => build(shape, &leaves, input, to_f32),
        DType::F64 => build(shape, &leaves, input, to_f64),
        DType::I8 => build(shape, &leaves, input, to_int::<i8>),
        DType::U8 => build(shape, &leaves, input, to_int::<u8>),
        DType::I16 => build(shape, &leaves, input, to_int::<i16>),
        DType::U16 => build(shape, &leaves, input, to_int::<u16>),
        DType::I32 => build(shape, &leaves, input, to_int::<i32>),
        DType::I64 => build(shape, &leaves, input, to_int::<i64>),
        DType::U64 => build(shape, &leaves, input, to_int::<u64>),
        DType::Bool => build(shape, &leaves, input, to_bool),
        DType::String => {
            let data = leaves
                .iter()
                .map(|&v| to_string(v).ok_or_else(|| bad_element(input, v, DType::String)))
                .collect::<Result<Vec<_>, _>>()?;
            Tensor::from_strings(shape, data)
        }
    }
}

fn build<T: Element>(
    shape: Shape,
    leaves: &[&Value],
    input: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Tensor, ServeError> {
    let data = leaves
        .iter()
        .map(|&v| convert(v).ok_or_else(|| bad_element(input, v, T::DTYPE)))
        .collect::<Result<Vec<_>, _>>()?;
    Tensor::from_vec(shape, data)
}

fn bad_element(input: &str, value: &Value, dtype: DType) -> ServeError {
    ServeError::invalid_value(input, format!("cannot convert {value} to {dtype}"))
}

/// Walks nested arrays, collecting scalars and rejecting ragged nesting.
struct Flattener<'a> {
    input: &'a str,
    dims: Vec<usize>,
    leaf_depth: Option<usize>,
    leaves: Vec<&'a Value>,
}

impl<'a> Flattener<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            dims: Vec::new(),
            leaf_depth: None,
            leaves: Vec::new(),
        }
    }

    fn visit(&mut self, value: &'a Value, depth: usize) -> Result<(), ServeError> {
        match value {
            Value::Array(items) => {
                if self.leaf_depth.is_some_and(|leaf| depth >= leaf) {
                    return Err(self.ragged());
                }
                match self.dims.get(depth) {
                    Some(&len) if len != items.len() => return Err(self.ragged()),
                    Some(_) => {}
                    None => self.dims.push(items.len()),
                }
                for item in items {
                    self.visit(item, depth + 1)?;
                }
            }
            _ => {
                match self.leaf_depth {
                    Some(leaf) if leaf != depth => return Err(self.ragged()),
                    Some(_) => {}
                    None if depth < self.dims.len() => return Err(self.ragged()),
                    None => self.leaf_depth = Some(depth),
                }
                self.leaves.push(value);
            }
        }
        Ok(())
    }

    fn ragged(&self) -> ServeError {
        ServeError::invalid_value(self.input, "nested arrays must be rectangular")
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// Like integers, a finite number out of the narrow float's range is
// rejected instead of becoming infinity. Non-finite input stays non-finite.
fn to_f32(value: &Value) -> Option<f32> {
    let x = to_f64(value)?;
    let y = x as f32;
    (y.is_finite() || !x.is_finite()).then_some(y)
}

fn to_f16(value: &Value) -> Option<f16> {
    let x = to_f64(value)?;
    let y = f16::from_f64(x);
    (y.is_finite() || !x.is_finite()).then_some(y)
}

fn to_int<T: TryFrom<i128>>(value: &Value) -> Option<T> {
    let wide: i128 = match value {
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i128::from(i),
            (None, Some(u)) => i128::from(u),
            _ => truncate(n.as_f64()?)?,
        },
        Value::Bool(b) => i128::from(*b),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i128>() {
                Ok(i) => i,
                Err(_) => truncate(s.parse().ok()?)?,
            }
        }
        _ => return None,
    };
    T::try_from(wide).ok()
}

fn truncate(x: f64) -> Option<i128> {
    // Beyond ±2^127 the cast would saturate silently.
    (x.is_finite() && x.abs() < 1.7e38).then(|| x.trunc() as i128)
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|x| x != 0.0),
        _ => None,
    }
}

fn to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flattens_rectangular_nesting() {
        let t = tensor_from_json(&json!([[1, 2], [3, 4]]), DType::I32, "x").unwrap();
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn rejects_ragged_nesting() {
        for value in [json!([[1, 2], [3]]), json!([1, [2]]), json!([[1], 2])] {
            let err = tensor_from_json(&value, DType::F32, "x").unwrap_err();
            assert!(matches!(err, ServeError::InvalidValue { .. }), "{value}");
        }
    }

    #[test]
    fn integer_conversion_truncates_and_checks_range() {
        assert_eq!(to_int::<i32>(&json!(2.9)), Some(2));
        assert_eq!(to_int::<i32>(&json!(-2.9)), Some(-2));
        assert_eq!(to_int::<u8>(&json!(256)), None);
        assert_eq!(to_int::<u8>(&json!(-1)), None);
        assert_eq!(to_int::<u64>(&json!(u64::MAX)), Some(u64::MAX));
        assert_eq!(to_int::<i64>(&json!("42")), Some(42));
        assert_eq!(to_int::<i64>(&json!(true)), Some(1));
    }

    #[test]
    fn narrow_floats_reject_overflow() {
        for dtype in [DType::F32, DType::F16] {
            let err = tensor_from_json(&json!([1e300, 2]), dtype, "x").unwrap_err();
            assert!(matches!(err, ServeError::InvalidValue { .. }), "{dtype}");
        }
        assert!(tensor_from_json(&json!([70000.0]), DType::F16, "x").is_err());
        assert!(tensor_from_json(&json!([70000.0]), DType::F32, "x").is_ok());

        let t = tensor_from_json(&json!(["inf", 1e300]), DType::F64, "x").unwrap();
        assert_eq!(t.to_vec::<f64>().unwrap(), vec![f64::INFINITY, 1e300]);
        let t = tensor_from_json(&json!(["-inf"]), DType::F32, "x").unwrap();
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![f32::NEG_INFINITY]);
    }

    #[test]
    fn null_and_objects_are_not_elements() {
        assert!(tensor_from_json(&json!(null), DType::F32, "x").is_err());
        assert!(tensor_from_json(&json!([{"a": 1}]), DType::String, "x").is_err());
    }

    #[test]
    fn strings_accept_scalars() {
        let t = tensor_from_json(&json!(["a", 1, true]), DType::String, "x").unwrap();
        assert_eq!(t.as_strings().unwrap(), &["a", "1", "true"]);
    }
}
