use std::collections::BTreeMap;

use onnxserve_core::{IOName, ServeError, Tensor, TensorSpec};
use serde_json::Value;

use crate::coerce;

/// Raw value for one model input.
#[derive(Clone, Debug)]
pub enum InputValue {
    Json(Value),
    /// Already typed, e.g. built by a pre-inference hook.
    Tensor(Tensor),
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Tensor> for InputValue {
    fn from(tensor: Tensor) -> Self {
        Self::Tensor(tensor)
    }
}

impl InputValue {
    fn is_null(&self) -> bool {
        matches!(self, InputValue::Json(Value::Null))
    }
}

/// One client sample, classified by its JSON shape.
#[derive(Clone, Debug)]
pub enum Sample {
    /// Scalar or array payload; only valid for single-input models.
    Bare(InputValue),
    /// Input name -> value.
    Keyed(BTreeMap<String, InputValue>),
}

impl From<Value> for Sample {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Sample::Keyed(
                map.into_iter()
                    .map(|(key, value)| (key, InputValue::Json(value)))
                    .collect(),
            ),
            other => Sample::Bare(InputValue::Json(other)),
        }
    }
}

impl From<Tensor> for Sample {
    fn from(tensor: Tensor) -> Self {
        Sample::Bare(InputValue::Tensor(tensor))
    }
}

/// Maps a sample onto the model's declared inputs and coerces each value.
///
/// Output is in declared input order. A key holding `null` counts as
/// missing.
pub fn dispatch(sample: Sample, specs: &[TensorSpec]) -> Result<Vec<(IOName, Tensor)>, ServeError> {
    if let [spec] = specs {
        let value = match sample {
            Sample::Bare(value) => value,
            Sample::Keyed(mut map) => take_field(&mut map, spec)
                .ok_or_else(|| ServeError::missing_field([spec.name.as_str()]))?,
        };
        return Ok(vec![(spec.name.clone(), coerce(value, spec)?)]);
    }

    let missing = || ServeError::missing_field(specs.iter().map(|s| s.name.as_str()));
    let mut map = match sample {
        Sample::Keyed(map) => map,
        Sample::Bare(_) if specs.is_empty() => BTreeMap::new(),
        Sample::Bare(_) => return Err(missing()),
    };

    let mut inputs = Vec::with_capacity(specs.len());
    for spec in specs {
        let value = take_field(&mut map, spec).ok_or_else(missing)?;
        inputs.push((spec.name.clone(), coerce(value, spec)?));
    }
    Ok(inputs)
}

fn take_field(map: &mut BTreeMap<String, InputValue>, spec: &TensorSpec) -> Option<InputValue> {
    map.remove(spec.name.as_str()).filter(|value| !value.is_null())
}
