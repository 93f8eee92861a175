use std::sync::Arc;

use onnxserve_core::{
    tensor_to_json, BackendModel, IOName, ModelOutput, ServeError, Tensor, TensorSpec,
};
use serde_json::Value;

/// Runs the loaded model and renders its outputs as JSON.
///
/// Holds no per-call state; concurrent calls are as safe as the backend's
/// `infer` is.
#[derive(Clone)]
pub struct Invoker {
    model: Arc<dyn BackendModel>,
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("inputs", &self.input_specs())
            .field("outputs", &self.output_specs())
            .finish()
    }
}

impl Invoker {
    pub fn new(model: Arc<dyn BackendModel>) -> Self {
        Self { model }
    }

    pub fn input_specs(&self) -> &[TensorSpec] {
        &self.model.spec().inputs
    }

    pub fn output_specs(&self) -> &[TensorSpec] {
        &self.model.spec().outputs
    }

    /// One JSON value per declared output, in declared order.
    pub fn infer(&self, inputs: Vec<(IOName, Tensor)>) -> Result<Vec<Value>, ServeError> {
        let outputs = self
            .model
            .infer(inputs)
            .map_err(ServeError::EngineExecution)?;
        outputs.iter().map(output_to_json).collect()
    }
}

pub fn output_to_json(output: &ModelOutput) -> Result<Value, ServeError> {
    match output {
        ModelOutput::Tensor(tensor) => tensor_to_json(tensor),
        ModelOutput::Value(value) => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use onnxserve_core::Shape;
    use serde_json::json;

    use super::*;

    #[test]
    fn pass_through_values_are_unchanged() {
        let value = json!([{"0": 0.25, "1": 0.75}]);
        let output = ModelOutput::Value(value.clone());
        assert_eq!(output_to_json(&output).unwrap(), value);
    }

    #[test]
    fn tensors_render_by_shape() {
        let t = Tensor::from_vec(Shape::from_slice(&[1, 2]), vec![3i32, 4]).unwrap();
        assert_eq!(output_to_json(&ModelOutput::Tensor(t)).unwrap(), json!([[3, 4]]));
    }
}
