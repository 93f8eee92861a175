use std::sync::Arc;

use anyhow::{bail, Result};
use onnxserve_core::{BackendModel, IOName, ModelOutput, ModelSpec, Tensor, TensorSpec};
use onnxserve_runtime::{ApiInfo, Hooks, ServingContext};

/// Returns every input unchanged, one output per input, unless the first
/// input is named `fail`.
pub struct EchoModel {
    spec: ModelSpec,
}

impl EchoModel {
    pub fn new(inputs: Vec<TensorSpec>) -> Self {
        let outputs = inputs
            .iter()
            .map(|spec| TensorSpec {
                name: IOName(format!("{}_out", spec.name)),
                ..spec.clone()
            })
            .collect();
        Self {
            spec: ModelSpec { inputs, outputs },
        }
    }
}

impl BackendModel for EchoModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&self, inputs: Vec<(IOName, Tensor)>) -> Result<Vec<ModelOutput>> {
        if inputs.first().is_some_and(|(name, _)| name.as_str() == "fail") {
            bail!("engine exploded");
        }
        Ok(inputs
            .into_iter()
            .map(|(_, tensor)| ModelOutput::Tensor(tensor))
            .collect())
    }
}

pub fn context(inputs: Vec<TensorSpec>, hooks: Hooks) -> ServingContext {
    ServingContext::new(
        ApiInfo {
            name: "myapi".to_string(),
            id: "api-123".to_string(),
        },
        Arc::new(EchoModel::new(inputs)),
        hooks,
    )
}
