use anyhow::Result;

use crate::{Device, IOName, ModelArtifact, ModelSpec, Tensor};

pub trait Backend: Send + Sync + 'static {
    type Model: BackendModel;

    fn name(&self) -> &'static str;
    fn load(&self, artifact: &ModelArtifact, device: Device) -> Result<Self::Model>;
}

/// One value produced by the engine for one declared output.
#[derive(Clone, Debug)]
pub enum ModelOutput {
    Tensor(Tensor),
    /// Non-tensor outputs (sequences, maps) already rendered as JSON.
    Value(serde_json::Value),
}

/// A loaded model. Shared read-only by every request, so `infer` takes
/// `&self`; implementations synchronise internally if the engine needs it.
pub trait BackendModel: Send + Sync + 'static {
    fn spec(&self) -> &ModelSpec;

    /// Inputs are keyed by declared input name. Outputs come back in
    /// declared output order.
    fn infer(&self, inputs: Vec<(IOName, Tensor)>) -> Result<Vec<ModelOutput>>;
}
