use std::sync::Arc;

use anyhow::{bail, Context};
use onnxserve_core::{ServeError, TensorSpec};
use serde_json::Value;

use crate::Sample;

/// Runs on the raw sample before it is mapped onto model inputs.
pub type PreInferenceFn =
    Arc<dyn Fn(Value, &[TensorSpec]) -> anyhow::Result<Sample> + Send + Sync + 'static>;

/// Runs on the per-output results; its return value becomes `prediction`.
pub type PostInferenceFn =
    Arc<dyn Fn(Vec<Value>, &[TensorSpec]) -> anyhow::Result<Value> + Send + Sync + 'static>;

/// User transformations around inference. An absent slot is the identity.
#[derive(Clone, Default)]
pub struct Hooks {
    pre_inference: Option<PreInferenceFn>,
    post_inference: Option<PostInferenceFn>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_inference", &self.pre_inference.is_some())
            .field("post_inference", &self.post_inference.is_some())
            .finish()
    }
}

impl Hooks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_pre_inference<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &[TensorSpec]) -> anyhow::Result<Sample> + Send + Sync + 'static,
    {
        self.pre_inference = Some(Arc::new(f));
        self
    }

    pub fn with_post_inference<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Value>, &[TensorSpec]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.post_inference = Some(Arc::new(f));
        self
    }

    pub fn pre_inference(&self, sample: Value, inputs: &[TensorSpec]) -> Result<Sample, ServeError> {
        match &self.pre_inference {
            Some(hook) => hook(sample, inputs).map_err(ServeError::UserHook),
            None => Ok(Sample::from(sample)),
        }
    }

    pub fn post_inference(
        &self,
        result: Vec<Value>,
        outputs: &[TensorSpec],
    ) -> Result<Value, ServeError> {
        match &self.post_inference {
            Some(hook) => hook(result, outputs).map_err(ServeError::UserHook),
            None => Ok(Value::Array(result)),
        }
    }

    /// Hook sets that ship with the server, selected by name at startup.
    ///
    /// - `first-output`: the prediction is the first output alone.
    /// - `argmax`: index of the largest value along the last axis of the
    ///   first output.
    pub fn builtin(name: &str) -> anyhow::Result<Self> {
        match name {
            "first-output" => Ok(Self::none().with_post_inference(|result, _| first_output(result))),
            "argmax" => Ok(Self::none().with_post_inference(|result, _| argmax(&first_output(result)?))),
            other => bail!("unknown request handler `{other}` (expected first-output or argmax)"),
        }
    }
}

fn first_output(result: Vec<Value>) -> anyhow::Result<Value> {
    result.into_iter().next().context("model produced no outputs")
}

fn argmax(value: &Value) -> anyhow::Result<Value> {
    let Value::Array(items) = value else {
        bail!("argmax expects an array output, got {value}");
    };
    if items.first().is_some_and(Value::is_array) {
        return items.iter().map(argmax).collect::<anyhow::Result<Vec<_>>>().map(Value::Array);
    }

    let mut best: Option<(usize, f64)> = None;
    for (idx, item) in items.iter().enumerate() {
        let x = item
            .as_f64()
            .with_context(|| format!("argmax expects numbers, got {item}"))?;
        if best.map_or(true, |(_, max)| x > max) {
            best = Some((idx, x));
        }
    }
    let (idx, _) = best.context("argmax over an empty array")?;
    Ok(Value::from(idx))
}
