use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use onnxserve_backend_ort::OrtBackend;
use onnxserve_core::{
    Backend, BackendModel, Device, IOName, ModelArtifact, ModelOutput, ServeError, Shape, Tensor,
};
use onnxserve_runtime::{ApiInfo, Hooks, RequestError, ServingContext};
use serde_json::{json, Value};

fn model_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../models")
        .join(file)
}

fn serving(file: &str, hooks: Hooks) -> Result<ServingContext> {
    let model = OrtBackend::new().load(&ModelArtifact::OnnxPath(model_path(file)), Device::Cpu)?;
    let api = ApiInfo {
        name: "iris".to_string(),
        id: "res-7".to_string(),
    };
    Ok(ServingContext::new(api, Arc::new(model), hooks))
}

#[test]
fn batch_through_onnxruntime() -> Result<()> {
    let ctx = serving("identity_int64.onnx", Hooks::none())?;

    let response = ctx.handle_batch(br#"{"samples": [3, {"x": 4}, "5", 6.9]}"#)?;
    assert_eq!(
        serde_json::to_value(&response)?,
        json!({
            "predictions": [
                {"prediction": [3]},
                {"prediction": [4]},
                {"prediction": [5]},
                {"prediction": [6]},
            ],
            "resource_id": "res-7",
        })
    );
    Ok(())
}

#[test]
fn one_bad_sample_fails_the_onnxruntime_batch() -> Result<()> {
    let ctx = serving("identity_int64.onnx", Hooks::none())?;

    let err = ctx
        .handle_batch(br#"{"samples": [1, [1, 2], 3]}"#)
        .expect_err("ragged batch must fail");
    let RequestError::PredictionFailed { sample, reason } = err else {
        anyhow::bail!("expected a prediction failure, got {err}");
    };
    assert_eq!(sample, json!([1, 2]));
    assert!(matches!(reason, ServeError::ShapeMismatch { numel: 2, .. }));
    Ok(())
}

#[test]
fn zipmap_output_reports_its_type() -> Result<()> {
    let model = OrtBackend::new().load(
        &ModelArtifact::OnnxPath(model_path("zipmap.onnx")),
        Device::Cpu,
    )?;
    let output = model.spec().outputs.first().context("missing output spec")?;
    assert_eq!(output.name, IOName::from("probs"));
    assert_eq!(output.engine_type, "seq(map(int64,tensor(float)))");
    assert!(output.dims.is_empty());
    assert!(output.dtype().is_err());

    let input = Tensor::from_vec(
        Shape::from_slice(&[2, 3]),
        vec![0.1f32, 0.7, 0.2, 1.0, 0.0, 0.0],
    )?;
    let outputs = model.infer(vec![(IOName::from("x"), input)])?;
    let Some(ModelOutput::Value(value)) = outputs.first() else {
        anyhow::bail!("expected a rendered sequence output, got {outputs:?}");
    };
    assert_eq!(
        value,
        &json!([
            {"0": 0.1, "1": 0.7, "2": 0.2},
            {"0": 1.0, "1": 0.0, "2": 0.0},
        ])
    );
    Ok(())
}

#[test]
fn zipmap_output_passes_through_the_batch() -> Result<()> {
    let ctx = serving("zipmap.onnx", Hooks::builtin("first-output")?)?;

    let response = ctx.handle_batch(br#"{"samples": [[0.25, 0.5, 0.25], {"x": [[0, 0, 1]]}]}"#)?;
    let predictions: Vec<Value> = response
        .predictions
        .into_iter()
        .map(|p| p.prediction)
        .collect();
    assert_eq!(
        predictions,
        vec![
            json!([{"0": 0.25, "1": 0.5, "2": 0.25}]),
            json!([{"0": 0.0, "1": 0.0, "2": 1.0}]),
        ]
    );
    Ok(())
}
