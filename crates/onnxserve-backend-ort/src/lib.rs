use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use half::f16;
use onnxserve_core::{
    tensor_to_json, Backend, BackendModel, DType, Device, Element, IOName, JsonElement,
    ModelArtifact, ModelOutput, ModelSpec, Shape, Tensor, TensorSpec,
};
use ort::{
    memory::Allocator,
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session, SessionInputValue,
    },
    tensor::{IntoTensorElementType, PrimitiveTensorElementType, TensorElementType},
    value::{DynValue, DynValueTypeMarker, ValueType},
};
use serde_json::Value as Json;
use tracing::debug;

pub struct OrtBackend {
    sessions: usize,
    intra_threads: Option<usize>,
}

impl OrtBackend {
    pub fn new() -> Self {
        Self {
            sessions: 1,
            intra_threads: None,
        }
    }

    /// Number of sessions to open on the same model file. Requests are
    /// spread round-robin so that concurrent batches don't queue on one lock.
    pub fn with_sessions(mut self, sessions: usize) -> Self {
        self.sessions = sessions.max(1);
        self
    }

    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }
}

impl Default for OrtBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OrtModel {
    spec: ModelSpec,
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
}

impl Backend for OrtBackend {
    type Model = OrtModel;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(&self, artifact: &ModelArtifact, device: Device) -> Result<Self::Model> {
        let ModelArtifact::OnnxPath(path) = artifact;

        let mut sessions = Vec::with_capacity(self.sessions);
        for _ in 0..self.sessions {
            let builder = Session::builder()
                .context("failed to create ORT session builder")?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .context("failed to configure ORT session builder")?;
            let builder = match self.intra_threads {
                Some(threads) => builder
                    .with_intra_threads(threads)
                    .context("failed to set ORT intra-op threads")?,
                None => builder,
            };
            let builder = configure_session_builder(builder, &device)?;

            let session = builder
                .commit_from_file(path)
                .with_context(|| format!("failed to load ONNX model {}", path.display()))?;
            sessions.push(session);
        }

        let first = sessions.first().context("no ORT session created")?;
        let spec = build_model_spec(first);
        debug!(
            sessions = sessions.len(),
            inputs = spec.inputs.len(),
            outputs = spec.outputs.len(),
            "onnx model loaded"
        );

        Ok(OrtModel {
            spec,
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            next_idx: AtomicUsize::new(0),
        })
    }
}

impl BackendModel for OrtModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&self, inputs: Vec<(IOName, Tensor)>) -> Result<Vec<ModelOutput>> {
        let mut ort_inputs = Vec::with_capacity(inputs.len());
        for (name, input) in inputs {
            let value = tensor_to_ort_value(input)
                .with_context(|| format!("failed to build ORT value for input `{name}`"))?;
            ort_inputs.push((name.0, SessionInputValue::from(value)));
        }

        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        // A session that saw a panicked run is still usable.
        let mut session = self.sessions[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let outputs = session.run(ort_inputs)?;
        let mut model_outputs = Vec::with_capacity(outputs.len());
        for (name, value) in outputs.iter() {
            let output = ort_value_to_output(&value)
                .with_context(|| format!("failed to read ORT output `{name}`"))?;
            model_outputs.push(output);
        }

        Ok(model_outputs)
    }
}

fn build_model_spec(session: &Session) -> ModelSpec {
    let inputs = session
        .inputs
        .iter()
        .map(|input| tensor_spec_from_value_type(&input.name, &input.input_type))
        .collect();

    let outputs = session
        .outputs
        .iter()
        .map(|output| tensor_spec_from_value_type(&output.name, &output.output_type))
        .collect();

    ModelSpec { inputs, outputs }
}

fn configure_session_builder(builder: SessionBuilder, device: &Device) -> Result<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => configure_cuda(builder, *device_id),
    }
}

fn configure_cuda(builder: SessionBuilder, device_id: u32) -> Result<SessionBuilder> {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::cuda::CUDAExecutionProvider;
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32)
            .build();
        builder
            .with_execution_providers([ep])
            .context("failed to enable ORT CUDA execution provider")
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = (builder, device_id);
        bail!("CUDA requested but onnxserve-backend-ort was built without the `cuda` feature")
    }
}

/// Non-tensor IO keeps an empty shape; its engine name records what it is.
fn tensor_spec_from_value_type(name: &str, value_type: &ValueType) -> TensorSpec {
    let dims = match value_type {
        ValueType::Tensor { shape, .. } => shape
            .iter()
            .map(|d| if *d < 0 { None } else { Some(*d as usize) })
            .collect(),
        _ => Vec::new(),
    };
    TensorSpec::with_engine_type(name, engine_type_name(value_type), dims)
}

fn engine_type_name(value_type: &ValueType) -> String {
    match value_type {
        ValueType::Tensor { ty, .. } => element_type_name(*ty),
        ValueType::Sequence(inner) => format!("seq({})", engine_type_name(inner)),
        ValueType::Map { key, value } => {
            format!("map({},{})", element_name(*key), element_type_name(*value))
        }
        ValueType::Optional(inner) => format!("optional({})", engine_type_name(inner)),
        #[allow(unreachable_patterns)]
        _ => "unknown".to_string(),
    }
}

fn element_type_name(ty: TensorElementType) -> String {
    format!("tensor({})", element_name(ty))
}

fn element_name(ty: TensorElementType) -> String {
    match ty {
        TensorElementType::Float16 => "float16".to_string(),
        TensorElementType::Float32 => "float".to_string(),
        TensorElementType::Float64 => "double".to_string(),
        TensorElementType::Int8 => "int8".to_string(),
        TensorElementType::Uint8 => "uint8".to_string(),
        TensorElementType::Int16 => "int16".to_string(),
        TensorElementType::Uint16 => "uint16".to_string(),
        TensorElementType::Int32 => "int32".to_string(),
        TensorElementType::Int64 => "int64".to_string(),
        TensorElementType::Uint64 => "uint64".to_string(),
        TensorElementType::Bool => "bool".to_string(),
        TensorElementType::String => "string".to_string(),
        TensorElementType::Bfloat16 => "bfloat16".to_string(),
        other => other.to_string().to_lowercase(),
    }
}

fn ort_element_to_dtype(ty: TensorElementType) -> Result<DType> {
    DType::from_engine_name(&element_type_name(ty)).map_err(Into::into)
}

fn tensor_to_ort_value(tensor: Tensor) -> Result<DynValue> {
    let shape: Vec<usize> = tensor.shape().dims().to_vec();

    let value = match tensor.dtype() {
        DType::F16 => primitive_value::<f16>(shape, &tensor)?,
        DType::F32 => primitive_value::<f32>(shape, &tensor)?,
        DType::F64 => primitive_value::<f64>(shape, &tensor)?,
        DType::I8 => primitive_value::<i8>(shape, &tensor)?,
        DType::U8 => primitive_value::<u8>(shape, &tensor)?,
        DType::I16 => primitive_value::<i16>(shape, &tensor)?,
        DType::U16 => primitive_value::<u16>(shape, &tensor)?,
        DType::I32 => primitive_value::<i32>(shape, &tensor)?,
        DType::I64 => primitive_value::<i64>(shape, &tensor)?,
        DType::U64 => primitive_value::<u64>(shape, &tensor)?,
        DType::Bool => primitive_value::<bool>(shape, &tensor)?,
        DType::String => {
            let data = tensor
                .as_strings()
                .context("string tensor without string storage")?
                .to_vec();
            ort::value::Tensor::from_string_array((shape, data.as_slice()))?.into_dyn()
        }
    };

    Ok(value)
}

fn primitive_value<T>(shape: Vec<usize>, tensor: &Tensor) -> Result<DynValue>
where
    T: Element + PrimitiveTensorElementType + std::fmt::Debug,
{
    let data = tensor.to_vec::<T>()?;
    Ok(ort::value::Tensor::from_array((shape, data))?.into_dyn())
}

/// Tensors stay tensors; sequences and maps are rendered to JSON here,
/// while the engine still owns them.
fn ort_value_to_output(value: &DynValue) -> Result<ModelOutput> {
    match value.dtype() {
        ValueType::Tensor { .. } => Ok(ModelOutput::Tensor(ort_value_to_tensor(value)?)),
        _ => Ok(ModelOutput::Value(ort_value_to_json(value)?)),
    }
}

fn ort_value_to_json(value: &DynValue) -> Result<Json> {
    match value.dtype() {
        ValueType::Tensor { .. } => Ok(tensor_to_json(&ort_value_to_tensor(value)?)?),
        ValueType::Sequence(_) => {
            let allocator = Allocator::default();
            let items = value.try_extract_sequence::<DynValueTypeMarker>(&allocator)?;
            let items = items
                .iter()
                .map(|item| ort_value_to_json(item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Json::Array(items))
        }
        ValueType::Map { key, value: element } => match key {
            TensorElementType::String => map_to_json::<String>(value, *element),
            TensorElementType::Int64 => map_to_json::<i64>(value, *element),
            other => bail!("unsupported map key type {}", element_name(*other)),
        },
        other => bail!("unsupported output type {}", engine_type_name(other)),
    }
}

/// JSON object keys are strings, so integer keys are rendered as text.
fn map_to_json<K>(value: &DynValue, element: TensorElementType) -> Result<Json>
where
    K: IntoTensorElementType + Clone + Hash + Eq + ToString,
{
    match element {
        TensorElementType::Float32 => map_entries::<K, f32>(value),
        TensorElementType::Float64 => map_entries::<K, f64>(value),
        TensorElementType::Int64 => map_entries::<K, i64>(value),
        TensorElementType::Int32 => map_entries::<K, i32>(value),
        other => bail!("unsupported map value type {}", element_name(other)),
    }
}

fn map_entries<K, V>(value: &DynValue) -> Result<Json>
where
    K: IntoTensorElementType + Clone + Hash + Eq + ToString,
    V: PrimitiveTensorElementType + JsonElement,
{
    let entries = value.try_extract_key_values::<K, V>()?;
    Ok(Json::Object(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect(),
    ))
}

fn ort_value_to_tensor(value: &DynValue) -> Result<Tensor> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        bail!("expected a tensor, got {}", engine_type_name(value.dtype()));
    };

    let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
    let shape = Shape::from_slice(&dims);

    let tensor = match ort_element_to_dtype(*ty)? {
        DType::F16 => extract_primitive::<f16>(value, shape)?,
        DType::F32 => extract_primitive::<f32>(value, shape)?,
        DType::F64 => extract_primitive::<f64>(value, shape)?,
        DType::I8 => extract_primitive::<i8>(value, shape)?,
        DType::U8 => extract_primitive::<u8>(value, shape)?,
        DType::I16 => extract_primitive::<i16>(value, shape)?,
        DType::U16 => extract_primitive::<u16>(value, shape)?,
        DType::I32 => extract_primitive::<i32>(value, shape)?,
        DType::I64 => extract_primitive::<i64>(value, shape)?,
        DType::U64 => extract_primitive::<u64>(value, shape)?,
        DType::Bool => extract_primitive::<bool>(value, shape)?,
        DType::String => {
            let array = value.try_extract_string_array()?;
            Tensor::from_strings(shape, array.iter().cloned().collect())?
        }
    };

    Ok(tensor)
}

fn extract_primitive<T>(value: &DynValue, shape: Shape) -> Result<Tensor>
where
    T: Element + PrimitiveTensorElementType + std::fmt::Debug,
{
    let array = value.try_extract_array::<T>()?;
    Ok(Tensor::from_vec(shape, array.iter().copied().collect())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ort_element_names_match_dtype_table() {
        let pairs = [
            (TensorElementType::Float16, DType::F16),
            (TensorElementType::Float32, DType::F32),
            (TensorElementType::Float64, DType::F64),
            (TensorElementType::Int8, DType::I8),
            (TensorElementType::Uint8, DType::U8),
            (TensorElementType::Int16, DType::I16),
            (TensorElementType::Uint16, DType::U16),
            (TensorElementType::Int32, DType::I32),
            (TensorElementType::Int64, DType::I64),
            (TensorElementType::Uint64, DType::U64),
            (TensorElementType::Bool, DType::Bool),
            (TensorElementType::String, DType::String),
        ];
        for (ty, dtype) in pairs {
            assert_eq!(ort_element_to_dtype(ty).unwrap(), dtype);
        }
    }

    #[test]
    fn poisoned_session_keeps_serving() -> Result<()> {
        let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../models/identity_int64.onnx");
        let model = OrtBackend::new().load(&ModelArtifact::OnnxPath(path), Device::Cpu)?;

        let crashed = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _session = model.sessions[0].lock();
                    panic!("engine run panicked");
                })
                .join()
        });
        assert!(crashed.is_err());
        assert!(model.sessions[0].is_poisoned());

        let input = Tensor::from_vec(Shape::scalar(), vec![9i64])?;
        let outputs = model.infer(vec![(IOName::from("x"), input)])?;
        let Some(ModelOutput::Tensor(out)) = outputs.first() else {
            bail!("expected a tensor output");
        };
        assert_eq!(out.to_vec::<i64>()?, vec![9]);
        Ok(())
    }

    #[test]
    fn bfloat16_is_reported_but_unsupported() {
        assert_eq!(
            element_type_name(TensorElementType::Bfloat16),
            "tensor(bfloat16)"
        );
        assert!(ort_element_to_dtype(TensorElementType::Bfloat16).is_err());
    }
}
