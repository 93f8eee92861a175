use std::panic::{catch_unwind, AssertUnwindSafe};

use onnxserve_core::ServeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::{dispatch, ServingContext};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub predictions: Vec<Prediction>,
    pub resource_id: String,
}

/// Why a batch request was rejected as a whole.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Body is not JSON at all.
    #[error("Malformed JSON")]
    MalformedJson,

    /// Top-level validation or one sample failed; `sample` is echoed back.
    #[error("prediction failed for sample: {sample} ({reason})")]
    PredictionFailed {
        sample: Value,
        #[source]
        reason: ServeError,
    },
}

impl ServingContext {
    /// Decodes a `{"samples": [...]}` body and predicts every sample in order.
    ///
    /// All or nothing: the first failing sample aborts the batch and no
    /// partial predictions are returned.
    pub fn handle_batch(&self, body: &[u8]) -> Result<BatchResponse, RequestError> {
        let payload: Value =
            serde_json::from_slice(body).map_err(|_| RequestError::MalformedJson)?;

        let samples = match payload.get("samples") {
            Some(Value::Array(samples)) => samples,
            Some(_) => {
                return Err(self.rejected(
                    &payload,
                    "expected the value of key `samples` to be a list of json objects",
                ))
            }
            None => {
                return Err(self.rejected(&payload, "top level `samples` key not found in request"))
            }
        };

        info!(
            api = %self.api.name,
            "Predicting {}",
            pluralize(samples.len(), "sample", "samples")
        );

        let mut predictions = Vec::with_capacity(samples.len());
        for (idx, sample) in samples.iter().enumerate() {
            info!(sample = idx + 1, raw = %sample, "raw sample");

            let prediction = match self.predict_guarded(sample.clone()) {
                Ok(prediction) => prediction,
                Err(reason) => {
                    error!(
                        api = %self.api.name,
                        sample = idx + 1,
                        raw = %sample,
                        error = %reason,
                        "prediction failed"
                    );
                    return Err(RequestError::PredictionFailed {
                        sample: sample.clone(),
                        reason,
                    });
                }
            };

            info!(sample = idx + 1, %prediction, "prediction");
            predictions.push(Prediction { prediction });
        }

        Ok(BatchResponse {
            predictions,
            resource_id: self.api.id.clone(),
        })
    }

    /// pre-inference hook -> dispatch/coerce -> engine -> post-inference hook.
    pub fn predict(&self, sample: Value) -> Result<Value, ServeError> {
        let input_specs = self.invoker.input_specs();
        let sample = self.hooks.pre_inference(sample, input_specs)?;
        let inputs = dispatch(sample, input_specs)?;
        let result = self.invoker.infer(inputs)?;
        self.hooks.post_inference(result, self.invoker.output_specs())
    }

    /// A panic while handling one sample (typically in a user hook) fails
    /// that sample instead of the worker.
    fn predict_guarded(&self, sample: Value) -> Result<Value, ServeError> {
        catch_unwind(AssertUnwindSafe(|| self.predict(sample))).unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ServeError::Unexpected(format!("panicked: {message}")))
        })
    }

    fn rejected(&self, payload: &Value, reason: &str) -> RequestError {
        error!(api = %self.api.name, payload = %payload, "{reason}");
        RequestError::PredictionFailed {
            sample: payload.clone(),
            reason: ServeError::MalformedRequest(reason.to_string()),
        }
    }
}

fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}
