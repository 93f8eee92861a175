use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use onnxserve_runtime::{RequestError, ServingContext};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

/// Batches are accepted whatever their size; there is no admission control
/// in front of the model.
pub fn router(ctx: Arc<ServingContext>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/{app_name}/{api_name}", post(predict))
        .layer(DefaultBodyLimit::disable())
        .with_state(ctx)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn predict(
    State(ctx): State<Arc<ServingContext>>,
    Path((app_name, api_name)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    debug!(%app_name, %api_name, bytes = body.len(), "predict request");

    // Coercion and inference are CPU-bound; keep them off the reactor.
    match tokio::task::spawn_blocking(move || ctx.handle_batch(&body)).await {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(err)) => request_error_response(err),
        Err(join_err) => {
            error!(error = %join_err, "prediction task did not complete");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

fn request_error_response(err: RequestError) -> Response {
    match err {
        RequestError::MalformedJson => {
            warn!("rejecting request with malformed JSON body");
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        RequestError::PredictionFailed { .. } => {
            (StatusCode::NOT_ACCEPTABLE, err.to_string()).into_response()
        }
    }
}
