use std::sync::Arc;

use onnxserve_core::BackendModel;

use crate::{Hooks, Invoker};

/// Identity of the API being served.
#[derive(Clone, Debug)]
pub struct ApiInfo {
    pub name: String,
    /// Echoed back as `resource_id` in every successful response.
    pub id: String,
}

/// Everything a request needs, built once at startup and shared read-only
/// (behind an `Arc`) by all concurrent requests.
#[derive(Clone, Debug)]
pub struct ServingContext {
    pub api: ApiInfo,
    pub invoker: Invoker,
    pub hooks: Hooks,
}

impl ServingContext {
    pub fn new(api: ApiInfo, model: Arc<dyn BackendModel>, hooks: Hooks) -> Self {
        Self {
            api,
            invoker: Invoker::new(model),
            hooks,
        }
    }
}
