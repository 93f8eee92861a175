mod artifact;
mod cli;
mod http;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, ServeArgs};
use onnxserve_backend_ort::OrtBackend;
use onnxserve_core::{Backend, BackendModel, Device, ModelArtifact};
use onnxserve_runtime::{ApiInfo, Hooks, ServingContext};
use tracing::{info, Instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            std::env::set_var("RUST_LOG", &args.log);
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .init();

            let span = tracing::info_span!(
                "onnxserved",
                api = %args.api_name,
                workload_id = args.workload_id.as_deref().unwrap_or("-"),
            );
            serve(args).instrument(span).await
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let device = parse_device(&args.device)?;

    let hooks = match args.request_handler.as_deref() {
        Some(name) => Hooks::builtin(name)?,
        None => Hooks::none(),
    };

    let model_path = artifact::resolve_model(&args.model, &args.model_dir, &args.api_name)
        .await
        .context("failed to resolve model")?;
    info!(path = %model_path.display(), "model resolved");

    let mut backend = OrtBackend::new().with_sessions(args.sessions);
    if let Some(threads) = args.intra_threads {
        backend = backend.with_intra_threads(threads);
    }
    let model = backend
        .load(&ModelArtifact::OnnxPath(model_path), device)
        .context("failed to load model")?;
    log_signature(&model);

    let api = ApiInfo {
        id: args.api_id.clone().unwrap_or_else(|| args.api_name.clone()),
        name: args.api_name.clone(),
    };
    let ctx = Arc::new(ServingContext::new(api, Arc::new(model), hooks));
    info!(
        backend = backend.name(),
        hooks = ?ctx.hooks,
        "Serving model: {}",
        args.model
    );

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    info!(addr = %listener.local_addr()?, "onnxserved HTTP listening");

    axum::serve(listener, http::router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("onnxserved stopped");
    Ok(())
}

fn log_signature(model: &impl BackendModel) {
    for input in &model.spec().inputs {
        info!(name = %input.name, engine_type = %input.engine_type, dims = ?input.dims, "model input");
    }
    for output in &model.spec().outputs {
        info!(name = %output.name, engine_type = %output.engine_type, dims = ?output.dims, "model output");
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn parse_device(raw: &str) -> Result<Device> {
    if raw.eq_ignore_ascii_case("cpu") {
        return Ok(Device::Cpu);
    }

    if let Some(rest) = raw.strip_prefix("cuda:") {
        let device_id: u32 = rest.parse().context("invalid cuda device id")?;
        return Ok(Device::Cuda { device_id });
    }

    anyhow::bail!("unsupported device: {raw} (expected cpu or cuda:N)");
}
