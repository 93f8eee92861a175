use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "onnxserved", version, about = "Single-model ONNX inference server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the model and start the HTTP server
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Name of the API being served
    #[arg(long)]
    pub api_name: String,

    /// Resource id returned as `resource_id` (defaults to the API name)
    #[arg(long)]
    pub api_id: Option<String>,

    /// Model location: a local path, file:// or http(s):// URL
    #[arg(long)]
    pub model: String,

    /// Directory downloaded models are cached in
    #[arg(long, default_value = "/mnt/model")]
    pub model_dir: PathBuf,

    /// Built-in request handler (first-output or argmax)
    #[arg(long)]
    pub request_handler: Option<String>,

    /// Bind host for HTTP
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port for HTTP
    #[arg(long, default_value_t = 8888)]
    pub port: u16,

    /// Log level (RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log: String,

    /// Device for inference (cpu or cuda:N)
    #[arg(long, default_value = "cpu")]
    pub device: String,

    /// ONNX Runtime sessions opened on the model
    #[arg(long, default_value_t = 1)]
    pub sessions: usize,

    /// Intra-op threads per session (ONNX Runtime picks when unset)
    #[arg(long)]
    pub intra_threads: Option<usize>,

    /// Workload id, attached to every log line
    #[arg(long)]
    pub workload_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::parse_from([
            "onnxserved",
            "serve",
            "--api-name",
            "iris",
            "--model",
            "models/identity.onnx",
        ]);
        let Command::Serve(args) = cli.command;
        assert_eq!(args.api_name, "iris");
        assert_eq!(args.api_id, None);
        assert_eq!(args.port, 8888);
        assert_eq!(args.device, "cpu");
        assert_eq!(args.sessions, 1);
        assert_eq!(args.intra_threads, None);
        assert_eq!(args.model_dir, PathBuf::from("/mnt/model"));
    }

    #[test]
    fn engine_tuning_flags() {
        let cli = Cli::parse_from([
            "onnxserved",
            "serve",
            "--api-name",
            "iris",
            "--model",
            "models/identity.onnx",
            "--sessions",
            "4",
            "--intra-threads",
            "2",
        ]);
        let Command::Serve(args) = cli.command;
        assert_eq!(args.sessions, 4);
        assert_eq!(args.intra_threads, Some(2));
    }

    #[test]
    fn model_is_required() {
        let result = Cli::try_parse_from(["onnxserved", "serve", "--api-name", "iris"]);
        assert!(result.is_err());
    }
}
