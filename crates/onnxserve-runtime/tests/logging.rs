mod support;

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use onnxserve_core::{DType, TensorSpec};
use onnxserve_runtime::Hooks;

use support::context;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn samples_and_predictions_log_at_info() -> Result<()> {
    let logs = Captured::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let ctx = context(vec![TensorSpec::new("x", DType::I64, vec![])], Hooks::none());
    tracing::subscriber::with_default(subscriber, || {
        ctx.handle_batch(br#"{"samples": [{"x": 41}]}"#)
    })?;

    let text = String::from_utf8(logs.0.lock().expect("log buffer").clone())?;
    assert!(text.contains("Predicting 1 sample"), "{text}");
    assert!(text.contains(r#"raw sample sample=1 raw={"x":41}"#), "{text}");
    assert!(text.contains("prediction sample=1 prediction=[41]"), "{text}");
    Ok(())
}
