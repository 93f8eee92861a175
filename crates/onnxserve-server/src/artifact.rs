use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use tracing::info;

/// Resolves a model reference to a local file.
///
/// Remote models are downloaded once to `<model_dir>/<api_name>`; an existing
/// file there is reused as-is.
pub async fn resolve_model(reference: &str, model_dir: &Path, api_name: &str) -> Result<PathBuf> {
    if is_remote(reference) {
        let dest = model_dir.join(api_name);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            info!(path = %dest.display(), "using cached model");
            return Ok(dest);
        }
        download(reference, &dest).await?;
        return Ok(dest);
    }

    let path = PathBuf::from(reference.strip_prefix("file://").unwrap_or(reference));
    ensure!(
        tokio::fs::try_exists(&path).await.unwrap_or(false),
        "model not found at {}",
        path.display()
    );
    Ok(path)
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

async fn download(url: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    info!(%url, path = %dest.display(), "downloading model");
    let bytes = reqwest::get(url)
        .await
        .with_context(|| format!("failed to fetch {url}"))?
        .error_for_status()
        .with_context(|| format!("failed to fetch {url}"))?
        .bytes()
        .await
        .with_context(|| format!("failed to read body of {url}"))?;

    // Write beside the target first so a failed download never looks cached.
    let partial = dest.with_extension("part");
    tokio::fs::write(&partial, &bytes)
        .await
        .with_context(|| format!("failed to write {}", partial.display()))?;
    tokio::fs::rename(&partial, dest)
        .await
        .with_context(|| format!("failed to move model into {}", dest.display()))?;

    info!(bytes = bytes.len(), "model downloaded");
    Ok(())
}
