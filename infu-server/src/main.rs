use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use hf_hub::api::{tokio::Api, RepoInfo};
use infu_core::{
    AssetLayout, PipelineConfig, PipelineManager, Studio, WorkerLoader, DEFAULT_BASE_MODEL,
    DEFAULT_MODELS_DIR,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod examples;
mod form;
mod page;
mod routes;

use examples::Gallery;
use routes::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about = "Identity-preserving image generation demo server")]
struct Args {
    /// Base diffusion model: a local directory or a hub repo id
    #[arg(long, default_value = DEFAULT_BASE_MODEL)]
    base_model_path: String,

    /// Override for the image encoder used by the identity pipeline
    #[arg(long)]
    clip_encoder_path: Option<PathBuf>,

    /// Root of the identity adapter checkpoints and support assets
    #[arg(long, default_value = DEFAULT_MODELS_DIR)]
    models_dir: PathBuf,

    /// Directory holding examples.json and its images
    #[arg(long, default_value = "./assets/examples")]
    examples_dir: PathBuf,

    /// Pipeline worker base URL
    #[arg(long, default_value = infu_core::worker::DEFAULT_WORKER_URL)]
    worker_url: String,

    /// Port to bind on the loopback address
    #[arg(long, default_value_t = 7860)]
    port: u16,
}

/// Fails early when the base model is visibly missing. A local directory must
/// hold `model_index.json`; a hub repo must list one. Only repo metadata is
/// fetched, so nothing lands in the hub cache. An unreachable hub is only a
/// warning, since the worker may already have the weights.
async fn check_base_model(base_model_path: &str) -> Result<()> {
    let local = Path::new(base_model_path);
    if local.is_dir() {
        if !local.join("model_index.json").is_file() {
            bail!("{} has no model_index.json", local.display());
        }
        info!(path = %local.display(), "using local base model");
        return Ok(());
    }

    let info = match Api::new()?.model(base_model_path.to_string()).info().await {
        Ok(info) => info,
        Err(e) => {
            warn!(repo = base_model_path, "could not query the hub for the base model: {e}");
            return Ok(());
        }
    };
    if !lists_model_index(&info) {
        bail!("base model {base_model_path} has no model_index.json");
    }
    info!(repo = base_model_path, revision = %info.sha, "base model found on the hub");
    Ok(())
}

fn lists_model_index(info: &RepoInfo) -> bool {
    info.siblings
        .iter()
        .any(|sibling| sibling.rfilename == "model_index.json")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    check_base_model(&args.base_model_path).await?;

    let manager = PipelineManager::new(
        WorkerLoader::new(&args.worker_url),
        AssetLayout::new(&args.models_dir),
        &args.base_model_path,
    )
    .with_image_encoder(args.clip_encoder_path.clone());
    let studio = Arc::new(Studio::new(manager));

    // Bring up the default pipeline before accepting requests.
    {
        let studio = studio.clone();
        tokio::task::spawn_blocking(move || studio.prepare(PipelineConfig::default()))
            .await?
            .context("failed to prepare the default pipeline")?;
    }

    let gallery = Gallery::load(&args.examples_dir)?;
    let page = page::render(&gallery)?;
    let state = Arc::new(AppState {
        studio,
        gallery,
        page,
    });

    let app = routes::router(state);

    let bind_address = format!("127.0.0.1:{}", args.port);
    let listener = TcpListener::bind(&bind_address).await?;
    info!("Started server on http://{}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("infu-server-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn repo_info(files: &[&str]) -> RepoInfo {
        let siblings: Vec<_> = files
            .iter()
            .map(|file| serde_json::json!({ "rfilename": file }))
            .collect();
        serde_json::from_value(serde_json::json!({ "siblings": siblings, "sha": "abc123" }))
            .unwrap()
    }

    #[test]
    fn test_repo_listing_needs_model_index() {
        assert!(lists_model_index(&repo_info(&["README.md", "model_index.json"])));
        assert!(!lists_model_index(&repo_info(&["README.md", "flux1-dev.safetensors"])));
    }

    #[tokio::test]
    async fn test_local_base_model_needs_model_index() {
        let dir = scratch_dir("base-model");
        let path = dir.to_str().unwrap();
        assert!(check_base_model(path).await.is_err());

        std::fs::write(dir.join("model_index.json"), "{}").unwrap();
        check_base_model(path).await.unwrap();
    }
}
