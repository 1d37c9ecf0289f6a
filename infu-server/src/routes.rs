use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use infu_core::{GenerationOutcome, PipelineConfig, Presentation, Studio, WorkerLoader};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{
    error::ApiError,
    examples::{ExampleEntry, Gallery},
    form::FormFields,
};

/// Identity images come straight from phone cameras.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub type AppStudio = Studio<WorkerLoader>;

pub struct AppState {
    pub studio: Arc<AppStudio>,
    pub gallery: Gallery,
    pub page: String,
}

#[derive(Serialize)]
struct StatusResponse {
    generating: bool,
    loaded: Option<PipelineConfig>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/generate", post(generate))
        .route("/api/examples", get(list_examples))
        .route("/api/examples/{index}", post(run_example))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.page.clone())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        generating: state.studio.is_generating(),
        loaded: state.studio.loaded(),
    })
}

/// Runs `job` on the studio lane off the async runtime and renders its outcome.
async fn on_lane<F>(studio: &Arc<AppStudio>, job: F) -> Result<Json<Presentation>, ApiError>
where
    F: FnOnce(&AppStudio) -> anyhow::Result<GenerationOutcome> + Send + 'static,
{
    let studio = studio.clone();
    let presentation =
        tokio::task::spawn_blocking(move || job(studio.as_ref()).map(Presentation::from))
            .await?
            .map_err(ApiError::Pipeline)?;
    Ok(Json(presentation))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Presentation>, ApiError> {
    let fields = FormFields::read(multipart).await?;
    let request = tokio::task::spawn_blocking(move || fields.into_request()).await??;
    on_lane(&state.studio, move |studio| studio.generate(&request)).await
}

async fn list_examples(State(state): State<Arc<AppState>>) -> Json<Vec<ExampleEntry>> {
    Json(state.gallery.entries().to_vec())
}

async fn run_example(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<Presentation>, ApiError> {
    let entry = state
        .gallery
        .get(index)
        .cloned()
        .ok_or(ApiError::UnknownExample(index))?;

    let gallery = state.gallery.clone();
    let input = tokio::task::spawn_blocking(move || gallery.input(&entry))
        .await?
        .map_err(ApiError::Internal)?;
    on_lane(&state.studio, move |studio| studio.generate_example(input)).await
}
