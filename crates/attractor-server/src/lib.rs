//! HTTP control plane for launching, inspecting, and cancelling pipeline runs.
//!
//! Each `POST /pipelines` call parses and validates a DOT graph, spawns it on a
//! background task against a fresh [`attractor_pipeline::PipelineExecutor`], and
//! hands back a run id. Pending human-gate questions and cancellation are
//! threaded through a [`attractor_pipeline::WebInterviewer`] and a
//! `CancellationToken` held per run.

mod error;
mod models;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use std::path::PathBuf;

/// Bind and serve the control plane at `addr`, persisting run logs/checkpoints
/// under `logs_root/<run-id>/`.
pub async fn serve(addr: &str, logs_root: PathBuf) -> anyhow::Result<()> {
    let state = AppState::new(logs_root);
    let app = routes::create_router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "attractor-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
