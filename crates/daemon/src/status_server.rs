//! HTTP status endpoint.
//!
//! Serves the current [`PipelineStatus`] as JSON on `GET /status`.

use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use thiserror::Error;

use crate::status::{PipelineStatus, SharedStatus};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

async fn get_status(State(status): State<SharedStatus>) -> Json<PipelineStatus> {
    Json(status.read().await.clone())
}

pub fn create_status_router(status: SharedStatus) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .with_state(status)
}

/// Serve the status router on `addr` until the process exits.
pub async fn run_status_server(status: SharedStatus, addr: SocketAddr) -> Result<(), ServerError> {
    let app = create_status_router(status);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Status server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
