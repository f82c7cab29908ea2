//! HTTP control plane.
//!
//! A loopback JSON API over the engine: the CLI spawns it in-process, makes
//! one call, and shuts down with the process. Every capability of the binary
//! is reachable here.

mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::Router;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::sequential::RunDeps;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Project directory every operation runs against.
    pub cwd: PathBuf,
    pub deps: RunDeps,
}

impl AppState {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        let deps = RunDeps::production(&cwd);
        Self { cwd, deps }
    }

    pub fn with_deps(cwd: impl Into<PathBuf>, deps: RunDeps) -> Self {
        Self {
            cwd: cwd.into(),
            deps,
        }
    }
}

/// Build the `/v1` router.
pub fn router(state: AppState) -> Router {
    routes::api_router(state)
}

/// Bind an ephemeral loopback port and serve until the process exits.
pub async fn serve(state: AppState) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .context("bind control plane listener")?;
    let addr = listener.local_addr().context("local addr")?;
    info!(%addr, "control plane listening");

    let app = router(state);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(%err, "control plane stopped");
        }
    });
    Ok((addr, handle))
}
