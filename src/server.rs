use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Serve the output directory as plain files
///
/// Nothing is shared with the poll loop except the filesystem. A client may
/// briefly see an empty directory while a resync clears it and retries on its
/// next playlist refresh.
pub fn router(root: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(TraceLayer::new_for_http())
}

/// Serve `root` on `0.0.0.0:<port>` until `cancel` fires
pub async fn serve(root: PathBuf, port: u16, cancel: CancellationToken) -> Result<()> {
    let app = router(&root);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;

    tracing::info!("Serving {:?} on http://{}", root, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server terminated unexpectedly")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
