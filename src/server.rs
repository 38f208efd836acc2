//! Health endpoint and download access to finished traces

use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use log::info;
use std::net::SocketAddr;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

/// GET /healthz -- liveness probe
async fn healthz() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "ok")
}

/// Build the router: `/healthz` plus static files from `trace_dir`
pub fn router(trace_dir: &Path) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .fallback_service(ServeDir::new(trace_dir))
}

/// Serve until `shutdown` is cancelled
///
/// # Errors
///
/// Returns an error if the listen address cannot be bound or the server
/// fails while running.
pub async fn serve(
    listen: SocketAddr,
    trace_dir: &Path,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(
        "serving traces from {} on http://{}",
        trace_dir.display(),
        listener.local_addr()?
    );

    axum::serve(listener, router(trace_dir))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("http server stopped");
    Ok(())
}
