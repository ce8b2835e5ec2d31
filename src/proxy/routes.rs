use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::tracking::{DownloadTracker, DownloadTrackingLayer};

use super::handlers::{forward, health_check, ProxyState};
use super::middleware::inject_head_snippet;

/// Router that fronts the wrapped application.
///
/// Every request except the health check is forwarded upstream. Download
/// tracking wraps everything, head injection (when a snippet is given) sits
/// between tracking and the forwarder.
pub fn create_proxy_router(
    state: Arc<ProxyState>,
    tracker: Arc<DownloadTracker>,
    head_snippet: Option<String>,
) -> Router {
    let mut router = Router::new()
        .route("/_tracker/health", get(health_check))
        .fallback(forward)
        .with_state(state);

    if let Some(snippet) = head_snippet {
        let snippet: Arc<str> = Arc::from(snippet);
        router = router.layer(middleware::from_fn_with_state(snippet, inject_head_snippet));
    }

    router
        .layer(DownloadTrackingLayer::new(tracker))
        .layer(TraceLayer::new_for_http())
}
