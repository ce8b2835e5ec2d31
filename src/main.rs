use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use umami_tracker::config::Config;
use umami_tracker::head;
use umami_tracker::proxy::{create_proxy_router, ProxyState};
use umami_tracker::tracking::DownloadTracker;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let config = Config::from_env().context("invalid analytics configuration")?;
    info!(
        "Loaded configuration (collector: {}, website: {})",
        config.analytics.base_url, config.analytics.website_id
    );

    let tracker = Arc::new(
        DownloadTracker::from_config(&config.analytics)
            .context("failed to build analytics client")?,
    );

    if tracker.tokens().has_credentials() {
        info!("🔐 Analytics events will be sent with a bearer token");
    } else if config.analytics.require_auth {
        info!("🔒 Analytics credentials missing and required - download tracking will be skipped");
    } else {
        info!("🔓 No analytics credentials configured - events will be sent unauthenticated");
    }

    // Built once; every proxied HTML page gets the same markup
    let head_snippet = config.analytics.inject_script.then(|| {
        let snippet = head::head_end(&config.analytics);
        info!("Injecting tracking script into HTML pages: {}", snippet);
        snippet
    });

    let state = Arc::new(
        ProxyState::new(&config.upstream.url).context("failed to build upstream HTTP client")?,
    );
    let app = create_proxy_router(state, tracker, head_snippet);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🚀 Tracking proxy listening on http://{}", addr);
    info!("   - Forwarding to {}", config.upstream.url);

    axum::serve(listener, app).await?;

    Ok(())
}
