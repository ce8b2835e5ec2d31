use anyhow::Context;
use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;

pub struct ProxyState {
    pub client: Client,
    /// Base URL of the wrapped application, without a trailing slash
    pub upstream: String,
}

impl ProxyState {
    /// Redirects from the wrapped application are passed through, not followed.
    pub fn new(upstream: &str) -> reqwest::Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            upstream: upstream.trim_end_matches('/').to_string(),
        })
    }
}

/// Forward any request to the wrapped application
pub async fn forward(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    match proxy_request(&state, request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(upstream = %state.upstream, error = %format!("{err:#}"), "Upstream request failed");
            (StatusCode::BAD_GATEWAY, "Upstream application unavailable").into_response()
        }
    }
}

async fn proxy_request(state: &ProxyState, request: Request) -> anyhow::Result<Response> {
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.upstream, path_and_query);

    let mut headers = parts.headers;
    if let Some(host) = headers.remove(header::HOST) {
        headers.insert("x-forwarded-host", host);
    }
    strip_hop_by_hop(&mut headers);
    // Keep HTML uncompressed so the head snippet can be injected.
    headers.remove(header::ACCEPT_ENCODING);

    let mut builder = state.client.request(parts.method, &url).headers(headers);
    if body.size_hint().exact() != Some(0) {
        builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let upstream = builder
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    // Streamed through so large downloads never sit in memory.
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::TE,
        header::TRAILER,
        header::UPGRADE,
        header::PROXY_AUTHORIZATION,
        header::PROXY_AUTHENTICATE,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
