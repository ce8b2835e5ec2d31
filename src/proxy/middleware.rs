use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::head::inject_into_html;
use crate::tracking::matches_download_path;

/// Largest HTML page buffered for injection; bigger pages pass through untouched.
pub const MAX_HTML_BYTES: usize = 8 * 1024 * 1024;

/// Insert the tracking snippet into HTML pages rendered by the wrapped application.
///
/// Resource downloads and attachments are files, not pages, and are never rewritten.
pub async fn inject_head_snippet(
    State(snippet): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Response {
    let is_download = matches_download_path(request.uri().path());
    let response = next.run(request).await;
    if is_download || !is_rendered_page(response.headers()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_HTML_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to buffer HTML response for script injection");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    match std::str::from_utf8(&bytes)
        .ok()
        .and_then(|html| inject_into_html(html, &snippet))
    {
        Some(html) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(html))
        }
        None => Response::from_parts(parts, Body::from(bytes)),
    }
}

/// Uncompressed, inline `text/html` small enough to buffer
fn is_rendered_page(headers: &HeaderMap) -> bool {
    let html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));
    let attachment = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|cd| cd.trim_start().to_ascii_lowercase().starts_with("attachment"));
    let oversized = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|len| len.parse::<usize>().ok())
        .is_some_and(|len| len > MAX_HTML_BYTES);

    html && !attachment && !oversized && !headers.contains_key(header::CONTENT_ENCODING)
}
