//! Tower middleware that reports resource downloads before handing the
//! request to the wrapped service.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{header, HeaderMap, Request};
use tower::{Layer, Service};

use super::models::DownloadRequest;
use super::path::matches_download_path;
use super::tracker::DownloadTracker;

#[derive(Clone)]
pub struct DownloadTrackingLayer {
    tracker: Arc<DownloadTracker>,
}

impl DownloadTrackingLayer {
    #[must_use]
    pub const fn new(tracker: Arc<DownloadTracker>) -> Self {
        Self { tracker }
    }
}

impl<S> Layer<S> for DownloadTrackingLayer {
    type Service = DownloadTracking<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DownloadTracking {
            inner,
            tracker: Arc::clone(&self.tracker),
        }
    }
}

#[derive(Clone)]
pub struct DownloadTracking<S> {
    inner: S,
    tracker: Arc<DownloadTracker>,
}

impl<S, B> Service<Request<B>> for DownloadTracking<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let path = req.uri().path();
        if !matches_download_path(path) {
            return Box::pin(async move { inner.call(req).await });
        }

        let download = DownloadRequest {
            path: path.to_string(),
            host: header_value(req.headers(), header::HOST),
            user_agent: header_value(req.headers(), header::USER_AGENT),
        };
        let tracker = Arc::clone(&self.tracker);

        Box::pin(async move {
            tracker.track_download(&download).await;
            inner.call(req).await
        })
    }
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
