//! Data models for download tracking

use serde::Serialize;

/// Event name (and title) reported for every resource download
pub const DOWNLOAD_EVENT_NAME: &str = "download-resource";

/// Identifiers pulled out of a download path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadIds {
    pub dataset_id: String,
    pub resource_id: String,
}

/// The parts of an inbound request tracking cares about
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    /// Request path without the query string
    pub path: String,

    /// Value of the Host header
    pub host: Option<String>,

    /// Value of the User-Agent header, forwarded to the collector
    pub user_agent: Option<String>,
}

/// A single resource download, built fresh per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEvent {
    pub hostname: String,
    pub url: String,
    pub website_id: String,
    pub ids: DownloadIds,
}

impl DownloadEvent {
    /// Wire body for `POST /api/send`
    pub fn to_body(&self) -> SendBody<'_> {
        SendBody {
            payload: EventPayload {
                hostname: &self.hostname,
                title: DOWNLOAD_EVENT_NAME,
                url: &self.url,
                website: &self.website_id,
                name: DOWNLOAD_EVENT_NAME,
                data: EventData {
                    dataset_id: &self.ids.dataset_id,
                    resource_id: &self.ids.resource_id,
                },
            },
            kind: "event",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendBody<'a> {
    pub payload: EventPayload<'a>,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EventPayload<'a> {
    pub hostname: &'a str,
    pub title: &'static str,
    pub url: &'a str,
    pub website: &'a str,
    pub name: &'static str,
    pub data: EventData<'a>,
}

#[derive(Debug, Serialize)]
pub struct EventData<'a> {
    #[serde(rename = "dataset-id")]
    pub dataset_id: &'a str,
    #[serde(rename = "resource-id")]
    pub resource_id: &'a str,
}

/// Where a single request ended up in the tracking flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingOutcome {
    /// Path is not a download; nothing was attempted
    NotApplicable,
    /// Event accepted by the collector
    Sent,
    /// Tracking was attempted and abandoned; the error has been logged
    Failed,
}
