//! Resource download tracking
//!
//! Requests whose path looks like a resource download are reported to the
//! analytics collector as a `download-resource` event. The wrapped
//! application's response is never affected by the outcome.

pub mod middleware;
pub mod models;
pub mod path;
pub mod tracker;

pub use middleware::{DownloadTracking, DownloadTrackingLayer};
pub use models::{DownloadEvent, DownloadIds, DownloadRequest, TrackingOutcome, DOWNLOAD_EVENT_NAME};
pub use path::{extract_download_ids, matches_download_path};
pub use tracker::DownloadTracker;
