//! Recognising download URLs and pulling ids out of them.
//!
//! Download URLs look like `/dataset/{dataset_id}/resource/{resource_id}/download/{filename}`.
//! Recognition is a loose prefix/substring test; extraction is stricter and
//! rejects paths whose `dataset` and `resource` markers are not where the ids
//! are read from.

use super::models::DownloadIds;
use crate::error::{TrackerError, TrackerResult};

const DATASET_PREFIX: &str = "/dataset";
const RESOURCE_MARKER: &str = "/resource/";
const DOWNLOAD_MARKER: &str = "/download/";

pub fn matches_download_path(path: &str) -> bool {
    path.starts_with(DATASET_PREFIX)
        && path.contains(RESOURCE_MARKER)
        && path.contains(DOWNLOAD_MARKER)
}

/// Read the dataset id (segment 2) and resource id (segment 4).
pub fn extract_download_ids(path: &str) -> TrackerResult<DownloadIds> {
    let segments: Vec<&str> = path.split('/').collect();

    let malformed = || TrackerError::MalformedPath {
        path: path.to_string(),
    };

    if segments.get(1) != Some(&"dataset") || segments.get(3) != Some(&"resource") {
        return Err(malformed());
    }

    let dataset_id = segments.get(2).filter(|s| !s.is_empty()).ok_or_else(malformed)?;
    let resource_id = segments.get(4).filter(|s| !s.is_empty()).ok_or_else(malformed)?;

    Ok(DownloadIds {
        dataset_id: (*dataset_id).to_string(),
        resource_id: (*resource_id).to_string(),
    })
}
