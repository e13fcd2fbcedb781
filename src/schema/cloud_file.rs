//! Mapping between local media files and their uploaded cloud blobs.
//!
//! Lifecycle: `uploaded` → `processed` once the observation containing
//! the file has been absorbed into memory; `deleted` is terminal and
//! triggers remote blob deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// Lifecycle state of a cloud file mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudFileStatus {
    /// Uploaded, not yet absorbed into memory.
    Uploaded,
    /// The observation carrying this file has been absorbed.
    Processed,
    /// Scheduled for (or completed) remote deletion. Terminal.
    Deleted,
}

impl CloudFileStatus {
    /// Parses a status string. Unknown values map to
    /// [`CloudFileStatus::Uploaded`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "processed" => Self::Processed,
            "deleted" => Self::Deleted,
            _ => Self::Uploaded,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processed => "processed",
            Self::Deleted => "deleted",
        }
    }
}

/// One local-file ↔ cloud-blob mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudFileMapping {
    /// Prefixed id (`cloud_map_…`).
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Local file path (or synthetic id) that was uploaded.
    pub local_file_id: String,
    /// Provider-side blob name.
    pub cloud_file_id: String,
    /// Provider-side blob URI.
    pub uri: String,
    /// Observation timestamp the file belongs to.
    pub timestamp: String,
    /// Lifecycle state.
    pub status: CloudFileStatus,
    /// Record creation time (UTC).
    pub created_at: DateTime<Utc>,
}

impl CloudFileMapping {
    /// Creates a fresh mapping in the `uploaded` state.
    #[must_use]
    pub fn new(
        organization_id: &str,
        local_file_id: &str,
        cloud_file_id: &str,
        uri: &str,
        timestamp: &str,
    ) -> Self {
        Self {
            id: ids::generate(ids::CLOUD_MAPPING_PREFIX),
            organization_id: organization_id.to_string(),
            local_file_id: local_file_id.to_string(),
            cloud_file_id: cloud_file_id.to_string(),
            uri: uri.to_string(),
            timestamp: timestamp.to_string(),
            status: CloudFileStatus::Uploaded,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            CloudFileStatus::Uploaded,
            CloudFileStatus::Processed,
            CloudFileStatus::Deleted,
        ] {
            assert_eq!(CloudFileStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_new_mapping_starts_uploaded() {
        let m = CloudFileMapping::new("org-1", "/tmp/shot.png", "files/abc", "uri://abc", "t0");
        assert_eq!(m.status, CloudFileStatus::Uploaded);
        assert!(m.id.starts_with("cloud_map_"));
    }
}
