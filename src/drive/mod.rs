//! Remote folder access: list and download the documents the watcher processes.

mod auth;
mod google;

pub use auth::ServiceAccountKey;
pub use google::GoogleDrive;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

/// A file listed in the watched folder
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// RFC 3339 timestamp as reported by the remote service
    pub modified_time: String,
}

/// A cloud folder the watcher can poll.
#[async_trait]
pub trait RemoteFolder: Send + Sync {
    /// Non-trashed image and PDF files in `folder_id`, in the configured order and
    /// capped at the configured page size. Fails with `CrmError::RemoteListing`.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>>;

    /// File contents. Fails with `CrmError::RemoteFetch`.
    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>>;
}
