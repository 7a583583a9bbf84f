use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::auth::{ServiceAccountKey, TokenProvider};
use super::{RemoteFile, RemoteFolder};
use crate::config::{DriveConfig, ListingOrder};
use crate::error::{CrmError, Result};

const FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";

const LISTING_FIELDS: &str = "files(id, name, mimeType, modifiedTime)";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

/// Drive v3 client scoped to a service account
pub struct GoogleDrive {
    client: Client,
    tokens: TokenProvider,
    page_size: u32,
    order: ListingOrder,
}

impl GoogleDrive {
    pub fn new(key: ServiceAccountKey, config: &DriveConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CrmError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            tokens: TokenProvider::new(key, client.clone())?,
            client,
            page_size: config.page_size,
            order: config.order,
        })
    }

    /// Build a client from configured credentials, `Ok(None)` when there are none
    pub fn from_config(config: &DriveConfig) -> Result<Option<Self>> {
        match ServiceAccountKey::load(config)? {
            Some(key) => {
                log::info!("Drive credentials loaded for {}", key.client_email);
                Self::new(key, config).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Listing request for one page of the folder
fn listing_url(folder_id: &str, page_size: u32, order: ListingOrder) -> Result<Url> {
    let query = folder_query(folder_id);
    let page_size = page_size.to_string();
    let params = [
        ("q", query.as_str()),
        ("fields", LISTING_FIELDS),
        ("orderBy", order.order_by()),
        ("pageSize", page_size.as_str()),
    ];
    let url = Url::parse_with_params(FILES_ENDPOINT, &params)
        .map_err(|e| CrmError::RemoteListing(format!("Invalid listing URL: {}", e)))?;
    Ok(url)
}

/// Drive search query: non-trashed images and PDFs directly inside the folder
fn folder_query(folder_id: &str) -> String {
    let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "'{}' in parents and trashed = false and (mimeType contains 'image/' or mimeType = 'application/pdf')",
        escaped
    )
}

#[async_trait]
impl RemoteFolder for GoogleDrive {
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        let url = listing_url(folder_id, self.page_size, self.order)?;
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CrmError::RemoteListing(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(CrmError::RemoteListing(format!(
                "Drive API error {}: {}",
                status, body
            )));
        }

        let list: FileList = response
            .json()
            .await
            .map_err(|e| CrmError::RemoteListing(format!("Failed to parse file list: {}", e)))?;

        log::debug!("Listed {} files in folder {}", list.files.len(), folder_id);
        Ok(list.files)
    }

    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>> {
        let mut url = Url::parse(FILES_ENDPOINT)
            .map_err(|e| CrmError::RemoteFetch(format!("Invalid download URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| CrmError::RemoteFetch("Invalid download URL".to_string()))?
            .push(&file.id);
        url.query_pairs_mut().append_pair("alt", "media");

        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| CrmError::RemoteFetch(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CrmError::RemoteFetch(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrmError::RemoteFetch(format!(
                "Drive download of {} failed with {}",
                file.name, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CrmError::RemoteFetch(format!("Failed to read {}: {}", file.name, e)))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_query() {
        assert_eq!(
            folder_query("abc123"),
            "'abc123' in parents and trashed = false and (mimeType contains 'image/' or mimeType = 'application/pdf')"
        );
    }

    #[test]
    fn test_folder_query_escapes_quotes() {
        let query = folder_query(r"it's\odd");
        assert!(query.starts_with(r"'it\'s\\odd' in parents"));
    }

    #[test]
    fn test_listing_url_params() {
        let url = listing_url("abc123", 10, ListingOrder::NewestFirst).unwrap();
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(url.path(), "/drive/v3/files");
        assert_eq!(get("q"), folder_query("abc123"));
        assert_eq!(get("orderBy"), "modifiedTime desc");
        assert_eq!(get("pageSize"), "10");
        assert_eq!(get("fields"), "files(id, name, mimeType, modifiedTime)");

        let url = listing_url("abc123", 5, ListingOrder::OldestFirst).unwrap();
        assert!(url.query_pairs().any(|(k, v)| k == "orderBy" && v == "modifiedTime"));
    }

    #[test]
    fn test_remote_file_deserializes_camel_case() {
        let list: FileList = serde_json::from_str(
            r#"{"files":[{"id":"f1","name":"scan.pdf","mimeType":"application/pdf","modifiedTime":"2024-05-01T10:00:00.000Z"}]}"#,
        )
        .unwrap();
        assert_eq!(list.files.len(), 1);
        assert_eq!(list.files[0].mime_type, "application/pdf");
        assert_eq!(list.files[0].modified_time, "2024-05-01T10:00:00.000Z");

        let empty: FileList = serde_json::from_str("{}").unwrap();
        assert!(empty.files.is_empty());
    }
}
