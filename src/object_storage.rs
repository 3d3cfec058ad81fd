//! Client for the remote image host.
//!
//! Ultrasound uploads must land in object storage before any database
//! write; a submission is never persisted without a stored URL.

use serde::Deserialize;
use thiserror::Error;

use crate::models::UploadedImage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cannot reach object storage at {0}")]
    Connection(String),
    #[error("Image upload timed out after {0}s")]
    Timeout(u64),
    #[error("Object storage error (status {status})")]
    Upstream { status: u16, body: String },
    #[error("Invalid upload request: {0}")]
    Request(String),
    #[error("Cannot parse object storage response: {0}")]
    ResponseParsing(String),
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result of a successful upload: the public URL plus the host-side
/// identifier kept for later deletion/reference.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredObject {
    pub url: String,
    pub storage_id: String,
}

#[derive(Debug)]
pub struct ObjectStorageClient {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ObjectStorageClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    /// Upload raw image bytes into the given folder namespace.
    pub async fn store(
        &self,
        image: &UploadedImage,
        folder: &str,
    ) -> Result<StoredObject, StorageError> {
        let url = format!("{}/upload", self.base_url);
        let part = reqwest::multipart::Part::bytes(image.data.clone())
            .file_name(image.filename.clone())
            .mime_str(&image.content_type)
            .map_err(|e| StorageError::Request(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("folder", folder.to_string());

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    StorageError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    StorageError::Timeout(self.timeout_secs)
                } else {
                    StorageError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| StorageError::ResponseParsing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = ObjectStorageClient::new("https://storage.example.com/", 10);
        assert_eq!(client.base_url, "https://storage.example.com");
    }

    #[test]
    fn stored_object_parses_host_response() {
        let parsed: StoredObject = serde_json::from_str(
            r#"{"url": "https://cdn.example.com/a.jpg", "storage_id": "pcosmart/ultrasound/a"}"#,
        )
        .unwrap();
        assert_eq!(parsed.url, "https://cdn.example.com/a.jpg");
        assert_eq!(parsed.storage_id, "pcosmart/ultrasound/a");
    }

    #[tokio::test]
    async fn unreachable_host_maps_to_connection_error() {
        // Port 1 is never listening; the connect error path must be taken.
        let client = ObjectStorageClient::new("http://127.0.0.1:1", 2);
        let image = UploadedImage {
            data: vec![0xFF, 0xD8],
            filename: "scan.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
        };
        let err = client.store(&image, "pcosmart/ultrasound").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Connection(_) | StorageError::Http(_) | StorageError::Timeout(_)
        ));
    }
}
