//! Blob storage client.

use crate::error::UploadError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::time::Duration;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Out-of-band storage for large content.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Base URL every reference starts with.
    fn base_url(&self) -> &str;

    /// Store `content` as `{path}/{file_name}` and return its URL.
    async fn upload(&self, content: &[u8], path: &str, file_name: &str)
        -> Result<String, UploadError>;
}

/// Storage service speaking the `POST /upload` multipart protocol.
pub struct HttpBlobStore {
    base_url: String,
    token: String,
    http_client: reqwest::Client,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, UploadError> {
        let http_client = reqwest::Client::builder().timeout(UPLOAD_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http_client,
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/upload", self.base_url)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn upload(
        &self,
        content: &[u8],
        path: &str,
        file_name: &str,
    ) -> Result<String, UploadError> {
        let form = Form::new()
            .part(
                "file0",
                Part::bytes(content.to_vec()).file_name(file_name.to_string()),
            )
            .text("path", path.to_string());

        let response = self
            .http_client
            .post(self.upload_url())
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(format!("{}/{}/{}", self.base_url, path, file_name))
    }
}
