//! HTTP object storage client
//!
//! Speaks the bucket/object REST dialect used by common hosted storage
//! services: `POST {base}/object/{bucket}/{key}` with `x-upsert: true` for
//! overwrite, public objects under `{base}/object/public/{bucket}/{key}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use super::{validate_key, ObjectStore, StorageError, StoredObject};

const USER_AGENT: &str = concat!("coursekit-ingest/", env!("CARGO_PKG_VERSION"));

/// Object store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    http_client: reqwest::Client,
    base_url: String,
    bucket: String,
    api_key: Option<String>,
}

impl HttpObjectStore {
    /// `request_timeout` bounds each upload request end to end
    pub fn new(
        base_url: &str,
        bucket: &str,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, key)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_key(key)?;

        let size = bytes.len();
        let mut request = self
            .http_client
            .post(self.object_url(key))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes);
        if let Some(api_key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {}", api_key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(key, content_type, bytes = size, "Uploaded object");

        Ok(StoredObject {
            key: key.to_string(),
            public_url: Some(self.public_url(key)),
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
