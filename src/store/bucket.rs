use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::{ObjectStore, ObjectStoreError};

/// Storage-API bucket client. Uploads overwrite in place (`x-upsert`), so
/// the published artifact is always the latest cycle's.
pub struct BucketStore {
    client: reqwest::Client,
    endpoint: Url,
    service_key: String,
}

impl BucketStore {
    pub fn new(base_url: &str, bucket: &str, service_key: &str) -> Result<Self, ObjectStoreError> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let endpoint = Url::parse(&base)
            .and_then(|u| u.join(&format!("storage/v1/object/{}/", bucket)))
            .map_err(|e| ObjectStoreError::Upload(format!("invalid storage url: {}", e)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            service_key: service_key.to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for BucketStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let url = self
            .endpoint
            .join(path)
            .map_err(|e| ObjectStoreError::Upload(format!("invalid object path: {}", e)))?;

        let size = bytes.len();
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Upload(format!(
                "status {}: {}",
                status, body
            )));
        }

        debug!("Uploaded {} ({} bytes)", path, size);
        Ok(())
    }
}
