//! Thin request/response surface over the Asset API (C1). All calls are
//! idempotent in intent; transient failures degrade to a soft result
//! (empty list, `false`, `None`) rather than propagating, so a flaky
//! network never poisons the in-memory registry — the scheduler simply
//! re-polls next cycle.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::ApiError;
use crate::models::{Asset, Job, PatchAssetBody, PatchJobBody};

/// Seam between the concrete HTTP client and everything that calls it
/// (scheduler, worker, job processor, heartbeat). Lets tests substitute an
/// in-memory fake without spinning up a server.
#[async_trait]
pub trait AssetApi: Send + Sync {
    async fn list_jobs(&self) -> Vec<Job>;
    async fn patch_job(&self, id: &str, body: PatchJobBody) -> bool;
    async fn fetch_asset(&self, asset_id: &str) -> Option<Asset>;
    async fn fetch_blob(&self, url: &str) -> Result<Vec<u8>, ApiError>;
    async fn patch_asset_content(&self, asset_id: &str, content: String) -> bool;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client should build with a timeout-only configuration");

        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl AssetApi for ApiClient {
    async fn list_jobs(&self) -> Vec<Job> {
        let url = self.url("/api/asset-processing-job");
        let response = match self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(source) => {
                warn!(error = %source, "failed to list jobs, returning empty list");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "list jobs returned non-2xx, returning empty list");
            return Vec::new();
        }

        match response.json::<Vec<Job>>().await {
            Ok(jobs) => jobs,
            Err(source) => {
                warn!(error = %source, "failed to decode job list, returning empty list");
                Vec::new()
            }
        }
    }

    async fn patch_job(&self, id: &str, body: PatchJobBody) -> bool {
        let url = self.url(&format!("/asset-processing-job/{id}"));
        let response = match self
            .http
            .patch(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(source) => {
                warn!(job_id = %id, error = %source, "failed to patch job");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(job_id = %id, status = %response.status(), "patch job returned non-2xx");
            return false;
        }
        true
    }

    async fn fetch_asset(&self, asset_id: &str) -> Option<Asset> {
        let url = self.url(&format!("/asset/{asset_id}"));
        let response = match self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(source) => {
                warn!(asset_id = %asset_id, error = %source, "failed to fetch asset");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(asset_id = %asset_id, status = %response.status(), "fetch asset returned non-2xx");
            return None;
        }

        match response.json::<Asset>().await {
            Ok(asset) => Some(asset),
            Err(source) => {
                warn!(asset_id = %asset_id, error = %source, "failed to decode asset");
                None
            }
        }
    }

    async fn fetch_blob(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let parsed = url::Url::parse(url).map_err(|source| ApiError::InvalidUrl {
            context: "fetch_blob",
            url: url.to_string(),
            source,
        })?;
        if !parsed.has_host() {
            return Err(ApiError::InvalidUrl {
                context: "fetch_blob",
                url: url.to_string(),
                source: url::ParseError::EmptyHost,
            });
        }

        let response = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(|source| ApiError::Network {
                context: "fetch_blob",
                source,
            })?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                context: "fetch_blob",
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| ApiError::Network {
            context: "fetch_blob",
            source,
        })?;
        Ok(bytes.to_vec())
    }

    async fn patch_asset_content(&self, asset_id: &str, content: String) -> bool {
        let url = self.url(&format!("/asset/{asset_id}"));
        let body = PatchAssetBody { content };

        let response = match self
            .http
            .patch(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(source) => {
                warn!(asset_id = %asset_id, error = %source, "failed to patch asset content");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(asset_id = %asset_id, status = %response.status(), "patch asset content returned non-2xx");
            return false;
        }
        true
    }
}
