//! Live — HTTP client for the usage service.
//!
//! - `GET  <base>/api/cdn-data/region/{name}` → 200 `{fileName, region}`, 204 none, 403 forbidden
//! - `POST <base>/api/cdn-data` with a [`UsageBatch`] → 200 on success

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use tracing::debug;

use super::ops::{Checkpoint, RegionCheckpoint, UsageApi};
use super::ApiError;
use crate::aggregate::UsageBatch;
use crate::conf::ApiSettings;

const DATA_PATH: [&str; 2] = ["api", "cdn-data"];

#[derive(Debug, Clone)]
pub struct HttpUsageApi {
    http: reqwest::Client,
    base: Url,
    key: String,
}

impl HttpUsageApi {
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base: base_url(&settings.url)?,
            key: settings.key.clone(),
        })
    }

    /// `<base>/api/cdn-data[/<segment>...]`, each segment percent-encoded.
    fn endpoint(&self, extra: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty();
            segments.extend(DATA_PATH);
            segments.extend(extra);
        }
        Ok(url)
    }

    fn region_endpoint(&self, region: &str) -> Result<Url, ApiError> {
        self.endpoint(&["region", region])
    }

    fn data_endpoint(&self) -> Result<Url, ApiError> {
        self.endpoint(&[])
    }
}

/// Reduce a configured URL to scheme + authority; any path is dropped.
fn base_url(raw: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(raw).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ApiError::InvalidUrl(raw.to_string()));
    }
    url.set_path("");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Map a checkpoint lookup response: 200 carries the checkpoint, 204 means
/// none yet, 403 is an authorization failure.
fn checkpoint_from_response(
    endpoint: &Url,
    region: &str,
    status: StatusCode,
    body: &[u8],
) -> Result<Checkpoint, ApiError> {
    match status {
        StatusCode::NO_CONTENT => Ok(Checkpoint::Fresh),
        StatusCode::FORBIDDEN => Err(ApiError::Forbidden(region.to_string())),
        StatusCode::OK => Ok(serde_json::from_slice::<RegionCheckpoint>(body)?.into()),
        other => Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status: other.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        }),
    }
}

/// Only 200 counts as delivered.
fn post_result(endpoint: &Url, region: &str, status: StatusCode, body: String) -> Result<(), ApiError> {
    match status {
        StatusCode::OK => Ok(()),
        StatusCode::FORBIDDEN => Err(ApiError::Forbidden(region.to_string())),
        other => Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status: other.as_u16(),
            body,
        }),
    }
}

impl UsageApi for HttpUsageApi {
    fn get_checkpoint<'a>(
        &'a self,
        region: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Checkpoint, ApiError>> + Send + 'a>> {
        Box::pin(async move {
            let endpoint = self.region_endpoint(region)?;
            let response = self
                .http
                .get(endpoint.clone())
                .bearer_auth(&self.key)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .send()
                .await?;

            let status = response.status();
            let body = response.bytes().await?;
            debug!("Checkpoint lookup region={} status={} body={}", region, status, String::from_utf8_lossy(&body));

            checkpoint_from_response(&endpoint, region, status, &body)
        })
    }

    fn post_usage<'a>(
        &'a self,
        batch: &'a UsageBatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + 'a>> {
        Box::pin(async move {
            let endpoint = self.data_endpoint()?;
            let response = self
                .http
                .post(endpoint.clone())
                .bearer_auth(&self.key)
                .json(batch)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!("Usage post region={} date={} status={} body={}", batch.region, batch.date, status, body);

            post_result(&endpoint, &batch.region, status, body)
        })
    }
}
