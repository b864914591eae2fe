//! GCS — live object store over the Google Cloud Storage JSON API.
//!
//! Listing maps 1:1 onto `objects.list` (`prefix`, `delimiter`,
//! `startOffset`, `endOffset`), following `nextPageToken` until the
//! requested limit is reached. Downloads use `alt=media` and stream the body.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, trace};

use super::ops::{ListQuery, Listing, ObjectBody, ObjectStore};
use super::StorageError;
use crate::conf::StorageSettings;

const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectsPage {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
}

#[derive(Debug, Clone)]
pub struct GcsStore {
    http: reqwest::Client,
    endpoint: Url,
    bucket: String,
    access_token: Option<String>,
}

impl GcsStore {
    pub fn new(settings: &StorageSettings, bucket: &str) -> Result<Self, StorageError> {
        let endpoint = Url::parse(&settings.endpoint)
            .map_err(|e| StorageError::Request(format!("invalid endpoint {}: {}", settings.endpoint, e)))?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.list_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            bucket: bucket.to_string(),
            access_token: settings.access_token.clone().filter(|t| !t.is_empty()),
        })
    }

    /// `<endpoint>/storage/v1/b/<bucket>/o[/<object>]`, each segment percent-encoded.
    fn objects_url(&self, object: Option<&str>) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::Request(format!("endpoint cannot be a base: {}", self.endpoint)))?;
            segments.pop_if_empty();
            segments.extend(["storage", "v1", "b", self.bucket.as_str(), "o"]);
            if let Some(name) = object {
                segments.push(name);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn list_page(&self, query: &ListQuery, page_token: Option<&str>, page_size: usize) -> Result<ObjectsPage, StorageError> {
        let mut params: Vec<(&str, String)> = vec![
            ("prefix", query.prefix.clone()),
            ("maxResults", page_size.to_string()),
            ("fields", "items(name),prefixes,nextPageToken".to_string()),
        ];
        if let Some(d) = &query.delimiter {
            params.push(("delimiter", d.clone()));
        }
        if let Some(start) = &query.start_offset {
            params.push(("startOffset", start.clone()));
        }
        if let Some(end) = &query.end_offset {
            params.push(("endOffset", end.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let url = self.objects_url(None)?;
        let response = self.authorize(self.http.get(url).query(&params)).send().await?;
        let body = check_status(response, &query.prefix).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Map HTTP failures onto storage errors; pass successful responses through.
async fn check_status(response: reqwest::Response, subject: &str) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => StorageError::NotFound(subject.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::PermissionDenied(subject.to_string()),
        _ => StorageError::Status {
            status: status.as_u16(),
            body,
        },
    })
}

impl ObjectStore for GcsStore {
    fn list<'a>(
        &'a self,
        query: &'a ListQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Listing, StorageError>> + Send + 'a>> {
        Box::pin(async move {
            let mut listing = Listing::default();
            let mut page_token: Option<String> = None;

            loop {
                let remaining = query
                    .limit
                    .map(|l| l.saturating_sub(listing.objects.len() + listing.prefixes.len()));
                if remaining == Some(0) {
                    break;
                }
                let page_size = remaining.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);

                let page = self.list_page(query, page_token.as_deref(), page_size).await?;
                trace!(
                    "Listed page prefix={} objects={} prefixes={}",
                    query.prefix,
                    page.items.len(),
                    page.prefixes.len()
                );
                listing.prefixes.extend(page.prefixes);
                listing.objects.extend(page.items.into_iter().map(|o| o.name));

                match page.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => break,
                }
            }

            if let Some(limit) = query.limit {
                listing.prefixes.truncate(limit);
                listing.objects.truncate(limit.saturating_sub(listing.prefixes.len()));
            }
            debug!(
                "Listing prefix={} returned {} objects, {} prefixes",
                query.prefix,
                listing.objects.len(),
                listing.prefixes.len()
            );
            Ok(listing)
        })
    }

    fn fetch<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectBody, StorageError>> + Send + 'a>> {
        Box::pin(async move {
            let mut url = self.objects_url(Some(name))?;
            url.query_pairs_mut().append_pair("alt", "media");

            let response = self.authorize(self.http.get(url)).send().await?;
            let response = check_status(response, name).await?;
            let body: ObjectBody = Box::pin(response.bytes_stream().map_err(StorageError::from));
            Ok(body)
        })
    }
}
