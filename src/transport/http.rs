use crate::cache::{DocumentPatch, DocumentStore, DEFAULT_BATCH_LIMIT};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::{Proxy, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use url::Url;

/// REST client for the shared document service.
///
/// Layout:
/// - `GET|PUT|PATCH {base}/collections/{c}/documents/{id}`
/// - `GET {base}/collections/{c}/documents`
/// - `POST {base}/collections/{c}:batchDelete`
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    batch_limit: usize,
}

#[derive(Deserialize)]
struct ListedDocument {
    id: String,
    data: Value,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    documents: Vec<ListedDocument>,
}

#[derive(Deserialize)]
struct BatchDeleteResponse {
    deleted: usize,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(TransportError::from)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::configuration_with_context(
                "document service URL cannot be a base",
                ErrorContext::new()
                    .with_field_path("remote_url")
                    .with_details(base_url.to_string()),
            ));
        }

        // Minimal production-friendly defaults (env-overridable).
        let timeout_secs = env::var("TRUST_CACHE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("TRUST_CACHE_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build().map_err(TransportError::Http)?;

        Ok(Self {
            client,
            base_url,
            token: None,
            batch_limit: DEFAULT_BATCH_LIMIT,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::configuration_with_context(
                    "document service URL cannot be a base",
                    ErrorContext::new().with_field_path("remote_url"),
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn document_url(&self, collection: &str, id: &str) -> Result<Url> {
        self.url(&["collections", collection, "documents", id])
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(TransportError::Http)?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(Error::Remote {
            status: status.as_u16(),
            message,
        })
    }

    async fn expect_found(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::Remote {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let url = self.document_url(collection, id)?;
        let response = self.send(self.request(reqwest::Method::GET, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc = response.json::<Value>().await.map_err(TransportError::Http)?;
        Ok(Some(doc))
    }

    async fn put(&self, collection: &str, id: &str, document: Value) -> Result<()> {
        let url = self.document_url(collection, id)?;
        self.expect_found(self.request(reqwest::Method::PUT, url).json(&document))
            .await?;
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        let url = self.url(&["collections", collection, "documents"])?;
        let response = self.send(self.request(reqwest::Method::GET, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let listed = response
            .json::<ListResponse>()
            .await
            .map_err(TransportError::Http)?;
        Ok(listed
            .documents
            .into_iter()
            .map(|d| (d.id, d.data))
            .collect())
    }

    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<usize> {
        if ids.len() > self.batch_limit {
            return Err(Error::validation_with_context(
                format!("batch of {} exceeds limit {}", ids.len(), self.batch_limit),
                ErrorContext::new().with_source("http_documents"),
            ));
        }
        let url = self.url(&["collections", &format!("{collection}:batchDelete")])?;
        let response = self
            .expect_found(
                self.request(reqwest::Method::POST, url)
                    .json(&json!({ "ids": ids })),
            )
            .await?;
        let body = response
            .json::<BatchDeleteResponse>()
            .await
            .map_err(TransportError::Http)?;
        Ok(body.deleted)
    }

    async fn merge(&self, collection: &str, id: &str, patch: &DocumentPatch) -> Result<()> {
        let url = self.document_url(collection, id)?;
        self.expect_found(self.request(reqwest::Method::PATCH, url).json(patch))
            .await?;
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.batch_limit
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}
