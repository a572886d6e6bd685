//! HTTP client abstraction for testability

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};

/// Status line of a completed request; bodies are never inspected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
}

impl HttpResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Body of a long-lived streaming response, read chunk by chunk
#[async_trait]
pub trait StreamBody: Send {
    /// Wait for the next chunk. Returns `Ok(None)` once the server has
    /// closed the stream.
    async fn next_chunk(&mut self) -> crate::Result<Option<Vec<u8>>>;
}

/// A streaming response whose headers have arrived
pub struct StreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Box<dyn StreamBody>,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Abstraction over HTTP client for dependency injection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a GET request that bypasses every cache along the way
    async fn get_uncached(&self, url: &str) -> crate::Result<HttpResponse>;

    /// Open a long-lived GET and return as soon as the response headers arrive
    async fn open_stream(&self, url: &str) -> crate::Result<StreamResponse>;
}

/// Production HTTP client using reqwest
#[derive(Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

struct ReqwestStreamBody {
    url: String,
    response: reqwest::Response,
}

#[async_trait]
impl StreamBody for ReqwestStreamBody {
    async fn next_chunk(&mut self) -> crate::Result<Option<Vec<u8>>> {
        let chunk = self.response.chunk().await.map_err(|e| {
            crate::CamviewError::Stream(format!("Reading {} failed: {}", self.url, e))
        })?;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get_uncached(&self, url: &str) -> crate::Result<HttpResponse> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| crate::CamviewError::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        tracing::debug!("GET {} -> {}", url, status);
        Ok(HttpResponse { status })
    }

    async fn open_stream(&self, url: &str) -> crate::Result<StreamResponse> {
        tracing::debug!("Opening stream {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| crate::CamviewError::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        tracing::debug!("Stream {} -> {} ({:?})", url, status, content_type);
        Ok(StreamResponse {
            status,
            content_type,
            body: Box::new(ReqwestStreamBody {
                url: url.to_string(),
                response,
            }),
        })
    }
}
