// fetch.rs - HTTP Access Module
// Thin wrapper over reqwest for the three outbound HTTP calls of /addgif:
// the existence probe, the content-type check (both HEAD) and the full download (GET).
//
// Key Features:
// - AssetHttp trait so the workflow can run against fakes in tests
// - Shared reqwest client with configured timeout and user agent
// - GIF media type check on parsed Content-Type headers
//
// Used by: workflow.rs, main.rs (client construction)

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL `{0}`")]
    InvalidUrl(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Result of a metadata-only request
#[derive(Debug, Clone)]
pub struct HeadResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
}

/// Result of a full download; body is empty unless status is a success
#[derive(Debug, Clone)]
pub struct GetResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait AssetHttp: Send + Sync {
    async fn head(&self, url: &str) -> Result<HeadResponse, FetchError>;
    async fn get(&self, url: &str) -> Result<GetResponse, FetchError>;
}

/// True when a Content-Type header names `image/gif`.
/// Wider than a byte-exact compare: the type is matched case-insensitively and
/// parameters are ignored, so `IMAGE/GIF; charset=binary` passes. A missing or
/// unparseable header never does.
pub fn is_gif_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .map(|parsed| parsed.essence_str().eq_ignore_ascii_case(mime::IMAGE_GIF.essence_str()))
        .unwrap_or(false)
}

// ============================================================================
// REQWEST IMPLEMENTATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ReqwestHttp { client })
    }

    fn parse_url(url: &str) -> Result<reqwest::Url, FetchError> {
        reqwest::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))
    }
}

#[async_trait]
impl AssetHttp for ReqwestHttp {
    async fn head(&self, url: &str) -> Result<HeadResponse, FetchError> {
        let response = self.client.head(Self::parse_url(url)?).send().await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        debug!("[HTTP] HEAD {} -> {} ({:?})", url, response.status(), content_type);

        Ok(HeadResponse {
            status: response.status(),
            content_type,
        })
    }

    async fn get(&self, url: &str) -> Result<GetResponse, FetchError> {
        let response = self.client.get(Self::parse_url(url)?).send().await?;
        let status = response.status();

        if !status.is_success() {
            debug!("[HTTP] GET {} -> {}", url, status);
            return Ok(GetResponse { status, body: Vec::new() });
        }

        let body = response.bytes().await?.to_vec();
        debug!("[HTTP] GET {} -> {} ({} bytes)", url, status, body.len());

        Ok(GetResponse { status, body })
    }
}
