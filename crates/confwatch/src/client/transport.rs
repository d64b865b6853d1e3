//! Transport seam: one HTTP exchange, body fully read.
//!
//! The executor owns deadlines; a transport only sends and reads.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use url::Url;

use crate::error::{ConfError, ConfResult};

/// Content type of write bodies.
pub const CONTENT_TYPE_FORM_ENCODED: &str = "application/x-www-form-urlencoded";

/// User agent sent by [`ReqwestTransport`].
pub const USER_AGENT_VALUE: &str = concat!("confwatch/", env!("CARGO_PKG_VERSION"));

/// A request to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    /// Form-encoded body, if any.
    pub form: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            form: None,
        }
    }

    pub fn with_form(mut self, form: String) -> Self {
        self.form = Some(form);
        self
    }
}

/// A raw response: status plus the complete body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Sends a single request and reads the whole response body.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: HttpRequest) -> ConfResult<HttpResponse>;
}

/// Production transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> ConfResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        // No client-level timeout: the executor enforces per-call deadlines.
        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(|e| ConfError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> ConfResult<HttpResponse> {
        let mut builder = self.client.request(request.method, request.url);
        if let Some(form) = request.form {
            builder = builder
                .header(CONTENT_TYPE, CONTENT_TYPE_FORM_ENCODED)
                .body(form);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        // Headers arrive immediately on a long-poll; a body error means the
        // store recycled the connection while we were waiting.
        let body = response.text().await.map_err(|e| ConfError::Disconnected {
            message: format!("failed to read response body: {}", e),
        })?;

        Ok(HttpResponse { status, body })
    }
}
