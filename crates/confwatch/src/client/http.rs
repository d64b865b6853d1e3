//! HTTP layer: request building, deadlines, status mapping.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;
use url::Url;

use super::executor::RequestExecutor;
use super::helpers::{body_snippet, encode_form, keys_url, wait_url};
use super::transport::{HttpRequest, HttpResponse};
use crate::cache::LongPoll;
use crate::error::{ConfError, ConfResult, STORE_EVENT_INDEX_CLEARED, STORE_TEST_FAILED};
use crate::types::{EtcdSettings, StoreErrorBody, StoreResponse};

/// HTTP backend for store requests (holds executor, endpoint, settings).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) executor: RequestExecutor,
    pub(crate) endpoint: Url,
    pub(crate) settings: EtcdSettings,
}

impl HttpBackend {
    /// Plain read, no long-poll.
    pub(crate) async fn get(&self, key: &str) -> ConfResult<StoreResponse> {
        let url = keys_url(&self.endpoint, key)?;
        debug!(key, url = %url, "GET");
        self.roundtrip(key, HttpRequest::new(Method::GET, url), self.settings.timeout())
            .await
    }

    /// Long-poll read; `after` is the last index already observed.
    pub(crate) async fn wait(
        &self,
        key: &str,
        recursive: bool,
        after: Option<u64>,
    ) -> ConfResult<StoreResponse> {
        let url = wait_url(&self.endpoint, key, recursive, after)?;
        debug!(key, url = %url, "GET (wait)");
        self.roundtrip(
            key,
            HttpRequest::new(Method::GET, url),
            self.settings.watch_timeout(),
        )
        .await
    }

    /// Form-encoded write (PUT for set/CAS/mkdir, POST for ordered append).
    pub(crate) async fn write(
        &self,
        method: Method,
        key: &str,
        params: &[(&str, &str)],
    ) -> ConfResult<StoreResponse> {
        let url = keys_url(&self.endpoint, key)?;
        debug!(key, url = %url, method = %method, "write");
        let request = HttpRequest::new(method, url).with_form(encode_form(params));
        self.roundtrip(key, request, self.settings.timeout()).await
    }

    pub(crate) async fn delete(&self, key: &str) -> ConfResult<StoreResponse> {
        let url = keys_url(&self.endpoint, key)?;
        debug!(key, url = %url, "DELETE");
        self.roundtrip(
            key,
            HttpRequest::new(Method::DELETE, url),
            self.settings.timeout(),
        )
        .await
    }

    async fn roundtrip(
        &self,
        key: &str,
        request: HttpRequest,
        timeout: std::time::Duration,
    ) -> ConfResult<StoreResponse> {
        let response = self.executor.execute(request, timeout).await?;
        interpret(key, response)
    }
}

#[async_trait]
impl LongPoll for HttpBackend {
    async fn long_poll(
        &self,
        key: &str,
        recursive: bool,
        after: Option<u64>,
    ) -> ConfResult<StoreResponse> {
        self.wait(key, recursive, after).await
    }

    async fn fetch(&self, key: &str) -> ConfResult<StoreResponse> {
        self.get(key).await
    }
}

/// Map a raw response to a decoded store response or a classified error.
pub(crate) fn interpret(key: &str, response: HttpResponse) -> ConfResult<StoreResponse> {
    let HttpResponse { status, body } = response;

    match status {
        200..=299 => serde_json::from_str(&body).map_err(|e| ConfError::InvalidResponse {
            message: format!("failed to decode store response: {}", e),
        }),

        404 => Err(ConfError::NoSuchKey {
            key: key.to_string(),
        }),

        _ => match serde_json::from_str::<StoreErrorBody>(&body) {
            Ok(err) if err.error_code == STORE_TEST_FAILED => Err(ConfError::ComparisonFailed {
                key: key.to_string(),
                message: describe(&err),
            }),
            Ok(err) if err.error_code == STORE_EVENT_INDEX_CLEARED => {
                Err(ConfError::IndexCleared {
                    index: err.index,
                    message: describe(&err),
                })
            }
            Ok(err) if (400..500).contains(&status) => Err(ConfError::Client {
                status,
                code: Some(err.error_code),
                message: describe(&err),
            }),
            Ok(err) => Err(ConfError::Service {
                status,
                code: Some(err.error_code),
                message: describe(&err),
            }),
            Err(_) if status == 400 => Err(ConfError::Client {
                status,
                code: None,
                message: generic_message(status, &body),
            }),
            Err(_) => Err(ConfError::Service {
                status,
                code: None,
                message: generic_message(status, &body),
            }),
        },
    }
}

fn describe(err: &StoreErrorBody) -> String {
    match &err.cause {
        Some(cause) if !cause.is_empty() => format!("{} ({})", err.message, cause),
        _ => err.message.clone(),
    }
}

fn generic_message(status: u16, body: &str) -> String {
    let snippet = body_snippet(body);
    if snippet.is_empty() {
        format!("HTTP {}", status)
    } else {
        snippet
    }
}
