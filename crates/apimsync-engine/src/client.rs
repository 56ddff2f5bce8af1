//! Management-service HTTP client
//!
//! Thin wrapper over a shared `reqwest::Client` with the semantics the
//! orchestrators rely on: every request carries the `api-version` query,
//! 404s are representable as `None`/`false` rather than errors, collection
//! listings follow `nextLink` pagination, and deletes can wait for the
//! service to finish asynchronous removal. All calls observe the run's
//! cancellation token.

use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{EngineError, EngineResult};

/// Default management API version sent with every request.
pub const DEFAULT_API_VERSION: &str = "2022-08-01";

/// Interval between polls while waiting for an asynchronous delete.
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum polls while waiting for an asynchronous delete.
const COMPLETION_POLL_LIMIT: u32 = 60;

/// Authenticated client against one management service.
pub struct ApimClient {
    http: Client,
    service_uri: String,
    api_version: String,
    bearer_token: Option<String>,
    cancel: CancellationToken,
}

impl ApimClient {
    /// Create a client for the given service URI.
    pub fn new(service_uri: impl Into<String>) -> EngineResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            service_uri: service_uri.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            bearer_token: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Override the management API version.
    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Attach a bearer token to every request.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Tie every request to a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The service URI requests are issued against.
    pub fn service_uri(&self) -> &str {
        &self.service_uri
    }

    /// GET returning the parsed JSON body; non-success is an error.
    pub async fn get(&self, uri: &str, query: &[(&str, &str)]) -> EngineResult<Value> {
        let response = self.send(Method::GET, uri, query, None).await?;
        let response = self.error_for_status("GET", uri, response).await?;
        Ok(response.json().await?)
    }

    /// GET with optional semantics: 404 becomes `None`.
    pub async fn get_optional(
        &self,
        uri: &str,
        query: &[(&str, &str)],
    ) -> EngineResult<Option<Value>> {
        let response = self.send(Method::GET, uri, query, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.error_for_status("GET", uri, response).await?;
        Ok(Some(response.json().await?))
    }

    /// HEAD existence probe: 404 becomes `false`.
    pub async fn exists(&self, uri: &str) -> EngineResult<bool> {
        let response = self.send(Method::HEAD, uri, &[], None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.error_for_status("HEAD", uri, response).await?;
        Ok(true)
    }

    /// List a collection, following `nextLink` pagination.
    pub async fn list_collection(&self, uri: &str) -> EngineResult<Vec<Value>> {
        let mut items = Vec::new();
        let mut page = self.get(uri, &[]).await?;
        loop {
            if let Some(values) = page.get_mut("value").and_then(Value::as_array_mut) {
                items.append(values);
            }
            let Some(next) = page.get("nextLink").and_then(Value::as_str) else {
                break;
            };
            // nextLink is absolute and carries its own query string
            let next = next.to_string();
            let response = self.send_raw(Method::GET, &next, None).await?;
            let response = self.error_for_status("GET", &next, response).await?;
            page = response.json().await?;
        }
        trace!(uri, count = items.len(), "Listed collection");
        Ok(items)
    }

    /// PUT a JSON body; returns the response body when the service sends one.
    pub async fn put(&self, uri: &str, body: &Value) -> EngineResult<Value> {
        let response = self.send(Method::PUT, uri, &[], Some(body)).await?;
        let response = self.error_for_status("PUT", uri, response).await?;
        Ok(response.json().await.unwrap_or(Value::Null))
    }

    /// PUT with extra query parameters (specification imports).
    pub async fn put_with_query(
        &self,
        uri: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> EngineResult<Value> {
        let response = self.send(Method::PUT, uri, query, Some(body)).await?;
        let response = self.error_for_status("PUT", uri, response).await?;
        Ok(response.json().await.unwrap_or(Value::Null))
    }

    /// DELETE, optionally tolerating 404 and waiting for asynchronous
    /// completion via the `location` header.
    pub async fn delete(
        &self,
        uri: &str,
        ignore_not_found: bool,
        wait_for_completion: bool,
    ) -> EngineResult<()> {
        let response = self.send(Method::DELETE, uri, &[], None).await?;
        if response.status() == StatusCode::NOT_FOUND && ignore_not_found {
            debug!(uri, "Delete target already absent");
            return Ok(());
        }
        let response = self.error_for_status("DELETE", uri, response).await?;

        if wait_for_completion && response.status() == StatusCode::ACCEPTED {
            if let Some(location) = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
            {
                self.wait_for_deletion(location.to_string()).await?;
            }
        }
        Ok(())
    }

    /// Unauthenticated download of an export link.
    pub async fn download(&self, url: &str) -> EngineResult<String> {
        let bare = Client::new();
        let request = bare.get(url).send();
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(EngineError::Cancelled),
            response = request => response?,
        };
        let response = self.error_for_status("GET", url, response).await?;
        Ok(response.text().await?)
    }

    async fn wait_for_deletion(&self, location: String) -> EngineResult<()> {
        for _ in 0..COMPLETION_POLL_LIMIT {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(COMPLETION_POLL_INTERVAL) => {}
            }
            let response = self.send_raw(Method::GET, &location, None).await?;
            match response.status() {
                StatusCode::ACCEPTED => continue,
                StatusCode::NOT_FOUND => return Ok(()),
                status if status.is_success() => return Ok(()),
                _ => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(EngineError::Api {
                        method: "GET",
                        url: location,
                        status,
                        body,
                    });
                }
            }
        }
        Err(EngineError::Api {
            method: "GET",
            url: location,
            status: 202,
            body: "deletion did not complete within the polling window".to_string(),
        })
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> EngineResult<Response> {
        let mut request = self
            .http
            .request(method.clone(), uri)
            .query(&[("api-version", self.api_version.as_str())]);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            response = request.send() => Ok(response?),
        }
    }

    async fn send_raw(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> EngineResult<Response> {
        let mut request = self.http.request(method, url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            response = request.send() => Ok(response?),
        }
    }

    async fn error_for_status(
        &self,
        method: &'static str,
        url: &str,
        response: Response,
    ) -> EngineResult<Response> {
        if response.status().is_success() || response.status() == StatusCode::ACCEPTED {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::Api {
            method,
            url: url.to_string(),
            status,
            body,
        })
    }
}
