//! HTTP transport for report delivery

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

/// Request timeout for collection calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Header carrying the debug session validation token
pub const VALIDATION_TOKEN_HEADER: &str = "X-Adobe-AEP-Validation-Token";

/// Outgoing JSON POST
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn post_json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds the validation token when a debug integration id is configured
    pub fn with_validation_token(self, integration_id: Option<&str>) -> Self {
        match integration_id.filter(|id| !id.is_empty()) {
            Some(id) => self.with_header(VALIDATION_TOKEN_HEADER, id),
            None => self,
        }
    }
}

/// Response status and the `Location` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub location: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turns a non-2xx status into [`Error::Http`]
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Http { status: self.status })
        }
    }
}

/// Delivers reports to the collection backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one POST. Transport failures are errors, any HTTP status is a response.
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by reqwest
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .header(CONTENT_TYPE, "application/json");

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::ConnectionTimeout
            } else {
                Error::Network(e)
            }
        })?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        debug!(status, location = ?location, "Collection response");
        Ok(HttpResponse { status, location })
    }
}
