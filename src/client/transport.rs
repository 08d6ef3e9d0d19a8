//! HTTP transport abstraction
//!
//! The gateway talks to the server only through [`Transport`], so the refresh
//! coordination can be exercised against a scripted backend. [`HttpTransport`]
//! is the reqwest implementation; its cookie jar holds the refresh cookie.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::cookie::{CookieStore, Jar};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::error::ClientError;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Endpoints that must never go through bearer attachment or refresh
const AUTH_ENDPOINTS: [&str; 4] = [LOGIN_PATH, REGISTER_PATH, REFRESH_PATH, LOGOUT_PATH];

/// Whether `path` is one of the session endpoints
pub fn is_auth_endpoint(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    AUTH_ENDPOINTS.contains(&path)
}

/// An outbound API request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the server root, starting with `/`
    pub path: String,
    pub body: Option<Value>,
    /// Access token sent as `Authorization: Bearer`
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            body,
            ..Self::new(Method::POST, path)
        }
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

/// A response with its JSON body (`Value::Null` when empty)
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Server-provided `message`, falling back to the status code
    pub fn message(&self) -> String {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_value(self.body.clone()).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Turn a non-2xx response into `ClientError::Status`
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::Status {
                status: self.status,
                message: self.message(),
            })
        }
    }
}

/// Sends requests to the auth server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dispatch `request`. Non-2xx statuses are returned as responses, not errors.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError>;
}

/// reqwest transport with an in-memory cookie jar
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .build()?;

        Ok(Self {
            client,
            jar,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The `Cookie` header the jar would send to `path`
    pub fn cookie_header(&self, path: &str) -> Option<String> {
        let url = reqwest::Url::parse(&self.url(path)).ok()?;
        self.jar
            .cookies(&url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut builder = self.client.request(request.method.clone(), self.url(&request.path));
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        tracing::trace!("{} {} -> {}", request.method, request.path, status);
        Ok(ApiResponse { status, body })
    }
}
