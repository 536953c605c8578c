//! HTTP client implementation

use std::time::Duration;

use async_trait::async_trait;
use http::{Method, StatusCode};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::errors::OnboardError;

/// A backend call, independent of the HTTP stack that carries it
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Build a GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    /// Build a POST request with a JSON body
    pub fn post<B: Serialize>(path: impl Into<String>, body: &B) -> Result<Self, OnboardError> {
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            body: Some(serde_json::to_value(body)?),
        })
    }
}

/// Status and raw body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, OnboardError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Convert a non-success response into an error value
    pub fn into_error(self) -> OnboardError {
        OnboardError::HttpStatus {
            status: self.status.as_u16(),
            body: self.body,
        }
    }
}

/// Sends one request with an optional bearer credential
#[async_trait]
pub trait HttpSend: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, OnboardError>;
}

/// HTTP client for backend communication
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OnboardError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;

        Ok(Self { client, base_url })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` under the base URL, keeping any base path prefix
    fn url(&self, path: &str) -> Result<Url, OnboardError> {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };

        let mut url = self.base_url.clone();
        let prefix = self.base_url.path().trim_end_matches('/');
        url.set_path(&format!("{}/{}", prefix, path.trim_start_matches('/')));
        url.set_query(query);
        Ok(url)
    }

    /// POST a JSON body without credentials and decode a JSON response
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, OnboardError> {
        let request = ApiRequest::post(path, body)?;
        let response = self.send(&request, None).await?;

        if !response.is_success() {
            error!("HTTP POST {} failed: {} - {}", path, response.status, response.body);
            return Err(response.into_error());
        }

        response.json()
    }
}

#[async_trait]
impl HttpSend for HttpClient {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, OnboardError> {
        let url = self.url(&request.path)?;
        debug!("{} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(ApiResponse { status, body })
    }
}
