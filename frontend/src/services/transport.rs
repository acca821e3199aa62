//! # HTTP transport
//!
//! The seam between the API client and the network. The client only builds
//! [`HttpRequest`]s and interprets [`HttpResponse`]s; moving bytes is the job
//! of a [`Transport`]:
//!
//! - [`TowerTransport`] (native) drives any `tower::Service` speaking `http`
//!   types. Handing it an `axum::Router` runs the whole client in-process.
//! - [`BrowserTransport`] (wasm32) goes through the browser's fetch API.
//!
//! A transport error means the request never produced a response. Non-success
//! statuses are ordinary responses.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }
}

/// The request never reached the server or never came back
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(not(target_arch = "wasm32"))]
pub use self::tower_transport::TowerTransport;

#[cfg(not(target_arch = "wasm32"))]
mod tower_transport {
    use super::*;
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, Request, Response};
    use tower::{Service, ServiceExt};

    /// Largest response body the client will buffer
    const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

    /// Transport over any `tower::Service` handling `http` requests
    #[derive(Clone)]
    pub struct TowerTransport<S> {
        service: S,
    }

    impl<S> TowerTransport<S> {
        pub fn new(service: S) -> Self {
            Self { service }
        }
    }

    #[async_trait]
    impl<S> Transport for TowerTransport<S>
    where
        S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + Sync + 'static,
        S::Error: fmt::Display + Send,
        S::Future: Send,
    {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut builder = Request::builder()
                .method(request.method.as_str())
                .uri(request.url.as_str());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            let body = match request.body {
                Some(body) => Body::from(body),
                None => Body::empty(),
            };
            let http_request = builder
                .body(body)
                .map_err(|e| TransportError::new(format!("invalid request: {}", e)))?;

            let response = self
                .service
                .clone()
                .oneshot(http_request)
                .await
                .map_err(|e| TransportError::new(e.to_string()))?;

            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let bytes = axum::body::to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
                .await
                .map_err(|e| TransportError::new(format!("failed to read response: {}", e)))?;

            Ok(HttpResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                content_type,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            })
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use self::browser::BrowserTransport;

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::*;
    use gloo::net::http::Request;

    /// Transport over the browser's fetch API
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BrowserTransport;

    #[async_trait(?Send)]
    impl Transport for BrowserTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut builder = match request.method {
                HttpMethod::Get => Request::get(&request.url),
                HttpMethod::Post => Request::post(&request.url),
                HttpMethod::Put => Request::put(&request.url),
                HttpMethod::Delete => Request::delete(&request.url),
            };
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let sent = match request.body {
                Some(body) => {
                    builder
                        .body(body)
                        .map_err(|e| TransportError::new(e.to_string()))?
                        .send()
                        .await
                }
                None => builder.send().await,
            };
            let response = sent.map_err(|e| TransportError::new(e.to_string()))?;

            let status = response.status();
            let status_text = response.status_text();
            let content_type = response.headers().get("content-type");
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::new(e.to_string()))?;

            Ok(HttpResponse {
                status,
                status_text,
                content_type,
                body,
            })
        }
    }
}
