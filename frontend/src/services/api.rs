use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::credentials::CredentialStore;
use super::transport::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::error::{ClientError, Result};
use crate::lock;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Outgoing request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Already URL-encoded form fields
    Form(String),
}

/// Parsed response payload
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

impl ResponseBody {
    fn from_response(response: &HttpResponse) -> Self {
        if response.body.trim().is_empty() {
            return ResponseBody::Empty;
        }
        if response.is_json() {
            // The server claimed JSON but sent something else: treat as no body
            return serde_json::from_str(&response.body)
                .map(ResponseBody::Json)
                .unwrap_or(ResponseBody::Empty);
        }
        ResponseBody::Text(response.body.clone())
    }

    /// Deserialize into the expected type; an empty body reads as `null`
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        let decoded = match self {
            ResponseBody::Empty => serde_json::from_value(Value::Null),
            ResponseBody::Json(value) => serde_json::from_value(value),
            ResponseBody::Text(text) => serde_json::from_str(&text),
        };
        decoded.map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Human-readable message for a failed response
fn error_message(response: &HttpResponse, body: &ResponseBody) -> String {
    let from_body = match body {
        ResponseBody::Text(text) => Some(text.clone()),
        ResponseBody::Json(Value::String(text)) => Some(text.clone()),
        ResponseBody::Json(Value::Object(map)) => {
            let text_field = |key: &str| {
                map.get(key)
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
                    .map(str::to_string)
            };
            text_field("detail")
                .or_else(|| text_field("message"))
                .or_else(|| {
                    map.get("detail")
                        .filter(|detail| !detail.is_null() && !detail.is_string())
                        .map(Value::to_string)
                })
                .or_else(|| Some(Value::Object(map.clone()).to_string()))
        }
        ResponseBody::Json(Value::Null) | ResponseBody::Empty => None,
        ResponseBody::Json(other) => Some(other.to_string()),
    };

    from_body.unwrap_or_else(|| {
        if response.status_text.is_empty() {
            format!("Request failed with status {}", response.status)
        } else {
            response.status_text.clone()
        }
    })
}

/// API client for the finance tracker service.
///
/// One instance is shared by the auth and data state. It holds the bearer
/// credential and attaches it to every request; it never changes the
/// credential on its own.
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    token: Mutex<Option<String>>,
}

impl ApiClient {
    /// Create a client, picking up a previously stored credential
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let token = credentials.load().unwrap_or_else(|e| {
            warn!("Could not load stored credential: {}", e);
            None
        });
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            base_url,
            transport,
            credentials,
            token: Mutex::new(token),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    pub fn has_credential(&self) -> bool {
        lock(&self.token).is_some()
    }

    /// Hold and persist a new bearer credential
    pub fn set_credential(&self, token: &str) -> Result<()> {
        self.credentials.store(token)?;
        *lock(&self.token) = Some(token.to_string());
        Ok(())
    }

    /// Forget the credential in memory and in storage.
    ///
    /// The in-memory copy is dropped even if the store fails.
    pub fn clear_credential(&self) -> Result<()> {
        *lock(&self.token) = None;
        self.credentials.clear()
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: RequestBody,
    ) -> Result<ResponseBody> {
        let mut headers = Vec::new();
        let body = match body {
            RequestBody::Empty => None,
            RequestBody::Json(value) => {
                headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()));
                Some(value.to_string())
            }
            RequestBody::Form(encoded) => {
                headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()));
                Some(encoded)
            }
        };
        if let Some(token) = self.credential() {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        let request = HttpRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            headers,
            body,
        };

        debug!("[API] {} request to {}", method, request.url);

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("[API] {} {} failed to reach the server: {}", method, path, e);
                return Err(ClientError::Connectivity);
            }
        };

        let body = ResponseBody::from_response(&response);
        debug!("[API] Response ({}) for {} {}", response.status, method, path);

        if !response.is_success() {
            let message = error_message(&response, &body);
            warn!("[API] {} {} returned {}: {}", method, path, response.status, message);
            return Err(ClientError::Api {
                status: response.status,
                message,
            });
        }

        Ok(body)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(HttpMethod::Get, path, RequestBody::Empty)
            .await?
            .decode()
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_json(body)?;
        self.request(HttpMethod::Post, path, body).await?.decode()
    }

    /// POST a struct as URL-encoded form fields
    pub async fn post_form<B, T>(&self, path: &str, form: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let encoded = serde_urlencoded::to_string(form).map_err(|e| ClientError::Encode(e.to_string()))?;
        self.request(HttpMethod::Post, path, RequestBody::Form(encoded))
            .await?
            .decode()
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_json(body)?;
        self.request(HttpMethod::Put, path, body).await?.decode()
    }

    /// DELETE; whatever the server sends back is ignored
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request(HttpMethod::Delete, path, RequestBody::Empty)
            .await
            .map(|_| ())
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<RequestBody> {
    serde_json::to_value(body)
        .map(RequestBody::Json)
        .map_err(|e| ClientError::Encode(e.to_string()))
}
