//! In-process fake of the finance tracker service for tests.
//!
//! An axum router with in-memory users and records, driven through
//! [`TowerTransport`] so no socket is ever opened. Every request is recorded,
//! and a failure can be scheduled for the n-th upcoming request.

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Form, Json, Router,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{Expense, ExpenseCategory, Income, LoginForm, RegisterRequest, User};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::services::api::{ApiClient, DEFAULT_API_URL};
use crate::services::credentials::MemoryCredentialStore;
use crate::services::transport::{HttpRequest, HttpResponse, TowerTransport, Transport, TransportError};

/// What the fake saw, as the service would see it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

struct PlannedFailure {
    remaining: usize,
    status: StatusCode,
    body: String,
}

struct FakeUser {
    profile: User,
    password: String,
}

#[derive(Default)]
struct FakeBackend {
    users: Vec<FakeUser>,
    expenses: Vec<Value>,
    incomes: Vec<Value>,
    next_id: i64,
    failure: Option<PlannedFailure>,
    requests: Vec<RecordedRequest>,
    omit_token: bool,
}

impl FakeBackend {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn add_user(&mut self, email: &str, password: &str, full_name: &str) -> User {
        let profile = User {
            id: self.users.len() as i64 + 1,
            email: email.to_string(),
            full_name: full_name.to_string(),
            is_active: true,
        };
        self.users.push(FakeUser {
            profile: profile.clone(),
            password: password.to_string(),
        });
        profile
    }

    /// Resolve the bearer header to a user id
    fn authorize(&self, headers: &HeaderMap) -> Result<i64, Response> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        self.users
            .iter()
            .map(|user| user.profile.id)
            .find(|id| token == Some(FakeService::token_for(*id).as_str()))
            .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Could not validate credentials"))
    }

    fn records(&mut self, kind: RecordKind) -> &mut Vec<Value> {
        match kind {
            RecordKind::Expense => &mut self.expenses,
            RecordKind::Income => &mut self.incomes,
        }
    }
}

#[derive(Clone, Copy)]
enum RecordKind {
    Expense,
    Income,
}

impl RecordKind {
    fn not_found(&self) -> Response {
        match self {
            RecordKind::Expense => detail(StatusCode::NOT_FOUND, "Expense not found"),
            RecordKind::Income => detail(StatusCode::NOT_FOUND, "Income not found"),
        }
    }

    fn deleted(&self) -> &'static str {
        match self {
            RecordKind::Expense => "Expense deleted successfully",
            RecordKind::Income => "Income deleted successfully",
        }
    }
}

type Backend = Arc<Mutex<FakeBackend>>;

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn owned_by(record: &Value, user_id: i64, id: i64) -> bool {
    record["id"] == id && record["user_id"] == user_id
}

#[derive(Clone, Default)]
pub struct FakeService {
    backend: Backend,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_for(user_id: i64) -> String {
        format!("test-token-{}", user_id)
    }

    pub fn with_user(self, email: &str, password: &str, full_name: &str) -> Self {
        self.backend.lock().unwrap().add_user(email, password, full_name);
        self
    }

    /// Token endpoint answers without an `access_token`
    pub fn omit_tokens(&self) {
        self.backend.lock().unwrap().omit_token = true;
    }

    /// Fail the request `skip` places ahead (0 = the very next one)
    pub fn fail_request(&self, skip: usize, status: u16, body: &str) {
        self.backend.lock().unwrap().failure = Some(PlannedFailure {
            remaining: skip,
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        });
    }

    pub fn fail_next(&self, status: u16, body: &str) {
        self.fail_request(0, status, body);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.backend.lock().unwrap().requests.clone()
    }

    /// Store an expense directly; `date` is sent back exactly as given
    pub fn seed_expense(&self, user_id: i64, amount: f64, category: ExpenseCategory, date: &str) -> Expense {
        let mut backend = self.backend.lock().unwrap();
        let record = json!({
            "id": backend.allocate_id(),
            "amount": amount,
            "category": category.as_str(),
            "description": null,
            "date": date,
            "user_id": user_id,
        });
        backend.expenses.push(record.clone());
        serde_json::from_value(record).unwrap()
    }

    /// Store an income directly; `date` is sent back exactly as given
    pub fn seed_income(&self, user_id: i64, amount: f64, source: &str, date: &str) -> Income {
        let mut backend = self.backend.lock().unwrap();
        let record = json!({
            "id": backend.allocate_id(),
            "amount": amount,
            "source": source,
            "description": null,
            "date": date,
            "is_recurring": false,
            "frequency": null,
            "user_id": user_id,
        });
        backend.incomes.push(record.clone());
        serde_json::from_value(record).unwrap()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/auth/token", post(issue_token))
            .route("/auth/register", post(register))
            .route("/auth/me", get(profile))
            .route("/expenses", get(list_expenses).post(create_expense))
            .route("/expenses/:id", put(update_expense).delete(delete_expense))
            .route("/income", get(list_incomes).post(create_income))
            .route("/income/:id", put(update_income).delete(delete_income))
            .layer(middleware::from_fn_with_state(self.backend.clone(), record_request))
            .with_state(self.backend.clone())
    }

    pub fn transport(&self) -> TowerTransport<Router> {
        TowerTransport::new(self.router())
    }

    pub fn api_client(&self) -> Arc<ApiClient> {
        Arc::new(ApiClient::new(
            DEFAULT_API_URL,
            Arc::new(self.transport()),
            Arc::new(MemoryCredentialStore::new()),
        ))
    }

    /// Client that starts out holding `token`
    pub fn api_client_with_token(&self, token: &str) -> Arc<ApiClient> {
        Arc::new(ApiClient::new(
            DEFAULT_API_URL,
            Arc::new(self.transport()),
            Arc::new(MemoryCredentialStore::with_token(token)),
        ))
    }

    /// Client whose `/expenses` and `/income` responses arrive `delay` late
    pub fn delayed_api_client(&self, delay: Duration) -> Arc<ApiClient> {
        Arc::new(ApiClient::new(
            DEFAULT_API_URL,
            Arc::new(DelayedTransport {
                inner: self.transport(),
                delay,
            }),
            Arc::new(MemoryCredentialStore::new()),
        ))
    }

    /// Client whose every request fails before reaching a server
    pub fn unreachable_api_client() -> Arc<ApiClient> {
        let refused = tower::service_fn(|_request: Request| async {
            Err::<Response, _>(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))
        });
        Arc::new(ApiClient::new(
            DEFAULT_API_URL,
            Arc::new(TowerTransport::new(refused)),
            Arc::new(MemoryCredentialStore::new()),
        ))
    }
}

/// Holds back data responses so a test can act while they are in flight.
/// The service has already handled the request when the delay starts.
struct DelayedTransport<T> {
    inner: T,
    delay: Duration,
}

#[async_trait]
impl<T: Transport> Transport for DelayedTransport<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let delayed = ["/expenses", "/income"]
            .iter()
            .any(|path| request.url.contains(path));
        let response = self.inner.send(request).await;
        if delayed {
            tokio::time::sleep(self.delay).await;
        }
        response
    }
}

async fn record_request(State(backend): State<Backend>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let header_value = |name: header::HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    let planned = {
        let mut backend = backend.lock().unwrap();
        backend.requests.push(RecordedRequest {
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            content_type: header_value(header::CONTENT_TYPE),
            authorization: header_value(header::AUTHORIZATION),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        });

        let due = match backend.failure.as_mut() {
            Some(failure) if failure.remaining > 0 => {
                failure.remaining -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if due {
            backend.failure.take()
        } else {
            None
        }
    };

    if let Some(failure) = planned {
        return match serde_json::from_str::<Value>(&failure.body) {
            Ok(value) => (failure.status, Json(value)).into_response(),
            Err(_) => (failure.status, failure.body).into_response(),
        };
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn issue_token(State(backend): State<Backend>, Form(form): Form<LoginForm>) -> impl IntoResponse {
    let backend = backend.lock().unwrap();
    let user = backend
        .users
        .iter()
        .find(|user| user.profile.email == form.username && user.password == form.password);

    match user {
        Some(_) if backend.omit_token => Json(json!({ "token_type": "bearer" })).into_response(),
        Some(user) => Json(json!({
            "access_token": FakeService::token_for(user.profile.id),
            "token_type": "bearer",
        }))
        .into_response(),
        None => detail(StatusCode::UNAUTHORIZED, "Incorrect email or password"),
    }
}

async fn register(State(backend): State<Backend>, Json(request): Json<RegisterRequest>) -> impl IntoResponse {
    let mut backend = backend.lock().unwrap();
    if backend.users.iter().any(|user| user.profile.email == request.email) {
        return detail(StatusCode::BAD_REQUEST, "Email already registered");
    }
    let user = backend.add_user(&request.email, &request.password, &request.full_name);
    (StatusCode::CREATED, Json(user)).into_response()
}

async fn profile(State(backend): State<Backend>, headers: HeaderMap) -> impl IntoResponse {
    let backend = backend.lock().unwrap();
    match backend.authorize(&headers) {
        Ok(id) => {
            let user = backend.users.iter().find(|user| user.profile.id == id);
            Json(user.map(|user| user.profile.clone())).into_response()
        }
        Err(response) => response,
    }
}

fn list(backend: &Backend, headers: &HeaderMap, kind: RecordKind) -> Response {
    let mut backend = backend.lock().unwrap();
    let user_id = match backend.authorize(headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let records: Vec<Value> = backend
        .records(kind)
        .iter()
        .filter(|record| record["user_id"] == user_id)
        .cloned()
        .collect();
    Json(records).into_response()
}

fn create(backend: &Backend, headers: &HeaderMap, kind: RecordKind, mut body: Value) -> Response {
    let mut backend = backend.lock().unwrap();
    let user_id = match backend.authorize(headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let id = backend.allocate_id();
    if let Some(fields) = body.as_object_mut() {
        fields.insert("id".to_string(), json!(id));
        fields.insert("user_id".to_string(), json!(user_id));
        if let RecordKind::Income = kind {
            fields.entry("is_recurring").or_insert(json!(false));
            fields.entry("frequency").or_insert(Value::Null);
        }
    }
    backend.records(kind).push(body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

fn update(backend: &Backend, headers: &HeaderMap, kind: RecordKind, id: i64, body: Value) -> Response {
    let mut backend = backend.lock().unwrap();
    let user_id = match backend.authorize(headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(record) = backend
        .records(kind)
        .iter_mut()
        .find(|record| owned_by(record, user_id, id))
    else {
        return kind.not_found();
    };
    if let (Some(fields), Some(changes)) = (record.as_object_mut(), body.as_object()) {
        for (key, value) in changes {
            fields.insert(key.clone(), value.clone());
        }
    }
    Json(record.clone()).into_response()
}

fn remove(backend: &Backend, headers: &HeaderMap, kind: RecordKind, id: i64) -> Response {
    let mut backend = backend.lock().unwrap();
    let user_id = match backend.authorize(headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let records = backend.records(kind);
    let before = records.len();
    records.retain(|record| !owned_by(record, user_id, id));
    if records.len() == before {
        return kind.not_found();
    }
    Json(json!({ "message": kind.deleted() })).into_response()
}

async fn list_expenses(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    list(&backend, &headers, RecordKind::Expense)
}

async fn create_expense(State(backend): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    create(&backend, &headers, RecordKind::Expense, body)
}

async fn update_expense(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    update(&backend, &headers, RecordKind::Expense, id, body)
}

async fn delete_expense(State(backend): State<Backend>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    remove(&backend, &headers, RecordKind::Expense, id)
}

async fn list_incomes(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    list(&backend, &headers, RecordKind::Income)
}

async fn create_income(State(backend): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    create(&backend, &headers, RecordKind::Income, body)
}

async fn update_income(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    update(&backend, &headers, RecordKind::Income, id, body)
}

async fn delete_income(State(backend): State<Backend>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    remove(&backend, &headers, RecordKind::Income, id)
}
