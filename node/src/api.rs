//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the registry over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! The calling account is read from the `x-caller` header. Authenticating
//! that header (signature checks, sessions) happens upstream of this node.
//!
//! ## Endpoints
//!
//! | Method | Path                                      | Description                    |
//! |--------|-------------------------------------------|--------------------------------|
//! | GET    | `/health`                                 | Liveness probe                 |
//! | GET    | `/status`                                 | Admin and event height         |
//! | POST   | `/rpc`                                    | JSON-RPC 2.0 gateway           |
//! | GET    | `/ws`                                     | Live committed events          |
//! | GET    | `/roles/:account`                         | Role of an account             |
//! | PUT    | `/roles/:account`                         | Assign a role (admin)          |
//! | POST   | `/credentials/:subject`                   | Issue a credential (issuer)    |
//! | GET    | `/credentials/:subject`                   | All credentials (subject)      |
//! | GET    | `/credentials/:subject/public`            | Public credentials             |
//! | GET    | `/credentials/:subject/:index`            | One credential                 |
//! | POST   | `/credentials/:subject/:index/revoke`     | Revoke (issuer)                |
//! | POST   | `/credentials/:subject/:index/verifiers`  | Grant a verifier (subject)     |
//! | GET    | `/credentials/:subject/:index/verify`     | Verify one credential          |
//! | POST   | `/verify`                                 | Batch verification             |
//! | GET    | `/events`                                 | Event log query                |
//! | GET    | `/stats`                                  | Aggregates replayed from events |
//!
//! ## Errors
//!
//! Failures return `{"error": "...", "kind": "..."}` with status 403 for
//! `unauthorized`, 404 for `invalid_index`, 400 for `invalid_argument`,
//! 401 for `missing_caller` and 500 for `storage`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, Request, State,
    },
    http::{HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use credreg_contracts::identity_registry::{NewCredential, RegistryError};
use credreg_contracts::ledger::{Ledger, LedgerError};
use credreg_protocol::config::{CALLER_HEADER, MAX_BATCH_VERIFICATIONS, MAX_EVENT_PAGE_SIZE};
use credreg_protocol::credential::{CredentialRecord, Verification};
use credreg_protocol::events::{EventFilter, EventKind, EventRecord, RegistryStats};
use credreg_protocol::identity::{AccountId, AccountIdError, RequestContext, Role, UnknownRole};
use credreg_protocol::storage::RegistryStore;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// The ledger as served by the node. The store is chosen at startup.
pub type SharedLedger = Arc<Ledger<Arc<dyn RegistryStore>>>;

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The registry.
    pub ledger: SharedLedger,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Records the outcome of a ledger call and converts its error.
    fn observe<T>(&self, op: &'static str, result: Result<T, LedgerError>) -> Result<T, ApiError> {
        match result {
            Ok(value) => {
                self.metrics.calls_committed_total.with_label_values(&[op]).inc();
                self.metrics
                    .set_event_height(self.ledger.latest_sequence().ok().flatten());
                Ok(value)
            }
            Err(LedgerError::Registry(err)) => Err(self.rejected(err)),
            Err(LedgerError::Storage(err)) => {
                self.metrics.storage_errors_total.inc();
                tracing::error!(op, error = %err, "storage failure");
                Err(ApiError::storage(err.to_string()))
            }
        }
    }

    fn rejected(&self, err: RegistryError) -> ApiError {
        self.metrics
            .calls_rejected_total
            .with_label_values(&[err.kind()])
            .inc();
        err.into()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// An error response: status code plus [`ErrorResponse`] body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, kind: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                kind: kind.into(),
            },
        }
    }

    fn invalid_argument(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_argument", error)
    }

    fn storage(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", error)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match err {
            RegistryError::Unauthorized(_) => StatusCode::FORBIDDEN,
            RegistryError::InvalidIndex { .. } => StatusCode::NOT_FOUND,
            RegistryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Registry(err) => err.into(),
            LedgerError::Storage(err) => Self::storage(err.to_string()),
        }
    }
}

impl From<AccountIdError> for ApiError {
    fn from(err: AccountIdError) -> Self {
        Self::invalid_argument(err.to_string())
    }
}

impl From<UnknownRole> for ApiError {
    fn from(err: UnknownRole) -> Self {
        Self::invalid_argument(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Builds the request context from the caller header and the current time.
fn request_context(headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    let raw = headers.get(CALLER_HEADER).ok_or_else(|| {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            "missing_caller",
            format!("missing {CALLER_HEADER} header"),
        )
    })?;
    let text = raw
        .to_str()
        .map_err(|_| ApiError::invalid_argument(format!("{CALLER_HEADER} is not valid text")))?;
    let caller: AccountId = text.trim().parse()?;
    Ok(RequestContext::at_current_time(caller))
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/roles/:account", get(role_handler).put(assign_role_handler))
        .route(
            "/credentials/:subject",
            get(all_credentials_handler).post(issue_credential_handler),
        )
        .route("/credentials/:subject/public", get(public_credentials_handler))
        .route("/credentials/:subject/:index", get(credential_handler))
        .route("/credentials/:subject/:index/revoke", post(revoke_handler))
        .route("/credentials/:subject/:index/verifiers", post(allow_verifier_handler))
        .route("/credentials/:subject/:index/verify", get(verify_handler))
        .route("/verify", post(verify_batch_handler))
        .route("/events", get(events_handler))
        .route("/stats", get(stats_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.metrics),
            track_latency,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn track_latency(State(metrics): State<SharedMetrics>, req: Request, next: Next) -> Response {
    let timer = metrics.request_latency_seconds.start_timer();
    let response = next.run(req).await;
    timer.observe_duration();
    response
}

// ---------------------------------------------------------------------------
// Request & Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Registry admin (deployer).
    pub admin: AccountId,
    /// Sequence number of the newest committed event.
    pub latest_sequence: Option<u64>,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Body and response of `/roles/:account`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoleBody {
    /// Role label, case-insensitive on input.
    pub role: String,
}

/// Response payload for `POST /credentials/:subject`.
#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedResponse {
    pub subject: AccountId,
    pub index: u64,
}

/// Body of `POST /credentials/:subject/:index/verifiers`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllowVerifierBody {
    pub verifier: String,
}

/// One entry of a batch verification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub subject: String,
    pub index: u64,
}

/// Body of `POST /verify`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub requests: Vec<BatchItem>,
}

/// Per-item outcome of a batch verification. Exactly one of
/// `verification` and `error` is set.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub subject: String,
    pub index: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

/// Query string of `GET /events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub kind: Option<String>,
    pub account: Option<String>,
    pub issuer: Option<String>,
    pub limit: Option<usize>,
}

impl EventQuery {
    fn into_filter(self) -> Result<EventFilter, ApiError> {
        let kind = self
            .kind
            .map(|k| k.parse::<EventKind>())
            .transpose()
            .map_err(ApiError::invalid_argument)?;
        let account = self.account.map(|a| a.parse::<AccountId>()).transpose()?;
        let issuer = self.issuer.map(|a| a.parse::<AccountId>()).transpose()?;
        Ok(EventFilter {
            from: self.from,
            to: self.to,
            kind,
            account,
            issuer,
            limit: self.limit.map(|limit| limit.min(MAX_EVENT_PAGE_SIZE)),
        })
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Positional parameters.
    pub params: Option<serde_json::Value>,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — admin and newest event sequence.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        admin: state.ledger.admin(),
        latest_sequence: state.ledger.latest_sequence()?,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /roles/:account`
async fn role_handler(
    Path(account): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RoleBody>, ApiError> {
    let account: AccountId = account.parse()?;
    Ok(Json(RoleBody {
        role: state.ledger.role_of(&account).to_string(),
    }))
}

/// `PUT /roles/:account` — admin only.
async fn assign_role_handler(
    Path(account): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RoleBody>,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(&headers)?;
    let target: AccountId = account.parse()?;
    let role: Role = body.role.parse()?;
    state.observe("assign_role", state.ledger.assign_role(&ctx, target, role))?;
    tracing::info!(caller = %ctx.caller, %target, %role, "role assigned");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /credentials/:subject` — issuers only. Returns 201 with the index.
async fn issue_credential_handler(
    Path(subject): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(credential): Json<NewCredential>,
) -> Result<(StatusCode, Json<IssuedResponse>), ApiError> {
    let ctx = request_context(&headers)?;
    let subject: AccountId = subject.parse()?;
    let index = state.observe(
        "issue_credential",
        state.ledger.issue_credential(&ctx, subject, credential),
    )?;
    tracing::info!(issuer = %ctx.caller, %subject, index, "credential issued");
    Ok((StatusCode::CREATED, Json(IssuedResponse { subject, index })))
}

/// `GET /credentials/:subject` — the subject's full list.
async fn all_credentials_handler(
    Path(subject): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<CredentialRecord>>, ApiError> {
    let ctx = request_context(&headers)?;
    let subject: AccountId = subject.parse()?;
    state
        .ledger
        .get_all_credentials(&ctx, &subject)
        .map(Json)
        .map_err(|e| state.rejected(e))
}

/// `GET /credentials/:subject/public`
async fn public_credentials_handler(
    Path(subject): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<CredentialRecord>>, ApiError> {
    let subject: AccountId = subject.parse()?;
    Ok(Json(state.ledger.get_public_credentials(&subject)))
}

/// `GET /credentials/:subject/:index`
async fn credential_handler(
    Path((subject, index)): Path<(String, u64)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CredentialRecord>, ApiError> {
    let ctx = request_context(&headers)?;
    let subject: AccountId = subject.parse()?;
    state
        .ledger
        .get_credential(&ctx, &subject, index)
        .map(Json)
        .map_err(|e| state.rejected(e))
}

/// `POST /credentials/:subject/:index/revoke` — issuers only.
async fn revoke_handler(
    Path((subject, index)): Path<(String, u64)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(&headers)?;
    let subject: AccountId = subject.parse()?;
    state.observe(
        "revoke_credential",
        state.ledger.revoke_credential(&ctx, subject, index),
    )?;
    tracing::info!(issuer = %ctx.caller, %subject, index, "credential revoked");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /credentials/:subject/:index/verifiers` — the subject only.
async fn allow_verifier_handler(
    Path((subject, index)): Path<(String, u64)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AllowVerifierBody>,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(&headers)?;
    let subject: AccountId = subject.parse()?;
    let verifier: AccountId = body.verifier.parse()?;
    state.observe(
        "allow_verifier",
        state.ledger.allow_verifier(&ctx, subject, index, verifier),
    )?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /credentials/:subject/:index/verify`
async fn verify_handler(
    Path((subject, index)): Path<(String, u64)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Verification>, ApiError> {
    let ctx = request_context(&headers)?;
    let subject: AccountId = subject.parse()?;
    state
        .ledger
        .verify_credential(&ctx, &subject, index)
        .map(Json)
        .map_err(|e| state.rejected(e))
}

/// `POST /verify` — verifies up to [`MAX_BATCH_VERIFICATIONS`] credentials.
///
/// Items fail individually: a malformed subject or a denied read is
/// reported in that item's `error` and never fails the request.
async fn verify_batch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BatchRequest>,
) -> Result<Json<Vec<BatchItemResult>>, ApiError> {
    let ctx = request_context(&headers)?;
    if body.requests.len() > MAX_BATCH_VERIFICATIONS {
        return Err(ApiError::invalid_argument(format!(
            "batch of {} exceeds limit of {MAX_BATCH_VERIFICATIONS}",
            body.requests.len()
        )));
    }

    let parsed: Vec<Result<AccountId, AccountIdError>> = body
        .requests
        .iter()
        .map(|item| item.subject.trim().parse())
        .collect();
    let valid: Vec<(AccountId, u64)> = parsed
        .iter()
        .zip(&body.requests)
        .filter_map(|(subject, item)| subject.as_ref().ok().map(|s| (*s, item.index)))
        .collect();
    let mut verified = state.ledger.verify_batch(&ctx, &valid).into_iter();

    let mut results = Vec::with_capacity(body.requests.len());
    for (item, subject) in body.requests.into_iter().zip(parsed) {
        let outcome = match subject {
            Err(err) => Err(ApiError::from(err)),
            Ok(_) => match verified.next() {
                Some(Ok(verification)) => Ok(verification),
                Some(Err(err)) => Err(ApiError::from(err)),
                None => Err(ApiError::storage("batch result missing")),
            },
        };
        let (verification, error) = match outcome {
            Ok(v) => (Some(v), None),
            Err(e) => (None, Some(e.body)),
        };
        results.push(BatchItemResult {
            subject: item.subject,
            index: item.index,
            verification,
            error,
        });
    }
    Ok(Json(results))
}

/// `GET /events?from=&to=&kind=&account=&issuer=&limit=`
async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Result<Json<Vec<EventRecord>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.ledger.events(&filter)?))
}

/// `GET /stats`
async fn stats_handler(State(state): State<AppState>) -> Result<Json<RegistryStats>, ApiError> {
    Ok(Json(state.ledger.stats()?))
}

/// `POST /rpc` — JSON-RPC 2.0 gateway for read-only queries.
///
/// Unknown methods return error code -32601 (Method not found).
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    let outcome = if req.jsonrpc != "2.0" {
        Err(JsonRpcError::new(
            -32600,
            "Invalid Request: jsonrpc must be \"2.0\"",
        ))
    } else {
        rpc_dispatch(&state, &req.method, req.params.as_ref())
    };

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(err)),
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

fn rpc_dispatch(
    state: &AppState,
    method: &str,
    params: Option<&serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcError> {
    let account_param = || -> Result<AccountId, JsonRpcError> {
        params
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
            .ok_or_else(|| JsonRpcError::new(-32602, "Invalid params: expected [account]"))?
            .parse()
            .map_err(|e: AccountIdError| JsonRpcError::new(-32602, format!("Invalid params: {e}")))
    };

    match method {
        "registry_version" => Ok(serde_json::json!(state.version)),
        "registry_admin" => Ok(serde_json::json!(state.ledger.admin())),
        "registry_roleOf" => Ok(serde_json::json!(state.ledger.role_of(&account_param()?))),
        "registry_credentialCount" => Ok(serde_json::json!(
            state.ledger.credential_count(&account_param()?)
        )),
        "registry_latestSequence" => state
            .ledger
            .latest_sequence()
            .map(|seq| serde_json::json!(seq))
            .map_err(|e| JsonRpcError::new(-32603, format!("Internal error: {e}"))),
        other => Err(JsonRpcError::new(
            -32601,
            format!("Method not found: {other}"),
        )),
    }
}

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive each committed [`EventRecord`] as a JSON text message.
/// Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding committed events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.ledger.subscribe();
    state.metrics.ws_subscribers.inc();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(record) => {
                        let payload = match serde_json::to_string(&record) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }

    state.metrics.ws_subscribers.dec();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
