//! HTTP transport adapter (axum)
//!
//! `POST /migrate` triggers an invocation; the JSON body is optional:
//! `{ "phase": 2, "single": false, "predecessors_applied": true }`.
//! Any other method on `/migrate` gets a 405 with a JSON error body.
//!
//! Status codes: 200 when every attempted phase succeeded, 500 with the
//! result body when one failed, 409 for a predecessor rule violation, 400 for
//! a malformed body or unknown phase, 401 for a missing or wrong API key and
//! 500 for connection or configuration failures.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use sha2::{Digest, Sha256};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::result::{Error, Result};
use crate::services::chain::Invocation;
use crate::services::logging::{new_run_id, LogEvent, LoggingService};
use crate::services::MigrationService;

#[derive(Clone)]
pub struct AppState {
    service: Arc<MigrationService>,
    api_key: Option<Arc<str>>,
    journal: Option<Arc<LoggingService>>,
}

impl AppState {
    pub fn new(
        service: Arc<MigrationService>,
        api_key: Option<String>,
        journal: Option<Arc<LoggingService>>,
    ) -> Self {
        Self {
            service,
            api_key: api_key.map(Arc::from),
            journal,
        }
    }

    /// Journal writes never fail a request
    fn journal(&self, event: LogEvent) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.log(event) {
                warn!(error = %e, "journal write failed");
            }
        }
    }
}

fn cors_layer(allowed_origin: Option<&str>) -> Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    Ok(match allowed_origin {
        Some(origin) => cors.allow_origin(
            origin
                .parse::<HeaderValue>()
                .map_err(|e| Error::config(format!("invalid allowed origin: {}", e)))?,
        ),
        None => cors.allow_origin(Any),
    })
}

/// Build the router with CORS applied
pub fn create_app(state: AppState, allowed_origin: Option<&str>) -> Result<Router> {
    Ok(Router::new()
        .route("/migrate", post(migrate).fallback(method_not_allowed))
        .route("/health", get(health))
        .route("/phases", get(list_phases))
        .layer(cors_layer(allowed_origin)?)
        .with_state(state))
}

/// Bind to the configured address and serve until Ctrl-C
pub async fn serve(config: &Config, journal: Option<Arc<LoggingService>>) -> Result<()> {
    let service = MigrationService::from_config(config)?;
    let state = AppState::new(Arc::new(service), config.api_key.clone(), journal);
    let app = create_app(state, config.server.allowed_origin.as_deref())?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::PhaseOrder(_) => StatusCode::CONFLICT,
        Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn authorized(expected: &str, headers: &HeaderMap) -> bool {
    let from_header = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    let from_bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    [from_header, from_bearer]
        .into_iter()
        .flatten()
        .any(|key| keys_match(key, expected))
}

/// Compare fixed-size digests so timing does not depend on the key bytes
fn keys_match(given: &str, expected: &str) -> bool {
    let given = Sha256::digest(given.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    given
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_phases(State(state): State<AppState>) -> Response {
    Json(state.service.phases()).into_response()
}

async fn method_not_allowed(method: Method) -> Response {
    let mut response = error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("method {} not allowed, use POST", method),
    );
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("POST"));
    response
}

async fn migrate(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(expected) = &state.api_key {
        if !authorized(expected, &headers) {
            return error_response(StatusCode::UNAUTHORIZED, "missing or invalid API key");
        }
    }

    let invocation: Invocation = if body.iter().all(u8::is_ascii_whitespace) {
        Invocation::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(invocation) => invocation,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("invalid request body: {}", e),
                )
            }
        }
    };

    let run_id = new_run_id();
    let mut started = LogEvent::new("run_started").with_run_id(&run_id);
    if let Some(phase) = invocation.phase {
        started = started.with_phase(phase);
    }
    state.journal(started);

    match state.service.run(&invocation).await {
        Ok(outcome) => {
            if let Some(journal) = &state.journal {
                if let Err(e) = journal.record_outcome(&run_id, &outcome) {
                    warn!(error = %e, "journal write failed");
                }
            }
            let status = if outcome.success() {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(outcome)).into_response()
        }
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "invocation rejected");
            state.journal(
                LogEvent::new("run_failed")
                    .with_run_id(&run_id)
                    .with_error(e.to_string()),
            );
            error_response(status_for(&e), e.to_string())
        }
    }
}
