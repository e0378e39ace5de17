//! HTTP surface: the payment processor webhooks and a health probe.
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::error::{ServiceError, ValidationError};
use crate::payment::{PaymentKind, SIGNATURE_HEADER, verify_signature};
use crate::service::Marketplace;

pub struct AppState {
    pub marketplace: Marketplace,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(marketplace: Marketplace, webhook_secret: Option<String>) -> Self {
        if webhook_secret.is_none() {
            warn!("no webhook secret configured, unsigned webhooks will be accepted");
        }
        Self {
            marketplace,
            webhook_secret,
        }
    }

    fn check_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
        let Some(secret) = &self.webhook_secret else {
            return Ok(());
        };
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        if verify_signature(secret.as_bytes(), body, signature) {
            Ok(())
        } else {
            warn!("webhook signature mismatch");
            Err(ApiError::Unauthorized)
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/payment-webhook", post(payment_webhook))
        .route("/session-payment-webhook", post(session_payment_webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[tracing::instrument(name = "POST /payment-webhook", skip_all)]
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    process_webhook(state, headers, body, PaymentKind::Goods).await
}

#[tracing::instrument(name = "POST /session-payment-webhook", skip_all)]
async fn session_payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    process_webhook(state, headers, body, PaymentKind::Session).await
}

async fn process_webhook(
    state: Arc<AppState>,
    headers: HeaderMap,
    body: Bytes,
    kind: PaymentKind,
) -> Result<Json<Value>, ApiError> {
    state.check_signature(&headers, &body)?;
    let raw: Value = serde_json::from_slice(&body).map_err(ServiceError::from)?;

    // sled is blocking
    let outcome = tokio::task::spawn_blocking(move || state.marketplace.handle_webhook(raw, kind))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    debug!(?outcome, "webhook handled");
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Service(ServiceError),
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Invalid signature".to_string()),
            ApiError::Service(err) => match err {
                ServiceError::Validation(v) => (StatusCode::BAD_REQUEST, validation_message(v)),
                ServiceError::Json(_) => (StatusCode::BAD_REQUEST, "Invalid JSON".to_string()),
                ServiceError::NotFound { resource, .. } => {
                    (StatusCode::NOT_FOUND, format!("{} not found", capitalize(resource)))
                }
                ServiceError::AccessDenied(denied) => (StatusCode::FORBIDDEN, denied.to_string()),
                ServiceError::Conflict(message) => (StatusCode::CONFLICT, message.clone()),
                ServiceError::Storage(_) | ServiceError::Encode(_) | ServiceError::Decode(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
                }
            },
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        }
    }
}

fn validation_message(err: &ValidationError) -> String {
    match err {
        ValidationError::MissingField("transaction ID") => "Missing transaction ID".to_string(),
        ValidationError::InvalidValue { field: "status", .. } => "Invalid status".to_string(),
        ValidationError::WrongPaymentFlow => "Invalid transaction".to_string(),
        other => other.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!(error = ?self, "webhook failed");
        } else {
            warn!(%status, %message, "webhook rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
