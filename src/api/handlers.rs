use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{Expiry, TokenRecord, Validity};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub duration_months: Option<i64>,
    #[serde(default)]
    pub permanent: Option<bool>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub created: bool,
    pub active: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateResponse {
    pub message: &'static str,
    pub token: String,
    pub expire_at: Option<Expiry>,
    pub mode: crate::models::ActivationMode,
}

#[derive(Serialize)]
pub struct DeactivateResponse {
    pub message: &'static str,
    pub token: String,
    pub deactivated: bool,
}

/// Unwrap a JSON body, reporting malformed or mistyped fields as a bad request.
fn extract_json<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

fn token_of(token: Option<String>) -> Result<String, AppError> {
    match token {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(AppError::BadRequest("token required".into())),
    }
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /register: register a token (inactive until activated)
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, AppError> {
    let payload = extract_json(body)?;
    let token = token_of(payload.token)?;
    let registration = state.registry.register(&token).await?;

    Ok(Json(RegisterResponse {
        message: registration.message(),
        created: registration.created,
        active: registration.active,
    }))
}

/// POST /activate: activate for `durationMonths` months, or permanently
pub async fn activate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<Json<ActivateResponse>, AppError> {
    let payload = extract_json(body)?;
    let token = token_of(payload.token)?;
    let activation = state
        .registry
        .activate(
            &token,
            payload.duration_months,
            payload.permanent.unwrap_or(false),
        )
        .await?;

    Ok(Json(ActivateResponse {
        message: activation.message(),
        token: activation.token,
        expire_at: activation.expire_at,
        mode: activation.mode,
    }))
}

/// GET /cek?token=…: validity check
pub async fn check(
    State(state): State<Arc<AppState>>,
    params: Result<Query<TokenRequest>, QueryRejection>,
) -> Result<Json<Validity>, AppError> {
    let Query(params) = params.map_err(|err| AppError::BadRequest(err.body_text()))?;
    let token = token_of(params.token)?;
    let validity = state.registry.check_validity(&token).await?;
    Ok(Json(validity))
}

/// POST /deactivate: clear the active flag, keep the stored expiry
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<DeactivateResponse>, AppError> {
    let payload = extract_json(body)?;
    let token = token_of(payload.token)?;
    let deactivation = state.registry.deactivate(&token).await?;

    Ok(Json(DeactivateResponse {
        message: "Token deactivated",
        token: deactivation.token,
        deactivated: deactivation.deactivated,
    }))
}

/// GET /client-tokens: every record, unmasked. Operator-only.
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TokenRecord>>, AppError> {
    let tokens = state.registry.list_all().await?;
    Ok(Json(tokens))
}

/// GET /readyz: 200 once the store answers
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    let ping = state.registry.store().ping();
    match tokio::time::timeout(state.config.store_timeout, ping).await {
        Ok(Ok(())) => StatusCode::OK,
        Ok(Err(e)) => {
            tracing::warn!("readiness check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(_) => {
            tracing::warn!("readiness check timed out");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
