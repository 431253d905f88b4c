//! HTTP surface.
//!
//! | Route | Body |
//! |---|---|
//! | `GET /health` | `{status, signer, chainId, timestamp}` |
//! | `GET /price/:symbol?market=` | index, plus a signed index update when `market` is set |
//! | `GET /index/flr-usd` | unsigned FLR spot, `{ok, data}` |
//! | `POST /quote/protection` | signed probability quote |
//! | `POST /attestation/trigger` | signed trigger attestation |
//! | `POST /update/price/:symbol` | forces an aggregation |
//!
//! Successful responses are `{success: true, data}`; failures are
//! `{success: false, error}` and never carry a substitute price or signature.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use depeg_oracle::service::{ProtectionQuoteRequest, TriggerRequest};
use depeg_oracle::OracleError;
use depeg_types::events::EventType;
use depeg_types::Address;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::storage::log_attestation;
use crate::DaemonState;

type AppState = Arc<DaemonState>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/price/:symbol", get(get_price))
        .route("/index/flr-usd", get(get_flr_usd))
        .route("/quote/protection", post(post_protection_quote))
        .route("/attestation/trigger", post(post_trigger_attestation))
        .route("/update/price/:symbol", post(post_update_price))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ===== Route Handlers =====

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "signer": state.oracle.signer(),
        "chainId": state.oracle.chain_id(),
        "timestamp": state.oracle.now(),
    }))
}

#[derive(Deserialize)]
struct PriceQuery {
    market: Option<Address>,
}

async fn get_price(
    State(state): State<AppState>,
    symbol: Result<Path<String>, PathRejection>,
    query: Result<Query<PriceQuery>, QueryRejection>,
) -> Result<Json<Success<impl Serialize>>, ApiError> {
    let (Path(symbol), Query(query)) = (symbol?, query?);
    let quote = state.oracle.price_quote(&symbol, query.market).await?;
    state
        .event_bus
        .publish(EventType::IndexUpdated, quote.index.timestamp, &quote.index);
    if let Some(update) = &quote.update {
        log_attestation(&state.db, update).await;
        state
            .event_bus
            .publish(EventType::AttestationSigned, state.oracle.now(), update);
    }
    Ok(Success::data(quote))
}

async fn get_flr_usd(State(state): State<AppState>) -> Response {
    match state.oracle.flr_spot().await {
        Ok(spot) => Json(json!({ "ok": true, "data": spot })).into_response(),
        Err(e) => {
            warn!(error = %e, "FLR spot failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn post_protection_quote(
    State(state): State<AppState>,
    body: Result<Json<ProtectionQuoteRequest>, JsonRejection>,
) -> Result<Json<Success<impl Serialize>>, ApiError> {
    let Json(req) = body?;
    let quote = state.oracle.protection_quote(&req).await?;
    log_attestation(&state.db, &quote.attestation).await;
    state
        .event_bus
        .publish(EventType::AttestationSigned, quote.issued_at, &quote.attestation);
    Ok(Success::data(quote))
}

async fn post_trigger_attestation(
    State(state): State<AppState>,
    body: Result<Json<TriggerRequest>, JsonRejection>,
) -> Result<Json<Success<impl Serialize>>, ApiError> {
    let Json(req) = body?;
    let res = state.oracle.trigger_attestation(&req)?;
    log_attestation(&state.db, &res.attestation).await;
    state
        .event_bus
        .publish(EventType::AttestationSigned, res.issued_at, &res.attestation);
    Ok(Success::data(res))
}

async fn post_update_price(
    State(state): State<AppState>,
    symbol: Result<Path<String>, PathRejection>,
) -> Result<Json<Success<impl Serialize>>, ApiError> {
    let Path(symbol) = symbol?;
    let index = state.oracle.index(&symbol).await?;
    state
        .event_bus
        .publish(EventType::IndexUpdated, index.timestamp, &index);
    Ok(Json(Success {
        success: true,
        message: Some("Price updated"),
        data: index,
    }))
}

// ===== Response Types =====

#[derive(Serialize)]
struct Success<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    data: T,
}

impl<T: Serialize> Success<T> {
    fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data,
        })
    }
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// Quorum not met; retry later.
    Unavailable(String),
    Internal(String),
}

impl From<OracleError> for ApiError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::InsufficientSources { .. } => ApiError::Unavailable(err.to_string()),
            OracleError::InvalidRequest(_) | OracleError::UnknownSymbol(_) | OracleError::Type(_) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => {
                error!("request failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
