//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use subscription_sync::{BillingError, CreateSubscriptionRequest, SubscriptionCreated};

use crate::state::AppState;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Create a subscription for the bearer of the Authorization header.
/// Every failure is reported as 400 with the error message.
pub async fn create_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateSubscriptionRequest>, JsonRejection>,
) -> Result<Json<SubscriptionCreated>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, e.body_text(), "INVALID_ARGUMENT")
    })?;

    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    let created = state.writer.create(authorization, request).await.map_err(|e| {
        match &e {
            BillingError::Upstream(_) | BillingError::Config(_) => {
                tracing::error!("Subscription creation error: {}", e);
            }
            _ => tracing::warn!("Subscription request rejected: {}", e),
        }
        error_response(StatusCode::BAD_REQUEST, e.to_string(), e.code())
    })?;

    Ok(Json(created))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "No signature", "MISSING_SIGNATURE"))?;

    state.reconciler.verify(&body, signature).map_err(|e| {
        tracing::warn!("Webhook signature failed: {}", e);
        error_response(StatusCode::BAD_REQUEST, format!("Webhook Error: {e}"), e.code())
    })?;

    // Verified events are always acknowledged; Stripe retries anything else.
    match state.reconciler.process(&body).await {
        Ok(outcome) => tracing::debug!(outcome = ?outcome, "Webhook processed"),
        Err(e @ BillingError::InvalidArgument(_)) => {
            tracing::warn!("Verified webhook could not be decoded: {}", e);
        }
        Err(e) => tracing::error!("Webhook processing error: {}", e),
    }

    Ok(Json(WebhookAck { received: true }))
}
