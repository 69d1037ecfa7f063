use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use roam_core::gateway::SignatureHeaders;
use roam_payments::ReconciliationAck;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments/{provider}", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments/{provider}
/// Provider callbacks are authenticated by signature, not by bearer
/// token, so this route sits outside the identity middleware.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature_headers: SignatureHeaders = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let ack = state
        .reconciler
        .process(&provider, &body, &signature_headers)
        .await?;

    let status = match ack {
        ReconciliationAck::Applied { .. } => "applied",
        ReconciliationAck::AlreadyProcessed => "already_processed",
        // Both acknowledged so the provider stops retrying.
        ReconciliationAck::UnknownSession | ReconciliationAck::Ignored => "ignored",
    };
    Ok(Json(json!({ "status": status })))
}
