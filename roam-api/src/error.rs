use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roam_booking::ReservationError;
use roam_core::gateway::GatewayError;
use roam_core::repository::StoreError;
use roam_payments::orchestrator::OrchestratorError;
use roam_payments::ReconcileError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError { message: String, conflicting_start: String, conflicting_end: String },
    UnavailableError(String),
    ProviderRejected(String),
    ProviderTimeout(String),
    ProviderUnavailable(String),
    InvalidSignature,
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::AuthenticationError(msg) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": msg }))
            }
            ApiError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::NotFoundError(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::ConflictError { message, conflicting_start, conflicting_end } => (
                StatusCode::CONFLICT,
                json!({
                    "error": message,
                    "conflicting_start": conflicting_start,
                    "conflicting_end": conflicting_end,
                }),
            ),
            ApiError::UnavailableError(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": msg }))
            }
            ApiError::ProviderRejected(msg) => {
                (StatusCode::PAYMENT_REQUIRED, json!({ "error": msg }))
            }
            ApiError::ProviderTimeout(msg) => {
                (StatusCode::GATEWAY_TIMEOUT, json!({ "error": msg, "retryable": true }))
            }
            ApiError::ProviderUnavailable(msg) => {
                (StatusCode::BAD_GATEWAY, json!({ "error": msg, "retryable": true }))
            }
            ApiError::InvalidSignature => {
                (StatusCode::BAD_REQUEST, json!({ "error": "invalid signature" }))
            }
            ApiError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
            ApiError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Validation(msg) => ApiError::ValidationError(msg),
            ReservationError::Conflict { existing } => ApiError::ConflictError {
                message: format!("requested dates conflict with existing booking {}", existing),
                conflicting_start: existing.start.to_string(),
                conflicting_end: existing.end.to_string(),
            },
            ReservationError::NotFound => ApiError::NotFoundError("booking or vehicle not found".into()),
            ReservationError::Unavailable => ApiError::UnavailableError("vehicle is delisted".into()),
            ReservationError::Forbidden => {
                ApiError::AuthorizationError("caller may not act on this booking".into())
            }
            ReservationError::Store(e) => ApiError::InternalServerError(e.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::ProviderUnavailable(msg) => ApiError::ProviderUnavailable(msg),
            GatewayError::ProviderRejected(msg) => ApiError::ProviderRejected(msg),
            GatewayError::ProviderTimeout(msg) => ApiError::ProviderTimeout(msg),
            GatewayError::InvalidSignature => ApiError::InvalidSignature,
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::UnknownProvider(p) => {
                ApiError::ValidationError(format!("unknown payment provider {}", p))
            }
            OrchestratorError::Gateway(e) => e.into(),
            OrchestratorError::Store(e) => ApiError::InternalServerError(e.to_string()),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::UnknownProvider(p) => {
                ApiError::NotFoundError(format!("unknown payment provider {}", p))
            }
            ReconcileError::InvalidSignature => ApiError::InvalidSignature,
            ReconcileError::Verification(e) => e.into(),
            ReconcileError::Store(e) => ApiError::InternalServerError(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFoundError("not found".into()),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}
