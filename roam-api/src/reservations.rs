use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use roam_core::identity::Claims;
use roam_core::repository::TransitionOutcome;
use roam_shared::Booking;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/{id}/cancel", post(cancel_reservation))
}

#[derive(Debug, Deserialize)]
struct CreateReservationRequest {
    vehicle_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    payment_provider: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReservationResponse {
    booking: Booking,
    payment_redirect_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    booking: Booking,
    already_terminal: bool,
}

async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    let renter_id = claims
        .caller_id()
        .ok_or_else(|| ApiError::AuthenticationError("caller id is not a uuid".into()))?;

    let booking = state
        .reservations
        .create(req.vehicle_id, renter_id, req.start_date, req.end_date)
        .await?;

    // The booking is committed either way; a provider failure here
    // surfaces as retryable and the reconciliation sweep owns the
    // booking's fate if the client walks away.
    let provider = req
        .payment_provider
        .unwrap_or_else(|| state.default_provider.clone());
    let session = match state.orchestrator.open_for(&booking, &provider).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Opening {} session for booking {} failed: {}", provider, booking.id, e);
            return Err(e.into());
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(ReservationResponse {
            payment_redirect_url: session.redirect_url.clone(),
            booking,
        }),
    ))
}

async fn get_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    if claims.is_ops() {
        return Ok(Json(state.reservations.fetch(id).await?));
    }
    let caller_id = claims
        .caller_id()
        .ok_or_else(|| ApiError::AuthenticationError("caller id is not a uuid".into()))?;
    Ok(Json(state.reservations.get(id, caller_id).await?))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let caller_id = claims
        .caller_id()
        .ok_or_else(|| ApiError::AuthenticationError("caller id is not a uuid".into()))?;

    let outcome = state.reservations.cancel(id, caller_id).await?;
    let response = match outcome {
        TransitionOutcome::Applied(booking) => {
            CancelResponse { booking, already_terminal: false }
        }
        TransitionOutcome::AlreadyTerminal(booking) => {
            CancelResponse { booking, already_terminal: true }
        }
    };
    Ok(Json(response))
}
