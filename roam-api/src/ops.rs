use axum::{extract::State, routing::post, Extension, Json, Router};
use chrono::{NaiveDate, Utc};
use roam_booking::sweep::CompletionSweep;
use roam_core::identity::Claims;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/ops/sweep/completed", post(sweep_completed))
}

#[derive(Debug, Deserialize)]
struct SweepRequest {
    as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct SweepResponse {
    count: usize,
}

/// Manual trigger for the Confirmed -> Completed sweep, for the ops
/// scheduler and for backfills.
async fn sweep_completed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SweepRequest>,
) -> Result<Json<SweepResponse>, ApiError> {
    if !claims.is_ops() {
        return Err(ApiError::AuthorizationError("ops role required".into()));
    }

    let as_of = req.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let count = CompletionSweep::new(state.bookings.clone()).run(as_of).await?;
    Ok(Json(SweepResponse { count }))
}
