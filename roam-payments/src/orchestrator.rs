use std::sync::Arc;

use chrono::Utc;
use roam_core::gateway::{GatewayError, GatewayRegistry};
use roam_core::repository::{BookingStore, PaymentSessionStore, StoreError};
use roam_shared::{Booking, PaymentSession, SessionStatus};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("unknown payment provider {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Opens provider sessions for bookings and records them. Never
/// decides reservation state; the reconciliation processor does that.
pub struct PaymentOrchestrator {
    gateways: GatewayRegistry,
    sessions: Arc<dyn PaymentSessionStore>,
    bookings: Arc<dyn BookingStore>,
}

impl PaymentOrchestrator {
    pub fn new(
        gateways: GatewayRegistry,
        sessions: Arc<dyn PaymentSessionStore>,
        bookings: Arc<dyn BookingStore>,
    ) -> Self {
        Self { gateways, sessions, bookings }
    }

    /// Open an external session for the booking's total. A booking has
    /// at most one active session: an existing non-terminal session is
    /// returned as-is instead of opening a second one.
    pub async fn open_for(
        &self,
        booking: &Booking,
        provider_id: &str,
    ) -> Result<PaymentSession, OrchestratorError> {
        if let Some(existing) = self.sessions.find_by_booking(booking.id).await? {
            if !existing.status.is_terminal() {
                return Ok(existing);
            }
        }

        let gateway = self
            .gateways
            .get(provider_id)
            .ok_or_else(|| OrchestratorError::UnknownProvider(provider_id.to_string()))?;

        let opened = gateway.open_session(booking).await?;

        let now = Utc::now();
        let session = PaymentSession {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            provider: provider_id.to_string(),
            provider_session_id: opened.provider_session_id,
            status: SessionStatus::Created,
            amount_minor: booking.total_minor,
            currency: booking.currency.clone(),
            redirect_url: Some(opened.redirect_url),
            created_at: now,
            updated_at: now,
        };
        self.sessions.create(session.clone()).await?;
        self.bookings
            .attach_session(booking.id, session.id, provider_id)
            .await?;

        info!(
            "Opened {} session {} for booking {}",
            provider_id, session.provider_session_id, booking.id
        );
        Ok(session)
    }
}
