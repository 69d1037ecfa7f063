use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use roam_core::gateway::{GatewayRegistry, PaymentOutcome};
use roam_core::identity;
use roam_core::lifecycle::LifecycleEvent;
use roam_core::publish::DomainEventPublisher;
use roam_core::repository::{BookingStore, PaymentSessionStore, StoreError, TransitionOutcome};
use roam_shared::events::{BookingConfirmedEvent, BookingPaymentFailedEvent, DomainEvent};
use roam_shared::{Booking, SessionStatus};
use tracing::{info, warn};

/// Time-based Confirmed -> Completed sweep, invoked by an external
/// scheduler. Uses the store's conditional transition, so a racing
/// cancellation always wins or loses cleanly, never both.
pub struct CompletionSweep {
    bookings: Arc<dyn BookingStore>,
}

impl CompletionSweep {
    pub fn new(bookings: Arc<dyn BookingStore>) -> Self {
        Self { bookings }
    }

    pub async fn run(&self, as_of: NaiveDate) -> Result<usize, StoreError> {
        let completed = self.bookings.sweep_completed(as_of).await?;
        if !completed.is_empty() {
            info!("Completion sweep moved {} bookings as of {}", completed.len(), as_of);
        }
        Ok(completed.len())
    }
}

/// Re-drives Pending bookings older than the configured threshold by
/// re-querying the provider. Provider silence past the threshold
/// resolves to payment_failed so no booking stays unreconciled
/// indefinitely.
pub struct ReconciliationSweep {
    bookings: Arc<dyn BookingStore>,
    sessions: Arc<dyn PaymentSessionStore>,
    gateways: GatewayRegistry,
    publisher: Arc<dyn DomainEventPublisher>,
}

impl ReconciliationSweep {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        sessions: Arc<dyn PaymentSessionStore>,
        gateways: GatewayRegistry,
        publisher: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        Self { bookings, sessions, gateways, publisher }
    }

    /// Returns how many bookings were actually transitioned.
    pub async fn run(&self, pending_ttl: Duration) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - pending_ttl;
        let stale = self.bookings.find_stale_pending(cutoff).await?;
        let mut driven = 0;
        for booking in stale {
            match self.redrive(&booking).await {
                Ok(true) => driven += 1,
                Ok(false) => {}
                Err(e) => warn!("Reconciliation of booking {} failed: {}", booking.id, e),
            }
        }
        if driven > 0 {
            info!("Reconciliation sweep re-drove {} stale bookings", driven);
        }
        Ok(driven)
    }

    async fn redrive(&self, booking: &Booking) -> Result<bool, StoreError> {
        let session = self.sessions.find_by_booking(booking.id).await?;

        let (event, session_update, provider) = match &session {
            // No session ever opened for this booking; nothing will
            // confirm it.
            None => (LifecycleEvent::PaymentDenied, None, "none".to_string()),
            Some(s) => {
                let gateway = match self.gateways.get(&s.provider) {
                    Some(g) => g,
                    None => {
                        warn!("No gateway registered for provider {}", s.provider);
                        return Ok(false);
                    }
                };
                match gateway.capture_result(&s.provider_session_id).await {
                    Ok(capture) => match capture.outcome {
                        PaymentOutcome::Captured => (
                            LifecycleEvent::PaymentCaptured,
                            Some((s.id, SessionStatus::Captured)),
                            s.provider.clone(),
                        ),
                        // Denied, or still pending past the threshold:
                        // both resolve the booking to payment_failed.
                        PaymentOutcome::Denied | PaymentOutcome::Pending => (
                            LifecycleEvent::PaymentDenied,
                            Some((s.id, SessionStatus::Failed)),
                            s.provider.clone(),
                        ),
                    },
                    Err(e) => {
                        // Transient provider trouble: leave the booking
                        // for the next sweep run.
                        warn!(
                            "Provider {} query for booking {} failed: {}",
                            s.provider, booking.id, e
                        );
                        return Ok(false);
                    }
                }
            }
        };

        let outcome = self
            .bookings
            .transition(booking.id, event, identity::SWEEP_ACTOR)
            .await?;

        let updated = match outcome {
            TransitionOutcome::Applied(b) => b,
            TransitionOutcome::AlreadyTerminal(_) => return Ok(false),
        };

        if let Some((session_id, status)) = session_update {
            self.sessions.mark_status(session_id, status).await?;
        }

        let occurred_at = Utc::now().timestamp();
        let domain_event = match event {
            LifecycleEvent::PaymentCaptured => DomainEvent::BookingConfirmed(BookingConfirmedEvent {
                booking_id: updated.id,
                vehicle_id: updated.vehicle_id,
                renter_id: updated.renter_id,
                provider,
                occurred_at,
            }),
            _ => DomainEvent::BookingPaymentFailed(BookingPaymentFailedEvent {
                booking_id: updated.id,
                vehicle_id: updated.vehicle_id,
                renter_id: updated.renter_id,
                provider,
                occurred_at,
            }),
        };
        self.publisher.publish(&domain_event).await;

        Ok(true)
    }
}
