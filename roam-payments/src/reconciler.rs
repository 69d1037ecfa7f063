use std::sync::Arc;

use chrono::Utc;
use roam_core::gateway::{GatewayError, GatewayRegistry, PaymentOutcome, SignatureHeaders};
use roam_core::identity;
use roam_core::lifecycle::LifecycleEvent;
use roam_core::publish::DomainEventPublisher;
use roam_core::repository::{BookingStore, PaymentSessionStore, StoreError, TransitionOutcome};
use roam_shared::events::{BookingConfirmedEvent, BookingPaymentFailedEvent, DomainEvent};
use roam_shared::{BookingStatus, SessionStatus};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("unknown payment provider {0}")]
    UnknownProvider(String),

    /// Authenticity check failed; the callback is dropped without
    /// touching state.
    #[error("webhook signature invalid")]
    InvalidSignature,

    /// The verification round-trip itself failed (remote key set
    /// unreachable); the provider should retry delivery.
    #[error(transparent)]
    Verification(GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the HTTP layer tells the provider. Everything here is a
/// definitive acknowledgement; only errors warrant provider retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationAck {
    /// The callback transitioned the booking.
    Applied { booking_id: Uuid, status: BookingStatus },
    /// Duplicate or out-of-order delivery for a booking that has
    /// already been decided; acknowledged without side effects.
    AlreadyProcessed,
    /// No session matches the callback. Acknowledged so the provider
    /// stops retrying; logged for operators.
    UnknownSession,
    /// Authentic but not an outcome we act on.
    Ignored,
}

/// Applies provider callbacks to booking state exactly once. The
/// correctness mechanism is the store's conditional transition keyed
/// on current status, not a time-boxed deduplication cache.
pub struct ReconciliationProcessor {
    gateways: GatewayRegistry,
    bookings: Arc<dyn BookingStore>,
    sessions: Arc<dyn PaymentSessionStore>,
    publisher: Arc<dyn DomainEventPublisher>,
}

impl ReconciliationProcessor {
    pub fn new(
        gateways: GatewayRegistry,
        bookings: Arc<dyn BookingStore>,
        sessions: Arc<dyn PaymentSessionStore>,
        publisher: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        Self { gateways, bookings, sessions, publisher }
    }

    pub async fn process(
        &self,
        provider_id: &str,
        body: &[u8],
        headers: &SignatureHeaders,
    ) -> Result<ReconciliationAck, ReconcileError> {
        let gateway = self
            .gateways
            .get(provider_id)
            .ok_or_else(|| ReconcileError::UnknownProvider(provider_id.to_string()))?;

        let notice = gateway.verify_webhook(body, headers).await.map_err(|e| match e {
            GatewayError::InvalidSignature => ReconcileError::InvalidSignature,
            other => ReconcileError::Verification(other),
        })?;

        let session = match self
            .sessions
            .find_by_provider_session_id(provider_id, &notice.provider_session_id)
            .await?
        {
            Some(s) => s,
            None => {
                warn!(
                    "Dropping {} callback for unknown session {}",
                    provider_id, notice.provider_session_id
                );
                return Ok(ReconciliationAck::UnknownSession);
            }
        };

        let (event, session_status) = match notice.outcome {
            PaymentOutcome::Captured => (LifecycleEvent::PaymentCaptured, SessionStatus::Captured),
            PaymentOutcome::Denied => (LifecycleEvent::PaymentDenied, SessionStatus::Failed),
            PaymentOutcome::Pending => return Ok(ReconciliationAck::Ignored),
        };

        let actor = identity::provider_actor(provider_id);
        let outcome = match self.bookings.transition(session.booking_id, event, &actor).await {
            Ok(outcome) => outcome,
            // The booking was decided by an earlier delivery (possibly
            // the mirror outcome); this one is a duplicate.
            Err(StoreError::InvalidTransition { from, event }) => {
                info!(
                    "Callback {} for booking {} ignored, status already {}",
                    event, session.booking_id, from
                );
                return Ok(ReconciliationAck::AlreadyProcessed);
            }
            Err(e) => return Err(e.into()),
        };

        let booking = match outcome {
            TransitionOutcome::Applied(b) => b,
            TransitionOutcome::AlreadyTerminal(b) => {
                info!(
                    "Callback for booking {} ignored, already terminal ({})",
                    b.id, b.status
                );
                return Ok(ReconciliationAck::AlreadyProcessed);
            }
        };

        self.sessions.mark_status(session.id, session_status).await?;

        let occurred_at = Utc::now().timestamp();
        let domain_event = match booking.status {
            BookingStatus::Confirmed => DomainEvent::BookingConfirmed(BookingConfirmedEvent {
                booking_id: booking.id,
                vehicle_id: booking.vehicle_id,
                renter_id: booking.renter_id,
                provider: provider_id.to_string(),
                occurred_at,
            }),
            _ => DomainEvent::BookingPaymentFailed(BookingPaymentFailedEvent {
                booking_id: booking.id,
                vehicle_id: booking.vehicle_id,
                renter_id: booking.renter_id,
                provider: provider_id.to_string(),
                occurred_at,
            }),
        };
        self.publisher.publish(&domain_event).await;

        info!(
            "Booking {} reconciled to {} via {} callback",
            booking.id, booking.status, provider_id
        );
        Ok(ReconciliationAck::Applied { booking_id: booking.id, status: booking.status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGateway;
    use crate::orchestrator::PaymentOrchestrator;
    use chrono::NaiveDate;
    use roam_core::publish::RecordingPublisher;
    use roam_core::repository::NewBooking;
    use roam_shared::{Booking, StayRange, Vehicle};
    use roam_store::memory::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        gateway: Arc<MockGateway>,
        publisher: Arc<RecordingPublisher>,
        processor: ReconciliationProcessor,
        booking: Booking,
        session_id: String,
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockGateway::new("mock-secret"));
        let publisher = Arc::new(RecordingPublisher::new());

        let mut gateways = GatewayRegistry::new();
        gateways.register(gateway.clone());

        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            nightly_rate_minor: 10000,
            currency: "USD".to_string(),
            location: "Portland, OR".to_string(),
            timezone: "America/Los_Angeles".to_string(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.add_vehicle(vehicle.clone());

        let booking = store
            .create_reservation(NewBooking {
                vehicle_id: vehicle.id,
                renter_id: Uuid::new_v4(),
                stay: StayRange::new(d(6, 10), d(6, 13)),
                total_minor: 30000,
                currency: "USD".to_string(),
                actor: "renter:test".to_string(),
            })
            .await
            .unwrap();

        let orchestrator =
            PaymentOrchestrator::new(gateways.clone(), store.clone(), store.clone());
        let session = orchestrator.open_for(&booking, "mock").await.unwrap();

        let processor = ReconciliationProcessor::new(
            gateways,
            store.clone(),
            store.clone(),
            publisher.clone(),
        );

        Fixture {
            store,
            gateway,
            publisher,
            processor,
            booking,
            session_id: session.provider_session_id,
        }
    }

    #[tokio::test]
    async fn test_capture_confirms_booking() {
        let f = fixture().await;
        let body = MockGateway::webhook_payload(&f.session_id, PaymentOutcome::Captured);

        let ack = f
            .processor
            .process("mock", &body, &f.gateway.signature_headers())
            .await
            .unwrap();
        assert_eq!(
            ack,
            ReconciliationAck::Applied {
                booking_id: f.booking.id,
                status: BookingStatus::Confirmed
            }
        );

        let booking = f.store.get(f.booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        let session = f
            .store
            .find_by_provider_session_id("mock", &f.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Captured);
        assert!(matches!(f.publisher.events()[0], DomainEvent::BookingConfirmed(_)));
    }

    #[tokio::test]
    async fn test_duplicate_capture_is_acked_without_side_effects() {
        let f = fixture().await;
        let body = MockGateway::webhook_payload(&f.session_id, PaymentOutcome::Captured);
        let headers = f.gateway.signature_headers();

        f.processor.process("mock", &body, &headers).await.unwrap();
        let audit_before = f.store.audit_trail(f.booking.id).await.unwrap().len();
        let events_before = f.publisher.events().len();

        // Identical payload redelivered.
        let ack = f.processor.process("mock", &body, &headers).await.unwrap();
        assert_eq!(ack, ReconciliationAck::AlreadyProcessed);

        assert_eq!(f.store.audit_trail(f.booking.id).await.unwrap().len(), audit_before);
        assert_eq!(f.publisher.events().len(), events_before);
    }

    #[tokio::test]
    async fn test_denial_after_capture_does_not_overwrite() {
        let f = fixture().await;
        let headers = f.gateway.signature_headers();

        let capture = MockGateway::webhook_payload(&f.session_id, PaymentOutcome::Captured);
        f.processor.process("mock", &capture, &headers).await.unwrap();

        let denial = MockGateway::webhook_payload(&f.session_id, PaymentOutcome::Denied);
        let ack = f.processor.process("mock", &denial, &headers).await.unwrap();
        assert_eq!(ack, ReconciliationAck::AlreadyProcessed);

        let booking = f.store.get(f.booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_denial_fails_booking() {
        let f = fixture().await;
        let body = MockGateway::webhook_payload(&f.session_id, PaymentOutcome::Denied);

        let ack = f
            .processor
            .process("mock", &body, &f.gateway.signature_headers())
            .await
            .unwrap();
        assert_eq!(
            ack,
            ReconciliationAck::Applied {
                booking_id: f.booking.id,
                status: BookingStatus::PaymentFailed
            }
        );
        assert!(matches!(f.publisher.events()[0], DomainEvent::BookingPaymentFailed(_)));
    }

    #[tokio::test]
    async fn test_invalid_signature_leaves_state_untouched() {
        let f = fixture().await;
        let body = MockGateway::webhook_payload(&f.session_id, PaymentOutcome::Captured);

        let err = f
            .processor
            .process("mock", &body, &SignatureHeaders::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidSignature));

        let booking = f.store.get(f.booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(f.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_acked_and_dropped() {
        let f = fixture().await;
        let body = MockGateway::webhook_payload("mock_sess_nonexistent", PaymentOutcome::Captured);

        let ack = f
            .processor
            .process("mock", &body, &f.gateway.signature_headers())
            .await
            .unwrap();
        assert_eq!(ack, ReconciliationAck::UnknownSession);
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let f = fixture().await;
        let body = MockGateway::webhook_payload(&f.session_id, PaymentOutcome::Captured);

        let err = f
            .processor
            .process("other-psp", &body, &f.gateway.signature_headers())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownProvider(_)));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_deliveries_apply_once() {
        let f = fixture().await;
        let processor = Arc::new(f.processor);
        let body = MockGateway::webhook_payload(&f.session_id, PaymentOutcome::Captured);
        let headers = f.gateway.signature_headers();

        let (p1, p2) = (processor.clone(), processor.clone());
        let (b1, b2) = (body.clone(), body);
        let (h1, h2) = (headers.clone(), headers);
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { p1.process("mock", &b1, &h1).await }),
            tokio::spawn(async move { p2.process("mock", &b2, &h2).await }),
        );
        let acks = [r1.unwrap().unwrap(), r2.unwrap().unwrap()];

        let applied = acks
            .iter()
            .filter(|a| matches!(a, ReconciliationAck::Applied { .. }))
            .count();
        assert_eq!(applied, 1);

        // One status-change audit entry beyond creation, one event.
        assert_eq!(f.store.audit_trail(f.booking.id).await.unwrap().len(), 2);
        assert_eq!(f.publisher.events().len(), 1);
    }
}
