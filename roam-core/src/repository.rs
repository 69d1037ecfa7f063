use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use roam_shared::{AuditEntry, Booking, PaymentSession, SessionStatus, StayRange, Vehicle};
use uuid::Uuid;

use crate::lifecycle::LifecycleEvent;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested dates overlap an active booking. Carries the
    /// conflicting interval for the caller's diagnostics.
    #[error("dates conflict with existing booking {existing}")]
    Conflict { existing: StayRange },

    #[error("not found")]
    NotFound,

    #[error("event {event} not applicable from status {from}")]
    InvalidTransition { from: roam_shared::BookingStatus, event: LifecycleEvent },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Input to the atomic reservation insert. The store owns id and
/// timestamp generation so retries cannot mint divergent rows.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub vehicle_id: Uuid,
    pub renter_id: Uuid,
    pub stay: StayRange,
    pub total_minor: i64,
    pub currency: String,
    pub actor: String,
}

#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The conditional update matched and the status changed.
    Applied(Booking),
    /// The booking was already terminal; nothing was written.
    AlreadyTerminal(Booking),
}

impl TransitionOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            TransitionOutcome::Applied(b) | TransitionOutcome::AlreadyTerminal(b) => b,
        }
    }
}

/// Durable booking store. Implementations must make
/// `create_reservation` and `transition` atomic: the overlap check plus
/// insert, and the status guard plus update plus audit append, each
/// commit fully or not at all under concurrent callers.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Overlap-check-then-insert as one unit. Returns
    /// `StoreError::Conflict` when the stay overlaps a Pending or
    /// Confirmed booking on the same vehicle; writes the booking row
    /// and its "created" audit entry otherwise.
    async fn create_reservation(&self, new: NewBooking) -> Result<Booking, StoreError>;

    async fn get(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Availability Index query: the first active booking interval
    /// overlapping `stay` on this vehicle, if any.
    async fn conflicting_booking(
        &self,
        vehicle_id: Uuid,
        stay: &StayRange,
    ) -> Result<Option<StayRange>, StoreError>;

    /// Conditional read-modify-write guarded by the event's source
    /// statuses, with a matching audit entry in the same unit of work.
    async fn transition(
        &self,
        booking_id: Uuid,
        event: LifecycleEvent,
        actor: &str,
    ) -> Result<TransitionOutcome, StoreError>;

    async fn attach_session(
        &self,
        booking_id: Uuid,
        session_id: Uuid,
        provider: &str,
    ) -> Result<(), StoreError>;

    /// Pending bookings created before `older_than`, for the
    /// reconciliation sweep.
    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Confirmed bookings whose end date passed as of `as_of`, each
    /// moved to Completed through the same conditional primitive.
    /// Returns the bookings that actually transitioned.
    async fn sweep_completed(&self, as_of: NaiveDate) -> Result<Vec<Booking>, StoreError>;

    async fn audit_trail(&self, booking_id: Uuid) -> Result<Vec<AuditEntry>, StoreError>;
}

#[async_trait]
pub trait PaymentSessionStore: Send + Sync {
    async fn create(&self, session: PaymentSession) -> Result<(), StoreError>;

    async fn find_by_provider_session_id(
        &self,
        provider: &str,
        provider_session_id: &str,
    ) -> Result<Option<PaymentSession>, StoreError>;

    async fn find_by_booking(&self, booking_id: Uuid)
        -> Result<Option<PaymentSession>, StoreError>;

    /// Idempotent: marking a session with its current status is a
    /// no-op.
    async fn mark_status(&self, session_id: Uuid, status: SessionStatus)
        -> Result<(), StoreError>;
}

/// Read seam over the externally owned vehicle catalog.
#[async_trait]
pub trait VehicleCatalog: Send + Sync {
    async fn vehicle(&self, vehicle_id: Uuid) -> Result<Option<Vehicle>, StoreError>;
}
