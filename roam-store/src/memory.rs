//! Mutex-guarded in-memory implementation of the store traits. Check
//! and insert happen under one lock, which is the per-key-lock flavor
//! of the conflict-safety strategies. Used by unit and integration
//! tests; the durable Postgres store is the production path.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use roam_catalog::availability;
use roam_core::lifecycle::{self, LifecycleEvent, Transition};
use roam_core::repository::{
    BookingStore, NewBooking, PaymentSessionStore, StoreError, TransitionOutcome, VehicleCatalog,
};
use roam_shared::{
    AuditEntry, Booking, BookingStatus, PaymentSession, SessionStatus, StayRange, Vehicle,
};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    vehicles: HashMap<Uuid, Vehicle>,
    bookings: HashMap<Uuid, Booking>,
    sessions: HashMap<Uuid, PaymentSession>,
    audit: HashMap<Uuid, Vec<AuditEntry>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vehicle(&self, vehicle: Vehicle) {
        self.inner.lock().vehicles.insert(vehicle.id, vehicle);
    }
}

fn append_audit(
    inner: &mut Inner,
    booking_id: Uuid,
    from_status: Option<BookingStatus>,
    to_status: BookingStatus,
    event: &str,
    actor: &str,
    recorded_at: DateTime<Utc>,
) {
    let trail = inner.audit.entry(booking_id).or_default();
    let seq = trail.len() as i32 + 1;
    trail.push(AuditEntry {
        booking_id,
        seq,
        from_status,
        to_status,
        event: event.to_string(),
        actor: actor.to_string(),
        recorded_at,
    });
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn create_reservation(&self, new: NewBooking) -> Result<Booking, StoreError> {
        let mut inner = self.inner.lock();

        let vehicle_bookings = inner
            .bookings
            .values()
            .filter(|b| b.vehicle_id == new.vehicle_id);
        if let Some(existing) = availability::first_conflict(vehicle_bookings, &new.stay) {
            return Err(StoreError::Conflict { existing });
        }

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            vehicle_id: new.vehicle_id,
            renter_id: new.renter_id,
            start_date: new.stay.start,
            end_date: new.stay.end,
            status: BookingStatus::Pending,
            total_minor: new.total_minor,
            currency: new.currency.clone(),
            payment_session_id: None,
            payment_provider: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        inner.bookings.insert(booking.id, booking.clone());
        append_audit(
            &mut inner,
            booking.id,
            None,
            BookingStatus::Pending,
            "created",
            &new.actor,
            now,
        );
        Ok(booking)
    }

    async fn get(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.lock().bookings.get(&booking_id).cloned())
    }

    async fn conflicting_booking(
        &self,
        vehicle_id: Uuid,
        stay: &StayRange,
    ) -> Result<Option<StayRange>, StoreError> {
        let inner = self.inner.lock();
        let vehicle_bookings = inner.bookings.values().filter(|b| b.vehicle_id == vehicle_id);
        Ok(availability::first_conflict(vehicle_bookings, stay))
    }

    async fn transition(
        &self,
        booking_id: Uuid,
        event: LifecycleEvent,
        actor: &str,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut inner = self.inner.lock();

        let current = inner
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        match lifecycle::apply(current.status, event) {
            Transition::AlreadyTerminal => Ok(TransitionOutcome::AlreadyTerminal(current)),
            Transition::Rejected => {
                Err(StoreError::InvalidTransition { from: current.status, event })
            }
            Transition::Applied(to) => {
                let now = Utc::now();
                let updated = Booking {
                    status: to,
                    version: current.version + 1,
                    updated_at: now,
                    ..current.clone()
                };
                inner.bookings.insert(booking_id, updated.clone());
                append_audit(
                    &mut inner,
                    booking_id,
                    Some(current.status),
                    to,
                    event.as_str(),
                    actor,
                    now,
                );
                Ok(TransitionOutcome::Applied(updated))
            }
        }
    }

    async fn attach_session(
        &self,
        booking_id: Uuid,
        session_id: Uuid,
        provider: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let booking = inner.bookings.get_mut(&booking_id).ok_or(StoreError::NotFound)?;
        booking.payment_session_id = Some(session_id);
        booking.payment_provider = Some(provider.to_string());
        booking.updated_at = Utc::now();
        Ok(())
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let inner = self.inner.lock();
        let mut stale: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|b| b.created_at);
        Ok(stale)
    }

    async fn sweep_completed(&self, as_of: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        let candidates: Vec<Uuid> = {
            let inner = self.inner.lock();
            inner
                .bookings
                .values()
                .filter(|b| b.status == BookingStatus::Confirmed && b.end_date <= as_of)
                .map(|b| b.id)
                .collect()
        };

        let mut completed = Vec::new();
        for id in candidates {
            match self
                .transition(id, LifecycleEvent::EndDatePassed, roam_core::identity::SWEEP_ACTOR)
                .await
            {
                Ok(TransitionOutcome::Applied(b)) => completed.push(b),
                Ok(TransitionOutcome::AlreadyTerminal(_)) => {}
                Err(StoreError::InvalidTransition { .. }) | Err(StoreError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(completed)
    }

    async fn audit_trail(&self, booking_id: Uuid) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.inner.lock().audit.get(&booking_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PaymentSessionStore for InMemoryStore {
    async fn create(&self, session: PaymentSession) -> Result<(), StoreError> {
        self.inner.lock().sessions.insert(session.id, session);
        Ok(())
    }

    async fn find_by_provider_session_id(
        &self,
        provider: &str,
        provider_session_id: &str,
    ) -> Result<Option<PaymentSession>, StoreError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .values()
            .find(|s| s.provider == provider && s.provider_session_id == provider_session_id)
            .cloned())
    }

    async fn find_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<PaymentSession>, StoreError> {
        let inner = self.inner.lock();
        let mut sessions: Vec<&PaymentSession> = inner
            .sessions
            .values()
            .filter(|s| s.booking_id == booking_id)
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions.last().map(|s| (*s).clone()))
    }

    async fn mark_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let session = inner.sessions.get_mut(&session_id).ok_or(StoreError::NotFound)?;
        if session.status != status {
            session.status = status;
            session.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl VehicleCatalog for InMemoryStore {
    async fn vehicle(&self, vehicle_id: Uuid) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.inner.lock().vehicles.get(&vehicle_id).cloned())
    }
}
