use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use roam_catalog::pricing;
use roam_core::identity;
use roam_core::lifecycle::LifecycleEvent;
use roam_core::publish::DomainEventPublisher;
use roam_core::repository::{
    BookingStore, NewBooking, StoreError, TransitionOutcome, VehicleCatalog,
};
use roam_shared::events::{BookingCancelledEvent, BookingCreatedEvent, DomainEvent};
use roam_shared::{Booking, StayRange, Vehicle};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("requested dates conflict with existing booking {existing}")]
    Conflict { existing: StayRange },

    #[error("not found")]
    NotFound,

    #[error("vehicle is delisted")]
    Unavailable,

    #[error("caller may not act on this booking")]
    Forbidden,

    #[error(transparent)]
    Store(StoreError),
}

impl ReservationError {
    fn from_store(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { existing } => ReservationError::Conflict { existing },
            StoreError::NotFound => ReservationError::NotFound,
            other => ReservationError::Store(other),
        }
    }
}

/// Single entry point for booking creation, cancellation and reads.
/// The overlap check and insert happen inside the store as one atomic
/// unit; this service validates, prices and publishes around it.
pub struct ReservationService {
    bookings: Arc<dyn BookingStore>,
    catalog: Arc<dyn VehicleCatalog>,
    publisher: Arc<dyn DomainEventPublisher>,
}

impl ReservationService {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        catalog: Arc<dyn VehicleCatalog>,
        publisher: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        Self { bookings, catalog, publisher }
    }

    pub async fn create(
        &self,
        vehicle_id: Uuid,
        renter_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Booking, ReservationError> {
        let stay = StayRange::new(start_date, end_date);
        if stay.nights() < 1 {
            return Err(ReservationError::Validation(
                "end date must be after start date".to_string(),
            ));
        }

        let vehicle = self
            .catalog
            .vehicle(vehicle_id)
            .await
            .map_err(ReservationError::from_store)?
            .ok_or(ReservationError::NotFound)?;
        if !vehicle.active {
            return Err(ReservationError::Unavailable);
        }

        // "Today" is judged in the listing's timezone, not the server's.
        let today = today_in(&vehicle.timezone);
        if start_date < today {
            return Err(ReservationError::Validation(format!(
                "start date {} is before today {}",
                start_date, today
            )));
        }

        let quote = pricing::quote(vehicle.nightly_rate_minor, &vehicle.currency, &stay)
            .map_err(|e| ReservationError::Validation(e.to_string()))?;

        let booking = self
            .bookings
            .create_reservation(NewBooking {
                vehicle_id,
                renter_id,
                stay,
                total_minor: quote.total_minor,
                currency: quote.currency,
                actor: identity::renter_actor(renter_id),
            })
            .await
            .map_err(ReservationError::from_store)?;

        info!(
            "Reservation {} created for vehicle {} ({} nights, {} {})",
            booking.id, vehicle_id, quote.nights, booking.total_minor, booking.currency
        );

        self.publisher
            .publish(&DomainEvent::BookingCreated(BookingCreatedEvent {
                booking_id: booking.id,
                vehicle_id,
                renter_id,
                start_date,
                end_date,
                total_minor: booking.total_minor,
                currency: booking.currency.clone(),
                occurred_at: Utc::now().timestamp(),
            }))
            .await;

        Ok(booking)
    }

    /// Cancel by the renter or the vehicle's owner. Cancelling an
    /// already-terminal booking is a successful no-op.
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
    ) -> Result<TransitionOutcome, ReservationError> {
        let booking = self.fetch(booking_id).await?;
        let actor = self.authorize(&booking, caller_id).await?;

        let outcome = self
            .bookings
            .transition(booking_id, LifecycleEvent::CancelRequested, &actor)
            .await
            .map_err(ReservationError::from_store)?;

        match &outcome {
            TransitionOutcome::Applied(updated) => {
                info!("Booking {} cancelled by {}", booking_id, actor);
                self.publisher
                    .publish(&DomainEvent::BookingCancelled(BookingCancelledEvent {
                        booking_id,
                        vehicle_id: updated.vehicle_id,
                        actor,
                        occurred_at: Utc::now().timestamp(),
                    }))
                    .await;
            }
            TransitionOutcome::AlreadyTerminal(b) => {
                info!(
                    "Cancel of booking {} ignored, already {}",
                    booking_id, b.status
                );
            }
        }

        Ok(outcome)
    }

    /// Read restricted to the renter or the vehicle's owner.
    pub async fn get(&self, booking_id: Uuid, caller_id: Uuid) -> Result<Booking, ReservationError> {
        let booking = self.fetch(booking_id).await?;
        self.authorize(&booking, caller_id).await?;
        Ok(booking)
    }

    /// Unrestricted read for internal collaborators (ops, sweeps).
    pub async fn fetch(&self, booking_id: Uuid) -> Result<Booking, ReservationError> {
        self.bookings
            .get(booking_id)
            .await
            .map_err(ReservationError::from_store)?
            .ok_or(ReservationError::NotFound)
    }

    /// Returns the audit actor string for an authorized caller.
    async fn authorize(&self, booking: &Booking, caller_id: Uuid) -> Result<String, ReservationError> {
        if booking.renter_id == caller_id {
            return Ok(identity::renter_actor(caller_id));
        }
        let vehicle: Option<Vehicle> = self
            .catalog
            .vehicle(booking.vehicle_id)
            .await
            .map_err(ReservationError::from_store)?;
        match vehicle {
            Some(v) if v.owner_id == caller_id => Ok(identity::host_actor(caller_id)),
            _ => Err(ReservationError::Forbidden),
        }
    }
}

fn today_in(tz_name: &str) -> NaiveDate {
    match tz_name.parse::<Tz>() {
        Ok(tz) => Utc::now().with_timezone(&tz).date_naive(),
        Err(_) => {
            warn!("Unknown listing timezone {:?}, falling back to UTC", tz_name);
            Utc::now().date_naive()
        }
    }
}
