use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TOPIC_BOOKING_CREATED: &str = "booking.created";
pub const TOPIC_BOOKING_CONFIRMED: &str = "booking.confirmed";
pub const TOPIC_BOOKING_PAYMENT_FAILED: &str = "booking.payment_failed";
pub const TOPIC_BOOKING_CANCELLED: &str = "booking.cancelled";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub vehicle_id: Uuid,
    pub renter_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_minor: i64,
    pub currency: String,
    pub occurred_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub vehicle_id: Uuid,
    pub renter_id: Uuid,
    pub provider: String,
    pub occurred_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingPaymentFailedEvent {
    pub booking_id: Uuid,
    pub vehicle_id: Uuid,
    pub renter_id: Uuid,
    pub provider: String,
    pub occurred_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub vehicle_id: Uuid,
    pub actor: String,
    pub occurred_at: i64,
}

/// Everything the notification dispatcher consumes from this core.
/// Keyed by booking id so per-booking ordering survives partitioning.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    BookingCreated(BookingCreatedEvent),
    BookingConfirmed(BookingConfirmedEvent),
    BookingPaymentFailed(BookingPaymentFailedEvent),
    BookingCancelled(BookingCancelledEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::BookingCreated(_) => TOPIC_BOOKING_CREATED,
            DomainEvent::BookingConfirmed(_) => TOPIC_BOOKING_CONFIRMED,
            DomainEvent::BookingPaymentFailed(_) => TOPIC_BOOKING_PAYMENT_FAILED,
            DomainEvent::BookingCancelled(_) => TOPIC_BOOKING_CANCELLED,
        }
    }

    pub fn key(&self) -> Uuid {
        match self {
            DomainEvent::BookingCreated(e) => e.booking_id,
            DomainEvent::BookingConfirmed(e) => e.booking_id,
            DomainEvent::BookingPaymentFailed(e) => e.booking_id,
            DomainEvent::BookingCancelled(e) => e.booking_id,
        }
    }
}
