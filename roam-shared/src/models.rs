use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A listed vehicle, owned and mutated by host-profile flows.
/// The reservation core only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub nightly_rate_minor: i64,
    pub currency: String,
    pub location: String,
    /// IANA timezone of the listing, e.g. "America/Denver".
    pub timezone: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    PaymentFailed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::PaymentFailed => "PAYMENT_FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "COMPLETED" => Some(BookingStatus::Completed),
            "PAYMENT_FAILED" => Some(BookingStatus::PaymentFailed),
            _ => None,
        }
    }

    /// Cancelled, Completed and PaymentFailed accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Completed | BookingStatus::PaymentFailed
        )
    }

    /// Statuses that occupy the vehicle's calendar.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open `[start, end)` calendar date range. `end` is exclusive,
/// so adjacent stays can share a boundary date without conflicting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StayRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StayRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Whole nights covered by the range. Zero or negative for
    /// malformed ranges; callers validate before pricing.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// `existing.start < new.end AND new.start < existing.end`.
    /// Boundary equality is not a conflict.
    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

impl std::fmt::Display for StayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A reservation of one vehicle for a half-open `[start_date, end_date)`
/// date range. `end_date` is exclusive: a booking ending on a date and
/// another starting on the same date never conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub renter_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BookingStatus,
    pub total_minor: i64,
    pub currency: String,
    pub payment_session_id: Option<Uuid>,
    pub payment_provider: Option<String>,
    /// Optimistic-concurrency token, bumped on every status write.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn stay(&self) -> StayRange {
        StayRange::new(self.start_date, self.end_date)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Created,
    Captured,
    Failed,
    Refunded,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "CREATED",
            SessionStatus::Captured => "CAPTURED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(SessionStatus::Created),
            "CAPTURED" => Some(SessionStatus::Captured),
            "FAILED" => Some(SessionStatus::Failed),
            "REFUNDED" => Some(SessionStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Created)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One external payment-provider session tied to exactly one booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub provider: String,
    pub provider_session_id: String,
    pub status: SessionStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record, one per status transition, kept for
/// dispute resolution. `seq` is a per-booking sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub booking_id: Uuid,
    pub seq: i32,
    pub from_status: Option<BookingStatus>,
    pub to_status: BookingStatus,
    pub event: String,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}
