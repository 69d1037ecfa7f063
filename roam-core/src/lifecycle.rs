use roam_shared::BookingStatus;
use serde::{Deserialize, Serialize};

/// Events that drive the booking state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    PaymentCaptured,
    PaymentDenied,
    CancelRequested,
    EndDatePassed,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::PaymentCaptured => "payment_captured",
            LifecycleEvent::PaymentDenied => "payment_denied",
            LifecycleEvent::CancelRequested => "cancel_requested",
            LifecycleEvent::EndDatePassed => "end_date_passed",
        }
    }

    /// Statuses this event may fire from. Used verbatim as the guard
    /// of the conditional status update in the store.
    pub fn sources(&self) -> &'static [BookingStatus] {
        match self {
            LifecycleEvent::PaymentCaptured => &[BookingStatus::Pending],
            LifecycleEvent::PaymentDenied => &[BookingStatus::Pending],
            LifecycleEvent::CancelRequested => {
                &[BookingStatus::Pending, BookingStatus::Confirmed]
            }
            LifecycleEvent::EndDatePassed => &[BookingStatus::Confirmed],
        }
    }

    pub fn target(&self) -> BookingStatus {
        match self {
            LifecycleEvent::PaymentCaptured => BookingStatus::Confirmed,
            LifecycleEvent::PaymentDenied => BookingStatus::PaymentFailed,
            LifecycleEvent::CancelRequested => BookingStatus::Cancelled,
            LifecycleEvent::EndDatePassed => BookingStatus::Completed,
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying an event to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied(BookingStatus),
    /// The booking already reached a terminal status. A successful
    /// idempotent no-op, not an error; retried webhooks land here.
    AlreadyTerminal,
    /// Undefined pair, e.g. EndDatePassed on a Pending booking.
    Rejected,
}

pub fn apply(from: BookingStatus, event: LifecycleEvent) -> Transition {
    if from.is_terminal() {
        return Transition::AlreadyTerminal;
    }
    if event.sources().contains(&from) {
        Transition::Applied(event.target())
    } else {
        Transition::Rejected
    }
}
