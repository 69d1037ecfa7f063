pub mod creator;
pub mod sweep;

pub use creator::{ReservationError, ReservationService};
