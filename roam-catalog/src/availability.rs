use roam_shared::{Booking, StayRange};

/// Scan a vehicle's bookings for the first active one overlapping the
/// candidate stay. The durable store answers this with an indexed
/// query; this shared predicate keeps the in-memory store and the
/// tests on the same overlap semantics.
pub fn first_conflict<'a, I>(bookings: I, candidate: &StayRange) -> Option<StayRange>
where
    I: IntoIterator<Item = &'a Booking>,
{
    bookings
        .into_iter()
        .filter(|b| b.status.is_active())
        .map(|b| b.stay())
        .find(|stay| stay.overlaps(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use roam_shared::BookingStatus;
    use uuid::Uuid;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn booking(start: NaiveDate, end: NaiveDate, status: BookingStatus) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            renter_id: Uuid::new_v4(),
            start_date: start,
            end_date: end,
            status,
            total_minor: 0,
            currency: "USD".to_string(),
            payment_session_id: None,
            payment_provider: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_overlap_detected_with_interval() {
        let existing = vec![booking(d(6, 10), d(6, 15), BookingStatus::Pending)];
        let candidate = StayRange::new(d(6, 14), d(6, 18));
        let hit = first_conflict(&existing, &candidate).unwrap();
        assert_eq!(hit, StayRange::new(d(6, 10), d(6, 15)));
    }

    #[test]
    fn test_boundary_date_is_not_a_conflict() {
        let existing = vec![booking(d(6, 10), d(6, 15), BookingStatus::Confirmed)];
        let candidate = StayRange::new(d(6, 15), d(6, 18));
        assert!(first_conflict(&existing, &candidate).is_none());
    }

    #[test]
    fn test_inactive_statuses_do_not_block() {
        let existing = vec![
            booking(d(6, 10), d(6, 15), BookingStatus::Cancelled),
            booking(d(6, 10), d(6, 15), BookingStatus::PaymentFailed),
        ];
        let candidate = StayRange::new(d(6, 12), d(6, 14));
        assert!(first_conflict(&existing, &candidate).is_none());
    }
}
