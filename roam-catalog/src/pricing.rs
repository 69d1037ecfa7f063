use roam_shared::{Booking, StayRange};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("stay {0} must cover at least one night")]
    EmptyStay(StayRange),

    #[error("total for {nights} nights at {rate_minor} overflows")]
    Overflow { rate_minor: i64, nights: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    pub nights: i64,
    pub total_minor: i64,
    pub currency: String,
}

/// Minor-unit exponent per ISO 4217: two decimal places except for
/// the zero-decimal currencies the payment providers accept.
pub fn minor_unit_exponent(currency: &str) -> u32 {
    match currency {
        "JPY" | "KRW" | "VND" | "CLP" => 0,
        _ => 2,
    }
}

/// Round a major-unit amount to the currency's minor unit, half-up,
/// and return it in minor units.
pub fn round_to_minor(amount: Decimal, currency: &str) -> Option<i64> {
    let exp = minor_unit_exponent(currency);
    let rounded = amount.round_dp_with_strategy(exp, RoundingStrategy::MidpointAwayFromZero);
    (rounded * Decimal::from(10_i64.checked_pow(exp)?)).to_i64()
}

/// Pure pricing function: `total = nightly_rate × nights`, `nights ≥ 1`.
/// No side effects; used at creation time and for audit re-verification.
pub fn quote(
    nightly_rate_minor: i64,
    currency: &str,
    stay: &StayRange,
) -> Result<Quote, PricingError> {
    let nights = stay.nights();
    if nights < 1 {
        return Err(PricingError::EmptyStay(*stay));
    }

    let exp = minor_unit_exponent(currency);
    let rate = Decimal::new(nightly_rate_minor, exp);
    let total = rate * Decimal::from(nights);
    let total_minor = round_to_minor(total, currency).ok_or(PricingError::Overflow {
        rate_minor: nightly_rate_minor,
        nights,
    })?;

    Ok(Quote {
        nights,
        total_minor,
        currency: currency.to_string(),
    })
}

/// Audit re-verification: does the booking's stored total match what
/// the calculator produces for this rate today?
pub fn verify_total(booking: &Booking, nightly_rate_minor: i64) -> Result<bool, PricingError> {
    let q = quote(nightly_rate_minor, &booking.currency, &booking.stay())?;
    Ok(q.total_minor == booking.total_minor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_four_nights_at_75() {
        // 75.00/night, 2025-12-01..2025-12-05 -> 4 nights -> 300.00
        let stay = StayRange::new(d(2025, 12, 1), d(2025, 12, 5));
        let q = quote(7500, "USD", &stay).unwrap();
        assert_eq!(q.nights, 4);
        assert_eq!(q.total_minor, 30000);
    }

    #[test]
    fn test_single_night_equals_rate() {
        let stay = StayRange::new(d(2025, 12, 1), d(2025, 12, 2));
        let q = quote(7500, "USD", &stay).unwrap();
        assert_eq!(q.nights, 1);
        assert_eq!(q.total_minor, 7500);
    }

    #[test]
    fn test_empty_and_negative_spans_rejected() {
        let zero = StayRange::new(d(2025, 12, 1), d(2025, 12, 1));
        assert!(matches!(quote(7500, "USD", &zero), Err(PricingError::EmptyStay(_))));

        let backwards = StayRange::new(d(2025, 12, 5), d(2025, 12, 1));
        assert!(matches!(quote(7500, "USD", &backwards), Err(PricingError::EmptyStay(_))));
    }

    #[test]
    fn test_zero_decimal_currency() {
        let stay = StayRange::new(d(2025, 12, 1), d(2025, 12, 4));
        let q = quote(8000, "JPY", &stay).unwrap();
        // 8000 yen/night, no fractional unit
        assert_eq!(q.total_minor, 24000);
    }

    #[test]
    fn test_round_half_up_at_midpoint() {
        let amount = Decimal::new(2345, 3); // 2.345
        assert_eq!(round_to_minor(amount, "USD"), Some(235));

        let amount = Decimal::new(2344, 3); // 2.344
        assert_eq!(round_to_minor(amount, "USD"), Some(234));

        let amount = Decimal::new(15, 1); // 1.5 in a zero-decimal currency
        assert_eq!(round_to_minor(amount, "JPY"), Some(2));
    }

    #[test]
    fn test_verify_total_detects_drift() {
        let stay = StayRange::new(d(2025, 6, 15), d(2025, 6, 18));
        let q = quote(10000, "USD", &stay).unwrap();
        assert_eq!(q.total_minor, 30000);

        let booking = Booking {
            id: uuid_stub(),
            vehicle_id: uuid_stub(),
            renter_id: uuid_stub(),
            start_date: stay.start,
            end_date: stay.end,
            status: roam_shared::BookingStatus::Pending,
            total_minor: q.total_minor,
            currency: "USD".to_string(),
            payment_session_id: None,
            payment_provider: None,
            version: 1,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert!(verify_total(&booking, 10000).unwrap());
        assert!(!verify_total(&booking, 9900).unwrap());
    }

    fn uuid_stub() -> uuid::Uuid {
        uuid::Uuid::new_v4()
    }
}
