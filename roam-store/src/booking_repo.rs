use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use roam_core::lifecycle::{self, LifecycleEvent, Transition};
use roam_core::repository::{
    BookingStore, NewBooking, StoreError, TransitionOutcome,
};
use roam_shared::{AuditEntry, Booking, BookingStatus, StayRange};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

/// SQLSTATE for exclusion constraint violations.
const EXCLUSION_VIOLATION: &str = "23P01";

/// Batch cap for the sweep queries.
const SWEEP_BATCH: i64 = 200;

const BOOKING_COLUMNS: &str = "id, vehicle_id, renter_id, start_date, end_date, status, \
     total_minor, currency, payment_session_id, payment_provider, version, created_at, updated_at";

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    vehicle_id: Uuid,
    renter_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: String,
    total_minor: i64,
    currency: String,
    payment_session_id: Option<Uuid>,
    payment_provider: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking, StoreError> {
        let status = BookingStatus::parse(&self.status)
            .ok_or_else(|| anyhow::anyhow!("unknown booking status {:?}", self.status))?;
        Ok(Booking {
            id: self.id,
            vehicle_id: self.vehicle_id,
            renter_id: self.renter_id,
            start_date: self.start_date,
            end_date: self.end_date,
            status,
            total_minor: self.total_minor,
            currency: self.currency,
            payment_session_id: self.payment_session_id,
            payment_provider: self.payment_provider,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    booking_id: Uuid,
    seq: i32,
    from_status: Option<String>,
    to_status: String,
    event: String,
    actor: String,
    recorded_at: DateTime<Utc>,
}

impl AuditRow {
    fn into_entry(self) -> Result<AuditEntry, StoreError> {
        let to_status = BookingStatus::parse(&self.to_status)
            .ok_or_else(|| anyhow::anyhow!("unknown audit status {:?}", self.to_status))?;
        let from_status = match self.from_status {
            Some(s) => Some(
                BookingStatus::parse(&s)
                    .ok_or_else(|| anyhow::anyhow!("unknown audit status {:?}", s))?,
            ),
            None => None,
        };
        Ok(AuditEntry {
            booking_id: self.booking_id,
            seq: self.seq,
            from_status,
            to_status,
            event: self.event,
            actor: self.actor,
            recorded_at: self.recorded_at,
        })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.into())
}

fn is_exclusion_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == EXCLUSION_VIOLATION)
        .unwrap_or(false)
}

async fn append_audit(
    tx: &mut Transaction<'_, Postgres>,
    booking_id: Uuid,
    from_status: Option<BookingStatus>,
    to_status: BookingStatus,
    event: &str,
    actor: &str,
    recorded_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO booking_audit (booking_id, seq, from_status, to_status, event, actor, recorded_at)
        SELECT $1, COALESCE(MAX(seq), 0) + 1, $2, $3, $4, $5, $6
        FROM booking_audit WHERE booking_id = $1
        "#,
    )
    .bind(booking_id)
    .bind(from_status.map(|s| s.as_str()))
    .bind(to_status.as_str())
    .bind(event)
    .bind(actor)
    .bind(recorded_at)
    .execute(&mut **tx)
    .await
    .map_err(backend)?;
    Ok(())
}

impl PgBookingStore {
    async fn overlap_query(
        &self,
        vehicle_id: Uuid,
        stay: &StayRange,
    ) -> Result<Option<StayRange>, StoreError> {
        let row: Option<(NaiveDate, NaiveDate)> = sqlx::query_as(
            r#"
            SELECT start_date, end_date FROM bookings
            WHERE vehicle_id = $1
              AND status IN ('PENDING', 'CONFIRMED')
              AND start_date < $3 AND $2 < end_date
            ORDER BY start_date
            LIMIT 1
            "#,
        )
        .bind(vehicle_id)
        .bind(stay.start)
        .bind(stay.end)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|(start, end)| StayRange::new(start, end)))
    }

    /// Row-locking read-modify-write shared by `transition` and the
    /// completion sweep.
    async fn transition_tx(
        &self,
        booking_id: Uuid,
        event: LifecycleEvent,
        actor: &str,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        let booking = row.ok_or(StoreError::NotFound)?.into_booking()?;

        match lifecycle::apply(booking.status, event) {
            Transition::AlreadyTerminal => {
                tx.rollback().await.map_err(backend)?;
                Ok(TransitionOutcome::AlreadyTerminal(booking))
            }
            Transition::Rejected => {
                tx.rollback().await.map_err(backend)?;
                Err(StoreError::InvalidTransition { from: booking.status, event })
            }
            Transition::Applied(to) => {
                let now = Utc::now();
                sqlx::query(
                    "UPDATE bookings SET status = $2, version = version + 1, updated_at = $3 \
                     WHERE id = $1",
                )
                .bind(booking_id)
                .bind(to.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;

                append_audit(
                    &mut tx,
                    booking_id,
                    Some(booking.status),
                    to,
                    event.as_str(),
                    actor,
                    now,
                )
                .await?;

                tx.commit().await.map_err(backend)?;

                Ok(TransitionOutcome::Applied(Booking {
                    status: to,
                    version: booking.version + 1,
                    updated_at: now,
                    ..booking
                }))
            }
        }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn create_reservation(&self, new: NewBooking) -> Result<Booking, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Re-check availability inside the transaction so the caller
        // gets the conflicting interval; the exclusion constraint
        // below backstops the race this check cannot close on its own.
        let existing: Option<(NaiveDate, NaiveDate)> = sqlx::query_as(
            r#"
            SELECT start_date, end_date FROM bookings
            WHERE vehicle_id = $1
              AND status IN ('PENDING', 'CONFIRMED')
              AND start_date < $3 AND $2 < end_date
            LIMIT 1
            "#,
        )
        .bind(new.vehicle_id)
        .bind(new.stay.start)
        .bind(new.stay.end)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        if let Some((start, end)) = existing {
            return Err(StoreError::Conflict { existing: StayRange::new(start, end) });
        }

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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO bookings (id, vehicle_id, renter_id, start_date, end_date, status,
                                  total_minor, currency, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(booking.id)
        .bind(booking.vehicle_id)
        .bind(booking.renter_id)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.status.as_str())
        .bind(booking.total_minor)
        .bind(&booking.currency)
        .bind(booking.version)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if is_exclusion_violation(&e) {
                // A concurrent insert won the range; it has committed,
                // so it is visible for diagnostics now.
                drop(tx);
                let existing = self
                    .overlap_query(new.vehicle_id, &new.stay)
                    .await?
                    .unwrap_or(new.stay);
                return Err(StoreError::Conflict { existing });
            }
            return Err(backend(e));
        }

        append_audit(
            &mut tx,
            booking.id,
            None,
            BookingStatus::Pending,
            "created",
            &new.actor,
            booking.created_at,
        )
        .await?;

        tx.commit().await.map_err(backend)?;
        Ok(booking)
    }

    async fn get(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(BookingRow::into_booking).transpose()
    }

    async fn conflicting_booking(
        &self,
        vehicle_id: Uuid,
        stay: &StayRange,
    ) -> Result<Option<StayRange>, StoreError> {
        self.overlap_query(vehicle_id, stay).await
    }

    async fn transition(
        &self,
        booking_id: Uuid,
        event: LifecycleEvent,
        actor: &str,
    ) -> Result<TransitionOutcome, StoreError> {
        self.transition_tx(booking_id, event, actor).await
    }

    async fn attach_session(
        &self,
        booking_id: Uuid,
        session_id: Uuid,
        provider: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE bookings SET payment_session_id = $2, payment_provider = $3, updated_at = $4 \
             WHERE id = $1",
        )
        .bind(booking_id)
        .bind(session_id)
        .bind(provider)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE status = 'PENDING' AND created_at < $1 \
             ORDER BY created_at LIMIT $2",
            BOOKING_COLUMNS
        ))
        .bind(older_than)
        .bind(SWEEP_BATCH)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(BookingRow::into_booking).collect()
    }

    async fn sweep_completed(&self, as_of: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        let candidates: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM bookings WHERE status = 'CONFIRMED' AND end_date <= $1 \
             ORDER BY end_date LIMIT $2",
        )
        .bind(as_of)
        .bind(SWEEP_BATCH)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut completed = Vec::new();
        for (id,) in candidates {
            // Conditional per row: a cancellation racing the sweep
            // simply wins, and the sweep skips the booking.
            match self
                .transition_tx(id, LifecycleEvent::EndDatePassed, roam_core::identity::SWEEP_ACTOR)
                .await
            {
                Ok(TransitionOutcome::Applied(b)) => completed.push(b),
                Ok(TransitionOutcome::AlreadyTerminal(_)) => {}
                Err(StoreError::InvalidTransition { .. }) | Err(StoreError::NotFound) => {}
                Err(e) => {
                    warn!("Completion sweep failed for booking {}: {}", id, e);
                    return Err(e);
                }
            }
        }
        Ok(completed)
    }

    async fn audit_trail(&self, booking_id: Uuid) -> Result<Vec<AuditEntry>, StoreError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT booking_id, seq, from_status, to_status, event, actor, recorded_at \
             FROM booking_audit WHERE booking_id = $1 ORDER BY seq",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(AuditRow::into_entry).collect()
    }
}
