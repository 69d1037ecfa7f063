use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roam_core::repository::{PaymentSessionStore, StoreError};
use roam_shared::{PaymentSession, SessionStatus};
use sqlx::PgPool;
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, booking_id, provider, provider_session_id, status, \
     amount_minor, currency, redirect_url, created_at, updated_at";

pub struct PgPaymentSessionStore {
    pool: PgPool,
}

impl PgPaymentSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    booking_id: Uuid,
    provider: String,
    provider_session_id: String,
    status: String,
    amount_minor: i64,
    currency: String,
    redirect_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self) -> Result<PaymentSession, StoreError> {
        let status = SessionStatus::parse(&self.status)
            .ok_or_else(|| anyhow::anyhow!("unknown session status {:?}", self.status))?;
        Ok(PaymentSession {
            id: self.id,
            booking_id: self.booking_id,
            provider: self.provider,
            provider_session_id: self.provider_session_id,
            status,
            amount_minor: self.amount_minor,
            currency: self.currency,
            redirect_url: self.redirect_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.into())
}

#[async_trait]
impl PaymentSessionStore for PgPaymentSessionStore {
    async fn create(&self, session: PaymentSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payment_sessions (id, booking_id, provider, provider_session_id, status,
                                          amount_minor, currency, redirect_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(session.id)
        .bind(session.booking_id)
        .bind(&session.provider)
        .bind(&session.provider_session_id)
        .bind(session.status.as_str())
        .bind(session.amount_minor)
        .bind(&session.currency)
        .bind(&session.redirect_url)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn find_by_provider_session_id(
        &self,
        provider: &str,
        provider_session_id: &str,
    ) -> Result<Option<PaymentSession>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_sessions WHERE provider = $1 AND provider_session_id = $2",
            SESSION_COLUMNS
        ))
        .bind(provider)
        .bind(provider_session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn find_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<PaymentSession>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_sessions WHERE booking_id = $1 \
             ORDER BY created_at DESC LIMIT 1",
            SESSION_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn mark_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), StoreError> {
        // No-op when the session is already in this status.
        sqlx::query(
            "UPDATE payment_sessions SET status = $2, updated_at = $3 \
             WHERE id = $1 AND status <> $2",
        )
        .bind(session_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
