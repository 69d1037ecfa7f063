use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roam_core::repository::{StoreError, VehicleCatalog};
use roam_shared::Vehicle;
use sqlx::PgPool;
use uuid::Uuid;

/// sqlx-backed read seam over the vehicle catalog. The catalog rows
/// themselves are owned and written by the host-profile flows.
pub struct PgVehicleCatalog {
    pool: PgPool,
}

impl PgVehicleCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct VehicleRow {
    id: Uuid,
    owner_id: Uuid,
    nightly_rate_minor: i64,
    currency: String,
    location: String,
    timezone: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl VehicleCatalog for PgVehicleCatalog {
    async fn vehicle(&self, vehicle_id: Uuid) -> Result<Option<Vehicle>, StoreError> {
        let row: Option<VehicleRow> = sqlx::query_as(
            "SELECT id, owner_id, nightly_rate_minor, currency, location, timezone, active, \
             created_at, updated_at FROM vehicles WHERE id = $1",
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;

        Ok(row.map(|r| Vehicle {
            id: r.id,
            owner_id: r.owner_id,
            nightly_rate_minor: r.nightly_rate_minor,
            currency: r.currency,
            location: r.location,
            timezone: r.timezone,
            active: r.active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }))
    }
}
