use std::sync::Arc;

use roam_booking::ReservationService;
use roam_core::repository::BookingStore;
use roam_payments::{PaymentOrchestrator, ReconciliationProcessor};
use roam_store::app_config::BusinessRules;
use roam_store::RedisClient;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationService>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub reconciler: Arc<ReconciliationProcessor>,
    pub bookings: Arc<dyn BookingStore>,
    /// Absent in tests; the rate limiter fails open without it.
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub default_provider: String,
}
