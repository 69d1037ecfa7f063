use std::net::SocketAddr;
use std::sync::Arc;

use roam_api::{app, state::{AppState, AuthConfig}};
use roam_booking::sweep::{CompletionSweep, ReconciliationSweep};
use roam_booking::ReservationService;
use roam_core::gateway::GatewayRegistry;
use roam_payments::mock::MockGateway;
use roam_payments::paypal::{PaypalConfig, PaypalGateway};
use roam_payments::stripe::{StripeConfig, StripeGateway};
use roam_payments::{PaymentOrchestrator, ReconciliationProcessor};
use roam_store::app_config::PaymentsConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roam_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = roam_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Roam API on port {}", config.server.port);

    // Postgres
    let db = roam_store::DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    // Redis
    let redis = roam_store::RedisClient::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");

    // Kafka
    let producer = roam_store::EventProducer::new(&config.kafka.brokers)
        .expect("Failed to create Kafka producer");
    let publisher = Arc::new(roam_store::KafkaEventPublisher::new(producer));

    // Stores
    let bookings: Arc<dyn roam_core::repository::BookingStore> =
        Arc::new(roam_store::PgBookingStore::new(db.pool.clone()));
    let sessions: Arc<dyn roam_core::repository::PaymentSessionStore> =
        Arc::new(roam_store::PgPaymentSessionStore::new(db.pool.clone()));
    let catalog: Arc<dyn roam_core::repository::VehicleCatalog> =
        Arc::new(roam_store::PgVehicleCatalog::new(db.pool.clone()));

    // Payment gateways
    let gateways = build_gateways(&config.payments);

    let reservations = Arc::new(ReservationService::new(
        bookings.clone(),
        catalog.clone(),
        publisher.clone(),
    ));
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        gateways.clone(),
        sessions.clone(),
        bookings.clone(),
    ));
    let reconciler = Arc::new(ReconciliationProcessor::new(
        gateways.clone(),
        bookings.clone(),
        sessions.clone(),
        publisher.clone(),
    ));

    // Background sweeps
    tokio::spawn(roam_api::worker::start_completion_worker(
        CompletionSweep::new(bookings.clone()),
        config.business_rules.completion_sweep_interval_seconds,
    ));
    tokio::spawn(roam_api::worker::start_reconciliation_worker(
        ReconciliationSweep::new(
            bookings.clone(),
            sessions.clone(),
            gateways.clone(),
            publisher.clone(),
        ),
        config.business_rules.reconciliation_sweep_interval_seconds,
        config.business_rules.pending_ttl_minutes,
    ));

    let app_state = AppState {
        reservations,
        orchestrator,
        reconciler,
        bookings,
        redis: Some(Arc::new(redis)),
        auth: AuthConfig { secret: config.auth.jwt_secret.clone() },
        business_rules: config.business_rules.clone(),
        default_provider: config.payments.default_provider.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn build_gateways(config: &PaymentsConfig) -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();

    if let Some(stripe) = &config.stripe {
        let gateway = StripeGateway::new(StripeConfig {
            secret_key: stripe.secret_key.clone(),
            webhook_secret: stripe.webhook_secret.clone(),
            base_url: stripe.base_url.clone(),
            return_url: stripe.return_url.clone(),
            timeout_seconds: stripe.timeout_seconds,
        })
        .expect("Failed to build stripe gateway");
        registry.register(Arc::new(gateway));
    }

    if let Some(paypal) = &config.paypal {
        let gateway = PaypalGateway::new(PaypalConfig {
            client_id: paypal.client_id.clone(),
            client_secret: paypal.client_secret.clone(),
            base_url: paypal.base_url.clone(),
            webhook_id: paypal.webhook_id.clone(),
            return_url: paypal.return_url.clone(),
            timeout_seconds: paypal.timeout_seconds,
        })
        .expect("Failed to build paypal gateway");
        registry.register(Arc::new(gateway));
    }

    if let Some(mock) = &config.mock {
        registry.register(Arc::new(MockGateway::new(&mock.webhook_secret)));
    }

    tracing::info!("Payment providers registered: {:?}", registry.provider_ids());
    registry
}
