use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDate, Utc};
use roam_api::state::{AppState, AuthConfig};
use roam_api::app;
use roam_booking::ReservationService;
use roam_core::gateway::{GatewayRegistry, PaymentOutcome};
use roam_core::identity::Claims;
use roam_core::lifecycle::LifecycleEvent;
use roam_core::publish::RecordingPublisher;
use roam_core::repository::BookingStore;
use roam_payments::mock::MockGateway;
use roam_payments::{PaymentOrchestrator, ReconciliationProcessor};
use roam_shared::events::DomainEvent;
use roam_shared::Vehicle;
use roam_store::app_config::BusinessRules;
use roam_store::memory::InMemoryStore;
use tower::util::ServiceExt;
use uuid::Uuid;

const JWT_SECRET: &str = "test-secret";
const MOCK_WEBHOOK_SECRET: &str = "test-mock-secret";

struct TestApp {
    app: Router,
    store: Arc<InMemoryStore>,
    publisher: Arc<RecordingPublisher>,
}

fn test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let publisher = Arc::new(RecordingPublisher::new());

    let mut gateways = GatewayRegistry::new();
    gateways.register(Arc::new(MockGateway::new(MOCK_WEBHOOK_SECRET)));

    let reservations = Arc::new(ReservationService::new(
        store.clone(),
        store.clone(),
        publisher.clone(),
    ));
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        gateways.clone(),
        store.clone(),
        store.clone(),
    ));
    let reconciler = Arc::new(ReconciliationProcessor::new(
        gateways,
        store.clone(),
        store.clone(),
        publisher.clone(),
    ));

    let state = AppState {
        reservations,
        orchestrator,
        reconciler,
        bookings: store.clone(),
        redis: None,
        auth: AuthConfig { secret: JWT_SECRET.to_string() },
        business_rules: BusinessRules {
            pending_ttl_minutes: 30,
            completion_sweep_interval_seconds: 3600,
            reconciliation_sweep_interval_seconds: 300,
            rate_limit_per_minute: 100,
        },
        default_provider: "mock".to_string(),
    };

    TestApp { app: app(state), store, publisher }
}

fn token(sub: &str, role: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

fn seed_vehicle(store: &Arc<InMemoryStore>, rate_minor: i64) -> Vehicle {
    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        nightly_rate_minor: rate_minor,
        currency: "USD".to_string(),
        location: "Boulder, CO".to_string(),
        timezone: "America/Denver".to_string(),
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.add_vehicle(vehicle.clone());
    vehicle
}

fn future(days: i64) -> NaiveDate {
    Utc::now().date_naive() + Duration::days(days)
}

async fn request(
    app: &Router,
    method: &str,
    path: &str,
    bearer: Option<&str>,
    headers: &[(&str, &str)],
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

async fn post_webhook(
    app: &Router,
    provider: &str,
    payload: Vec<u8>,
    signature: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/v1/webhooks/payments/{}", provider))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(sig) = signature {
        builder = builder.header("x-mock-signature", sig);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::from(payload)).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn mock_session_id(booking_id: &str) -> String {
    format!("mock_sess_{}", booking_id.replace('-', ""))
}

#[tokio::test]
async fn test_reserve_confirm_and_replay_webhook() {
    let t = test_app();
    let vehicle = seed_vehicle(&t.store, 10000);
    let renter = Uuid::new_v4();
    let bearer = token(&renter.to_string(), "RENTER");

    // Create: 3 nights at 100.00.
    let (status, body) = request(
        &t.app,
        "POST",
        "/v1/reservations",
        Some(&bearer),
        &[],
        Some(serde_json::json!({
            "vehicle_id": vehicle.id,
            "start_date": future(10).to_string(),
            "end_date": future(13).to_string(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["booking"]["status"], "PENDING");
    assert_eq!(body["booking"]["total_minor"], 30000);
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();
    assert!(body["payment_redirect_url"]
        .as_str()
        .unwrap()
        .starts_with("https://pay.example/mock/"));

    // Provider capture callback.
    let session_id = mock_session_id(&booking_id);
    let payload = MockGateway::webhook_payload(&session_id, PaymentOutcome::Captured);
    let (status, body) =
        post_webhook(&t.app, "mock", payload.clone(), Some(MOCK_WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "applied");

    let (status, body) = request(
        &t.app,
        "GET",
        &format!("/v1/reservations/{}", booking_id),
        Some(&bearer),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CONFIRMED");

    // Identical payload redelivered: acked, no extra audit or event.
    let booking_uuid = Uuid::parse_str(&booking_id).unwrap();
    let audit_before = t.store.audit_trail(booking_uuid).await.unwrap().len();
    let events_before = t.publisher.events().len();

    let (status, body) = post_webhook(&t.app, "mock", payload, Some(MOCK_WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already_processed");

    assert_eq!(t.store.audit_trail(booking_uuid).await.unwrap().len(), audit_before);
    assert_eq!(t.publisher.events().len(), events_before);
    assert!(matches!(
        t.publisher.events().as_slice(),
        [DomainEvent::BookingCreated(_), DomainEvent::BookingConfirmed(_)]
    ));
}

#[tokio::test]
async fn test_conflicting_dates_rejected_boundary_allowed() {
    let t = test_app();
    let vehicle = seed_vehicle(&t.store, 10000);
    let bearer = token(&Uuid::new_v4().to_string(), "RENTER");

    let start = future(20);
    let end = future(25);
    let (status, _) = request(
        &t.app,
        "POST",
        "/v1/reservations",
        Some(&bearer),
        &[],
        Some(serde_json::json!({
            "vehicle_id": vehicle.id,
            "start_date": start.to_string(),
            "end_date": end.to_string(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Overlapping request from another renter: 409 with the
    // conflicting interval in the body.
    let other = token(&Uuid::new_v4().to_string(), "RENTER");
    let (status, body) = request(
        &t.app,
        "POST",
        "/v1/reservations",
        Some(&other),
        &[],
        Some(serde_json::json!({
            "vehicle_id": vehicle.id,
            "start_date": future(24).to_string(),
            "end_date": future(28).to_string(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["conflicting_start"], start.to_string());
    assert_eq!(body["conflicting_end"], end.to_string());

    // Back-to-back: starting on the other booking's end date is fine.
    let (status, _) = request(
        &t.app,
        "POST",
        "/v1/reservations",
        Some(&other),
        &[],
        Some(serde_json::json!({
            "vehicle_id": vehicle.id,
            "start_date": end.to_string(),
            "end_date": future(28).to_string(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_validation_and_auth_failures() {
    let t = test_app();
    let vehicle = seed_vehicle(&t.store, 10000);
    let bearer = token(&Uuid::new_v4().to_string(), "RENTER");

    // No token.
    let (status, _) = request(
        &t.app,
        "POST",
        "/v1/reservations",
        None,
        &[],
        Some(serde_json::json!({
            "vehicle_id": vehicle.id,
            "start_date": future(5).to_string(),
            "end_date": future(8).to_string(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // end <= start.
    let (status, _) = request(
        &t.app,
        "POST",
        "/v1/reservations",
        Some(&bearer),
        &[],
        Some(serde_json::json!({
            "vehicle_id": vehicle.id,
            "start_date": future(8).to_string(),
            "end_date": future(8).to_string(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Start in the past.
    let (status, _) = request(
        &t.app,
        "POST",
        "/v1/reservations",
        Some(&bearer),
        &[],
        Some(serde_json::json!({
            "vehicle_id": vehicle.id,
            "start_date": future(-3).to_string(),
            "end_date": future(2).to_string(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_with_bad_signature_rejected() {
    let t = test_app();
    let vehicle = seed_vehicle(&t.store, 10000);
    let renter = Uuid::new_v4();
    let bearer = token(&renter.to_string(), "RENTER");

    let (_, body) = request(
        &t.app,
        "POST",
        "/v1/reservations",
        Some(&bearer),
        &[],
        Some(serde_json::json!({
            "vehicle_id": vehicle.id,
            "start_date": future(10).to_string(),
            "end_date": future(12).to_string(),
        })),
    )
    .await;
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();
    let payload =
        MockGateway::webhook_payload(&mock_session_id(&booking_id), PaymentOutcome::Captured);

    let (status, _) = post_webhook(&t.app, "mock", payload.clone(), Some("wrong-secret")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_webhook(&t.app, "mock", payload.clone(), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown provider path.
    let (status, _) = post_webhook(&t.app, "other-psp", payload, Some(MOCK_WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Booking untouched throughout.
    let (_, body) = request(
        &t.app,
        "GET",
        &format!("/v1/reservations/{}", booking_id),
        Some(&bearer),
        &[],
        None,
    )
    .await;
    assert_eq!(body["status"], "PENDING");
}

#[tokio::test]
async fn test_cancel_paths() {
    let t = test_app();
    let vehicle = seed_vehicle(&t.store, 10000);
    let renter = Uuid::new_v4();
    let bearer = token(&renter.to_string(), "RENTER");

    let (_, body) = request(
        &t.app,
        "POST",
        "/v1/reservations",
        Some(&bearer),
        &[],
        Some(serde_json::json!({
            "vehicle_id": vehicle.id,
            "start_date": future(10).to_string(),
            "end_date": future(12).to_string(),
        })),
    )
    .await;
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();
    let booking_uuid = Uuid::parse_str(&booking_id).unwrap();

    // A stranger cannot cancel.
    let stranger = token(&Uuid::new_v4().to_string(), "RENTER");
    let (status, _) = request(
        &t.app,
        "POST",
        &format!("/v1/reservations/{}/cancel", booking_id),
        Some(&stranger),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Denial lands first; cancelling afterwards is a quiet no-op.
    t.store
        .transition(booking_uuid, LifecycleEvent::PaymentDenied, "provider:mock")
        .await
        .unwrap();
    let (status, body) = request(
        &t.app,
        "POST",
        &format!("/v1/reservations/{}/cancel", booking_id),
        Some(&bearer),
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_terminal"], true);
    assert_eq!(body["booking"]["status"], "PAYMENT_FAILED");
}

#[tokio::test]
async fn test_ops_sweep_endpoint() {
    let t = test_app();
    let vehicle = seed_vehicle(&t.store, 10000);
    let renter = Uuid::new_v4();
    let bearer = token(&renter.to_string(), "RENTER");

    let end = future(12);
    let (_, body) = request(
        &t.app,
        "POST",
        "/v1/reservations",
        Some(&bearer),
        &[],
        Some(serde_json::json!({
            "vehicle_id": vehicle.id,
            "start_date": future(10).to_string(),
            "end_date": end.to_string(),
        })),
    )
    .await;
    let booking_uuid = Uuid::parse_str(body["booking"]["id"].as_str().unwrap()).unwrap();
    t.store
        .transition(booking_uuid, LifecycleEvent::PaymentCaptured, "provider:mock")
        .await
        .unwrap();

    // Renters may not run sweeps.
    let (status, _) = request(
        &t.app,
        "POST",
        "/v1/ops/sweep/completed",
        Some(&bearer),
        &[],
        Some(serde_json::json!({ "as_of": end.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let ops = token(&Uuid::new_v4().to_string(), "OPS");
    let (status, body) = request(
        &t.app,
        "POST",
        "/v1/ops/sweep/completed",
        Some(&ops),
        &[],
        Some(serde_json::json!({ "as_of": end.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (_, body) = request(
        &t.app,
        "GET",
        &format!("/v1/reservations/{}", booking_uuid),
        Some(&ops),
        &[],
        None,
    )
    .await;
    assert_eq!(body["status"], "COMPLETED");
}
