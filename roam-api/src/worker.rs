use std::time::Duration;

use chrono::Utc;
use roam_booking::sweep::{CompletionSweep, ReconciliationSweep};
use tracing::{error, info};

/// Periodic Confirmed -> Completed pass over bookings whose end date
/// passed.
pub async fn start_completion_worker(sweep: CompletionSweep, interval_seconds: u64) {
    info!("Completion worker started ({}s interval)", interval_seconds);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
    loop {
        ticker.tick().await;
        if let Err(e) = sweep.run(Utc::now().date_naive()).await {
            error!("Completion sweep failed: {}", e);
        }
    }
}

/// Periodic re-drive of Pending bookings the providers went silent on.
pub async fn start_reconciliation_worker(
    sweep: ReconciliationSweep,
    interval_seconds: u64,
    pending_ttl_minutes: u64,
) {
    info!(
        "Reconciliation worker started ({}s interval, {}min pending TTL)",
        interval_seconds, pending_ttl_minutes
    );
    let ttl = chrono::Duration::minutes(pending_ttl_minutes as i64);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
    loop {
        ticker.tick().await;
        if let Err(e) = sweep.run(ttl).await {
            error!("Reconciliation sweep failed: {}", e);
        }
    }
}
