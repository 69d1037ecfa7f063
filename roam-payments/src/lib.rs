pub mod mock;
pub mod orchestrator;
pub mod paypal;
pub mod reconciler;
pub mod stripe;

pub use orchestrator::PaymentOrchestrator;
pub use reconciler::{ReconciliationAck, ReconciliationProcessor, ReconcileError};
