use async_trait::async_trait;
use roam_shared::events::DomainEvent;

/// Sink for domain events consumed by the notification dispatcher.
/// Publishing is best-effort from the caller's perspective: booking
/// state is committed before the event leaves the process, and a
/// failed publish is logged, never rolled into the request outcome.
#[async_trait]
pub trait DomainEventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent);
}

/// No-op publisher for wiring paths that do not emit.
pub struct NullPublisher;

#[async_trait]
impl DomainEventPublisher for NullPublisher {
    async fn publish(&self, _event: &DomainEvent) {}
}

/// Buffers published events in memory; assertions read them back.
#[derive(Default)]
pub struct RecordingPublisher {
    events: std::sync::Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("publisher lock").clone()
    }
}

#[async_trait]
impl DomainEventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) {
        self.events.lock().expect("publisher lock").push(event.clone());
    }
}
