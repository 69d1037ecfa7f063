use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use roam_core::publish::DomainEventPublisher;
use roam_shared::events::DomainEvent;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Domain-event sink backed by the Kafka producer. Booking state is
/// already committed when we get here, so a failed publish is logged
/// and dropped rather than failing the request.
pub struct KafkaEventPublisher {
    producer: EventProducer,
}

impl KafkaEventPublisher {
    pub fn new(producer: EventProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl DomainEventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &DomainEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize domain event: {}", e);
                return;
            }
        };
        let key = event.key().to_string();
        if let Err(e) = self.producer.publish(event.topic(), &key, &payload).await {
            error!("Failed to publish {} event: {}", event.topic(), e);
        }
    }
}
