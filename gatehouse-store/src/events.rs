use async_trait::async_trait;
use gatehouse_core::publisher::TicketEventPublisher;
use gatehouse_core::{CoreError, CoreResult};
use gatehouse_shared::models::events::TicketLifecycleEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

pub const LIFECYCLE_TOPIC: &str = "tickets.lifecycle";

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

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(topic, key, partition = delivery.partition, offset = delivery.offset, "lifecycle event sent");
                Ok(())
            }
            Err((e, _msg)) => {
                error!(topic, error = %e, "failed to send lifecycle event");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl TicketEventPublisher for EventProducer {
    async fn publish(&self, event: &TicketLifecycleEvent) -> CoreResult<()> {
        let payload = serde_json::to_string(event).map_err(|e| CoreError::Storage(e.to_string()))?;
        let key = event.event_id().to_string();
        EventProducer::publish(self, LIFECYCLE_TOPIC, &key, &payload)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))
    }
}
