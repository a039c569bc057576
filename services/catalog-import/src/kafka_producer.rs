//! Kafka-backed row queue and notification sink.

use crate::config::KafkaConfig;
use crate::model::{Notification, RawRow};
use crate::ports::{NotificationSink, RowQueue};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Header naming the notification subject
pub const SUBJECT_HEADER: &str = "subject";

/// Base client settings shared by producers and consumers
pub fn base_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.bootstrap_servers);

    if let Some(ref protocol) = config.security_protocol {
        client_config.set("security.protocol", protocol);
    }
    if let Some(ref ca_location) = config.ssl_ca_location {
        client_config.set("ssl.ca.location", ca_location);
    }
    if let (Some(ref username), Some(ref password)) =
        (&config.sasl_username, &config.sasl_password)
    {
        client_config
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);
    }

    client_config
}

/// Thin wrapper over a [`FutureProducer`] that waits for broker acks
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = base_client_config(config)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .context("Failed to create Kafka producer")?;

        info!(servers = %config.bootstrap_servers, "Kafka producer created");

        Ok(Self {
            producer,
            timeout: config.message_timeout(),
        })
    }

    #[instrument(skip(self, payload, headers), fields(size = payload.len()))]
    pub async fn deliver(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
        headers: OwnedHeaders,
    ) -> Result<(i32, i64)> {
        let mut record = FutureRecord::<str, [u8]>::to(topic)
            .payload(payload)
            .headers(headers);
        if let Some(key) = key {
            record = record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| anyhow!("Failed to send message to topic {topic}: {e}"))?;

        debug!(partition, offset, "Message delivered");
        Ok((partition, offset))
    }
}

/// Relays parsed rows to the row topic, keyed by row id when present
pub struct KafkaRowQueue {
    publisher: Arc<KafkaPublisher>,
    topic: String,
}

impl KafkaRowQueue {
    pub fn new(publisher: Arc<KafkaPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl RowQueue for KafkaRowQueue {
    async fn send(&self, row: &RawRow) -> Result<()> {
        let payload = row
            .to_message_body()
            .context("Failed to serialize row")?;
        let headers = OwnedHeaders::new().insert(Header {
            key: "content-type",
            value: Some("application/json"),
        });

        self.publisher
            .deliver(&self.topic, row.id(), &payload, headers)
            .await?;
        Ok(())
    }
}

/// Publishes batch summaries; attributes become message headers
pub struct KafkaNotificationSink {
    publisher: Arc<KafkaPublisher>,
    topic: String,
}

impl KafkaNotificationSink {
    pub fn new(publisher: Arc<KafkaPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }
}

/// Headers for a notification: subject first, then its attributes
pub fn notification_headers(notification: &Notification) -> OwnedHeaders {
    let headers = OwnedHeaders::new_with_capacity(notification.attributes.len() + 1).insert(Header {
        key: SUBJECT_HEADER,
        value: Some(notification.subject.as_str()),
    });

    notification
        .attributes
        .iter()
        .fold(headers, |headers, (key, value)| {
            headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            })
        })
}

#[async_trait]
impl NotificationSink for KafkaNotificationSink {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        self.publisher
            .deliver(
                &self.topic,
                None,
                &notification.payload,
                notification_headers(notification),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PRICE_CATEGORY_ATTRIBUTE;
    use rdkafka::message::Headers;

    #[test]
    fn test_notification_headers_carry_attributes() {
        let notification = Notification {
            subject: "Products Imported".to_string(),
            attributes: vec![(PRICE_CATEGORY_ATTRIBUTE.to_string(), "low".to_string())],
            payload: b"{}".to_vec(),
        };

        let headers = notification_headers(&notification);
        assert_eq!(headers.count(), 2);

        let category = headers.get(1);
        assert_eq!(category.key, PRICE_CATEGORY_ATTRIBUTE);
        assert_eq!(category.value, Some(&b"low"[..]));
    }

    #[test]
    fn test_base_client_config_sets_sasl() {
        let config = KafkaConfig {
            bootstrap_servers: "broker:9092".to_string(),
            consumer_group: "g".to_string(),
            intake_events_topic: "events".to_string(),
            row_topic: "rows".to_string(),
            notification_topic: "notifications".to_string(),
            security_protocol: Some("sasl_ssl".to_string()),
            ssl_ca_location: None,
            sasl_username: Some("user".to_string()),
            sasl_password: Some("secret".to_string()),
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: 30000,
            message_timeout_ms: 5000,
            batch_size: 5,
            batch_linger_ms: 1000,
            retry_backoff_ms: 5000,
        };

        let client_config = base_client_config(&config);
        assert_eq!(client_config.get("bootstrap.servers"), Some("broker:9092"));
        assert_eq!(client_config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(client_config.get("sasl.username"), Some("user"));
    }
}
