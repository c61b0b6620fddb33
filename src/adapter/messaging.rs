//! Message broker adapter (Kafka, JMS, AMQP)
//!
//! Producing and consuming need broker client libraries; this adapter
//! resolves the broker endpoints from the connection properties and checks
//! that the first one accepts TCP connections.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

use super::config::{AdapterMode, AdapterType, Properties, PropertyReader};
use super::{reach, Adapter, AdapterError, AdapterOperationResult};

const STRING_SERIALIZER: &str = "org.apache.kafka.common.serialization.StringSerializer";
const STRING_DESERIALIZER: &str = "org.apache.kafka.common.serialization.StringDeserializer";

const KAFKA_DEFAULT_PORT: u16 = 9092;
const JMS_DEFAULT_PORT: u16 = 61616;
const AMQP_DEFAULT_PORT: u16 = 5672;

#[derive(Debug, Clone, PartialEq)]
pub struct KafkaSettings {
    pub bootstrap_servers: Vec<String>,
    pub topic: String,
    pub group_id: Option<String>,
    pub key_serializer: String,
    pub value_serializer: String,
    pub key_deserializer: String,
    pub value_deserializer: String,
    pub acks: String,
    pub retries: u32,
    pub batch_size: u32,
    pub linger_ms: u64,
    pub buffer_memory: u64,
    pub auto_offset_reset: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JmsSettings {
    pub broker_url: String,
    pub queue_name: Option<String>,
    pub topic_name: Option<String>,
}

#[derive(Clone, PartialEq)]
pub struct AmqpSettings {
    pub host: String,
    pub port: u16,
    pub virtual_host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub queue_name: Option<String>,
    pub exchange: Option<String>,
}

impl fmt::Debug for AmqpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("virtual_host", &self.virtual_host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("queue_name", &self.queue_name)
            .field("exchange", &self.exchange)
            .finish()
    }
}

/// Broker-specific settings
#[derive(Debug, Clone, PartialEq)]
pub enum MessagingSettings {
    Kafka(KafkaSettings),
    Jms(JmsSettings),
    Amqp(AmqpSettings),
}

impl MessagingSettings {
    pub fn from_properties(
        props: &Properties,
        adapter_type: AdapterType,
    ) -> Result<Self, AdapterError> {
        let reader = PropertyReader::new(props);

        match adapter_type {
            AdapterType::Kafka => {
                let bootstrap_servers = reader.string_list("bootstrapServers")?;
                if bootstrap_servers.is_empty() {
                    return Err(AdapterError::MissingProperty("bootstrapServers".to_string()));
                }
                Ok(MessagingSettings::Kafka(KafkaSettings {
                    bootstrap_servers,
                    topic: reader.require_string("topic")?,
                    group_id: reader.string("groupId")?,
                    key_serializer: reader.string_or("keySerializer", STRING_SERIALIZER)?,
                    value_serializer: reader.string_or("valueSerializer", STRING_SERIALIZER)?,
                    key_deserializer: reader.string_or("keyDeserializer", STRING_DESERIALIZER)?,
                    value_deserializer: reader
                        .string_or("valueDeserializer", STRING_DESERIALIZER)?,
                    acks: reader.string_or("acks", "all")?,
                    retries: reader.u32_or("retries", 3)?,
                    batch_size: reader.u32_or("batchSize", 16384)?,
                    linger_ms: reader.u64_or("lingerMs", 1)?,
                    buffer_memory: reader.u64_or("bufferMemory", 33554432)?,
                    auto_offset_reset: reader.string_or("autoOffsetReset", "earliest")?,
                }))
            }
            AdapterType::Jms => {
                let queue_name = reader.string("queueName")?;
                let topic_name = reader.string("topicName")?;
                if queue_name.is_none() && topic_name.is_none() {
                    return Err(AdapterError::MissingProperty("queueName".to_string()));
                }
                Ok(MessagingSettings::Jms(JmsSettings {
                    broker_url: reader.require_string("brokerUrl")?,
                    queue_name,
                    topic_name,
                }))
            }
            AdapterType::Amqp => Ok(MessagingSettings::Amqp(AmqpSettings {
                host: reader.require_string("host")?,
                port: reader.u16_or("port", AMQP_DEFAULT_PORT)?,
                virtual_host: reader.string_or("virtualHost", "/")?,
                username: reader.string("username")?,
                password: reader.string("password")?,
                queue_name: reader.string("queueName")?,
                exchange: reader.string("exchange")?,
            })),
            other => Err(AdapterError::Configuration(format!(
                "{} is not a message broker type",
                other
            ))),
        }
    }

    /// First broker endpoint to dial
    pub fn primary_endpoint(&self) -> Result<(String, u16), AdapterError> {
        match self {
            MessagingSettings::Kafka(k) => {
                let first = k.bootstrap_servers.first().ok_or_else(|| {
                    AdapterError::MissingProperty("bootstrapServers".to_string())
                })?;
                reach::split_host_port(first, KAFKA_DEFAULT_PORT)
            }
            MessagingSettings::Jms(j) => {
                let trimmed = j
                    .broker_url
                    .split("://")
                    .nth(1)
                    .unwrap_or(&j.broker_url);
                let authority = trimmed.split(['/', '?']).next().unwrap_or_default();
                reach::split_host_port(authority, JMS_DEFAULT_PORT)
            }
            MessagingSettings::Amqp(a) => Ok((a.host.clone(), a.port)),
        }
    }
}

pub struct MessagingAdapter {
    adapter_type: AdapterType,
    mode: AdapterMode,
    settings: MessagingSettings,
    connect_timeout: Duration,
    initialized: AtomicBool,
}

impl MessagingAdapter {
    pub fn new(adapter_type: AdapterType, mode: AdapterMode, settings: MessagingSettings) -> Self {
        Self {
            adapter_type,
            mode,
            settings,
            connect_timeout: Duration::from_secs(10),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &MessagingSettings {
        &self.settings
    }
}

#[async_trait]
impl Adapter for MessagingAdapter {
    fn adapter_type(&self) -> AdapterType {
        self.adapter_type
    }

    fn mode(&self) -> AdapterMode {
        self.mode
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        let (host, port) = self.settings.primary_endpoint()?;
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "Initialized {} {} adapter (broker {}:{})",
            self.adapter_type, self.mode, host, port
        );
        Ok(())
    }

    async fn test_connection(&self) -> AdapterOperationResult {
        match self.settings.primary_endpoint() {
            Ok((host, port)) => reach::tcp_reachable(&host, port, self.connect_timeout).await,
            Err(e) => AdapterOperationResult::failure(e.to_string()),
        }
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kafka_defaults() {
        let p: Properties = serde_json::from_value(json!({
            "bootstrapServers": "broker-1:9093, broker-2:9093",
            "topic": "orders"
        }))
        .unwrap();

        let MessagingSettings::Kafka(kafka) =
            MessagingSettings::from_properties(&p, AdapterType::Kafka).unwrap()
        else {
            panic!("expected kafka settings");
        };

        assert_eq!(kafka.bootstrap_servers.len(), 2);
        assert_eq!(kafka.acks, "all");
        assert_eq!(kafka.retries, 3);
        assert_eq!(kafka.batch_size, 16384);
        assert_eq!(kafka.linger_ms, 1);
        assert_eq!(kafka.buffer_memory, 33554432);
        assert_eq!(kafka.auto_offset_reset, "earliest");
        assert_eq!(kafka.key_serializer, STRING_SERIALIZER);
        assert_eq!(kafka.value_deserializer, STRING_DESERIALIZER);
    }

    #[test]
    fn test_primary_endpoints() {
        let kafka: Properties = serde_json::from_value(json!({
            "bootstrapServers": ["broker-1:9093"],
            "topic": "t"
        }))
        .unwrap();
        let settings = MessagingSettings::from_properties(&kafka, AdapterType::Kafka).unwrap();
        assert_eq!(
            settings.primary_endpoint().unwrap(),
            ("broker-1".to_string(), 9093)
        );

        let jms: Properties = serde_json::from_value(json!({
            "brokerUrl": "tcp://activemq:61617",
            "queueName": "orders"
        }))
        .unwrap();
        let settings = MessagingSettings::from_properties(&jms, AdapterType::Jms).unwrap();
        assert_eq!(
            settings.primary_endpoint().unwrap(),
            ("activemq".to_string(), 61617)
        );

        let amqp: Properties = serde_json::from_value(json!({ "host": "rabbit" })).unwrap();
        let settings = MessagingSettings::from_properties(&amqp, AdapterType::Amqp).unwrap();
        assert_eq!(
            settings.primary_endpoint().unwrap(),
            ("rabbit".to_string(), 5672)
        );
    }

    #[test]
    fn test_jms_requires_destination() {
        let p: Properties =
            serde_json::from_value(json!({ "brokerUrl": "tcp://activemq:61616" })).unwrap();
        assert!(MessagingSettings::from_properties(&p, AdapterType::Jms).is_err());
    }
}
