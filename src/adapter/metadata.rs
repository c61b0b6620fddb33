//! Static adapter metadata catalog

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::config::{AdapterMode, AdapterType};

pub const ADAPTER_VERSION: &str = "1.0.0";

/// Descriptive information about one (type, mode) adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterMetadata {
    pub adapter_type: AdapterType,
    pub mode: AdapterMode,
    pub display_name: String,
    pub version: String,
    pub supported_operations: Vec<String>,
    pub required_properties: Vec<String>,
    pub optional_properties: Vec<String>,
    pub capabilities: Vec<String>,
    pub supports_async: bool,
    pub supports_batch: bool,
    pub supports_streaming: bool,
}

impl AdapterMetadata {
    /// Fallback for pairs without a catalog entry
    pub fn generic(adapter_type: AdapterType, mode: AdapterMode) -> Self {
        Self {
            adapter_type,
            mode,
            display_name: format!("{} {} Adapter", adapter_type, mode),
            version: ADAPTER_VERSION.to_string(),
            supported_operations: Vec::new(),
            required_properties: Vec::new(),
            optional_properties: Vec::new(),
            capabilities: Vec::new(),
            supports_async: false,
            supports_batch: false,
            supports_streaming: false,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

struct Entry {
    display_name: &'static str,
    operations: &'static [&'static str],
    required: &'static [&'static str],
    optional: &'static [&'static str],
    capabilities: &'static [&'static str],
    supports_async: bool,
    supports_batch: bool,
    supports_streaming: bool,
}

impl Entry {
    fn build(&self, adapter_type: AdapterType, mode: AdapterMode) -> AdapterMetadata {
        AdapterMetadata {
            adapter_type,
            mode,
            display_name: self.display_name.to_string(),
            version: ADAPTER_VERSION.to_string(),
            supported_operations: strings(self.operations),
            required_properties: strings(self.required),
            optional_properties: strings(self.optional),
            capabilities: strings(self.capabilities),
            supports_async: self.supports_async,
            supports_batch: self.supports_batch,
            supports_streaming: self.supports_streaming,
        }
    }
}

const HTTP_OPTIONAL: &[&str] = &[
    "method",
    "connectionTimeout",
    "readTimeout",
    "contentType",
    "accept",
    "authentication",
    "username",
    "password",
    "token",
    "apiKeyHeader",
    "apiKey",
    "headers",
    "followRedirects",
];
const JDBC_OPTIONAL: &[&str] = &[
    "driverClassName",
    "username",
    "password",
    "pollingInterval",
    "fetchSize",
    "batchSize",
    "connectionTimeout",
];
const FTP_OPTIONAL: &[&str] = &[
    "port",
    "username",
    "password",
    "directory",
    "filePattern",
    "passiveMode",
    "privateKeyPath",
    "connectionTimeout",
];
const SAP_OPTIONAL: &[&str] = &["sysnr", "user", "password", "language"];
const KAFKA_OPTIONAL: &[&str] = &[
    "groupId",
    "keySerializer",
    "valueSerializer",
    "keyDeserializer",
    "valueDeserializer",
    "acks",
    "retries",
    "batchSize",
    "lingerMs",
    "bufferMemory",
    "autoOffsetReset",
];
const MAIL_OPTIONAL: &[&str] = &[
    "protocol", "port", "username", "password", "from", "folder", "useTls",
];

fn entry(adapter_type: AdapterType, mode: AdapterMode) -> Option<Entry> {
    use AdapterMode::{Inbound, Outbound};
    use AdapterType::*;

    let entry = match (adapter_type, mode) {
        (Http, Inbound) | (Rest, Inbound) => Entry {
            display_name: if adapter_type == Rest { "REST Inbound Adapter" } else { "HTTP Inbound Adapter" },
            operations: &["poll", "receive"],
            required: &["url"],
            optional: HTTP_OPTIONAL,
            capabilities: &["authentication", "headers", "json"],
            supports_async: true,
            supports_batch: false,
            supports_streaming: false,
        },
        (Http, Outbound) | (Rest, Outbound) => Entry {
            display_name: if adapter_type == Rest { "REST Outbound Adapter" } else { "HTTP Outbound Adapter" },
            operations: &["send", "request"],
            required: &["url"],
            optional: HTTP_OPTIONAL,
            capabilities: &["authentication", "headers", "json", "retry"],
            supports_async: true,
            supports_batch: false,
            supports_streaming: false,
        },
        (Jdbc, Inbound) => Entry {
            display_name: "JDBC Inbound Adapter",
            operations: &["query", "poll"],
            required: &["jdbcUrl", "query"],
            optional: JDBC_OPTIONAL,
            capabilities: &["polling", "connection-pool"],
            supports_async: false,
            supports_batch: true,
            supports_streaming: false,
        },
        (Jdbc, Outbound) => Entry {
            display_name: "JDBC Outbound Adapter",
            operations: &["insert", "update", "batch"],
            required: &["jdbcUrl"],
            optional: JDBC_OPTIONAL,
            capabilities: &["transactions", "connection-pool"],
            supports_async: false,
            supports_batch: true,
            supports_streaming: false,
        },
        (Ftp, Inbound) | (Sftp, Inbound) => Entry {
            display_name: if adapter_type == Sftp { "SFTP Inbound Adapter" } else { "FTP Inbound Adapter" },
            operations: &["list", "download"],
            required: &["host"],
            optional: FTP_OPTIONAL,
            capabilities: &["polling", "file-pattern"],
            supports_async: false,
            supports_batch: true,
            supports_streaming: true,
        },
        (Ftp, Outbound) | (Sftp, Outbound) => Entry {
            display_name: if adapter_type == Sftp { "SFTP Outbound Adapter" } else { "FTP Outbound Adapter" },
            operations: &["upload"],
            required: &["host"],
            optional: FTP_OPTIONAL,
            capabilities: &["file-transfer"],
            supports_async: false,
            supports_batch: true,
            supports_streaming: true,
        },
        (Soap, Outbound) => Entry {
            display_name: "SOAP Outbound Adapter",
            operations: &["invoke"],
            required: &["wsdlUrl"],
            optional: &["endpointUrl", "serviceName", "portName", "soapAction", "soapVersion", "timeout"],
            capabilities: &["wsdl", "envelope"],
            supports_async: false,
            supports_batch: false,
            supports_streaming: false,
        },
        (File, Inbound) => Entry {
            display_name: "File Inbound Adapter",
            operations: &["read", "poll"],
            required: &["directory"],
            optional: &["filePattern", "archiveDirectory", "encoding", "pollingInterval"],
            capabilities: &["polling", "file-pattern", "archive"],
            supports_async: false,
            supports_batch: true,
            supports_streaming: false,
        },
        (File, Outbound) => Entry {
            display_name: "File Outbound Adapter",
            operations: &["write"],
            required: &["directory"],
            optional: &["fileName", "encoding"],
            capabilities: &["file-write"],
            supports_async: false,
            supports_batch: false,
            supports_streaming: false,
        },
        (Kafka, Inbound) => Entry {
            display_name: "Kafka Consumer Adapter",
            operations: &["consume"],
            required: &["bootstrapServers", "topic"],
            optional: KAFKA_OPTIONAL,
            capabilities: &["consumer-groups", "offsets"],
            supports_async: true,
            supports_batch: true,
            supports_streaming: true,
        },
        (Kafka, Outbound) => Entry {
            display_name: "Kafka Producer Adapter",
            operations: &["produce"],
            required: &["bootstrapServers", "topic"],
            optional: KAFKA_OPTIONAL,
            capabilities: &["acks", "batching"],
            supports_async: true,
            supports_batch: true,
            supports_streaming: true,
        },
        (Jms, Inbound) | (Jms, Outbound) => Entry {
            display_name: if mode == Inbound { "JMS Consumer Adapter" } else { "JMS Producer Adapter" },
            operations: if mode == Inbound { &["receive"] } else { &["send"] },
            required: &["brokerUrl"],
            optional: &["queueName", "topicName", "username", "password"],
            capabilities: &["queues", "topics"],
            supports_async: true,
            supports_batch: false,
            supports_streaming: false,
        },
        (Amqp, Inbound) | (Amqp, Outbound) => Entry {
            display_name: if mode == Inbound { "AMQP Consumer Adapter" } else { "AMQP Publisher Adapter" },
            operations: if mode == Inbound { &["consume"] } else { &["publish"] },
            required: &["host"],
            optional: &["port", "virtualHost", "username", "password", "queueName", "exchange"],
            capabilities: &["exchanges", "queues"],
            supports_async: true,
            supports_batch: false,
            supports_streaming: false,
        },
        (Mail, Inbound) => Entry {
            display_name: "Mail Inbound Adapter",
            operations: &["fetch"],
            required: &["host"],
            optional: MAIL_OPTIONAL,
            capabilities: &["imap", "pop3", "tls"],
            supports_async: false,
            supports_batch: true,
            supports_streaming: false,
        },
        (Mail, Outbound) => Entry {
            display_name: "Mail Outbound Adapter",
            operations: &["send"],
            required: &["host"],
            optional: MAIL_OPTIONAL,
            capabilities: &["smtp", "tls"],
            supports_async: true,
            supports_batch: false,
            supports_streaming: false,
        },
        (Rfc, _) => Entry {
            display_name: if mode == Inbound { "SAP RFC Server Adapter" } else { "SAP RFC Client Adapter" },
            operations: &["call"],
            required: &["ashost", "client", "functionName"],
            optional: SAP_OPTIONAL,
            capabilities: &["bapi", "gateway"],
            supports_async: false,
            supports_batch: false,
            supports_streaming: false,
        },
        (Idoc, _) => Entry {
            display_name: if mode == Inbound { "SAP IDoc Inbound Adapter" } else { "SAP IDoc Outbound Adapter" },
            operations: if mode == Inbound { &["receive"] } else { &["send"] },
            required: &["ashost", "client", "idocType"],
            optional: SAP_OPTIONAL,
            capabilities: &["idoc", "gateway"],
            supports_async: true,
            supports_batch: true,
            supports_streaming: false,
        },
        (Odata, Inbound) => Entry {
            display_name: "OData Inbound Adapter",
            operations: &["query"],
            required: &["serviceUrl"],
            optional: &["entitySet", "username", "password", "timeout"],
            capabilities: &["odata-v2", "json"],
            supports_async: false,
            supports_batch: false,
            supports_streaming: false,
        },
        (Odata, Outbound) => Entry {
            display_name: "OData Outbound Adapter",
            operations: &["create"],
            required: &["serviceUrl"],
            optional: &["entitySet", "username", "password", "timeout"],
            capabilities: &["odata-v2", "json"],
            supports_async: false,
            supports_batch: false,
            supports_streaming: false,
        },
        (Soap, Inbound) => return None,
    };
    Some(entry)
}

/// Metadata for every built-in adapter pair
#[derive(Debug, Clone, Default)]
pub struct MetadataCatalog {
    entries: HashMap<(AdapterType, AdapterMode), AdapterMetadata>,
}

impl MetadataCatalog {
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        for adapter_type in AdapterType::ALL {
            for mode in AdapterMode::ALL {
                if let Some(entry) = entry(adapter_type, mode) {
                    entries.insert((adapter_type, mode), entry.build(adapter_type, mode));
                }
            }
        }
        Self { entries }
    }

    pub fn insert(&mut self, metadata: AdapterMetadata) {
        self.entries
            .insert((metadata.adapter_type, metadata.mode), metadata);
    }

    pub fn contains(&self, adapter_type: AdapterType, mode: AdapterMode) -> bool {
        self.entries.contains_key(&(adapter_type, mode))
    }

    /// Never fails; unregistered pairs get generic metadata
    pub fn get(&self, adapter_type: AdapterType, mode: AdapterMode) -> AdapterMetadata {
        self.entries
            .get(&(adapter_type, mode))
            .cloned()
            .unwrap_or_else(|| AdapterMetadata::generic(adapter_type, mode))
    }

    pub fn all(&self) -> Vec<AdapterMetadata> {
        let mut all: Vec<_> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| {
            (a.adapter_type.as_str(), a.mode.as_str()).cmp(&(b.adapter_type.as_str(), b.mode.as_str()))
        });
        all
    }
}
