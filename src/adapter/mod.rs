//! Protocol adapters
//!
//! Every connector the engine drives implements the [`Adapter`] port:
//! - `http`: HTTP and REST endpoints via reqwest
//! - `soap`: SOAP services (WSDL-described)
//! - `jdbc`: relational databases
//! - `ftp`: FTP and SFTP servers
//! - `file`: local or mounted directories
//! - `messaging`: Kafka, JMS and AMQP brokers
//! - `mail`: SMTP / IMAP / POP3 servers
//! - `erp`: SAP RFC, IDoc and OData services

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::engine::result::AdapterExecutionResult;
use crate::pool::PoolError;
use crate::workflow::context::AdapterExecutionContext;

pub mod config;
pub mod erp;
pub mod file;
pub mod ftp;
pub mod http;
pub mod jdbc;
pub mod mail;
pub mod messaging;
pub mod metadata;
pub mod reach;
pub mod soap;
pub mod validation;

pub use config::{AdapterConfiguration, AdapterMode, AdapterType, Properties, PropertyReader};
pub use erp::{ErpAdapter, ErpSettings};
pub use file::{FileAdapter, FileSettings};
pub use ftp::{FtpAdapter, FtpSettings};
pub use http::{HttpAdapter, HttpAuth, HttpSettings};
pub use jdbc::{JdbcAdapter, JdbcSettings};
pub use mail::{MailAdapter, MailSettings};
pub use messaging::{MessagingAdapter, MessagingSettings};
pub use metadata::{AdapterMetadata, MetadataCatalog};
pub use soap::{SoapAdapter, SoapSettings};
pub use validation::validate_configuration;

/// Common error type for adapter operations
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing required property: {0}")]
    MissingProperty(String),

    #[error("Invalid property '{property}': {message}")]
    InvalidProperty { property: String, message: String },

    #[error("Unsupported adapter: {adapter_type} ({mode})")]
    Unsupported {
        adapter_type: AdapterType,
        mode: AdapterMode,
    },

    #[error("Adapter not found: {0}")]
    NotFound(String),

    #[error("Adapter not initialized: {0}")]
    NotInitialized(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Execution failed: {0}")]
    Execution(String),
}

impl AdapterError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AdapterError::Configuration(_) => "CONFIGURATION_ERROR",
            AdapterError::MissingProperty(_) => "MISSING_PROPERTY",
            AdapterError::InvalidProperty { .. } => "INVALID_PROPERTY",
            AdapterError::Unsupported { .. } => "UNSUPPORTED_ADAPTER",
            AdapterError::NotFound(_) => "ADAPTER_NOT_FOUND",
            AdapterError::NotInitialized(_) => "NOT_INITIALIZED",
            AdapterError::ConnectionFailed(_) => "CONNECTION_FAILED",
            AdapterError::Timeout(_) => "TIMEOUT",
            AdapterError::Http { .. } => "HTTP_ERROR",
            AdapterError::Io(_) => "IO_ERROR",
            AdapterError::Serialization(_) => "SERIALIZATION_ERROR",
            AdapterError::Pool(_) => "POOL_EXHAUSTED",
            AdapterError::UnsupportedOperation(_) => "UNSUPPORTED_OPERATION",
            AdapterError::Execution(_) => "EXECUTION_ERROR",
        }
    }

    /// Configuration errors are surfaced immediately and never retried
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AdapterError::Configuration(_)
                | AdapterError::MissingProperty(_)
                | AdapterError::InvalidProperty { .. }
                | AdapterError::Unsupported { .. }
        )
    }

    /// Network, timeout and server-side faults worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::ConnectionFailed(_)
            | AdapterError::Timeout(_)
            | AdapterError::Io(_)
            | AdapterError::Pool(_) => true,
            AdapterError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Outcome of a lifecycle, validation or health operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdapterOperationResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl AdapterOperationResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// The adapter port every protocol connector implements
///
/// Adapters receive their typed settings at construction; `initialize`
/// brings them live and `shutdown` releases whatever they hold. All methods
/// take `&self` because instances are shared across concurrent flows.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn adapter_type(&self) -> AdapterType;

    fn mode(&self) -> AdapterMode;

    fn is_initialized(&self) -> bool;

    async fn initialize(&self) -> Result<(), AdapterError>;

    async fn test_connection(&self) -> AdapterOperationResult;

    async fn health_status(&self) -> AdapterOperationResult {
        if !self.is_initialized() {
            return AdapterOperationResult::failure(format!(
                "{} {} adapter is not initialized",
                self.adapter_type(),
                self.mode()
            ));
        }
        self.test_connection().await
    }

    async fn execute(
        &self,
        _ctx: &AdapterExecutionContext,
    ) -> Result<AdapterExecutionResult, AdapterError> {
        Err(AdapterError::UnsupportedOperation(format!(
            "{} {} adapter does not support direct execution",
            self.adapter_type(),
            self.mode()
        )))
    }

    async fn shutdown(&self) -> Result<(), AdapterError>;
}

/// Fail with `NotInitialized` unless the adapter is live
pub(crate) fn ensure_initialized(adapter: &dyn Adapter) -> Result<(), AdapterError> {
    if adapter.is_initialized() {
        Ok(())
    } else {
        Err(AdapterError::NotInitialized(format!(
            "{} {}",
            adapter.adapter_type(),
            adapter.mode()
        )))
    }
}

/// Cap an error body at `max` bytes without splitting a UTF-8 character
pub(crate) fn truncate_message(mut message: String, max: usize) -> String {
    if message.len() > max {
        let mut end = max;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message_respects_char_boundaries() {
        let body = format!("{}é tail", "a".repeat(511));
        let truncated = truncate_message(body, 512);
        assert_eq!(truncated.len(), 511);
        assert!(truncated.chars().all(|c| c == 'a'));

        assert_eq!(truncate_message("short".to_string(), 512), "short");
    }

    #[test]
    fn test_error_classification() {
        assert!(AdapterError::Timeout(100).is_transient());
        assert!(AdapterError::ConnectionFailed("refused".into()).is_transient());
        assert!(AdapterError::Http {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!AdapterError::Http {
            status: 404,
            message: "missing".into()
        }
        .is_transient());
        assert!(AdapterError::MissingProperty("url".into()).is_configuration());
        assert!(!AdapterError::MissingProperty("url".into()).is_transient());
        assert_eq!(AdapterError::Timeout(5).code(), "TIMEOUT");
    }

    #[test]
    fn test_operation_result_details() {
        let result = AdapterOperationResult::success("ok").with_detail("latencyMs", 12);
        assert!(result.success);
        assert_eq!(result.details.get("latencyMs"), Some(&"12".to_string()));

        let json = serde_json::to_value(&AdapterOperationResult::failure("down")).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("details").is_none());
    }
}
