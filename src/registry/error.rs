//! Lifecycle management errors

use crate::adapter::{AdapterError, AdapterMode, AdapterType};

#[derive(Debug, thiserror::Error)]
pub enum ManagementError {
    /// Invalid or incomplete configuration; never retried
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[source] AdapterError),

    #[error("Adapter not found: {0}")]
    NotFound(String),

    #[error("Adapter already exists: {0}")]
    AlreadyExists(String),

    #[error("Unsupported adapter: {adapter_type} ({mode})")]
    Unsupported {
        adapter_type: AdapterType,
        mode: AdapterMode,
    },

    /// Instantiation, initialization or shutdown failed
    #[error("Lifecycle operation '{operation}' failed for {adapter_id}: {source}")]
    Lifecycle {
        adapter_id: String,
        operation: &'static str,
        #[source]
        source: AdapterError,
    },

    #[error("Adapter {adapter_id} is unhealthy: {message}")]
    Unhealthy { adapter_id: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ManagementError {
    pub fn lifecycle(adapter_id: &str, operation: &'static str, source: AdapterError) -> Self {
        if source.is_configuration() {
            if let AdapterError::Unsupported { adapter_type, mode } = source {
                return ManagementError::Unsupported { adapter_type, mode };
            }
            return ManagementError::InvalidConfiguration(source);
        }
        ManagementError::Lifecycle {
            adapter_id: adapter_id.to_string(),
            operation,
            source,
        }
    }

    /// The caller supplied a bad argument (the IllegalArgument class)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ManagementError::InvalidConfiguration(_) | ManagementError::Unsupported { .. }
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            ManagementError::InvalidConfiguration(e) => e.code(),
            ManagementError::NotFound(_) => "ADAPTER_NOT_FOUND",
            ManagementError::AlreadyExists(_) => "ADAPTER_EXISTS",
            ManagementError::Unsupported { .. } => "UNSUPPORTED_ADAPTER",
            ManagementError::Lifecycle { .. } => "LIFECYCLE_ERROR",
            ManagementError::Unhealthy { .. } => "UNHEALTHY",
            ManagementError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}
