//! Adapter registry and lifecycle management
//!
//! This module contains:
//! - `factory` - The (type, mode) factory table and shared adapter resources
//! - `adapter_registry` - Live instances and their cached status
//! - `repository` - Persistence of adapter configurations
//! - `manager` - The lifecycle facade (create, update, start, stop, ...)
//! - `error` - Management error types

pub mod adapter_registry;
pub mod error;
pub mod factory;
pub mod manager;
pub mod repository;

pub use adapter_registry::AdapterRegistry;
pub use error::ManagementError;
pub use factory::{AdapterEnvironment, AdapterFactories, AdapterFactory};
pub use manager::{
    AdapterManager, AdapterSummary, AdvisoryFailure, BootstrapReport, ResetOutcome, UpdateOutcome,
};
pub use repository::{ConfigurationRepository, InMemoryConfigurationRepository};
