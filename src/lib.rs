//! # Integration Flows
//!
//! An adapter runtime and orchestration engine for declarative integration
//! flows: data is read through an inbound adapter, optionally transformed,
//! and routed to one or more outbound targets.
//!
//! ## Features
//!
//! - **Protocol adapters** - HTTP/REST, SOAP, JDBC, FTP/SFTP, file, Kafka/JMS/AMQP, mail and SAP (RFC, IDoc, OData)
//! - **Lifecycle management** - Create, update, start, stop, reset and health-check adapters
//! - **Orchestration** - Ordered and parallel targets with conditions, retries and error strategies
//! - **Pool tuning** - Database and HTTP pools resized from their utilization
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use integration_flows::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(AdapterRegistry::builtin());
//!     let manager = AdapterManager::new(registry.clone(), Arc::new(InMemoryConfigurationRepository::new()));
//!
//!     let config = AdapterConfiguration::new("drop", AdapterType::File, AdapterMode::Outbound)
//!         .with_id("drop")
//!         .with_property("directory", "/tmp/out");
//!     manager.create_adapter(config).await?;
//!
//!     let flow: FlowDefinition = serde_yaml::from_str(r#"
//! id: copy
//! outbound_adapter_id: drop
//! "#)?;
//!
//!     let executor = FlowExecutor::new(registry);
//!     executor.register_flow(flow)?;
//!     let result = executor
//!         .trigger("copy", serde_json::json!({"id": 1}), HashMap::new())
//!         .await?;
//!
//!     println!("Flow completed: {}", result.outcome);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod engine;
pub mod pool;
pub mod registry;
pub mod workflow;

// Re-export main types
pub use adapter::{
    validate_configuration, Adapter, AdapterConfiguration, AdapterError, AdapterMetadata,
    AdapterMode, AdapterOperationResult, AdapterType, MetadataCatalog,
};
pub use engine::{
    AdapterExecutionResult, AdapterLookup, CancellationFlag, EngineError, EventPublisher,
    ExecutionEvent, FlowExecutionResult, FlowExecutor, FlowOutcome, OrchestrationRouter,
    RoutingReport, TargetOutcome, TargetResult, WorkflowState,
};
pub use pool::{ManagedPool, PoolError, PoolKind, PoolTuner, TunerConfig};
pub use registry::{
    AdapterManager, AdapterRegistry, ConfigurationRepository, InMemoryConfigurationRepository,
    ManagementError,
};
pub use workflow::{
    EngineConfig, FlowDefinition, FlowExecutionContext, FlowLoader, LoadError, OrchestrationTarget,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapter::{
        Adapter, AdapterConfiguration, AdapterError, AdapterMetadata, AdapterMode,
        AdapterOperationResult, AdapterType,
    };
    pub use crate::engine::{
        AdapterExecutionResult, CancellationFlag, EngineError, FlowExecutionResult, FlowExecutor,
        FlowOutcome, TargetOutcome, TargetResult,
    };
    pub use crate::pool::{ManagedPool, PoolKind, PoolTuner, TunerConfig};
    pub use crate::registry::{
        AdapterEnvironment, AdapterFactories, AdapterManager, AdapterRegistry,
        InMemoryConfigurationRepository, ManagementError,
    };
    pub use crate::workflow::{
        AdapterExecutionContext, ConditionType, EngineConfig, ErrorStrategy, FlowDefinition,
        FlowExecutionContext, FlowLoader, LoadError, MappingMode, OrchestrationTarget, RetryPolicy,
    };
}
