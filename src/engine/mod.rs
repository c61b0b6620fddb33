//! Flow execution engine module
//!
//! This module contains:
//! - `executor` - The flow executor and flow registry
//! - `router` - The orchestration target router
//! - `retry` - Retrying, timeout-bounded adapter invocation
//! - `state` - Workflow and step state machines
//! - `transform` - Payload transformation (Handlebars templates)
//! - `events` - Execution event publishing
//! - `cancel` - Cooperative cancellation
//! - `error` - Engine error types
//! - `result` - Adapter, target and flow result types

pub mod cancel;
pub mod error;
pub mod events;
pub mod executor;
pub mod result;
pub mod retry;
pub mod router;
pub mod state;
pub mod transform;

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::Adapter;

pub use cancel::CancellationFlag;
pub use error::{EngineError, TransformError};
pub use events::{
    ChannelEventPublisher, EventPublisher, ExecutionEvent, NoopEventPublisher,
    TracingEventPublisher,
};
pub use executor::FlowExecutor;
pub use result::{
    AdapterExecutionResult, FlowExecutionResult, FlowOutcome, TargetOutcome, TargetResult,
};
pub use retry::{execute_with_retry, InvocationFailure, InvocationOutcome};
pub use router::{CompensationRecord, OrchestrationRouter, RoutingReport};
pub use state::{StepStatus, StepType, WorkflowContext, WorkflowState, WorkflowStep};
pub use transform::{PassthroughTransformer, TemplateCacheStats, TemplateTransformer, Transformer};

/// Resolves live adapter instances by id
pub trait AdapterLookup: Send + Sync {
    fn lookup(&self, adapter_id: &str) -> Option<Arc<dyn Adapter>>;
}

impl AdapterLookup for HashMap<String, Arc<dyn Adapter>> {
    fn lookup(&self, adapter_id: &str) -> Option<Arc<dyn Adapter>> {
        self.get(adapter_id).cloned()
    }
}
