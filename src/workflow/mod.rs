//! Flow types and definitions
//!
//! This module contains all types for defining and loading flows:
//! - `flow` - FlowDefinition and MappingMode
//! - `target` - OrchestrationTarget, routing conditions, retry and error strategies
//! - `context` - Flow and adapter execution contexts
//! - `expressions` - Expression evaluation for `${{ }}` syntax and routing conditions
//! - `loader` - Load flows from files and directories
//! - `engine_config` - EngineConfig loaded from engine.yaml

pub mod context;
pub mod engine_config;
pub mod expressions;
pub mod flow;
pub mod loader;
pub mod target;

// Re-export all public types for convenience
pub use context::{AdapterExecutionContext, FlowExecutionContext};
pub use engine_config::EngineConfig;
pub use expressions::{
    evaluate as evaluate_expression, evaluate_condition, evaluate_routing, ExpressionError,
    ExpressionScope,
};
pub use flow::{FlowDefinition, MappingMode};
pub use loader::{FlowLoader, LoadError};
pub use target::{ConditionType, ErrorStrategy, OrchestrationTarget, RetryPolicy, TargetUpdate};
