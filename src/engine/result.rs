//! Execution result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::state::WorkflowStep;
use crate::adapter::AdapterError;
use crate::workflow::context::AdapterExecutionContext;
use crate::workflow::target::{ErrorStrategy, OrchestrationTarget};

/// Result of one adapter invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterExecutionResult {
    pub execution_id: String,
    pub adapter_id: String,
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl AdapterExecutionResult {
    pub fn success(ctx: &AdapterExecutionContext, output: Value) -> Self {
        Self {
            execution_id: ctx.execution_id.clone(),
            adapter_id: ctx.adapter_id.clone(),
            success: true,
            output,
            error_code: None,
            error_message: None,
            elapsed_ms: 0,
            warnings: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn failure(ctx: &AdapterExecutionContext, error: &AdapterError) -> Self {
        Self {
            execution_id: ctx.execution_id.clone(),
            adapter_id: ctx.adapter_id.clone(),
            success: false,
            output: Value::Null,
            error_code: Some(error.code().to_string()),
            error_message: Some(error.to_string()),
            elapsed_ms: 0,
            warnings: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// How one orchestration target ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetOutcome {
    /// Awaited and answered successfully
    Succeeded,
    /// Fire-and-forget target handed to the runtime
    Dispatched,
    /// Routing condition evaluated to false
    Skipped,
    Failed,
    /// Never launched because an earlier failure or cancellation stopped routing
    NotDispatched,
}

impl TargetOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TargetOutcome::Failed)
    }
}

/// Result of routing a payload to one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub target_id: String,
    pub adapter_id: String,
    pub outcome: TargetOutcome,
    pub required: bool,
    pub error_strategy: ErrorStrategy,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// When the adapter call began; unset for targets never invoked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl TargetResult {
    fn base(target: &OrchestrationTarget, outcome: TargetOutcome) -> Self {
        Self {
            target_id: target.id.clone(),
            adapter_id: target.adapter_id.clone(),
            outcome,
            required: target.required,
            error_strategy: target.error_strategy,
            attempts: 0,
            response: None,
            error_code: None,
            error_message: None,
            elapsed_ms: 0,
            warnings: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn with_window(mut self, started_at: DateTime<Utc>, ended_at: Option<DateTime<Utc>>) -> Self {
        self.started_at = Some(started_at);
        self.ended_at = ended_at;
        self
    }

    pub fn succeeded(target: &OrchestrationTarget, result: AdapterExecutionResult, attempts: u32) -> Self {
        let mut out = Self::base(target, TargetOutcome::Succeeded);
        out.attempts = attempts;
        out.elapsed_ms = result.elapsed_ms;
        out.warnings = result.warnings;
        out.response = Some(result.output);
        out
    }

    pub fn dispatched(target: &OrchestrationTarget) -> Self {
        Self::base(target, TargetOutcome::Dispatched)
    }

    pub fn skipped(target: &OrchestrationTarget) -> Self {
        Self::base(target, TargetOutcome::Skipped)
    }

    pub fn failed(
        target: &OrchestrationTarget,
        code: impl Into<String>,
        message: impl Into<String>,
        attempts: u32,
        elapsed_ms: u64,
    ) -> Self {
        let mut out = Self::base(target, TargetOutcome::Failed);
        out.attempts = attempts;
        out.elapsed_ms = elapsed_ms;
        out.error_code = Some(code.into());
        out.error_message = Some(message.into());
        out
    }

    pub fn not_dispatched(target: &OrchestrationTarget, reason: impl Into<String>) -> Self {
        let mut out = Self::base(target, TargetOutcome::NotDispatched);
        out.error_message = Some(reason.into());
        out
    }

    /// A failure that fails the flow: required, or under a non-CONTINUE strategy
    pub fn is_blocking_failure(&self) -> bool {
        self.outcome.is_failure()
            && (self.required || self.error_strategy != ErrorStrategy::Continue)
    }
}

/// Overall outcome of a flow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowOutcome {
    Success,
    PartialSuccess,
    Failed,
    Cancelled,
}

impl fmt::Display for FlowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowOutcome::Success => write!(f, "SUCCESS"),
            FlowOutcome::PartialSuccess => write!(f, "PARTIAL_SUCCESS"),
            FlowOutcome::Failed => write!(f, "FAILED"),
            FlowOutcome::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Result of a flow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowExecutionResult {
    pub execution_id: String,
    pub flow_id: String,
    pub correlation_id: String,
    pub success: bool,
    pub outcome: FlowOutcome,
    pub processed_data: Value,
    pub records_processed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub target_results: Vec<TargetResult>,
    pub steps: Vec<WorkflowStep>,
    pub elapsed_ms: u64,
}

impl FlowExecutionResult {
    pub fn target(&self, target_id: &str) -> Option<&TargetResult> {
        self.target_results.iter().find(|r| r.target_id == target_id)
    }
}
