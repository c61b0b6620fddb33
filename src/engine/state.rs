//! Workflow and step state machines
//!
//! A flow execution is tracked as a `WorkflowContext` holding an
//! append-only list of `WorkflowStep`s. Both the workflow and each step move
//! through a fixed transition graph; anything else is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Initiated,
    InProgress,
    Suspended,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Initiated, InProgress | Cancelled)
                | (InProgress, Completed | Failed | Cancelled | Suspended)
                | (Suspended, InProgress | Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::Initiated => "INITIATED",
            WorkflowState::InProgress => "IN_PROGRESS",
            WorkflowState::Suspended => "SUSPENDED",
            WorkflowState::Completed => "COMPLETED",
            WorkflowState::Failed => "FAILED",
            WorkflowState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Retry,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress | Skipped)
                | (InProgress, Completed | Failed | Retry)
                | (Retry, InProgress | Failed)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "PENDING",
            StepStatus::InProgress => "IN_PROGRESS",
            StepStatus::Retry => "RETRY",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "SKIPPED",
        };
        write!(f, "{}", s)
    }
}

/// Stages a flow execution records steps for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    SourceAdapter,
    TargetAdapter,
    Transformation,
    Routing,
    Validation,
    Enrichment,
    Split,
    Aggregate,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub step_id: String,
    pub name: String,
    pub step_type: StepType,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    pub retry_count: u32,
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
}

impl WorkflowStep {
    pub fn new(step_id: impl Into<String>, name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            step_type,
            status: StepStatus::Pending,
            adapter_id: None,
            input: Value::Null,
            output: Value::Null,
            retry_count: 0,
            optional: false,
            started_at: None,
            ended_at: None,
            elapsed_ms: 0,
            error_message: None,
            next_step_id: None,
        }
    }

    pub fn with_adapter(mut self, adapter_id: impl Into<String>) -> Self {
        self.adapter_id = Some(adapter_id.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn transition(&mut self, next: StepStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                subject: format!("step '{}'", self.step_id),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// PENDING -> IN_PROGRESS, stamping the start time
    pub fn start(&mut self, input: Value) -> Result<(), EngineError> {
        self.start_at(input, Utc::now())
    }

    /// PENDING -> IN_PROGRESS at a start time recorded elsewhere
    pub fn start_at(&mut self, input: Value, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(StepStatus::InProgress)?;
        self.input = input;
        self.started_at = Some(at);
        Ok(())
    }

    pub fn complete(&mut self, output: Value) -> Result<(), EngineError> {
        self.complete_at(output, Utc::now())
    }

    pub fn complete_at(&mut self, output: Value, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(StepStatus::Completed)?;
        self.output = output;
        self.finish(at);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), EngineError> {
        self.fail_at(message, Utc::now())
    }

    pub fn fail_at(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(StepStatus::Failed)?;
        self.error_message = Some(message.into());
        self.finish(at);
        Ok(())
    }

    pub fn skip(&mut self) -> Result<(), EngineError> {
        self.transition(StepStatus::Skipped)
    }

    /// IN_PROGRESS -> RETRY -> IN_PROGRESS, counting the attempt
    pub fn retry(&mut self) -> Result<(), EngineError> {
        self.transition(StepStatus::Retry)?;
        self.retry_count += 1;
        self.transition(StepStatus::InProgress)
    }

    fn finish(&mut self, ended: DateTime<Utc>) {
        if let Some(started) = self.started_at {
            self.elapsed_ms = (ended - started).num_milliseconds().max(0) as u64;
        }
        self.ended_at = Some(ended);
    }
}

/// State of one flow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub flow_id: String,
    pub state: WorkflowState,
    steps: Vec<WorkflowStep>,
    pub variables: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowContext {
    pub fn new(workflow_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            flow_id: flow_id.into(),
            state: WorkflowState::Initiated,
            steps: Vec::new(),
            variables: HashMap::new(),
            current_step: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn transition(&mut self, next: WorkflowState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                subject: format!("workflow '{}'", self.workflow_id),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Append a step, linking it from the previous one
    pub fn add_step(&mut self, step: WorkflowStep) -> usize {
        if let Some(previous) = self.steps.last_mut() {
            previous.next_step_id = Some(step.step_id.clone());
        }
        self.current_step = Some(step.step_id.clone());
        self.steps.push(step);
        self.updated_at = Utc::now();
        self.steps.len() - 1
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut WorkflowStep> {
        self.steps.get_mut(index)
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<WorkflowStep> {
        self.steps
    }

    pub fn set_variable(&mut self, key: &str, value: Value) {
        self.variables.insert(key.to_string(), value);
    }

    /// Every required step reached COMPLETED; optional and skipped steps don't count
    pub fn is_successful(&self) -> bool {
        self.steps
            .iter()
            .filter(|s| !s.optional && s.status != StepStatus::Skipped)
            .all(|s| s.status == StepStatus::Completed)
    }
}
