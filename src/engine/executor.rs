//! Flow executor
//!
//! Runs a flow as a linear progression of recorded steps:
//! 1. SOURCE_ADAPTER: invoke the inbound adapter, when one is configured
//! 2. TRANSFORMATION: render the mapping template (skipped in PASS_THROUGH)
//! 3. ROUTING: hand the payload to the orchestration router
//! 4. TARGET_ADAPTER: one step per routed target
//!
//! A failed source or transformation step aborts the flow. Whether a target
//! failure fails the flow is decided by the router's error strategies.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use super::cancel::CancellationFlag;
use super::error::EngineError;
use super::events::{EventPublisher, ExecutionEvent, TracingEventPublisher};
use super::result::{FlowExecutionResult, FlowOutcome, TargetOutcome, TargetResult};
use super::retry::{InvocationFailure, InvocationOutcome};
use super::router::{execution_event, OrchestrationRouter, RoutingReport};
use super::state::{StepType, WorkflowContext, WorkflowState, WorkflowStep};
use super::transform::{TemplateTransformer, Transformer};
use super::AdapterLookup;
use crate::adapter::AdapterError;
use crate::workflow::context::FlowExecutionContext;
use crate::workflow::flow::{FlowDefinition, MappingMode};

/// Why the stages stopped before routing finished normally
enum StageError {
    Failed { code: String, message: String },
    Cancelled,
}

impl From<EngineError> for StageError {
    fn from(e: EngineError) -> Self {
        StageError::Failed {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<InvocationFailure> for StageError {
    fn from(f: InvocationFailure) -> Self {
        StageError::Failed {
            code: f.code,
            message: f.message,
        }
    }
}

pub struct FlowExecutor {
    flows: DashMap<String, FlowDefinition>,
    adapters: Arc<dyn AdapterLookup>,
    transformer: Arc<dyn Transformer>,
    events: Arc<dyn EventPublisher>,
    router: OrchestrationRouter,
}

impl FlowExecutor {
    pub fn new(adapters: Arc<dyn AdapterLookup>) -> Self {
        let events: Arc<dyn EventPublisher> = Arc::new(TracingEventPublisher);
        Self {
            flows: DashMap::new(),
            router: OrchestrationRouter::new(adapters.clone(), events.clone()),
            adapters,
            transformer: Arc::new(TemplateTransformer::new()),
            events,
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.router = OrchestrationRouter::new(self.adapters.clone(), events.clone());
        self.events = events;
        self
    }

    /// Validate and register a flow, replacing any flow with the same id
    pub fn register_flow(&self, flow: FlowDefinition) -> Result<(), EngineError> {
        flow.validate()?;
        info!("Registered flow {}", flow.id);
        self.flows.insert(flow.id.clone(), flow);
        Ok(())
    }

    pub fn flow(&self, flow_id: &str) -> Option<FlowDefinition> {
        self.flows.get(flow_id).map(|f| f.value().clone())
    }

    /// All registered flows, sorted by id
    pub fn flows(&self) -> Vec<FlowDefinition> {
        let mut flows: Vec<_> = self.flows.iter().map(|f| f.value().clone()).collect();
        flows.sort_by(|a, b| a.id.cmp(&b.id));
        flows
    }

    /// Run a registered flow on a raw payload
    pub async fn trigger(
        &self,
        flow_id: &str,
        payload: Value,
        headers: HashMap<String, String>,
    ) -> Result<FlowExecutionResult, EngineError> {
        let flow = self
            .flow(flow_id)
            .ok_or_else(|| EngineError::FlowNotFound(flow_id.to_string()))?;
        if !flow.active {
            return Err(EngineError::FlowInactive(flow_id.to_string()));
        }

        let mut ctx = FlowExecutionContext::for_flow(&flow, payload);
        ctx.headers = headers;
        Ok(self.execute(&flow, ctx).await)
    }

    pub async fn execute(&self, flow: &FlowDefinition, ctx: FlowExecutionContext) -> FlowExecutionResult {
        self.execute_with_cancel(flow, ctx, &CancellationFlag::new()).await
    }

    #[instrument(skip(self, flow, ctx, cancel), fields(flow_id = %flow.id, correlation_id = %ctx.correlation_id))]
    pub async fn execute_with_cancel(
        &self,
        flow: &FlowDefinition,
        mut ctx: FlowExecutionContext,
        cancel: &CancellationFlag,
    ) -> FlowExecutionResult {
        let start = Instant::now();
        info!("Executing flow {} ({})", flow.display_name(), ctx.execution_id);

        let mut workflow = WorkflowContext::new(ctx.execution_id.clone(), flow.id.clone());
        let mut warnings = Vec::new();

        let stages = match workflow.transition(WorkflowState::InProgress) {
            Ok(()) => {
                self.run_stages(flow, &mut ctx, &mut workflow, cancel, &mut warnings)
                    .await
            }
            Err(e) => Err(StageError::from(e)),
        };

        let (outcome, target_results, processed_data, error) = match stages {
            Ok(report) => {
                for result in report.results.iter().filter(|r| r.outcome.is_failure()) {
                    if !result.is_blocking_failure() {
                        warnings.push(format!(
                            "Target {} failed: {}",
                            result.target_id,
                            result.error_message.as_deref().unwrap_or("unknown error")
                        ));
                    }
                }
                for compensation in report.compensations.iter().filter(|c| !c.success) {
                    warnings.push(format!(
                        "Compensation for target {} failed: {}",
                        compensation.target_id,
                        compensation.error_message.as_deref().unwrap_or("unknown error")
                    ));
                }

                let responses = report.responses();
                let processed = if responses.is_empty() {
                    ctx.payload.clone()
                } else {
                    Value::Object(responses)
                };
                let error = if report.cancelled {
                    Some(("CANCELLED".to_string(), "Flow execution was cancelled".to_string()))
                } else {
                    report.decisive_failure().map(|r| {
                        (
                            r.error_code.clone().unwrap_or_else(|| "TARGET_FAILED".to_string()),
                            format!(
                                "Target {} failed: {}",
                                r.target_id,
                                r.error_message.as_deref().unwrap_or("unknown error")
                            ),
                        )
                    })
                };
                (report.outcome(), report.results, processed, error)
            }
            Err(StageError::Cancelled) => (
                FlowOutcome::Cancelled,
                Vec::new(),
                ctx.payload.clone(),
                Some(("CANCELLED".to_string(), "Flow execution was cancelled".to_string())),
            ),
            Err(StageError::Failed { code, message }) => (
                FlowOutcome::Failed,
                Vec::new(),
                ctx.payload.clone(),
                Some((code, message)),
            ),
        };

        let final_state = match outcome {
            FlowOutcome::Success | FlowOutcome::PartialSuccess => WorkflowState::Completed,
            FlowOutcome::Failed => WorkflowState::Failed,
            FlowOutcome::Cancelled => WorkflowState::Cancelled,
        };
        if let Err(e) = workflow.transition(final_state) {
            warn!("{}", e);
        }

        let routed_ok = matches!(outcome, FlowOutcome::Success | FlowOutcome::PartialSuccess);
        let success = routed_ok && workflow.is_successful();
        if routed_ok && !success {
            warn!("Flow {} routed {:?} but a required step did not complete", flow.id, outcome);
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.events.publish(ExecutionEvent::FlowExecution {
            correlation_id: ctx.correlation_id.clone(),
            execution_id: ctx.execution_id.clone(),
            flow_id: flow.id.clone(),
            outcome,
            elapsed_ms,
            timestamp: Utc::now(),
        });

        match &error {
            Some((code, message)) => warn!("Flow {} finished {:?}: {} {}", flow.id, outcome, code, message),
            None => info!("Flow {} finished {:?} in {}ms", flow.id, outcome, elapsed_ms),
        }

        let (error_code, error_message) = error.unzip();
        FlowExecutionResult {
            execution_id: ctx.execution_id.clone(),
            flow_id: flow.id.clone(),
            correlation_id: ctx.correlation_id.clone(),
            success,
            outcome,
            processed_data,
            records_processed: ctx.records(),
            warnings,
            error_code,
            error_message,
            target_results,
            steps: workflow.into_steps(),
            elapsed_ms,
        }
    }

    async fn run_stages(
        &self,
        flow: &FlowDefinition,
        ctx: &mut FlowExecutionContext,
        workflow: &mut WorkflowContext,
        cancel: &CancellationFlag,
        warnings: &mut Vec<String>,
    ) -> Result<RoutingReport, StageError> {
        flow.validate().map_err(EngineError::from)?;

        if let Some(inbound) = &flow.inbound_adapter_id {
            if cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            self.run_source(flow, inbound, ctx, workflow, warnings).await?;
        }

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        self.run_transformation(flow, ctx, workflow).await?;

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        let index = workflow.add_step(WorkflowStep::new("routing", "Route to targets", StepType::Routing));
        let targets = flow.effective_targets();
        if let Some(step) = workflow.step_mut(index) {
            step.start(json!({ "targets": targets.len() }))?;
        }

        let report = self.router.route(&targets, ctx, cancel).await;

        if let Some(step) = workflow.step_mut(index) {
            if report.is_success() {
                step.complete(json!({ "outcome": report.outcome() }))?;
            } else if report.cancelled {
                step.fail("Flow execution was cancelled")?;
            } else {
                let message = report
                    .decisive_failure()
                    .map(|r| format!("Target {} failed", r.target_id))
                    .unwrap_or_else(|| "Routing failed".to_string());
                step.fail(message)?;
            }
        }

        for result in &report.results {
            workflow.add_step(target_step(result, ctx)?);
        }

        Ok(report)
    }

    async fn run_source(
        &self,
        flow: &FlowDefinition,
        adapter_id: &str,
        ctx: &mut FlowExecutionContext,
        workflow: &mut WorkflowContext,
        warnings: &mut Vec<String>,
    ) -> Result<(), StageError> {
        let index = workflow.add_step(
            WorkflowStep::new("source", "Source adapter", StepType::SourceAdapter).with_adapter(adapter_id),
        );
        let Some(step) = workflow.step_mut(index) else {
            return Ok(());
        };
        step.start(ctx.payload.clone())?;

        let Some(adapter) = self.adapters.lookup(adapter_id) else {
            let error = AdapterError::NotFound(adapter_id.to_string());
            step.fail(error.to_string())?;
            return Err(InvocationFailure::from(&error).into());
        };

        let mut actx = ctx.adapter_context("source", adapter_id);
        actx.timeout_ms = flow.timeout_ms;

        let start = Instant::now();
        let result = match tokio::time::timeout(
            std::time::Duration::from_millis(flow.timeout_ms),
            adapter.execute(&actx),
        )
        .await
        {
            Ok(Ok(result)) if result.success => Ok(result),
            Ok(Ok(result)) => Err(InvocationFailure {
                code: result.error_code.unwrap_or_else(|| "EXECUTION_ERROR".to_string()),
                message: result
                    .error_message
                    .unwrap_or_else(|| format!("Source adapter {} reported failure", adapter_id)),
            }),
            Ok(Err(e)) => Err(InvocationFailure::from(&e)),
            Err(_) => Err(InvocationFailure::from(&AdapterError::Timeout(flow.timeout_ms))),
        };

        let outcome = InvocationOutcome {
            result,
            attempts: 1,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        self.events.publish(execution_event(&actx, None, &outcome));

        match outcome.result {
            Ok(result) => {
                step.complete(result.output.clone())?;
                warnings.extend(result.warnings);
                if !result.output.is_null() {
                    ctx.payload = result.output;
                }
                Ok(())
            }
            Err(failure) => {
                step.fail(failure.message.clone())?;
                Err(failure.into())
            }
        }
    }

    async fn run_transformation(
        &self,
        flow: &FlowDefinition,
        ctx: &mut FlowExecutionContext,
        workflow: &mut WorkflowContext,
    ) -> Result<(), StageError> {
        let index = workflow.add_step(WorkflowStep::new("transformation", "Transform payload", StepType::Transformation));
        let Some(step) = workflow.step_mut(index) else {
            return Ok(());
        };

        if flow.mapping_mode == MappingMode::PassThrough {
            step.optional = true;
            step.skip()?;
            return Ok(());
        }

        step.start(ctx.payload.clone())?;
        match self.transformer.transform(flow, ctx).await {
            Ok(output) => {
                step.complete(output.clone())?;
                ctx.payload = output;
                Ok(())
            }
            Err(e) => {
                step.fail(e.to_string())?;
                Err(EngineError::from(e).into())
            }
        }
    }
}

/// Record a routed target as a TARGET_ADAPTER step, stamped with the call's own start and end
fn target_step(result: &TargetResult, ctx: &FlowExecutionContext) -> Result<WorkflowStep, EngineError> {
    let mut step = WorkflowStep::new(
        format!("target:{}", result.target_id),
        format!("Target {}", result.target_id),
        StepType::TargetAdapter,
    )
    .with_adapter(result.adapter_id.clone());
    step.optional = !result.required;

    let started = result.started_at.unwrap_or_else(Utc::now);
    let ended = result.ended_at.unwrap_or(started);

    match result.outcome {
        TargetOutcome::Succeeded | TargetOutcome::Dispatched => {
            step.start_at(ctx.payload.clone(), started)?;
            for _ in 1..result.attempts {
                step.retry()?;
            }
            step.complete_at(result.response.clone().unwrap_or(Value::Null), ended)?;
        }
        TargetOutcome::Failed => {
            step.start_at(ctx.payload.clone(), started)?;
            for _ in 1..result.attempts {
                step.retry()?;
            }
            step.fail_at(result.error_message.clone().unwrap_or_default(), ended)?;
        }
        TargetOutcome::Skipped => step.skip()?,
        TargetOutcome::NotDispatched => {
            step.error_message = result.error_message.clone();
        }
    }
    Ok(step)
}
