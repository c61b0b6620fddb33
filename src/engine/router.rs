//! Orchestration target router
//!
//! Routes a payload to a flow's targets:
//! - active targets are stable-sorted by `execution_order` and grouped into tiers
//! - sequential targets run one at a time in configuration order
//! - the parallel targets of a tier launch together when the first of them is
//!   reached and are joined before anything after them runs
//! - a fail-fast failure stops further dispatching; parallel targets already
//!   launched in the tier are awaited first, then the run fails
//! - COMPENSATE additionally runs each completed target's compensation
//!   adapter, newest completion first

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::cancel::CancellationFlag;
use super::events::{EventPublisher, ExecutionEvent};
use super::result::{FlowOutcome, TargetOutcome, TargetResult};
use super::retry::{execute_with_retry, InvocationOutcome};
use super::AdapterLookup;
use crate::workflow::context::{AdapterExecutionContext, FlowExecutionContext};
use crate::workflow::expressions::{evaluate_routing, ExpressionScope};
use crate::workflow::target::{ErrorStrategy, OrchestrationTarget, RetryPolicy};

/// One compensation attempted after a COMPENSATE failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationRecord {
    pub target_id: String,
    pub adapter_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingReport {
    /// One result per active target, in routing order
    pub results: Vec<TargetResult>,
    pub compensations: Vec<CompensationRecord>,
    /// Target whose failure stopped routing
    pub aborted_by: Option<String>,
    pub cancelled: bool,
}

impl RoutingReport {
    pub fn is_success(&self) -> bool {
        self.aborted_by.is_none()
            && !self.cancelled
            && !self
                .results
                .iter()
                .any(|r| r.required && r.outcome.is_failure())
    }

    pub fn outcome(&self) -> FlowOutcome {
        if self.cancelled {
            FlowOutcome::Cancelled
        } else if !self.is_success() {
            FlowOutcome::Failed
        } else if self.results.iter().any(|r| r.outcome.is_failure()) {
            FlowOutcome::PartialSuccess
        } else {
            FlowOutcome::Success
        }
    }

    /// Awaited responses keyed by target id
    pub fn responses(&self) -> Map<String, Value> {
        self.results
            .iter()
            .filter(|r| r.outcome == TargetOutcome::Succeeded)
            .filter_map(|r| r.response.clone().map(|v| (r.target_id.clone(), v)))
            .collect()
    }

    /// The failure that decided the run, if any
    pub fn decisive_failure(&self) -> Option<&TargetResult> {
        if let Some(id) = &self.aborted_by {
            return self.results.iter().find(|r| &r.target_id == id);
        }
        self.results
            .iter()
            .find(|r| r.required && r.outcome.is_failure())
    }

    pub fn result(&self, target_id: &str) -> Option<&TargetResult> {
        self.results.iter().find(|r| r.target_id == target_id)
    }
}

pub struct OrchestrationRouter {
    adapters: Arc<dyn AdapterLookup>,
    events: Arc<dyn EventPublisher>,
}

impl OrchestrationRouter {
    pub fn new(adapters: Arc<dyn AdapterLookup>, events: Arc<dyn EventPublisher>) -> Self {
        Self { adapters, events }
    }

    #[instrument(skip(self, targets, ctx, cancel), fields(flow_id = %ctx.flow_id, correlation_id = %ctx.correlation_id))]
    pub async fn route(
        &self,
        targets: &[OrchestrationTarget],
        ctx: &FlowExecutionContext,
        cancel: &CancellationFlag,
    ) -> RoutingReport {
        let mut ordered: Vec<&OrchestrationTarget> = targets.iter().filter(|t| t.active).collect();
        ordered.sort_by_key(|t| t.execution_order);

        let mut report = RoutingReport::default();
        let mut completed: Vec<(Instant, &OrchestrationTarget, Option<Value>)> = Vec::new();
        let mut compensate = false;

        for tier in ordered.chunk_by(|a, b| a.execution_order == b.execution_order) {
            let mut parallel_launched = false;

            for target in tier {
                if report.aborted_by.is_some() || report.cancelled {
                    if !(target.parallel && parallel_launched) {
                        report.results.push(TargetResult::not_dispatched(
                            target,
                            if report.cancelled { "flow cancelled" } else { "routing aborted" },
                        ));
                    }
                    continue;
                }

                if cancel.is_cancelled() {
                    info!("Flow cancelled before target {}", target.id);
                    report.cancelled = true;
                    if !(target.parallel && parallel_launched) {
                        report
                            .results
                            .push(TargetResult::not_dispatched(target, "flow cancelled"));
                    }
                    continue;
                }

                let batch: Vec<&OrchestrationTarget> = if target.parallel {
                    if parallel_launched {
                        continue;
                    }
                    parallel_launched = true;
                    tier.iter().filter(|t| t.parallel).copied().collect()
                } else {
                    vec![*target]
                };

                if batch.len() > 1 {
                    debug!("Launching {} parallel targets at order {}", batch.len(), target.execution_order);
                }
                let outcomes = join_all(batch.iter().map(|t| self.dispatch(t, ctx))).await;

                for (t, (result, at)) in batch.into_iter().zip(outcomes) {
                    if result.outcome == TargetOutcome::Succeeded {
                        completed.push((at, t, result.response.clone()));
                    }
                    if result.outcome.is_failure() {
                        match t.error_strategy {
                            ErrorStrategy::Continue => {
                                warn!("Target {} failed, continuing", t.id);
                            }
                            ErrorStrategy::FailFast | ErrorStrategy::Compensate => {
                                if report.aborted_by.is_none() {
                                    warn!("Target {} failed, aborting remaining targets", t.id);
                                    report.aborted_by = Some(t.id.clone());
                                }
                                compensate |= t.error_strategy == ErrorStrategy::Compensate;
                            }
                        }
                    }
                    report.results.push(result);
                }
            }
        }

        if compensate {
            completed.sort_by_key(|(at, _, _)| *at);
            for (_, target, response) in completed.into_iter().rev() {
                if let Some(record) = self.compensate(target, response, ctx).await {
                    report.compensations.push(record);
                }
            }
        }

        report
    }

    fn adapter_context(&self, target: &OrchestrationTarget, ctx: &FlowExecutionContext) -> AdapterExecutionContext {
        let mut actx = ctx.adapter_context(&format!("target:{}", target.id), &target.adapter_id);
        actx.headers.extend(target.headers());
        actx.parameters.extend(target.parameters());
        actx.timeout_ms = target.timeout_ms;
        actx.is_async = !target.await_response;
        actx
    }

    /// Evaluate the condition, then invoke the target, returning when it finished
    async fn dispatch(&self, target: &OrchestrationTarget, ctx: &FlowExecutionContext) -> (TargetResult, Instant) {
        let scope = ExpressionScope::from(ctx);
        match evaluate_routing(target.condition_type, target.routing_condition.as_deref(), &scope) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Target {} skipped by routing condition", target.id);
                return (TargetResult::skipped(target), Instant::now());
            }
            Err(e) => {
                warn!("Target {} condition failed to evaluate: {}", target.id, e);
                let now = Utc::now();
                return (
                    TargetResult::failed(target, "CONDITION_ERROR", e.to_string(), 0, 0)
                        .with_window(now, Some(now)),
                    Instant::now(),
                );
            }
        }

        let started_at = Utc::now();
        let Some(adapter) = self.adapters.lookup(&target.adapter_id) else {
            return (
                TargetResult::failed(
                    target,
                    "ADAPTER_NOT_FOUND",
                    format!("Adapter not found: {}", target.adapter_id),
                    0,
                    0,
                )
                .with_window(started_at, Some(Utc::now())),
                Instant::now(),
            );
        };

        let actx = self.adapter_context(target, ctx);

        if !target.await_response {
            let events = self.events.clone();
            let policy = target.retry_policy.clone();
            let timeout = target.timeout();
            let target_id = target.id.clone();
            tokio::spawn(async move {
                let outcome = execute_with_retry(&adapter, &actx, &policy, timeout).await;
                if let Err(failure) = &outcome.result {
                    warn!("Fire-and-forget target {} failed: {}", target_id, failure.message);
                }
                events.publish(execution_event(&actx, Some(&target_id), &outcome));
            });
            return (
                TargetResult::dispatched(target).with_window(started_at, None),
                Instant::now(),
            );
        }

        let outcome = execute_with_retry(&adapter, &actx, &target.retry_policy, target.timeout()).await;
        self.events
            .publish(execution_event(&actx, Some(&target.id), &outcome));

        let result = match outcome.result {
            Ok(result) => TargetResult::succeeded(target, result, outcome.attempts),
            Err(failure) => TargetResult::failed(
                target,
                failure.code,
                failure.message,
                outcome.attempts,
                outcome.elapsed_ms,
            ),
        };
        (result.with_window(started_at, Some(Utc::now())), Instant::now())
    }

    /// One best-effort attempt of the target's compensation adapter
    async fn compensate(
        &self,
        target: &OrchestrationTarget,
        response: Option<Value>,
        ctx: &FlowExecutionContext,
    ) -> Option<CompensationRecord> {
        let adapter_id = target.compensation_adapter_id.as_deref()?;
        info!("Compensating target {} via {}", target.id, adapter_id);

        let Some(adapter) = self.adapters.lookup(adapter_id) else {
            return Some(CompensationRecord {
                target_id: target.id.clone(),
                adapter_id: adapter_id.to_string(),
                success: false,
                error_message: Some(format!("Adapter not found: {}", adapter_id)),
            });
        };

        let mut actx = ctx.adapter_context(&format!("compensate:{}", target.id), adapter_id);
        actx.timeout_ms = target.timeout_ms;
        actx.metadata
            .insert("compensatesTarget".to_string(), target.id.clone());
        if let Some(response) = response {
            actx.parameters.insert("targetResponse".to_string(), response);
        }

        let outcome = execute_with_retry(&adapter, &actx, &RetryPolicy::none(), target.timeout()).await;
        self.events
            .publish(execution_event(&actx, Some(&target.id), &outcome));

        let error_message = outcome.result.as_ref().err().map(|f| f.message.clone());
        if let Some(message) = &error_message {
            warn!("Compensation for target {} failed: {}", target.id, message);
        }
        Some(CompensationRecord {
            target_id: target.id.clone(),
            adapter_id: adapter_id.to_string(),
            success: outcome.is_success(),
            error_message,
        })
    }
}

pub(crate) fn execution_event(
    actx: &AdapterExecutionContext,
    target_id: Option<&str>,
    outcome: &InvocationOutcome,
) -> ExecutionEvent {
    ExecutionEvent::AdapterExecution {
        correlation_id: actx.correlation_id.clone(),
        execution_id: actx.execution_id.clone(),
        flow_id: actx.flow_id.clone(),
        adapter_id: actx.adapter_id.clone(),
        target_id: target_id.map(str::to_string),
        success: outcome.is_success(),
        attempts: outcome.attempts,
        elapsed_ms: outcome.elapsed_ms,
        error_code: outcome.result.as_ref().err().map(|f| f.code.clone()),
        timestamp: Utc::now(),
    }
}
