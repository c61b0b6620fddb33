mod common;

use common::*;
use integration_flows::engine::{
    CancellationFlag, ChannelEventPublisher, ExecutionEvent, FlowOutcome, NoopEventPublisher,
    OrchestrationRouter, TargetOutcome,
};
use integration_flows::workflow::{ConditionType, ErrorStrategy, FlowExecutionContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn router(lookup: Arc<std::collections::HashMap<String, Arc<dyn integration_flows::Adapter>>>) -> OrchestrationRouter {
    OrchestrationRouter::new(lookup, Arc::new(NoopEventPublisher))
}

fn context() -> FlowExecutionContext {
    FlowExecutionContext::new("orders", json!({"orderId": 7, "status": "NEW"})).with_header("Region", "EU")
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_fail_fast_target_blocks_later_tiers() {
    let primary = ScriptedAdapter::new("primary").always_fail(5, "connection reset").shared();
    let audit = ScriptedAdapter::new("audit").shared();
    let archive = ScriptedAdapter::new("archive").shared();
    let router = router(adapters(&[("primary", &primary), ("audit", &audit), ("archive", &archive)]));

    let mut first = target("primary", "primary", 1);
    first.retry_policy.max_attempts = 3;
    let targets = vec![
        first,
        parallel_target("audit", "audit", 2),
        parallel_target("archive", "archive", 2),
    ];

    let report = router.route(&targets, &context(), &CancellationFlag::new()).await;

    assert_eq!(primary.call_count(), 3);
    assert_eq!(audit.call_count(), 0);
    assert_eq!(archive.call_count(), 0);

    let failed = report.result("primary").unwrap();
    assert_eq!(failed.outcome, TargetOutcome::Failed);
    assert_eq!(failed.attempts, 3);
    assert_eq!(failed.error_code.as_deref(), Some("CONNECTION_FAILED"));
    assert_eq!(report.result("audit").unwrap().outcome, TargetOutcome::NotDispatched);
    assert_eq!(report.result("archive").unwrap().outcome, TargetOutcome::NotDispatched);
    assert_eq!(report.aborted_by.as_deref(), Some("primary"));
    assert_eq!(report.outcome(), FlowOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_attempts_are_retried() {
    let slow = ScriptedAdapter::new("slow").with_delay(Duration::from_millis(200)).shared();
    let router = router(adapters(&[("slow", &slow)]));

    let mut only = target("slow", "slow", 1);
    only.timeout_ms = 50;
    only.retry_policy.max_attempts = 3;

    let report = router.route(&[only], &context(), &CancellationFlag::new()).await;
    let result = report.result("slow").unwrap();

    assert_eq!(slow.call_count(), 3);
    assert_eq!(result.outcome, TargetOutcome::Failed);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.error_code.as_deref(), Some("TIMEOUT"));
    assert_eq!(report.outcome(), FlowOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_fail_fast_in_parallel_tier_awaits_siblings_then_fails() {
    let flaky = ScriptedAdapter::new("flaky").then(Reply::Fail("connection reset".to_string())).shared();
    let slow = ScriptedAdapter::new("slow").with_delay(Duration::from_millis(100)).shared();
    let later = ScriptedAdapter::new("later").shared();
    let router = router(adapters(&[("flaky", &flaky), ("slow", &slow), ("later", &later)]));

    let targets = vec![
        parallel_target("flaky", "flaky", 1),
        parallel_target("slow", "slow", 1),
        target("later", "later", 2),
    ];
    let report = router.route(&targets, &context(), &CancellationFlag::new()).await;

    assert_eq!(report.result("flaky").unwrap().outcome, TargetOutcome::Failed);
    assert_eq!(report.result("slow").unwrap().outcome, TargetOutcome::Succeeded);
    assert_eq!(slow.call_count(), 1);
    assert_eq!(report.result("later").unwrap().outcome, TargetOutcome::NotDispatched);
    assert_eq!(later.call_count(), 0);
    assert_eq!(report.aborted_by.as_deref(), Some("flaky"));
    assert_eq!(report.outcome(), FlowOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_targets_start_together() {
    let left = ScriptedAdapter::new("left").with_delay(Duration::from_millis(100)).shared();
    let right = ScriptedAdapter::new("right").with_delay(Duration::from_millis(100)).shared();
    let router = router(adapters(&[("left", &left), ("right", &right)]));

    let targets = vec![parallel_target("left", "left", 1), parallel_target("right", "right", 1)];

    let start = tokio::time::Instant::now();
    let report = router.route(&targets, &context(), &CancellationFlag::new()).await;
    let elapsed = start.elapsed();

    assert_eq!(left.started_at()[0], right.started_at()[0]);
    assert!(elapsed < Duration::from_millis(200), "parallel tier took {:?}", elapsed);
    assert_eq!(report.outcome(), FlowOutcome::Success);

    let ids: Vec<_> = report.results.iter().map(|r| r.target_id.as_str()).collect();
    assert_eq!(ids, vec!["left", "right"]);
}

#[tokio::test]
async fn test_tiers_run_in_execution_order() {
    let first = ScriptedAdapter::new("first").shared();
    let second = ScriptedAdapter::new("second").shared();
    let router = router(adapters(&[("first", &first), ("second", &second)]));

    let targets = vec![target("second", "second", 5), target("first", "first", 1)];
    let report = router.route(&targets, &context(), &CancellationFlag::new()).await;

    let ids: Vec<_> = report.results.iter().map(|r| r.target_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second"]);
    assert!(first.started_at()[0] <= second.started_at()[0]);
}

#[tokio::test]
async fn test_false_condition_skips_without_failure() {
    let us = ScriptedAdapter::new("us").shared();
    let eu = ScriptedAdapter::new("eu").shared();
    let router = router(adapters(&[("us", &us), ("eu", &eu)]));

    let mut to_us = target("us", "us", 1);
    to_us.condition_type = ConditionType::HeaderMatch;
    to_us.routing_condition = Some("Region=US".to_string());

    let mut to_eu = target("eu", "eu", 1);
    to_eu.condition_type = ConditionType::Expression;
    to_eu.routing_condition = Some("${{ headers.Region }} == 'EU' && ${{ payload.orderId }} > 5".to_string());

    let report = router
        .route(&[to_us, to_eu], &context(), &CancellationFlag::new())
        .await;

    assert_eq!(report.result("us").unwrap().outcome, TargetOutcome::Skipped);
    assert_eq!(report.result("eu").unwrap().outcome, TargetOutcome::Succeeded);
    assert_eq!(us.call_count(), 0);
    assert_eq!(report.outcome(), FlowOutcome::Success);
}

#[tokio::test]
async fn test_invalid_condition_fails_target() {
    let sink = ScriptedAdapter::new("sink").shared();
    let router = router(adapters(&[("sink", &sink)]));

    let mut broken = target("sink", "sink", 1);
    broken.condition_type = ConditionType::Regex;
    broken.routing_condition = Some("([unclosed".to_string());

    let report = router.route(&[broken], &context(), &CancellationFlag::new()).await;
    let result = report.result("sink").unwrap();

    assert_eq!(result.outcome, TargetOutcome::Failed);
    assert_eq!(result.error_code.as_deref(), Some("CONDITION_ERROR"));
    assert_eq!(result.attempts, 0);
    assert_eq!(sink.call_count(), 0);
}

#[tokio::test]
async fn test_optional_continue_failure_is_partial_success() {
    let flaky = ScriptedAdapter::new("flaky").then(Reply::Reject("bad mapping".to_string())).shared();
    let stable = ScriptedAdapter::new("stable").shared();
    let router = router(adapters(&[("flaky", &flaky), ("stable", &stable)]));

    let mut optional = target("flaky", "flaky", 1);
    optional.required = false;
    optional.error_strategy = ErrorStrategy::Continue;

    let report = router
        .route(&[optional, target("stable", "stable", 2)], &context(), &CancellationFlag::new())
        .await;

    assert_eq!(report.result("flaky").unwrap().outcome, TargetOutcome::Failed);
    assert_eq!(report.result("stable").unwrap().outcome, TargetOutcome::Succeeded);
    assert!(report.aborted_by.is_none());
    assert_eq!(report.outcome(), FlowOutcome::PartialSuccess);
}

#[tokio::test]
async fn test_required_continue_failure_fails_flow_but_keeps_routing() {
    let flaky = ScriptedAdapter::new("flaky").then(Reply::Reject("bad mapping".to_string())).shared();
    let stable = ScriptedAdapter::new("stable").shared();
    let router = router(adapters(&[("flaky", &flaky), ("stable", &stable)]));

    let mut required = target("flaky", "flaky", 1);
    required.error_strategy = ErrorStrategy::Continue;

    let report = router
        .route(&[required, target("stable", "stable", 2)], &context(), &CancellationFlag::new())
        .await;

    assert_eq!(stable.call_count(), 1);
    assert_eq!(report.result("stable").unwrap().outcome, TargetOutcome::Succeeded);
    assert!(!report.is_success());
    assert_eq!(report.outcome(), FlowOutcome::Failed);
}

#[tokio::test]
async fn test_configuration_failure_is_not_retried() {
    let strict = ScriptedAdapter::new("strict").then(Reply::Reject("missing table".to_string())).shared();
    let router = router(adapters(&[("strict", &strict)]));

    let mut only = target("strict", "strict", 1);
    only.retry_policy.max_attempts = 4;

    let report = router.route(&[only], &context(), &CancellationFlag::new()).await;

    assert_eq!(strict.call_count(), 1);
    assert_eq!(report.result("strict").unwrap().attempts, 1);
    assert_eq!(report.outcome(), FlowOutcome::Failed);
}

#[tokio::test]
async fn test_missing_adapter_fails_target() {
    let router = router(adapters(&[]));
    let report = router
        .route(&[target("ghost", "nowhere", 1)], &context(), &CancellationFlag::new())
        .await;

    let result = report.result("ghost").unwrap();
    assert_eq!(result.error_code.as_deref(), Some("ADAPTER_NOT_FOUND"));
    assert_eq!(report.outcome(), FlowOutcome::Failed);
}

#[tokio::test]
async fn test_fire_and_forget_reports_dispatched() {
    let slow = ScriptedAdapter::new("slow").with_delay(Duration::from_millis(50)).shared();
    let (publisher, events) = ChannelEventPublisher::new(16);
    let router = OrchestrationRouter::new(adapters(&[("slow", &slow)]), Arc::new(publisher));

    let mut audit = target("audit", "slow", 1);
    audit.await_response = false;

    let report = router.route(&[audit], &context(), &CancellationFlag::new()).await;
    assert_eq!(report.result("audit").unwrap().outcome, TargetOutcome::Dispatched);
    assert_eq!(report.outcome(), FlowOutcome::Success);

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("dispatch event")
        .unwrap();
    match event {
        ExecutionEvent::AdapterExecution { target_id, success, .. } => {
            assert_eq!(target_id.as_deref(), Some("audit"));
            assert!(success);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(slow.calls()[0].is_async);
}

#[tokio::test]
async fn test_compensation_runs_in_reverse_completion_order() {
    let reserve = ScriptedAdapter::new("reserve")
        .then(Reply::Respond(json!({"reservation": "R-1"})))
        .shared();
    let charge = ScriptedAdapter::new("charge")
        .then(Reply::Respond(json!({"charge": "C-1"})))
        .shared();
    let ship = ScriptedAdapter::new("ship").then(Reply::Reject("no carrier".to_string())).shared();
    let undo = ScriptedAdapter::new("undo").shared();
    let router = router(adapters(&[
        ("reserve", &reserve),
        ("charge", &charge),
        ("ship", &ship),
        ("undo", &undo),
    ]));

    let mut first = target("reserve", "reserve", 1);
    first.compensation_adapter_id = Some("undo".to_string());
    let mut second = target("charge", "charge", 2);
    second.compensation_adapter_id = Some("undo".to_string());
    let mut third = target("ship", "ship", 3);
    third.error_strategy = ErrorStrategy::Compensate;

    let report = router
        .route(&[first, second, third], &context(), &CancellationFlag::new())
        .await;

    assert_eq!(report.outcome(), FlowOutcome::Failed);
    let compensated: Vec<_> = report.compensations.iter().map(|c| c.target_id.as_str()).collect();
    assert_eq!(compensated, vec!["charge", "reserve"]);
    assert!(report.compensations.iter().all(|c| c.success));

    let calls = undo.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].metadata.get("compensatesTarget").map(String::as_str), Some("charge"));
    assert_eq!(calls[0].parameters.get("targetResponse"), Some(&json!({"charge": "C-1"})));
}

#[tokio::test]
async fn test_cancelled_routing_dispatches_nothing() {
    let sink = ScriptedAdapter::new("sink").shared();
    let router = router(adapters(&[("sink", &sink)]));
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let report = router.route(&[target("sink", "sink", 1)], &context(), &cancel).await;

    assert!(report.cancelled);
    assert_eq!(report.result("sink").unwrap().outcome, TargetOutcome::NotDispatched);
    assert_eq!(report.outcome(), FlowOutcome::Cancelled);
    assert_eq!(sink.call_count(), 0);
}

#[tokio::test]
async fn test_target_configuration_reaches_adapter() {
    let sink = ScriptedAdapter::new("sink").shared();
    let router = router(adapters(&[("sink", &sink)]));

    let mut configured = target("sink", "sink", 1);
    configured.timeout_ms = 1234;
    configured
        .configuration
        .insert("headers".to_string(), json!({"X-Tenant": "acme"}));
    configured
        .configuration
        .insert("parameters".to_string(), json!({"path": "/orders"}));

    router.route(&[configured], &context(), &CancellationFlag::new()).await;

    let call = &sink.calls()[0];
    assert_eq!(call.step_id, "target:sink");
    assert_eq!(call.timeout_ms, 1234);
    assert_eq!(call.headers.get("X-Tenant").map(String::as_str), Some("acme"));
    assert_eq!(call.headers.get("Region").map(String::as_str), Some("EU"));
    assert_eq!(call.parameters.get("path"), Some(&json!("/orders")));
}
