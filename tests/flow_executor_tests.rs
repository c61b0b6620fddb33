mod common;

use common::*;
use integration_flows::adapter::{AdapterConfiguration, AdapterMode, AdapterType};
use integration_flows::engine::{
    CancellationFlag, ChannelEventPublisher, EngineError, ExecutionEvent, FlowExecutor, FlowOutcome,
    StepStatus, TargetOutcome,
};
use integration_flows::registry::{AdapterManager, AdapterRegistry, InMemoryConfigurationRepository};
use integration_flows::workflow::{FlowDefinition, FlowExecutionContext, MappingMode};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn flow(id: &str) -> FlowDefinition {
    FlowDefinition::new(id)
}

#[tokio::test]
async fn test_source_output_flows_to_targets() {
    let source = ScriptedAdapter::new("orders-in")
        .with_mode(AdapterMode::Inbound)
        .then(Reply::Respond(json!({"id": 42, "total": 99.5})))
        .shared();
    let erp = ScriptedAdapter::new("erp").then(Reply::Respond(json!({"docNo": "4711"}))).shared();
    let executor = FlowExecutor::new(adapters(&[("orders-in", &source), ("erp", &erp)]));

    let mut definition = flow("order-sync");
    definition.inbound_adapter_id = Some("orders-in".to_string());
    definition = definition.with_target(target("erp", "erp", 1));
    executor.register_flow(definition).unwrap();

    let result = executor
        .trigger("order-sync", json!({}), HashMap::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.outcome, FlowOutcome::Success);
    assert_eq!(erp.calls()[0].input, json!({"id": 42, "total": 99.5}));
    assert_eq!(result.processed_data, json!({"erp": {"docNo": "4711"}}));

    let steps: Vec<_> = result.steps.iter().map(|s| (s.step_id.as_str(), s.status)).collect();
    assert_eq!(
        steps,
        vec![
            ("source", StepStatus::Completed),
            ("transformation", StepStatus::Skipped),
            ("routing", StepStatus::Completed),
            ("target:erp", StepStatus::Completed),
        ]
    );
    assert_eq!(result.steps[0].next_step_id.as_deref(), Some("transformation"));
}

#[tokio::test]
async fn test_target_step_spans_the_adapter_call() {
    let slow = ScriptedAdapter::new("slow")
        .with_delay(std::time::Duration::from_millis(60))
        .shared();
    let executor = FlowExecutor::new(adapters(&[("slow", &slow)]));
    executor
        .register_flow(flow("timed").with_target(target("slow", "slow", 1)))
        .unwrap();

    let result = executor.trigger("timed", json!({"id": 1}), HashMap::new()).await.unwrap();
    assert!(result.success);

    let routing = result.steps.iter().find(|s| s.step_id == "routing").unwrap();
    let step = result.steps.iter().find(|s| s.step_id == "target:slow").unwrap();
    let started = step.started_at.unwrap();
    let ended = step.ended_at.unwrap();

    assert_eq!(step.status, StepStatus::Completed);
    assert!(started >= routing.started_at.unwrap());
    assert!(ended <= routing.ended_at.unwrap());
    assert!((ended - started).num_milliseconds() >= 50);
    assert!(step.elapsed_ms >= 50);
    assert_eq!(result.target_results[0].started_at, Some(started));
}

#[tokio::test]
async fn test_mapping_template_reshapes_payload() {
    let sink = ScriptedAdapter::new("sink").shared();
    let executor = FlowExecutor::new(adapters(&[("sink", &sink)]));

    let mut definition = flow("mapped");
    definition.mapping_mode = MappingMode::WithMapping;
    definition.transformation =
        Some(r#"{"orderId": {{payload.id}}, "region": "{{headers.region}}", "flow": "{{flow.id}}" }"#.to_string());
    definition = definition.with_target(target("sink", "sink", 1));
    executor.register_flow(definition).unwrap();

    let headers = HashMap::from([("region".to_string(), "EU".to_string())]);
    let result = executor.trigger("mapped", json!({"id": 5}), headers).await.unwrap();

    assert_eq!(result.outcome, FlowOutcome::Success);
    assert_eq!(
        sink.calls()[0].input,
        json!({"orderId": 5, "region": "EU", "flow": "mapped"})
    );
    let transformation = result.steps.iter().find(|s| s.step_id == "transformation").unwrap();
    assert_eq!(transformation.status, StepStatus::Completed);
}

#[tokio::test]
async fn test_broken_template_fails_flow_before_routing() {
    let sink = ScriptedAdapter::new("sink").shared();
    let executor = FlowExecutor::new(adapters(&[("sink", &sink)]));

    let mut definition = flow("broken");
    definition.mapping_mode = MappingMode::WithMapping;
    definition.transformation = Some(r#"{"orderId": {{payload.id}"#.to_string());
    definition = definition.with_target(target("sink", "sink", 1));

    let ctx = FlowExecutionContext::for_flow(&definition, json!({"id": 5}));
    let result = executor.execute(&definition, ctx).await;

    assert_eq!(result.outcome, FlowOutcome::Failed);
    assert!(!result.success);
    assert!(result.error_code.is_some());
    assert!(result.target_results.is_empty());
    assert_eq!(sink.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_the_flow() {
    let primary = ScriptedAdapter::new("primary").always_fail(3, "connection reset").shared();
    let audit = ScriptedAdapter::new("audit").shared();
    let executor = FlowExecutor::new(adapters(&[("primary", &primary), ("audit", &audit)]));

    let mut first = target("primary", "primary", 1);
    first.retry_policy.max_attempts = 3;
    let definition = flow("scenario")
        .with_target(first)
        .with_target(parallel_target("audit", "audit", 2));
    executor.register_flow(definition).unwrap();

    let result = executor.trigger("scenario", json!({"id": 1}), HashMap::new()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.outcome, FlowOutcome::Failed);
    assert_eq!(result.error_code.as_deref(), Some("CONNECTION_FAILED"));
    assert_eq!(audit.call_count(), 0);
    assert_eq!(result.target("audit").unwrap().outcome, TargetOutcome::NotDispatched);

    let primary_step = result.steps.iter().find(|s| s.step_id == "target:primary").unwrap();
    assert_eq!(primary_step.status, StepStatus::Failed);
    assert_eq!(primary_step.retry_count, 2);

    let audit_step = result.steps.iter().find(|s| s.step_id == "target:audit").unwrap();
    assert_eq!(audit_step.status, StepStatus::Pending);
}

#[tokio::test]
async fn test_source_failure_stops_flow() {
    let source = ScriptedAdapter::new("in")
        .with_mode(AdapterMode::Inbound)
        .then(Reply::Fail("broker down".to_string()))
        .shared();
    let sink = ScriptedAdapter::new("sink").shared();
    let executor = FlowExecutor::new(adapters(&[("in", &source), ("sink", &sink)]));

    let mut definition = flow("pull");
    definition.inbound_adapter_id = Some("in".to_string());
    definition = definition.with_target(target("sink", "sink", 1));

    let ctx = FlowExecutionContext::for_flow(&definition, json!(null));
    let result = executor.execute(&definition, ctx).await;

    assert_eq!(result.outcome, FlowOutcome::Failed);
    assert_eq!(result.error_code.as_deref(), Some("CONNECTION_FAILED"));
    assert_eq!(sink.call_count(), 0);
    assert_eq!(result.steps[0].status, StepStatus::Failed);
}

#[tokio::test]
async fn test_skipped_target_is_not_a_failure() {
    let sink = ScriptedAdapter::new("sink").shared();
    let executor = FlowExecutor::new(adapters(&[("sink", &sink)]));

    let mut gated = target("sink", "sink", 1);
    gated.condition_type = integration_flows::workflow::ConditionType::ContentContains;
    gated.routing_condition = Some("URGENT".to_string());
    executor.register_flow(flow("gated").with_target(gated)).unwrap();

    let result = executor
        .trigger("gated", json!({"priority": "low"}), HashMap::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.outcome, FlowOutcome::Success);
    assert_eq!(result.target("sink").unwrap().outcome, TargetOutcome::Skipped);
    assert!(result.error_code.is_none());
    assert_eq!(result.processed_data, json!({"priority": "low"}));
}

#[tokio::test]
async fn test_cancelled_flow() {
    let sink = ScriptedAdapter::new("sink").shared();
    let executor = FlowExecutor::new(adapters(&[("sink", &sink)]));
    let definition = flow("cancel-me").with_target(target("sink", "sink", 1));

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let ctx = FlowExecutionContext::for_flow(&definition, json!({}));
    let result = executor.execute_with_cancel(&definition, ctx, &cancel).await;

    assert_eq!(result.outcome, FlowOutcome::Cancelled);
    assert_eq!(result.error_code.as_deref(), Some("CANCELLED"));
    assert_eq!(sink.call_count(), 0);
}

#[tokio::test]
async fn test_trigger_unknown_and_inactive_flows() {
    let executor = FlowExecutor::new(adapters(&[]));
    assert!(matches!(
        executor.trigger("missing", json!({}), HashMap::new()).await,
        Err(EngineError::FlowNotFound(_))
    ));

    let mut dormant = flow("dormant").with_target(target("t", "a", 1));
    dormant.active = false;
    executor.register_flow(dormant).unwrap();
    assert!(matches!(
        executor.trigger("dormant", json!({}), HashMap::new()).await,
        Err(EngineError::FlowInactive(_))
    ));
}

#[tokio::test]
async fn test_flow_event_published() {
    let sink = ScriptedAdapter::new("sink").shared();
    let (publisher, events) = ChannelEventPublisher::new(16);
    let executor = FlowExecutor::new(adapters(&[("sink", &sink)])).with_events(Arc::new(publisher));
    executor
        .register_flow(flow("observed").with_target(target("sink", "sink", 1)))
        .unwrap();

    let result = executor.trigger("observed", json!({}), HashMap::new()).await.unwrap();

    let mut flow_events = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::FlowExecution { execution_id, outcome, .. } = event {
            flow_events.push((execution_id, outcome));
        }
    }
    assert_eq!(flow_events, vec![(result.execution_id.clone(), FlowOutcome::Success)]);
}

#[tokio::test]
async fn test_file_to_file_flow_through_registry() {
    let inbox = create_test_dir();
    let outbox = create_test_dir();
    write_file(inbox.path(), "order-1.csv", "id,total\n1,10");
    write_file(inbox.path(), "notes.txt", "ignored");

    let registry = Arc::new(AdapterRegistry::builtin());
    let manager = AdapterManager::new(registry.clone(), Arc::new(InMemoryConfigurationRepository::new()));

    manager
        .create_adapter(
            AdapterConfiguration::new("inbox", AdapterType::File, AdapterMode::Inbound)
                .with_id("inbox")
                .with_property("directory", inbox.path().display().to_string())
                .with_property("filePattern", "*.csv"),
        )
        .await
        .unwrap();
    manager
        .create_adapter(
            AdapterConfiguration::new("outbox", AdapterType::File, AdapterMode::Outbound)
                .with_id("outbox")
                .with_property("directory", outbox.path().display().to_string())
                .with_property("fileName", "orders.json"),
        )
        .await
        .unwrap();

    let definition: FlowDefinition = serde_yaml::from_str(
        r#"
id: csv-drop
inbound_adapter_id: inbox
outbound_adapter_id: outbox
"#,
    )
    .unwrap();

    let executor = FlowExecutor::new(registry);
    executor.register_flow(definition).unwrap();
    let result = executor.trigger("csv-drop", json!(null), HashMap::new()).await.unwrap();

    assert_eq!(result.outcome, FlowOutcome::Success, "{:?}", result.error_message);
    assert_eq!(result.records_processed, 1);

    let written = std::fs::read_to_string(outbox.path().join("orders.json")).unwrap();
    let files: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(files[0]["name"], "order-1.csv");
    assert_eq!(files[0]["content"], "id,total\n1,10");
}
