//! Execution contexts
//!
//! `FlowExecutionContext` carries one flow run's payload and metadata;
//! `AdapterExecutionContext` is the per-invocation view handed to an adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::flow::{FlowDefinition, MappingMode};

/// Runtime context of one flow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowExecutionContext {
    pub execution_id: String,
    pub flow_id: String,
    pub inbound_adapter_id: Option<String>,
    pub outbound_adapter_id: Option<String>,
    pub mapping_mode: MappingMode,
    pub payload: Value,
    pub headers: HashMap<String, String>,
    pub parameters: HashMap<String, Value>,
    pub metadata: HashMap<String, String>,
    pub correlation_id: String,
    pub started_at: DateTime<Utc>,
}

impl FlowExecutionContext {
    /// Create a context with fresh execution and correlation IDs
    pub fn new(flow_id: impl Into<String>, payload: Value) -> Self {
        let execution_id = uuid::Uuid::new_v4().to_string();
        Self {
            correlation_id: execution_id.clone(),
            execution_id,
            flow_id: flow_id.into(),
            inbound_adapter_id: None,
            outbound_adapter_id: None,
            mapping_mode: MappingMode::PassThrough,
            payload,
            headers: HashMap::new(),
            parameters: HashMap::new(),
            metadata: HashMap::new(),
            started_at: Utc::now(),
        }
    }

    /// Create a context pre-filled from a flow definition
    pub fn for_flow(flow: &FlowDefinition, payload: Value) -> Self {
        let mut ctx = Self::new(flow.id.clone(), payload);
        ctx.inbound_adapter_id = flow.inbound_adapter_id.clone();
        ctx.outbound_adapter_id = flow.outbound_adapter_id.clone();
        ctx.mapping_mode = flow.mapping_mode;
        ctx
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_string(), value.into());
        self
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Header lookup, exact name first, then case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// Number of records in the payload: array length, otherwise 1
    pub fn records(&self) -> usize {
        match &self.payload {
            Value::Array(items) => items.len(),
            _ => 1,
        }
    }

    /// Build the context for invoking one adapter within this flow
    pub fn adapter_context(&self, step_id: &str, adapter_id: &str) -> AdapterExecutionContext {
        AdapterExecutionContext {
            execution_id: self.execution_id.clone(),
            flow_id: self.flow_id.clone(),
            step_id: step_id.to_string(),
            adapter_id: adapter_id.to_string(),
            input: self.payload.clone(),
            headers: self.headers.clone(),
            parameters: self.parameters.clone(),
            metadata: self.metadata.clone(),
            is_async: false,
            timeout_ms: 30000,
            correlation_id: self.correlation_id.clone(),
        }
    }
}

/// Per-invocation context handed to an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterExecutionContext {
    pub execution_id: String,
    pub flow_id: String,
    pub step_id: String,
    pub adapter_id: String,
    pub input: Value,
    pub headers: HashMap<String, String>,
    pub parameters: HashMap<String, Value>,
    pub metadata: HashMap<String, String>,
    pub is_async: bool,
    pub timeout_ms: u64,
    pub correlation_id: String,
}

impl AdapterExecutionContext {
    pub fn new(
        execution_id: impl Into<String>,
        flow_id: impl Into<String>,
        adapter_id: impl Into<String>,
    ) -> Self {
        let execution_id = execution_id.into();
        let adapter_id = adapter_id.into();
        Self {
            correlation_id: execution_id.clone(),
            execution_id,
            flow_id: flow_id.into(),
            step_id: adapter_id.clone(),
            adapter_id,
            input: Value::Null,
            headers: HashMap::new(),
            parameters: HashMap::new(),
            metadata: HashMap::new(),
            is_async: false,
            timeout_ms: 30000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_context() {
        let ctx = FlowExecutionContext::new("orders", json!({"id": 1}));
        assert!(!ctx.execution_id.is_empty());
        assert_eq!(ctx.correlation_id, ctx.execution_id);
        assert_eq!(ctx.records(), 1);
    }

    #[test]
    fn test_records_counts_arrays() {
        let ctx = FlowExecutionContext::new("orders", json!([1, 2, 3]));
        assert_eq!(ctx.records(), 3);
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let ctx = FlowExecutionContext::new("orders", Value::Null).with_header("X-Region", "EU");
        assert_eq!(ctx.header("X-Region"), Some("EU"));
        assert_eq!(ctx.header("x-region"), Some("EU"));
        assert_eq!(ctx.header("X-Missing"), None);
    }

    #[test]
    fn test_adapter_context_inherits_flow_data() {
        let ctx = FlowExecutionContext::new("orders", json!({"id": 7}))
            .with_correlation_id("corr-1")
            .with_header("X-Tenant", "acme");
        let adapter_ctx = ctx.adapter_context("target:erp", "erp-soap");

        assert_eq!(adapter_ctx.execution_id, ctx.execution_id);
        assert_eq!(adapter_ctx.correlation_id, "corr-1");
        assert_eq!(adapter_ctx.step_id, "target:erp");
        assert_eq!(adapter_ctx.input["id"], 7);
        assert_eq!(adapter_ctx.headers.get("X-Tenant"), Some(&"acme".to_string()));
    }
}
