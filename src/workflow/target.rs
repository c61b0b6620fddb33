//! Orchestration targets
//!
//! A target binds an outbound adapter to a flow together with its ordering,
//! routing condition, retry policy and error strategy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use super::loader::LoadError;

/// How a target's routing condition is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    #[default]
    Always,
    /// `${{ headers.X }} == 'v'` style comparisons joined by `&&` / `||`
    Expression,
    /// `Name=value`, or `Name` for presence
    HeaderMatch,
    ContentContains,
    Regex,
    /// `$.a.b`, optionally followed by `== 'v'` or `!= 'v'`
    JsonPath,
}

/// What a failed target does to the rest of the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorStrategy {
    #[default]
    FailFast,
    Continue,
    /// Fail fast, then run compensation adapters of completed targets
    Compensate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Error codes or message fragments worth retrying; empty retries everything
    #[serde(default)]
    pub retry_on_errors: Vec<String>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_retry_delay_ms() -> u64 {
    30000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            retry_on_errors: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Back-off before attempt `attempt + 1`: min(base × mult^(attempt-1), cap)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.retry_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if raw.is_finite() {
            raw.min(self.max_retry_delay_ms as f64)
        } else {
            self.max_retry_delay_ms as f64
        };
        Duration::from_millis(capped as u64)
    }

    pub fn should_retry(&self, code: &str, message: &str) -> bool {
        if self.retry_on_errors.is_empty() {
            return true;
        }
        let message = message.to_lowercase();
        self.retry_on_errors.iter().any(|pattern| {
            pattern.eq_ignore_ascii_case(code) || message.contains(&pattern.to_lowercase())
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be at least 1.0".to_string());
        }
        if self.retry_delay_ms > self.max_retry_delay_ms {
            return Err("retry_delay_ms exceeds max_retry_delay_ms".to_string());
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationTarget {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub adapter_id: String,

    /// Targets sharing an order form one tier
    #[serde(default)]
    pub execution_order: i32,

    #[serde(default)]
    pub parallel: bool,

    #[serde(default)]
    pub routing_condition: Option<String>,

    #[serde(default)]
    pub condition_type: ConditionType,

    #[serde(default)]
    pub target_structure_id: Option<String>,

    #[serde(default)]
    pub response_structure_id: Option<String>,

    /// When false the target is fire-and-forget
    #[serde(default = "default_true")]
    pub await_response: bool,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub retry_policy: RetryPolicy,

    #[serde(default)]
    pub error_strategy: ErrorStrategy,

    #[serde(default = "default_true")]
    pub required: bool,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub compensation_adapter_id: Option<String>,

    /// Free-form settings; `headers` and `parameters` are handed to the adapter
    #[serde(default)]
    pub configuration: HashMap<String, Value>,
}

impl OrchestrationTarget {
    pub fn new(id: impl Into<String>, adapter_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            adapter_id: adapter_id.into(),
            execution_order: 0,
            parallel: false,
            routing_condition: None,
            condition_type: ConditionType::Always,
            target_structure_id: None,
            response_structure_id: None,
            await_response: true,
            timeout_ms: default_timeout_ms(),
            retry_policy: RetryPolicy::default(),
            error_strategy: ErrorStrategy::FailFast,
            required: true,
            active: true,
            compensation_adapter_id: None,
            configuration: HashMap::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Static headers from `configuration.headers`
    pub fn headers(&self) -> HashMap<String, String> {
        match self.configuration.get("headers") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            _ => HashMap::new(),
        }
    }

    /// Adapter parameters from `configuration.parameters`
    pub fn parameters(&self) -> HashMap<String, Value> {
        match self.configuration.get("parameters") {
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        let invalid = |message: String| LoadError::InvalidDefinition(format!("target '{}': {}", self.id, message));

        if self.id.trim().is_empty() {
            return Err(LoadError::InvalidDefinition(
                "target id must not be empty".to_string(),
            ));
        }
        if self.adapter_id.trim().is_empty() {
            return Err(invalid("adapter_id must not be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms must be positive".to_string()));
        }
        if self.condition_type != ConditionType::Always
            && self
                .routing_condition
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .is_empty()
        {
            return Err(invalid(format!(
                "{:?} condition requires routing_condition",
                self.condition_type
            )));
        }
        self.retry_policy.validate().map_err(invalid)?;
        Ok(())
    }
}

/// Partial update of a target; unset fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetUpdate {
    pub name: Option<String>,
    pub adapter_id: Option<String>,
    pub execution_order: Option<i32>,
    pub parallel: Option<bool>,
    pub routing_condition: Option<String>,
    pub condition_type: Option<ConditionType>,
    pub await_response: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub retry_policy: Option<RetryPolicy>,
    pub error_strategy: Option<ErrorStrategy>,
    pub required: Option<bool>,
    pub active: Option<bool>,
    pub compensation_adapter_id: Option<String>,
    pub configuration: Option<HashMap<String, Value>>,
}

impl TargetUpdate {
    /// Apply to `target`; leaves it untouched if the result is invalid
    pub fn apply(self, target: &mut OrchestrationTarget) -> Result<(), LoadError> {
        let mut updated = target.clone();

        if let Some(name) = self.name {
            updated.name = Some(name);
        }
        if let Some(adapter_id) = self.adapter_id {
            updated.adapter_id = adapter_id;
        }
        if let Some(order) = self.execution_order {
            updated.execution_order = order;
        }
        if let Some(parallel) = self.parallel {
            updated.parallel = parallel;
        }
        if let Some(condition) = self.routing_condition {
            updated.routing_condition = Some(condition);
        }
        if let Some(condition_type) = self.condition_type {
            updated.condition_type = condition_type;
        }
        if let Some(await_response) = self.await_response {
            updated.await_response = await_response;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            updated.timeout_ms = timeout_ms;
        }
        if let Some(policy) = self.retry_policy {
            updated.retry_policy = policy;
        }
        if let Some(strategy) = self.error_strategy {
            updated.error_strategy = strategy;
        }
        if let Some(required) = self.required {
            updated.required = required;
        }
        if let Some(active) = self.active {
            updated.active = active;
        }
        if let Some(compensation) = self.compensation_adapter_id {
            updated.compensation_adapter_id = Some(compensation);
        }
        if let Some(configuration) = self.configuration {
            updated.configuration = configuration;
        }

        updated.validate()?;
        *target = updated;
        Ok(())
    }
}
