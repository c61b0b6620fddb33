//! Flow definitions
//!
//! A flow reads from an optional inbound adapter, optionally transforms the
//! payload and routes it to one or more orchestration targets:
//!
//! ```yaml
//! id: order-sync
//! name: Order sync
//! inbound_adapter_id: orders-api
//! mapping_mode: WITH_MAPPING
//! transformation: '{"orderId": "{{payload.id}}"}'
//! targets:
//!   - id: erp
//!     adapter_id: erp-soap
//!     execution_order: 1
//!   - id: audit
//!     adapter_id: audit-kafka
//!     execution_order: 2
//!     parallel: true
//!     await_response: false
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::loader::LoadError;
use super::target::OrchestrationTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingMode {
    #[default]
    PassThrough,
    WithMapping,
}

impl fmt::Display for MappingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingMode::PassThrough => write!(f, "PASS_THROUGH"),
            MappingMode::WithMapping => write!(f, "WITH_MAPPING"),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub inbound_adapter_id: Option<String>,

    /// Shorthand for a single target when `targets` is empty
    #[serde(default)]
    pub outbound_adapter_id: Option<String>,

    #[serde(default)]
    pub mapping_mode: MappingMode,

    /// Handlebars template applied in WITH_MAPPING mode
    #[serde(default)]
    pub transformation: Option<String>,

    #[serde(default)]
    pub targets: Vec<OrchestrationTarget>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_true")]
    pub active: bool,
}

impl FlowDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            inbound_adapter_id: None,
            outbound_adapter_id: None,
            mapping_mode: MappingMode::PassThrough,
            transformation: None,
            targets: Vec::new(),
            timeout_ms: default_timeout_ms(),
            active: true,
        }
    }

    pub fn with_target(mut self, target: OrchestrationTarget) -> Self {
        self.targets.push(target);
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Configured targets, or one synthesized from `outbound_adapter_id`
    pub fn effective_targets(&self) -> Vec<OrchestrationTarget> {
        if !self.targets.is_empty() {
            return self.targets.clone();
        }
        match &self.outbound_adapter_id {
            Some(adapter_id) => {
                let mut target = OrchestrationTarget::new("outbound", adapter_id.clone());
                target.timeout_ms = self.timeout_ms;
                vec![target]
            }
            None => Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        let invalid = |message: &str| LoadError::InvalidDefinition(format!("flow '{}': {}", self.id, message));

        if self.id.trim().is_empty() {
            return Err(LoadError::InvalidDefinition(
                "flow id must not be empty".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms must be positive"));
        }
        if self.mapping_mode == MappingMode::WithMapping
            && self
                .transformation
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .is_empty()
        {
            return Err(invalid("WITH_MAPPING requires a transformation"));
        }

        let targets = self.effective_targets();
        if targets.is_empty() {
            return Err(invalid("at least one target or outbound_adapter_id is required"));
        }

        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.id.as_str()) {
                return Err(invalid(&format!("duplicate target id '{}'", target.id)));
            }
            target.validate()?;
        }
        Ok(())
    }
}
