//! Payload transformation
//!
//! WITH_MAPPING flows render their `transformation` template against the
//! execution context. Templates are Handlebars, compiled once and cached by
//! the SHA-256 of their source:
//!
//! ```text
//! {"orderId": "{{payload.id}}", "region": "{{headers.region}}"}
//! ```

use async_trait::async_trait;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use super::error::TransformError;
use crate::workflow::context::FlowExecutionContext;
use crate::workflow::flow::FlowDefinition;

/// Collaborator that turns the inbound payload into the routed payload
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        flow: &FlowDefinition,
        ctx: &FlowExecutionContext,
    ) -> Result<Value, TransformError>;
}

/// Returns the payload unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTransformer;

#[async_trait]
impl Transformer for PassthroughTransformer {
    async fn transform(
        &self,
        _flow: &FlowDefinition,
        ctx: &FlowExecutionContext,
    ) -> Result<Value, TransformError> {
        Ok(ctx.payload.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemplateCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct TemplateTransformer {
    registry: RwLock<Handlebars<'static>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for TemplateTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateTransformer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Self {
            registry: RwLock::new(registry),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn cache_stats(&self) -> TemplateCacheStats {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        TemplateCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: registry.get_templates().len(),
        }
    }

    fn template_key(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Compile `source` unless an identical template is already cached
    fn compiled(&self, source: &str) -> Result<String, TransformError> {
        let key = Self::template_key(source);

        {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            if registry.has_template(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(key);
            }
        }

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.has_template(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            registry
                .register_template_string(&key, source)
                .map_err(|e| TransformError::Compile(e.to_string()))?;
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Compiled transformation template {}", &key[..12]);
        }
        Ok(key)
    }

    pub fn render(&self, source: &str, ctx: &FlowExecutionContext) -> Result<Value, TransformError> {
        let key = self.compiled(source)?;
        let data = json!({
            "payload": ctx.payload,
            "headers": ctx.headers,
            "parameters": ctx.parameters,
            "metadata": ctx.metadata,
            "flow": {
                "id": ctx.flow_id,
                "execution_id": ctx.execution_id,
                "correlation_id": ctx.correlation_id,
            },
        });

        let rendered = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .render(&key, &data)
            .map_err(|e| TransformError::Render(e.to_string()))?;

        let trimmed = rendered.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            serde_json::from_str(trimmed).map_err(|e| TransformError::InvalidOutput(e.to_string()))
        } else {
            Ok(serde_json::from_str(trimmed).unwrap_or(Value::String(rendered)))
        }
    }
}

#[async_trait]
impl Transformer for TemplateTransformer {
    async fn transform(
        &self,
        flow: &FlowDefinition,
        ctx: &FlowExecutionContext,
    ) -> Result<Value, TransformError> {
        let source = flow
            .transformation
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(TransformError::MissingTemplate)?;
        self.render(source, ctx)
    }
}
