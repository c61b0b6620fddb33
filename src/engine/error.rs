//! Engine error types

use crate::adapter::AdapterError;
use crate::workflow::expressions::ExpressionError;
use crate::workflow::loader::LoadError;

/// Errors that can occur during flow execution
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Expression error: {0}")]
    ExpressionError(#[from] ExpressionError),

    #[error("Adapter error: {0}")]
    AdapterError(#[from] AdapterError),

    #[error("Transformation failed: {0}")]
    TransformError(#[from] TransformError),

    #[error("Invalid flow: {0}")]
    InvalidFlow(#[from] LoadError),

    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    #[error("Flow is inactive: {0}")]
    FlowInactive(String),

    #[error("Invalid transition for {subject}: {from} -> {to}")]
    InvalidTransition {
        subject: String,
        from: String,
        to: String,
    },
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ExpressionError(_) => "CONDITION_ERROR",
            EngineError::AdapterError(e) => e.code(),
            EngineError::TransformError(_) => "TRANSFORMATION_ERROR",
            EngineError::InvalidFlow(_) => "INVALID_FLOW",
            EngineError::FlowNotFound(_) => "FLOW_NOT_FOUND",
            EngineError::FlowInactive(_) => "FLOW_INACTIVE",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
        }
    }
}

/// Errors raised by a transformation collaborator
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Template compile error: {0}")]
    Compile(String),

    #[error("Template render error: {0}")]
    Render(String),

    #[error("Transformation output is not valid JSON: {0}")]
    InvalidOutput(String),

    #[error("No transformation template configured")]
    MissingTemplate,
}
