//! Retrying adapter invocation
//!
//! Each attempt is bounded by the target timeout. Failures are retried while
//! attempts remain, the error is not a configuration error and the policy's
//! error filter matches. The loop sleeps between attempts holding no lock.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::adapter::{Adapter, AdapterError};
use crate::engine::result::AdapterExecutionResult;
use crate::workflow::context::AdapterExecutionContext;
use crate::workflow::target::RetryPolicy;

/// Terminal failure of an invocation, after retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    pub code: String,
    pub message: String,
}

impl From<&AdapterError> for InvocationFailure {
    fn from(error: &AdapterError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub result: Result<AdapterExecutionResult, InvocationFailure>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run one attempt under `timeout`, folding unsuccessful results into errors
async fn attempt(
    adapter: &Arc<dyn Adapter>,
    ctx: &AdapterExecutionContext,
    timeout: Duration,
) -> Result<AdapterExecutionResult, (InvocationFailure, bool)> {
    match tokio::time::timeout(timeout, adapter.execute(ctx)).await {
        Ok(Ok(result)) if result.success => Ok(result),
        Ok(Ok(result)) => Err((
            InvocationFailure {
                code: result
                    .error_code
                    .unwrap_or_else(|| "EXECUTION_ERROR".to_string()),
                message: result
                    .error_message
                    .unwrap_or_else(|| format!("adapter {} reported failure", ctx.adapter_id)),
            },
            true,
        )),
        Ok(Err(e)) => Err((InvocationFailure::from(&e), !e.is_configuration())),
        Err(_) => {
            let e = AdapterError::Timeout(timeout.as_millis() as u64);
            Err((InvocationFailure::from(&e), true))
        }
    }
}

/// Invoke `adapter` until it succeeds or the policy gives up
pub async fn execute_with_retry(
    adapter: &Arc<dyn Adapter>,
    ctx: &AdapterExecutionContext,
    policy: &RetryPolicy,
    timeout: Duration,
) -> InvocationOutcome {
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match attempt(adapter, ctx, timeout).await {
            Ok(result) => {
                debug!(
                    "Adapter {} succeeded on attempt {}/{}",
                    ctx.adapter_id, attempts, max_attempts
                );
                return InvocationOutcome {
                    result: Ok(result),
                    attempts,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                };
            }
            Err((failure, retryable)) => {
                let retry = retryable
                    && attempts < max_attempts
                    && policy.should_retry(&failure.code, &failure.message);

                if !retry {
                    return InvocationOutcome {
                        result: Err(failure),
                        attempts,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    };
                }

                let delay = policy.delay_for_attempt(attempts);
                warn!(
                    "Adapter {} failed attempt {}/{} ({}), retrying in {:?}",
                    ctx.adapter_id, attempts, max_attempts, failure.code, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
