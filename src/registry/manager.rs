//! Adapter lifecycle manager
//!
//! The facade every lifecycle operation goes through. It persists
//! configurations, keeps the registry in step with them and publishes an
//! `AdapterLifecycle` event for every operation. Operations on the same
//! adapter id are serialized; different ids proceed independently.

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

use super::adapter_registry::AdapterRegistry;
use super::error::ManagementError;
use super::repository::ConfigurationRepository;
use crate::adapter::{
    validate_configuration, Adapter, AdapterConfiguration, AdapterMetadata,
    AdapterMode, AdapterOperationResult, AdapterType,
};
use crate::engine::events::{EventPublisher, ExecutionEvent, TracingEventPublisher};

/// A best-effort step that failed without failing its operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryFailure {
    pub adapter_id: String,
    pub operation: &'static str,
    pub message: String,
}

impl AdvisoryFailure {
    fn new(adapter_id: &str, operation: &'static str, message: impl ToString) -> Self {
        Self {
            adapter_id: adapter_id.to_string(),
            operation,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for AdvisoryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} failed: {}", self.operation, self.adapter_id, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub adapter_id: String,
    /// Whether the updated adapter was brought live
    pub running: bool,
    pub stop_advisory: Option<AdvisoryFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    pub health: AdapterOperationResult,
    pub shutdown_advisory: Option<AdvisoryFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub adapter_type: AdapterType,
    pub mode: AdapterMode,
    pub active: bool,
    pub running: bool,
    pub last_status: Option<AdapterOperationResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    pub started: Vec<String>,
    pub failures: Vec<AdvisoryFailure>,
}

pub struct AdapterManager {
    registry: Arc<AdapterRegistry>,
    repository: Arc<dyn ConfigurationRepository>,
    events: Arc<dyn EventPublisher>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AdapterManager {
    pub fn new(registry: Arc<AdapterRegistry>, repository: Arc<dyn ConfigurationRepository>) -> Self {
        Self {
            registry,
            repository,
            events: Arc::new(TracingEventPublisher),
            locks: DashMap::new(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(id.to_string()).or_default().value().clone();
        mutex.lock_owned().await
    }

    /// Release the id's lock and drop its entry unless another caller holds or awaits it
    fn forget_lock(&self, id: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.locks.remove_if(id, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    fn publish(&self, id: &str, operation: &str, success: bool, message: impl Into<String>) {
        self.events
            .publish(ExecutionEvent::lifecycle(id, operation, success, message));
    }

    fn check(&self, config: &AdapterConfiguration) -> Result<(), ManagementError> {
        if !self.registry.supports(config.adapter_type, config.mode) {
            return Err(ManagementError::Unsupported {
                adapter_type: config.adapter_type,
                mode: config.mode,
            });
        }
        let metadata = self.registry.metadata(config.adapter_type, config.mode);
        validate_configuration(config, &metadata).map_err(ManagementError::InvalidConfiguration)
    }

    async fn find(&self, id: &str) -> Result<AdapterConfiguration, ManagementError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ManagementError::NotFound(id.to_string()))
    }

    /// Instantiate, register and initialize; unregisters again on failure
    async fn bring_up(&self, id: &str, config: &AdapterConfiguration) -> Result<Arc<dyn Adapter>, ManagementError> {
        let adapter = self
            .registry
            .instantiate(config)
            .map_err(|e| ManagementError::lifecycle(id, "instantiate", e))?;
        self.registry.register(id, adapter.clone());

        if let Err(e) = adapter.initialize().await {
            self.registry.remove(id);
            return Err(ManagementError::lifecycle(id, "initialize", e));
        }
        Ok(adapter)
    }

    /// Shut down and unregister the live instance, if any
    async fn take_down(&self, id: &str, operation: &'static str) -> Option<AdvisoryFailure> {
        let adapter = self.registry.remove(id)?;
        match adapter.shutdown().await {
            Ok(()) => None,
            Err(e) => {
                let advisory = AdvisoryFailure::new(id, operation, e);
                warn!("{}", advisory);
                Some(advisory)
            }
        }
    }

    /// Validate without persisting; never errors
    pub fn validate_configuration(&self, config: &AdapterConfiguration) -> AdapterOperationResult {
        match self.check(config) {
            Ok(()) => AdapterOperationResult::success("Configuration is valid"),
            Err(e) => AdapterOperationResult::failure(e.to_string()).with_detail("errorCode", e.code()),
        }
    }

    #[instrument(skip(self, config), fields(name = %config.name, adapter_type = %config.adapter_type))]
    pub async fn create_adapter(&self, mut config: AdapterConfiguration) -> Result<String, ManagementError> {
        let id = config
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        config.id = Some(id.clone());

        if let Err(e) = self.check(&config) {
            self.publish(&id, "CREATE", false, e.to_string());
            return Err(e);
        }

        let guard = self.lock(&id).await;
        if self.repository.find_by_id(&id).await?.is_some() || self.registry.contains(&id) {
            return Err(ManagementError::AlreadyExists(id));
        }

        self.repository.save(&config).await?;

        if !config.active {
            info!("Persisted inactive adapter {}", id);
            self.publish(&id, "CREATE", true, "Adapter persisted (inactive)");
            return Ok(id);
        }

        match self.bring_up(&id, &config).await {
            Ok(_) => {
                info!("Created adapter {} ({} {})", id, config.adapter_type, config.mode);
                self.publish(&id, "CREATE", true, "Adapter created");
                Ok(id)
            }
            Err(e) => {
                error!("Creating adapter {} failed, rolling back: {}", id, e);
                self.registry.remove(&id);
                if let Err(rollback) = self.repository.delete(&id).await {
                    error!("Rollback of adapter {} failed: {}", id, rollback);
                }
                self.forget_lock(&id, guard);
                self.publish(&id, "CREATE", false, e.to_string());
                Err(e)
            }
        }
    }

    /// Replace a configuration; type and mode stay as persisted
    #[instrument(skip(self, config), fields(adapter_id = %id))]
    pub async fn update_adapter_configuration(
        &self,
        id: &str,
        mut config: AdapterConfiguration,
    ) -> Result<UpdateOutcome, ManagementError> {
        let _guard = self.lock(id).await;
        let existing = self.find(id).await?;

        config.id = Some(id.to_string());
        config.adapter_type = existing.adapter_type;
        config.mode = existing.mode;
        if let Err(e) = self.check(&config) {
            self.publish(id, "UPDATE", false, e.to_string());
            return Err(e);
        }

        let stop_advisory = self.take_down(id, "stop").await;
        self.repository.save(&config).await?;

        let running = if config.active {
            if let Err(e) = self.bring_up(id, &config).await {
                self.publish(id, "UPDATE", false, e.to_string());
                return Err(e);
            }
            true
        } else {
            false
        };

        self.publish(id, "UPDATE", true, "Adapter configuration updated");
        Ok(UpdateOutcome {
            adapter_id: id.to_string(),
            running,
            stop_advisory,
        })
    }

    #[instrument(skip(self), fields(adapter_id = %id))]
    pub async fn delete_adapter(&self, id: &str) -> Result<Option<AdvisoryFailure>, ManagementError> {
        let guard = self.lock(id).await;
        let persisted = self.repository.find_by_id(id).await?.is_some();
        if !persisted && !self.registry.contains(id) {
            self.forget_lock(id, guard);
            return Err(ManagementError::NotFound(id.to_string()));
        }

        let advisory = self.take_down(id, "shutdown").await;
        self.repository.delete(id).await?;
        self.forget_lock(id, guard);

        info!("Deleted adapter {}", id);
        self.publish(id, "DELETE", true, "Adapter deleted");
        Ok(advisory)
    }

    /// Re-instantiate from the persisted configuration and health-check it
    #[instrument(skip(self), fields(adapter_id = %id))]
    pub async fn start_adapter(&self, id: &str) -> Result<AdapterOperationResult, ManagementError> {
        let _guard = self.lock(id).await;
        self.start_locked(id).await
    }

    async fn start_locked(&self, id: &str) -> Result<AdapterOperationResult, ManagementError> {
        let config = self.find(id).await?;
        self.take_down(id, "shutdown").await;

        let adapter = match self.bring_up(id, &config).await {
            Ok(adapter) => adapter,
            Err(e) => {
                self.publish(id, "START", false, e.to_string());
                return Err(e);
            }
        };

        let health = adapter.health_status().await;
        self.registry.cache_status(id, health.clone());

        if !health.success {
            self.publish(id, "START", false, health.message.clone());
            return Err(ManagementError::Unhealthy {
                adapter_id: id.to_string(),
                message: health.message,
            });
        }

        info!("Started adapter {}", id);
        self.publish(id, "START", true, "Adapter started");
        Ok(health)
    }

    /// Shut down, keeping the instance registered with a "stopped" status
    #[instrument(skip(self), fields(adapter_id = %id))]
    pub async fn stop_adapter(&self, id: &str) -> Result<AdapterOperationResult, ManagementError> {
        let _guard = self.lock(id).await;

        match self.registry.get(id) {
            Some(adapter) => {
                if let Err(e) = adapter.shutdown().await {
                    self.publish(id, "STOP", false, e.to_string());
                    return Err(ManagementError::lifecycle(id, "stop", e));
                }
            }
            None => {
                self.find(id).await?;
            }
        }

        let status = AdapterOperationResult::success("Adapter stopped");
        self.registry.cache_status(id, status.clone());
        info!("Stopped adapter {}", id);
        self.publish(id, "STOP", true, "Adapter stopped");
        Ok(status)
    }

    #[instrument(skip(self), fields(adapter_id = %id))]
    pub async fn reset_adapter(&self, id: &str) -> Result<ResetOutcome, ManagementError> {
        let _guard = self.lock(id).await;
        self.find(id).await?;

        let shutdown_advisory = self.take_down(id, "shutdown").await;
        self.registry.clear_status(id);

        let health = self.start_locked(id).await?;
        self.publish(id, "RESET", true, "Adapter reset");
        Ok(ResetOutcome {
            health,
            shutdown_advisory,
        })
    }

    /// Test connectivity with the live instance, or a transient one
    #[instrument(skip(self), fields(adapter_id = %id))]
    pub async fn test_adapter_connection(&self, id: &str) -> Result<AdapterOperationResult, ManagementError> {
        let result = match self.registry.get(id) {
            Some(adapter) => adapter.test_connection().await,
            None => {
                let config = self.find(id).await?;
                match self.registry.instantiate(&config) {
                    Ok(transient) => transient.test_connection().await,
                    Err(e) => AdapterOperationResult::failure(e.to_string()).with_detail("errorCode", e.code()),
                }
            }
        };

        self.registry.cache_status(id, result.clone());
        self.publish(id, "TEST_CONNECTION", result.success, result.message.clone());
        Ok(result)
    }

    #[instrument(skip(self), fields(adapter_id = %id))]
    pub async fn check_adapter_health(&self, id: &str) -> Result<AdapterOperationResult, ManagementError> {
        let result = match self.registry.get(id) {
            Some(adapter) => adapter.health_status().await,
            None => {
                self.find(id).await?;
                AdapterOperationResult::failure(format!("Adapter {} is not running", id))
            }
        };
        self.registry.cache_status(id, result.clone());
        Ok(result)
    }

    /// Cached status when trusted, otherwise a live health check
    pub async fn get_adapter_status(&self, id: &str) -> Result<AdapterOperationResult, ManagementError> {
        if let Some(status) = self.registry.cached_status(id) {
            return Ok(status);
        }
        self.check_adapter_health(id).await
    }

    pub async fn list_adapters(&self) -> Result<Vec<AdapterSummary>, ManagementError> {
        let configs = self.repository.find_all().await?;
        Ok(configs
            .into_iter()
            .filter_map(|config| {
                let id = config.id?;
                Some(AdapterSummary {
                    running: self
                        .registry
                        .get(&id)
                        .map(|a| a.is_initialized())
                        .unwrap_or(false),
                    last_status: self.registry.last_status(&id),
                    id,
                    name: config.name,
                    adapter_type: config.adapter_type,
                    mode: config.mode,
                    active: config.active,
                })
            })
            .collect())
    }

    pub fn get_adapter_metadata(&self, adapter_type: AdapterType, mode: AdapterMode) -> AdapterMetadata {
        self.registry.metadata(adapter_type, mode)
    }

    /// Bring every active persisted adapter live; failures are reported, not raised
    pub async fn restore_from_repository(&self) -> Result<Vec<AdvisoryFailure>, ManagementError> {
        let mut failures = Vec::new();
        for config in self.repository.find_all().await? {
            let Some(id) = config.id.clone() else {
                continue;
            };
            if !config.active || self.registry.contains(&id) {
                continue;
            }

            let _guard = self.lock(&id).await;
            match self.bring_up(&id, &config).await {
                Ok(_) => {
                    info!("Restored adapter {}", id);
                    self.publish(&id, "RESTORE", true, "Adapter restored");
                }
                Err(e) => {
                    let advisory = AdvisoryFailure::new(&id, "restore", &e);
                    error!("{}", advisory);
                    self.publish(&id, "RESTORE", false, e.to_string());
                    failures.push(advisory);
                }
            }
        }
        Ok(failures)
    }

    /// Create each configured adapter, continuing past failures
    pub async fn bootstrap(&self, configs: Vec<AdapterConfiguration>) -> BootstrapReport {
        let mut report = BootstrapReport::default();
        for config in configs {
            let label = config.id.clone().unwrap_or_else(|| config.name.clone());
            match self.create_adapter(config).await {
                Ok(id) => report.started.push(id),
                Err(e) => {
                    let advisory = AdvisoryFailure::new(&label, "create", &e);
                    error!("{}", advisory);
                    report.failures.push(advisory);
                }
            }
        }
        report
    }

    /// Shut down every live adapter
    pub async fn shutdown_all(&self) -> Vec<AdvisoryFailure> {
        let mut failures = Vec::new();
        for id in self.registry.ids() {
            let _guard = self.lock(&id).await;
            if let Some(advisory) = self.take_down(&id, "shutdown").await {
                failures.push(advisory);
            }
        }
        info!("All adapters shut down");
        failures
    }
}
