//! Live adapter registry
//!
//! Holds the running adapter instances and their last known status. Both
//! maps are concurrent; no operation needs to lock more than one key.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::factory::{AdapterEnvironment, AdapterFactories};
use crate::adapter::{
    Adapter, AdapterConfiguration, AdapterError, AdapterMetadata, AdapterMode,
    AdapterOperationResult, AdapterType, MetadataCatalog,
};
use crate::engine::AdapterLookup;

pub struct AdapterRegistry {
    instances: DashMap<String, Arc<dyn Adapter>>,
    statuses: DashMap<String, AdapterOperationResult>,
    factories: AdapterFactories,
    catalog: MetadataCatalog,
    environment: AdapterEnvironment,
}

impl AdapterRegistry {
    pub fn new(factories: AdapterFactories, environment: AdapterEnvironment) -> Self {
        Self {
            instances: DashMap::new(),
            statuses: DashMap::new(),
            factories,
            catalog: MetadataCatalog::builtin(),
            environment,
        }
    }

    /// Built-in factories, metadata and no shared pools
    pub fn builtin() -> Self {
        Self::new(AdapterFactories::builtin(), AdapterEnvironment::default())
    }

    pub fn with_catalog(mut self, catalog: MetadataCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn supports(&self, adapter_type: AdapterType, mode: AdapterMode) -> bool {
        self.factories.supports(adapter_type, mode)
    }

    /// Build a fresh, uninitialized instance without registering it
    pub fn instantiate(&self, config: &AdapterConfiguration) -> Result<Arc<dyn Adapter>, AdapterError> {
        self.factories.create(config, &self.environment)
    }

    /// Register an instance, returning the one it replaced
    pub fn register(&self, id: &str, adapter: Arc<dyn Adapter>) -> Option<Arc<dyn Adapter>> {
        debug!("Registering adapter {}", id);
        self.instances.insert(id.to_string(), adapter)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Adapter>> {
        self.instances.get(id).map(|entry| entry.value().clone())
    }

    /// Unregister an instance and drop its cached status
    pub fn remove(&self, id: &str) -> Option<Arc<dyn Adapter>> {
        self.statuses.remove(id);
        self.instances.remove(id).map(|(_, adapter)| adapter)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn cache_status(&self, id: &str, status: AdapterOperationResult) {
        self.statuses.insert(id.to_string(), status);
    }

    /// Cached status, trusted only while the adapter is live
    pub fn cached_status(&self, id: &str) -> Option<AdapterOperationResult> {
        if !self.contains(id) {
            self.statuses.remove(id);
            return None;
        }
        self.statuses.get(id).map(|entry| entry.value().clone())
    }

    /// Last recorded status, whether or not the adapter is live
    pub fn last_status(&self, id: &str) -> Option<AdapterOperationResult> {
        self.statuses.get(id).map(|entry| entry.value().clone())
    }

    pub fn clear_status(&self, id: &str) {
        self.statuses.remove(id);
    }

    pub fn metadata(&self, adapter_type: AdapterType, mode: AdapterMode) -> AdapterMetadata {
        self.catalog.get(adapter_type, mode)
    }

    pub fn catalog(&self) -> &MetadataCatalog {
        &self.catalog
    }
}

impl AdapterLookup for AdapterRegistry {
    fn lookup(&self, adapter_id: &str) -> Option<Arc<dyn Adapter>> {
        self.get(adapter_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_config(dir: &std::path::Path) -> AdapterConfiguration {
        AdapterConfiguration::new("drop", AdapterType::File, AdapterMode::Outbound)
            .with_property("directory", dir.display().to_string())
    }

    #[test]
    fn test_register_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AdapterRegistry::builtin();
        let adapter = registry.instantiate(&file_config(dir.path())).unwrap();

        assert!(registry.register("drop", adapter.clone()).is_none());
        assert!(registry.register("drop", adapter).is_some());
        assert_eq!(registry.ids(), vec!["drop".to_string()]);

        registry.cache_status("drop", AdapterOperationResult::success("ok"));
        assert!(registry.remove("drop").is_some());
        assert!(registry.last_status("drop").is_none());
        assert!(registry.lookup("drop").is_none());
    }

    #[test]
    fn test_cached_status_requires_live_instance() {
        let registry = AdapterRegistry::builtin();
        registry.cache_status("ghost", AdapterOperationResult::success("ok"));

        assert!(registry.cached_status("ghost").is_none());
        assert!(registry.last_status("ghost").is_none());
    }

    #[test]
    fn test_metadata_never_fails() {
        let registry = AdapterRegistry::builtin();
        let metadata = registry.metadata(AdapterType::Soap, AdapterMode::Inbound);
        assert!(metadata.required_properties.is_empty());
        assert!(!registry.supports(AdapterType::Soap, AdapterMode::Inbound));
    }
}
