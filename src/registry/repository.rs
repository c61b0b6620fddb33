//! Adapter configuration persistence

use async_trait::async_trait;
use dashmap::DashMap;

use super::error::ManagementError;
use crate::adapter::AdapterConfiguration;

/// Durable store of adapter configurations, keyed by adapter id
#[async_trait]
pub trait ConfigurationRepository: Send + Sync {
    /// Insert or replace; the configuration must carry an id
    async fn save(&self, config: &AdapterConfiguration) -> Result<(), ManagementError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<AdapterConfiguration>, ManagementError>;

    async fn find_all(&self) -> Result<Vec<AdapterConfiguration>, ManagementError>;

    /// Returns whether a row was deleted
    async fn delete(&self, id: &str) -> Result<bool, ManagementError>;
}

#[derive(Debug, Default)]
pub struct InMemoryConfigurationRepository {
    rows: DashMap<String, AdapterConfiguration>,
}

impl InMemoryConfigurationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigurationRepository for InMemoryConfigurationRepository {
    async fn save(&self, config: &AdapterConfiguration) -> Result<(), ManagementError> {
        let id = config
            .id
            .clone()
            .ok_or_else(|| ManagementError::Persistence("cannot save a configuration without an id".to_string()))?;
        self.rows.insert(id, config.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AdapterConfiguration>, ManagementError> {
        Ok(self.rows.get(id).map(|row| row.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<AdapterConfiguration>, ManagementError> {
        let mut rows: Vec<_> = self.rows.iter().map(|row| row.value().clone()).collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn delete(&self, id: &str) -> Result<bool, ManagementError> {
        Ok(self.rows.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterMode, AdapterType};

    #[tokio::test]
    async fn test_crud() {
        let repo = InMemoryConfigurationRepository::new();
        let config = AdapterConfiguration::new("api", AdapterType::Http, AdapterMode::Outbound).with_id("a1");

        repo.save(&config).await.unwrap();
        assert_eq!(repo.find_by_id("a1").await.unwrap(), Some(config.clone()));
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
        assert!(repo.delete("a1").await.unwrap());
        assert!(!repo.delete("a1").await.unwrap());
        assert!(repo.find_by_id("a1").await.unwrap().is_none());
    }

    #[test]
    fn test_save_requires_id() {
        let repo = InMemoryConfigurationRepository::new();
        let config = AdapterConfiguration::new("api", AdapterType::Http, AdapterMode::Outbound);
        let saved = tokio_test::block_on(repo.save(&config));
        assert!(matches!(saved, Err(ManagementError::Persistence(_))));
    }
}
