//! Adapter factory table
//!
//! Maps each supported (type, mode) pair to a closure that builds typed
//! settings from the generic properties and constructs the adapter.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::{
    Adapter, AdapterConfiguration, AdapterError, AdapterMode, AdapterType, ErpAdapter,
    ErpSettings, FileAdapter, FileSettings, FtpAdapter, FtpSettings, HttpAdapter, HttpSettings,
    JdbcAdapter, JdbcSettings, MailAdapter, MailSettings, MessagingAdapter, MessagingSettings,
    SoapAdapter, SoapSettings,
};
use crate::pool::ManagedPool;

/// Shared resources adapters are built with
#[derive(Clone, Default)]
pub struct AdapterEnvironment {
    pub database_pool: Option<Arc<ManagedPool>>,
    pub http_pool: Option<Arc<ManagedPool>>,
}

impl AdapterEnvironment {
    pub fn new(database_pool: Arc<ManagedPool>, http_pool: Arc<ManagedPool>) -> Self {
        Self {
            database_pool: Some(database_pool),
            http_pool: Some(http_pool),
        }
    }
}

pub type AdapterFactory = Arc<
    dyn Fn(&AdapterConfiguration, &AdapterEnvironment) -> Result<Arc<dyn Adapter>, AdapterError>
        + Send
        + Sync,
>;

#[derive(Clone, Default)]
pub struct AdapterFactories {
    factories: HashMap<(AdapterType, AdapterMode), AdapterFactory>,
}

impl AdapterFactories {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in protocol adapter, except SOAP INBOUND
    pub fn builtin() -> Self {
        let mut table = Self::empty();

        for mode in AdapterMode::ALL {
            for adapter_type in [AdapterType::Http, AdapterType::Rest] {
                table.register(adapter_type, mode, move |config, env| {
                    let settings = HttpSettings::from_properties(&config.properties, config.mode)?;
                    let adapter = HttpAdapter::new(adapter_type, config.mode, settings, env.http_pool.clone())?;
                    Ok(Arc::new(adapter) as Arc<dyn Adapter>)
                });
            }

            table.register(AdapterType::Jdbc, mode, |config, env| {
                let settings = JdbcSettings::from_properties(&config.properties, config.mode)?;
                let adapter = JdbcAdapter::new(config.mode, settings, env.database_pool.clone())?;
                Ok(Arc::new(adapter) as Arc<dyn Adapter>)
            });

            for adapter_type in [AdapterType::Ftp, AdapterType::Sftp] {
                table.register(adapter_type, mode, move |config, _env| {
                    let settings = FtpSettings::from_properties(&config.properties, adapter_type)?;
                    Ok(Arc::new(FtpAdapter::new(adapter_type, config.mode, settings)) as Arc<dyn Adapter>)
                });
            }

            table.register(AdapterType::File, mode, |config, _env| {
                let settings = FileSettings::from_properties(&config.properties, config.mode)?;
                Ok(Arc::new(FileAdapter::new(config.mode, settings)) as Arc<dyn Adapter>)
            });

            for adapter_type in [AdapterType::Kafka, AdapterType::Jms, AdapterType::Amqp] {
                table.register(adapter_type, mode, move |config, _env| {
                    let settings = MessagingSettings::from_properties(&config.properties, adapter_type)?;
                    Ok(Arc::new(MessagingAdapter::new(adapter_type, config.mode, settings)) as Arc<dyn Adapter>)
                });
            }

            table.register(AdapterType::Mail, mode, |config, _env| {
                let settings = MailSettings::from_properties(&config.properties, config.mode)?;
                Ok(Arc::new(MailAdapter::new(config.mode, settings)) as Arc<dyn Adapter>)
            });

            for adapter_type in [AdapterType::Rfc, AdapterType::Idoc, AdapterType::Odata] {
                table.register(adapter_type, mode, move |config, _env| {
                    let settings = ErpSettings::from_properties(&config.properties, adapter_type)?;
                    let adapter = ErpAdapter::new(adapter_type, config.mode, settings)?;
                    Ok(Arc::new(adapter) as Arc<dyn Adapter>)
                });
            }
        }

        table.register(AdapterType::Soap, AdapterMode::Outbound, |config, _env| {
            let settings = SoapSettings::from_properties(&config.properties, config.mode)?;
            Ok(Arc::new(SoapAdapter::new(config.mode, settings)?) as Arc<dyn Adapter>)
        });

        table
    }

    /// Add or replace the factory for one (type, mode) pair
    pub fn register<F>(&mut self, adapter_type: AdapterType, mode: AdapterMode, factory: F)
    where
        F: Fn(&AdapterConfiguration, &AdapterEnvironment) -> Result<Arc<dyn Adapter>, AdapterError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert((adapter_type, mode), Arc::new(factory));
    }

    pub fn supports(&self, adapter_type: AdapterType, mode: AdapterMode) -> bool {
        self.factories.contains_key(&(adapter_type, mode))
    }

    pub fn create(
        &self,
        config: &AdapterConfiguration,
        env: &AdapterEnvironment,
    ) -> Result<Arc<dyn Adapter>, AdapterError> {
        let factory = self
            .factories
            .get(&(config.adapter_type, config.mode))
            .ok_or(AdapterError::Unsupported {
                adapter_type: config.adapter_type,
                mode: config.mode,
            })?;
        factory(config, env)
    }
}
