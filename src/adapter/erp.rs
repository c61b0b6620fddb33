//! ERP adapter: SAP RFC, IDoc and OData
//!
//! RFC and IDoc connections go through the SAP gateway (`33<sysnr>`), which
//! is checked with a TCP connect. OData services are plain HTTP and are
//! executed with reqwest.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::config::{AdapterMode, AdapterType, Properties, PropertyReader};
use super::{ensure_initialized, reach, Adapter, AdapterError, AdapterOperationResult};
use crate::engine::result::AdapterExecutionResult;
use crate::workflow::context::AdapterExecutionContext;

const GATEWAY_BASE_PORT: u16 = 3300;

#[derive(Clone, PartialEq)]
pub struct SapConnection {
    pub ashost: String,
    pub sysnr: u16,
    pub client: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub language: String,
}

impl fmt::Debug for SapConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SapConnection")
            .field("ashost", &self.ashost)
            .field("sysnr", &self.sysnr)
            .field("client", &self.client)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("language", &self.language)
            .finish()
    }
}

impl SapConnection {
    fn from_reader(reader: &PropertyReader<'_>) -> Result<Self, AdapterError> {
        let sysnr = reader.u16_or("sysnr", 0)?;
        if sysnr > 99 {
            return Err(AdapterError::InvalidProperty {
                property: "sysnr".to_string(),
                message: "system number must be between 00 and 99".to_string(),
            });
        }
        Ok(Self {
            ashost: reader.require_string("ashost")?,
            sysnr,
            client: reader.require_string("client")?,
            user: reader.string("user")?,
            password: reader.string("password")?,
            language: reader.string_or("language", "EN")?,
        })
    }

    pub fn gateway_port(&self) -> u16 {
        GATEWAY_BASE_PORT + self.sysnr
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErpSettings {
    Rfc {
        connection: SapConnection,
        function_name: String,
    },
    Idoc {
        connection: SapConnection,
        idoc_type: String,
    },
    OData {
        service_url: String,
        entity_set: Option<String>,
        username: Option<String>,
        password: Option<String>,
        timeout_ms: u64,
    },
}

impl ErpSettings {
    pub fn from_properties(
        props: &Properties,
        adapter_type: AdapterType,
    ) -> Result<Self, AdapterError> {
        let reader = PropertyReader::new(props);
        match adapter_type {
            AdapterType::Rfc => Ok(ErpSettings::Rfc {
                connection: SapConnection::from_reader(&reader)?,
                function_name: reader.require_string("functionName")?,
            }),
            AdapterType::Idoc => Ok(ErpSettings::Idoc {
                connection: SapConnection::from_reader(&reader)?,
                idoc_type: reader.require_string("idocType")?,
            }),
            AdapterType::Odata => {
                let service_url = reader.require_string("serviceUrl")?;
                if !service_url.starts_with("http://") && !service_url.starts_with("https://") {
                    return Err(AdapterError::InvalidProperty {
                        property: "serviceUrl".to_string(),
                        message: format!("'{}' is not an http(s) URL", service_url),
                    });
                }
                Ok(ErpSettings::OData {
                    service_url: service_url.trim_end_matches('/').to_string(),
                    entity_set: reader.string("entitySet")?,
                    username: reader.string("username")?,
                    password: reader.string("password")?,
                    timeout_ms: reader.u64_or("timeout", 30000)?,
                })
            }
            other => Err(AdapterError::Configuration(format!(
                "{} is not an ERP adapter type",
                other
            ))),
        }
    }
}

pub struct ErpAdapter {
    adapter_type: AdapterType,
    mode: AdapterMode,
    settings: ErpSettings,
    client: reqwest::Client,
    initialized: AtomicBool,
}

impl ErpAdapter {
    pub fn new(
        adapter_type: AdapterType,
        mode: AdapterMode,
        settings: ErpSettings,
    ) -> Result<Self, AdapterError> {
        let timeout = match &settings {
            ErpSettings::OData { timeout_ms, .. } => *timeout_ms,
            _ => 30000,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout))
            .build()
            .map_err(|e| AdapterError::Configuration(e.to_string()))?;

        Ok(Self {
            adapter_type,
            mode,
            settings,
            client,
            initialized: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &ErpSettings {
        &self.settings
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        username: &Option<String>,
        password: &Option<String>,
    ) -> reqwest::RequestBuilder {
        match username {
            Some(user) => request.basic_auth(user, password.as_ref()),
            None => request,
        }
    }

    async fn execute_odata(
        &self,
        ctx: &AdapterExecutionContext,
    ) -> Result<AdapterExecutionResult, AdapterError> {
        let ErpSettings::OData {
            service_url,
            entity_set,
            username,
            password,
            timeout_ms,
        } = &self.settings
        else {
            return Err(AdapterError::UnsupportedOperation(format!(
                "{} adapter executes through the SAP gateway",
                self.adapter_type
            )));
        };

        let entity_set = ctx
            .parameters
            .get("entitySet")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| entity_set.clone())
            .ok_or_else(|| AdapterError::MissingProperty("entitySet".to_string()))?;
        let url = format!("{}/{}", service_url, entity_set);

        let request = match self.mode {
            AdapterMode::Inbound => self.client.get(&url),
            AdapterMode::Outbound => self.client.post(&url).json(&ctx.input),
        };
        let request = self
            .authorize(request, username, password)
            .header("Accept", "application/json")
            .header("X-Correlation-ID", &ctx.correlation_id);

        debug!("OData {} {}", self.mode, url);
        let start = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout(*timeout_ms)
            } else {
                AdapterError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?;
        if status >= 400 {
            return Err(AdapterError::Http {
                status,
                message: text,
            });
        }

        let output = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(AdapterExecutionResult::success(ctx, output)
            .with_elapsed(start.elapsed().as_millis() as u64)
            .with_metadata("status", status))
    }
}

#[async_trait]
impl Adapter for ErpAdapter {
    fn adapter_type(&self) -> AdapterType {
        self.adapter_type
    }

    fn mode(&self) -> AdapterMode {
        self.mode
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        self.initialized.store(true, Ordering::SeqCst);
        info!("Initialized {} {} adapter", self.adapter_type, self.mode);
        Ok(())
    }

    async fn test_connection(&self) -> AdapterOperationResult {
        match &self.settings {
            ErpSettings::Rfc { connection, .. } | ErpSettings::Idoc { connection, .. } => {
                reach::tcp_reachable(
                    &connection.ashost,
                    connection.gateway_port(),
                    Duration::from_secs(10),
                )
                .await
            }
            ErpSettings::OData {
                service_url,
                username,
                password,
                ..
            } => {
                let url = format!("{}/$metadata", service_url);
                let request = self.authorize(self.client.get(&url), username, password);
                match request.send().await {
                    Ok(r) if r.status().is_success() => {
                        AdapterOperationResult::success(format!("OData service {} is available", service_url))
                    }
                    Ok(r) => AdapterOperationResult::failure(format!(
                        "OData metadata returned HTTP {}",
                        r.status().as_u16()
                    )),
                    Err(e) => AdapterOperationResult::failure(format!(
                        "OData service {} is not reachable: {}",
                        service_url, e
                    )),
                }
            }
        }
    }

    async fn execute(
        &self,
        ctx: &AdapterExecutionContext,
    ) -> Result<AdapterExecutionResult, AdapterError> {
        ensure_initialized(self)?;
        self.execute_odata(ctx).await
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}
