//! SOAP adapter
//!
//! Calls WSDL-described services by POSTing SOAP envelopes. Payloads that are
//! not already an envelope are wrapped in one for the configured SOAP version.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::config::{AdapterMode, AdapterType, Properties, PropertyReader};
use super::{ensure_initialized, truncate_message, Adapter, AdapterError, AdapterOperationResult};
use crate::engine::result::AdapterExecutionResult;
use crate::workflow::context::AdapterExecutionContext;

const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

#[derive(Debug, Clone, PartialEq)]
pub struct SoapSettings {
    pub wsdl_url: String,
    pub endpoint_url: String,
    pub service_name: Option<String>,
    pub port_name: Option<String>,
    pub soap_action: Option<String>,
    pub soap_version: String,
    pub timeout_ms: u64,
}

impl SoapSettings {
    pub fn from_properties(props: &Properties, _mode: AdapterMode) -> Result<Self, AdapterError> {
        let reader = PropertyReader::new(props);
        let wsdl_url = reader.require_string("wsdlUrl")?;
        let endpoint_url = match reader.string("endpointUrl")? {
            Some(url) => url,
            None => strip_wsdl_suffix(&wsdl_url),
        };

        let soap_version = reader.string_or("soapVersion", "1.1")?;
        if soap_version != "1.1" && soap_version != "1.2" {
            return Err(AdapterError::InvalidProperty {
                property: "soapVersion".to_string(),
                message: format!("'{}' is not 1.1 or 1.2", soap_version),
            });
        }

        Ok(Self {
            wsdl_url,
            endpoint_url,
            service_name: reader.string("serviceName")?,
            port_name: reader.string("portName")?,
            soap_action: reader.string("soapAction")?,
            soap_version,
            timeout_ms: reader.u64_or("timeout", 30000)?,
        })
    }

    fn content_type(&self) -> &'static str {
        if self.soap_version == "1.2" {
            "application/soap+xml; charset=utf-8"
        } else {
            "text/xml; charset=utf-8"
        }
    }

    fn namespace(&self) -> &'static str {
        if self.soap_version == "1.2" {
            SOAP_12_NS
        } else {
            SOAP_11_NS
        }
    }
}

fn strip_wsdl_suffix(url: &str) -> String {
    let lower = url.to_lowercase();
    if lower.ends_with("?wsdl") {
        url[..url.len() - 5].to_string()
    } else {
        url.to_string()
    }
}

/// Wrap a body in a SOAP envelope unless it already is one
pub fn wrap_envelope(body: &str, namespace: &str) -> String {
    if body.contains("Envelope") {
        return body.to_string();
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><soap:Envelope xmlns:soap="{}"><soap:Body>{}</soap:Body></soap:Envelope>"#,
        namespace, body
    )
}

pub struct SoapAdapter {
    mode: AdapterMode,
    settings: SoapSettings,
    client: reqwest::Client,
    initialized: AtomicBool,
}

impl SoapAdapter {
    pub fn new(mode: AdapterMode, settings: SoapSettings) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| AdapterError::Configuration(e.to_string()))?;

        Ok(Self {
            mode,
            settings,
            client,
            initialized: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Adapter for SoapAdapter {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Soap
    }

    fn mode(&self) -> AdapterMode {
        self.mode
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        url::Url::parse(&self.settings.endpoint_url).map_err(|e| AdapterError::InvalidProperty {
            property: "endpointUrl".to_string(),
            message: e.to_string(),
        })?;
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "Initialized SOAP adapter (endpoint: {}, service: {:?})",
            self.settings.endpoint_url, self.settings.service_name
        );
        Ok(())
    }

    async fn test_connection(&self) -> AdapterOperationResult {
        let start = Instant::now();
        let response = match self.client.get(&self.settings.wsdl_url).send().await {
            Ok(r) => r,
            Err(e) => {
                return AdapterOperationResult::failure(format!(
                    "WSDL {} is not reachable: {}",
                    self.settings.wsdl_url, e
                ))
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return AdapterOperationResult::failure(format!(
                "WSDL {} returned HTTP {}",
                self.settings.wsdl_url, status
            ));
        }

        match response.text().await {
            Ok(body) if body.contains("definitions") => AdapterOperationResult::success(format!(
                "WSDL {} is available",
                self.settings.wsdl_url
            ))
            .with_detail("latencyMs", start.elapsed().as_millis()),
            Ok(_) => AdapterOperationResult::failure(format!(
                "{} does not look like a WSDL document",
                self.settings.wsdl_url
            )),
            Err(e) => AdapterOperationResult::failure(e.to_string()),
        }
    }

    async fn execute(
        &self,
        ctx: &AdapterExecutionContext,
    ) -> Result<AdapterExecutionResult, AdapterError> {
        ensure_initialized(self)?;

        let body = match &ctx.input {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let envelope = wrap_envelope(&body, self.settings.namespace());

        let mut request = self
            .client
            .post(&self.settings.endpoint_url)
            .header("Content-Type", self.settings.content_type())
            .header("X-Correlation-ID", &ctx.correlation_id);
        if let Some(action) = &self.settings.soap_action {
            request = request.header("SOAPAction", action);
        }
        for (key, value) in &ctx.headers {
            request = request.header(key, value);
        }

        debug!("POST SOAP envelope to {}", self.settings.endpoint_url);
        let start = Instant::now();
        let response = request.body(envelope).send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout(self.settings.timeout_ms)
            } else {
                AdapterError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?;

        if status >= 400 || text.contains(":Fault>") {
            let message = truncate_message(text, 512);
            return Err(AdapterError::Http { status, message });
        }

        Ok(AdapterExecutionResult::success(ctx, Value::String(text))
            .with_elapsed(start.elapsed().as_millis() as u64)
            .with_metadata("status", status))
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_defaults_from_wsdl() {
        let p: Properties = serde_json::from_value(json!({
            "wsdlUrl": "https://erp.example.com/OrderService?wsdl"
        }))
        .unwrap();
        let settings = SoapSettings::from_properties(&p, AdapterMode::Outbound).unwrap();
        assert_eq!(settings.endpoint_url, "https://erp.example.com/OrderService");
        assert_eq!(settings.soap_version, "1.1");
        assert_eq!(settings.timeout_ms, 30000);
        assert_eq!(settings.content_type(), "text/xml; charset=utf-8");
    }

    #[test]
    fn test_rejects_unknown_version() {
        let p: Properties = serde_json::from_value(json!({
            "wsdlUrl": "https://erp.example.com/svc.wsdl",
            "soapVersion": "2.0"
        }))
        .unwrap();
        assert!(SoapSettings::from_properties(&p, AdapterMode::Outbound).is_err());
    }

    #[test]
    fn test_wrap_envelope() {
        let wrapped = wrap_envelope("<getOrder><id>1</id></getOrder>", SOAP_11_NS);
        assert!(wrapped.contains("<soap:Body><getOrder>"));
        assert!(wrapped.contains(SOAP_11_NS));

        let existing = "<soap:Envelope><soap:Body/></soap:Envelope>";
        assert_eq!(wrap_envelope(existing, SOAP_11_NS), existing);
    }
}
