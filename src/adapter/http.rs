//! HTTP / REST adapter
//!
//! Executes HTTP requests directly using reqwest. It supports:
//! - Any HTTP method (GET for inbound polling, POST for outbound delivery by default)
//! - Authentication (Basic, Bearer, API Key)
//! - Static and per-invocation headers
//! - JSON or raw-text payloads and responses
//!
//! Connection slots are leased from the shared HTTP pool when one is supplied.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::config::{AdapterMode, AdapterType, Properties, PropertyReader};
use super::{ensure_initialized, truncate_message, Adapter, AdapterError, AdapterOperationResult};
use crate::engine::result::AdapterExecutionResult;
use crate::pool::ManagedPool;
use crate::workflow::context::AdapterExecutionContext;

pub const DEFAULT_TIMEOUT_MS: u64 = 30000;
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Authentication scheme for HTTP endpoints
#[derive(Clone, PartialEq)]
pub enum HttpAuth {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey { header: String, key: String },
}

impl fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpAuth::None => write!(f, "None"),
            HttpAuth::Basic { username, .. } => write!(f, "Basic({}, ***)", username),
            HttpAuth::Bearer { .. } => write!(f, "Bearer(***)"),
            HttpAuth::ApiKey { header, .. } => write!(f, "ApiKey({}: ***)", header),
        }
    }
}

/// Typed HTTP settings built from connection properties
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub url: String,
    pub method: String,
    pub connection_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub content_type: String,
    pub accept: String,
    pub auth: HttpAuth,
    pub headers: HashMap<String, String>,
    pub follow_redirects: bool,
}

impl HttpSettings {
    pub fn from_properties(props: &Properties, mode: AdapterMode) -> Result<Self, AdapterError> {
        let reader = PropertyReader::new(props);
        let default_method = match mode {
            AdapterMode::Inbound => "GET",
            AdapterMode::Outbound => "POST",
        };

        let auth = match reader
            .string_or("authentication", "none")?
            .to_lowercase()
            .as_str()
        {
            "none" => HttpAuth::None,
            "basic" => HttpAuth::Basic {
                username: reader.require_string("username")?,
                password: reader.string_or("password", "")?,
            },
            "bearer" | "token" => HttpAuth::Bearer {
                token: reader.require_string("token")?,
            },
            "apikey" | "api_key" => HttpAuth::ApiKey {
                header: reader.string_or("apiKeyHeader", "X-API-Key")?,
                key: reader.require_string("apiKey")?,
            },
            other => {
                return Err(AdapterError::InvalidProperty {
                    property: "authentication".to_string(),
                    message: format!("unsupported scheme '{}'", other),
                })
            }
        };

        Ok(Self {
            url: reader.require_string("url")?,
            method: reader.string_or("method", default_method)?.to_uppercase(),
            connection_timeout_ms: reader.u64_or("connectionTimeout", DEFAULT_TIMEOUT_MS)?,
            read_timeout_ms: reader.u64_or("readTimeout", DEFAULT_TIMEOUT_MS)?,
            content_type: reader.string_or("contentType", DEFAULT_CONTENT_TYPE)?,
            accept: reader.string_or("accept", DEFAULT_CONTENT_TYPE)?,
            auth,
            headers: reader.string_map("headers")?,
            follow_redirects: reader.bool_or("followRedirects", true)?,
        })
    }
}

/// Adapter for HTTP and REST endpoints
pub struct HttpAdapter {
    adapter_type: AdapterType,
    mode: AdapterMode,
    settings: HttpSettings,
    client: reqwest::Client,
    pool: Option<Arc<ManagedPool>>,
    initialized: AtomicBool,
}

impl HttpAdapter {
    pub fn new(
        adapter_type: AdapterType,
        mode: AdapterMode,
        settings: HttpSettings,
        pool: Option<Arc<ManagedPool>>,
    ) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connection_timeout_ms))
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .redirect(if settings.follow_redirects {
                reqwest::redirect::Policy::default()
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| AdapterError::Configuration(e.to_string()))?;

        Ok(Self {
            adapter_type,
            mode,
            settings,
            client,
            pool,
            initialized: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    fn build_url(&self, path: Option<&str>) -> String {
        match path {
            None | Some("") => self.settings.url.clone(),
            Some(path) => {
                let base = self.settings.url.trim_end_matches('/');
                let path = if path.starts_with('/') {
                    path.to_string()
                } else {
                    format!("/{}", path)
                };
                format!("{}{}", base, path)
            }
        }
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.auth {
            HttpAuth::Bearer { token } => {
                request.header("Authorization", format!("Bearer {}", token))
            }
            HttpAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
            HttpAuth::ApiKey { header, key } => request.header(header, key),
            HttpAuth::None => request,
        }
    }

    fn apply_headers(
        &self,
        mut request: reqwest::RequestBuilder,
        extra_headers: &HashMap<String, String>,
    ) -> reqwest::RequestBuilder {
        request = request
            .header("Content-Type", &self.settings.content_type)
            .header("Accept", &self.settings.accept);

        for (key, value) in &self.settings.headers {
            request = request.header(key, value);
        }
        for (key, value) in extra_headers {
            request = request.header(key, value);
        }

        request
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
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
        let parsed = url::Url::parse(&self.settings.url).map_err(|e| {
            AdapterError::InvalidProperty {
                property: "url".to_string(),
                message: e.to_string(),
            }
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AdapterError::InvalidProperty {
                property: "url".to_string(),
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        reqwest::Method::from_bytes(self.settings.method.as_bytes()).map_err(|_| {
            AdapterError::InvalidProperty {
                property: "method".to_string(),
                message: format!("unknown HTTP method '{}'", self.settings.method),
            }
        })?;

        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "Initialized {} {} adapter ({} {})",
            self.adapter_type, self.mode, self.settings.method, self.settings.url
        );
        Ok(())
    }

    async fn test_connection(&self) -> AdapterOperationResult {
        let start = Instant::now();
        let request = self.apply_auth(self.client.head(&self.settings.url));

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let elapsed = start.elapsed().as_millis();
                if status < 500 {
                    AdapterOperationResult::success(format!(
                        "{} is reachable (HTTP {})",
                        self.settings.url, status
                    ))
                    .with_detail("status", status)
                    .with_detail("latencyMs", elapsed)
                } else {
                    AdapterOperationResult::failure(format!(
                        "{} answered with server error (HTTP {})",
                        self.settings.url, status
                    ))
                    .with_detail("status", status)
                }
            }
            Err(e) => AdapterOperationResult::failure(format!(
                "{} is not reachable: {}",
                self.settings.url, e
            )),
        }
    }

    async fn execute(
        &self,
        ctx: &AdapterExecutionContext,
    ) -> Result<AdapterExecutionResult, AdapterError> {
        ensure_initialized(self)?;

        let _lease = match &self.pool {
            Some(pool) => Some(
                pool.acquire(Duration::from_millis(self.settings.connection_timeout_ms))
                    .await?,
            ),
            None => None,
        };

        let start = Instant::now();
        let path = ctx.parameters.get("path").and_then(|v| v.as_str());
        let url = self.build_url(path);
        let method = reqwest::Method::from_bytes(self.settings.method.as_bytes())
            .map_err(|_| AdapterError::Configuration(self.settings.method.clone()))?;

        let mut request = self.client.request(method.clone(), &url);
        if let Some(Value::Object(query)) = ctx.parameters.get("query") {
            let pairs: Vec<(String, String)> = query
                .iter()
                .map(|(k, v)| {
                    let value = v.as_str().map(String::from).unwrap_or_else(|| v.to_string());
                    (k.clone(), value)
                })
                .collect();
            request = request.query(&pairs);
        }

        request = self.apply_auth(request);
        request = self.apply_headers(request, &ctx.headers);
        request = request.header("X-Correlation-ID", &ctx.correlation_id);

        if method != reqwest::Method::GET && method != reqwest::Method::HEAD {
            request = match &ctx.input {
                Value::Null => request,
                Value::String(raw) => request.body(raw.clone()),
                other => request.body(serde_json::to_vec(other)?),
            };
        }

        debug!("Executing {} {}", method, url);

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout(self.settings.read_timeout_ms)
            } else {
                AdapterError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body_text = response
            .text()
            .await
            .map_err(|e| AdapterError::ConnectionFailed(e.to_string()))?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        info!("{} {} -> {} ({}ms)", method, url, status, elapsed_ms);

        if status >= 400 {
            let message = truncate_message(body_text, 512);
            return Err(AdapterError::Http { status, message });
        }

        let body = if body_text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body_text).unwrap_or(Value::String(body_text))
        };

        Ok(AdapterExecutionResult::success(ctx, body)
            .with_elapsed(elapsed_ms)
            .with_metadata("status", status))
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        self.initialized.store(false, Ordering::SeqCst);
        info!("Shut down {} adapter ({})", self.adapter_type, self.settings.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        serde_json::from_value(value).unwrap()
    }

    fn make_adapter(url: &str) -> HttpAdapter {
        let settings =
            HttpSettings::from_properties(&props(json!({ "url": url })), AdapterMode::Outbound)
                .unwrap();
        HttpAdapter::new(AdapterType::Http, AdapterMode::Outbound, settings, None).unwrap()
    }

    #[test]
    fn test_defaults_by_mode() {
        let p = props(json!({ "url": "https://api.example.com/x" }));

        let inbound = HttpSettings::from_properties(&p, AdapterMode::Inbound).unwrap();
        assert_eq!(inbound.method, "GET");
        assert_eq!(inbound.connection_timeout_ms, 30000);
        assert_eq!(inbound.read_timeout_ms, 30000);
        assert_eq!(inbound.content_type, "application/json");
        assert_eq!(inbound.accept, "application/json");
        assert_eq!(inbound.auth, HttpAuth::None);

        let outbound = HttpSettings::from_properties(&p, AdapterMode::Outbound).unwrap();
        assert_eq!(outbound.method, "POST");
    }

    #[test]
    fn test_auth_settings() {
        let p = props(json!({
            "url": "https://api.example.com",
            "authentication": "bearer",
            "token": "abc"
        }));
        let settings = HttpSettings::from_properties(&p, AdapterMode::Outbound).unwrap();
        assert_eq!(
            settings.auth,
            HttpAuth::Bearer {
                token: "abc".to_string()
            }
        );
        assert!(!format!("{:?}", settings).contains("abc"));

        let missing = props(json!({ "url": "https://x", "authentication": "basic" }));
        assert!(matches!(
            HttpSettings::from_properties(&missing, AdapterMode::Outbound),
            Err(AdapterError::MissingProperty(_))
        ));
    }

    #[test]
    fn test_build_url() {
        let adapter = make_adapter("https://api.example.com/");
        assert_eq!(adapter.build_url(None), "https://api.example.com/");
        assert_eq!(
            adapter.build_url(Some("users")),
            "https://api.example.com/users"
        );
        assert_eq!(
            adapter.build_url(Some("/users")),
            "https://api.example.com/users"
        );
    }

    #[tokio::test]
    async fn test_initialize_rejects_bad_scheme() {
        let adapter = make_adapter("ftp://files.example.com");
        assert!(adapter.initialize().await.is_err());
        assert!(!adapter.is_initialized());

        let adapter = make_adapter("https://api.example.com");
        adapter.initialize().await.unwrap();
        assert!(adapter.is_initialized());
        adapter.shutdown().await.unwrap();
        assert!(!adapter.is_initialized());
    }

    #[tokio::test]
    async fn test_error_body_with_multibyte_text_is_truncated() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = format!("{}é tail", "a".repeat(511));
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_string(body))
            .mount(&server)
            .await;

        let adapter = make_adapter(&format!("{}/orders", server.uri()));
        adapter.initialize().await.unwrap();

        let ctx = AdapterExecutionContext::new("exec-1", "orders", "api");
        match adapter.execute(&ctx).await {
            Err(AdapterError::Http { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message.len(), 511);
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
    }
}
