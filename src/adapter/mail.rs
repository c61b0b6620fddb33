//! Mail adapter (SMTP outbound, IMAP / POP3 inbound)

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

use super::config::{AdapterMode, AdapterType, Properties, PropertyReader};
use super::{reach, Adapter, AdapterError, AdapterOperationResult};

/// Ports where the session starts inside TLS, so there is no plaintext banner
const IMPLICIT_TLS_PORTS: [u16; 3] = [465, 993, 995];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailProtocol {
    Smtp,
    Imap,
    Pop3,
}

impl MailProtocol {
    fn parse(value: &str) -> Result<Self, AdapterError> {
        match value.to_lowercase().as_str() {
            "smtp" | "smtps" => Ok(MailProtocol::Smtp),
            "imap" | "imaps" => Ok(MailProtocol::Imap),
            "pop3" | "pop3s" => Ok(MailProtocol::Pop3),
            other => Err(AdapterError::InvalidProperty {
                property: "protocol".to_string(),
                message: format!("unsupported mail protocol '{}'", other),
            }),
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            MailProtocol::Smtp => 587,
            MailProtocol::Imap => 993,
            MailProtocol::Pop3 => 995,
        }
    }

    pub fn greeting(&self) -> &'static str {
        match self {
            MailProtocol::Smtp => "220",
            MailProtocol::Imap => "* OK",
            MailProtocol::Pop3 => "+OK",
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct MailSettings {
    pub host: String,
    pub protocol: MailProtocol,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub folder: String,
    pub use_tls: bool,
    pub connection_timeout_ms: u64,
}

impl fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSettings")
            .field("host", &self.host)
            .field("protocol", &self.protocol)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from", &self.from)
            .field("folder", &self.folder)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

impl MailSettings {
    pub fn from_properties(props: &Properties, mode: AdapterMode) -> Result<Self, AdapterError> {
        let reader = PropertyReader::new(props);
        let default_protocol = match mode {
            AdapterMode::Outbound => "smtp",
            AdapterMode::Inbound => "imap",
        };
        let protocol = MailProtocol::parse(&reader.string_or("protocol", default_protocol)?)?;

        Ok(Self {
            host: reader.require_string("host")?,
            protocol,
            port: reader.u16_or("port", protocol.default_port())?,
            username: reader.string("username")?,
            password: reader.string("password")?,
            from: reader.string("from")?,
            folder: reader.string_or("folder", "INBOX")?,
            use_tls: reader.bool_or("useTls", true)?,
            connection_timeout_ms: reader.u64_or("connectionTimeout", 30000)?,
        })
    }

    fn implicit_tls(&self) -> bool {
        self.use_tls && IMPLICIT_TLS_PORTS.contains(&self.port)
    }
}

pub struct MailAdapter {
    mode: AdapterMode,
    settings: MailSettings,
    initialized: AtomicBool,
}

impl MailAdapter {
    pub fn new(mode: AdapterMode, settings: MailSettings) -> Self {
        Self {
            mode,
            settings,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &MailSettings {
        &self.settings
    }
}

#[async_trait]
impl Adapter for MailAdapter {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Mail
    }

    fn mode(&self) -> AdapterMode {
        self.mode
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "Initialized MAIL adapter ({:?} {}:{})",
            self.settings.protocol, self.settings.host, self.settings.port
        );
        Ok(())
    }

    async fn test_connection(&self) -> AdapterOperationResult {
        let timeout = Duration::from_millis(self.settings.connection_timeout_ms);
        if self.settings.implicit_tls() {
            reach::tcp_reachable(&self.settings.host, self.settings.port, timeout).await
        } else {
            reach::banner_matches(
                &self.settings.host,
                self.settings.port,
                timeout,
                self.settings.protocol.greeting(),
            )
            .await
        }
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}
