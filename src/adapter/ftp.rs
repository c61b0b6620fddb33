//! FTP and SFTP adapter
//!
//! Transfers need a session library, so this adapter validates settings and
//! checks the server greeting: FTP servers answer `220`, SSH servers `SSH-`.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

use super::config::{AdapterMode, AdapterType, Properties, PropertyReader};
use super::{reach, Adapter, AdapterError, AdapterOperationResult};

#[derive(Clone, PartialEq)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub directory: String,
    pub file_pattern: String,
    pub passive_mode: bool,
    pub private_key_path: Option<String>,
    pub connection_timeout_ms: u64,
}

impl fmt::Debug for FtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("directory", &self.directory)
            .field("file_pattern", &self.file_pattern)
            .field("passive_mode", &self.passive_mode)
            .field("private_key_path", &self.private_key_path)
            .finish()
    }
}

impl FtpSettings {
    pub fn from_properties(
        props: &Properties,
        adapter_type: AdapterType,
    ) -> Result<Self, AdapterError> {
        let reader = PropertyReader::new(props);
        let default_port = if adapter_type == AdapterType::Sftp { 22 } else { 21 };

        let port = reader.u16_or("port", default_port)?;
        if port == 0 {
            return Err(AdapterError::InvalidProperty {
                property: "port".to_string(),
                message: "port must be between 1 and 65535".to_string(),
            });
        }

        Ok(Self {
            host: reader.require_string("host")?,
            port,
            username: reader.string("username")?,
            password: reader.string("password")?,
            directory: reader.string_or("directory", "/")?,
            file_pattern: reader.string_or("filePattern", "*")?,
            passive_mode: reader.bool_or("passiveMode", true)?,
            private_key_path: reader.string("privateKeyPath")?,
            connection_timeout_ms: reader.u64_or("connectionTimeout", 30000)?,
        })
    }
}

pub struct FtpAdapter {
    adapter_type: AdapterType,
    mode: AdapterMode,
    settings: FtpSettings,
    initialized: AtomicBool,
}

impl FtpAdapter {
    pub fn new(adapter_type: AdapterType, mode: AdapterMode, settings: FtpSettings) -> Self {
        Self {
            adapter_type,
            mode,
            settings,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &FtpSettings {
        &self.settings
    }

    fn expected_banner(&self) -> &'static str {
        if self.adapter_type == AdapterType::Sftp {
            "SSH-"
        } else {
            "220"
        }
    }
}

#[async_trait]
impl Adapter for FtpAdapter {
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
        info!(
            "Initialized {} adapter ({}:{}{})",
            self.adapter_type, self.settings.host, self.settings.port, self.settings.directory
        );
        Ok(())
    }

    async fn test_connection(&self) -> AdapterOperationResult {
        reach::banner_matches(
            &self.settings.host,
            self.settings.port,
            Duration::from_millis(self.settings.connection_timeout_ms),
            self.expected_banner(),
        )
        .await
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
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_defaults_per_protocol() {
        let p: Properties = serde_json::from_value(json!({ "host": "files.example.com" })).unwrap();

        let ftp = FtpSettings::from_properties(&p, AdapterType::Ftp).unwrap();
        assert_eq!(ftp.port, 21);
        assert_eq!(ftp.directory, "/");
        assert_eq!(ftp.file_pattern, "*");
        assert!(ftp.passive_mode);

        let sftp = FtpSettings::from_properties(&p, AdapterType::Sftp).unwrap();
        assert_eq!(sftp.port, 22);
    }

    #[test]
    fn test_rejects_bad_port() {
        let zero: Properties =
            serde_json::from_value(json!({ "host": "h", "port": 0 })).unwrap();
        assert!(FtpSettings::from_properties(&zero, AdapterType::Ftp).is_err());

        let huge: Properties =
            serde_json::from_value(json!({ "host": "h", "port": "70000" })).unwrap();
        assert!(FtpSettings::from_properties(&huge, AdapterType::Ftp).is_err());
    }

    #[tokio::test]
    async fn test_sftp_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await.unwrap();
        });

        let p: Properties =
            serde_json::from_value(json!({ "host": "127.0.0.1", "port": port })).unwrap();
        let settings = FtpSettings::from_properties(&p, AdapterType::Sftp).unwrap();
        let adapter = FtpAdapter::new(AdapterType::Sftp, AdapterMode::Inbound, settings);

        let result = adapter.test_connection().await;
        assert!(result.success, "{}", result.message);
    }
}
