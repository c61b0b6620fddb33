//! Configuration validation rules
//!
//! Checks run before an adapter is persisted or started. Every failure is a
//! configuration error and is never retried.

use regex::Regex;
use std::sync::LazyLock;

use super::config::{AdapterConfiguration, AdapterType, PropertyReader};
use super::metadata::AdapterMetadata;
use super::AdapterError;

static HTTP_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://[^\s/]+").unwrap());

static WSDL_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://\S+(\?wsdl|\.wsdl)$").unwrap());

static HOST_PORT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._\-]+:\d{1,5}$").unwrap());

/// Validate a configuration against its metadata and protocol rules
pub fn validate_configuration(
    config: &AdapterConfiguration,
    metadata: &AdapterMetadata,
) -> Result<(), AdapterError> {
    if config.name.trim().is_empty() {
        return Err(AdapterError::Configuration(
            "Adapter name must not be empty".to_string(),
        ));
    }

    let reader = config.reader();
    for property in &metadata.required_properties {
        if reader.string(property)?.is_none() {
            return Err(AdapterError::MissingProperty(property.clone()));
        }
    }

    check_protocol_rules(config.adapter_type, &reader)
}

fn check_protocol_rules(
    adapter_type: AdapterType,
    reader: &PropertyReader<'_>,
) -> Result<(), AdapterError> {
    match adapter_type {
        AdapterType::Http | AdapterType::Rest => {
            if let Some(url) = reader.string("url")? {
                matches_or(&HTTP_URL_REGEX, &url, "url", "must be an http:// or https:// URL")?;
            }
        }
        AdapterType::Jdbc => {
            if let Some(url) = reader.string("jdbcUrl")? {
                if !url.starts_with("jdbc:") {
                    return Err(invalid("jdbcUrl", "must start with jdbc:"));
                }
            }
        }
        AdapterType::Ftp | AdapterType::Sftp => {
            if reader.raw("port").is_some() {
                let port = reader.u64_or("port", 0)?;
                if !(1..=65535).contains(&port) {
                    return Err(invalid("port", "must be between 1 and 65535"));
                }
            }
        }
        AdapterType::Soap => {
            if let Some(url) = reader.string("wsdlUrl")? {
                matches_or(
                    &WSDL_URL_REGEX,
                    &url,
                    "wsdlUrl",
                    "must be an http(s) URL ending in ?wsdl or .wsdl",
                )?;
            }
        }
        AdapterType::Odata => {
            if let Some(url) = reader.string("serviceUrl")? {
                matches_or(&HTTP_URL_REGEX, &url, "serviceUrl", "must be an http(s) URL")?;
            }
        }
        AdapterType::Kafka => {
            for server in reader.string_list("bootstrapServers")? {
                matches_or(
                    &HOST_PORT_REGEX,
                    &server,
                    "bootstrapServers",
                    "entries must be host:port",
                )?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn matches_or(regex: &Regex, value: &str, property: &str, message: &str) -> Result<(), AdapterError> {
    if regex.is_match(value) {
        Ok(())
    } else {
        Err(invalid(property, &format!("'{}' {}", value, message)))
    }
}

fn invalid(property: &str, message: &str) -> AdapterError {
    AdapterError::InvalidProperty {
        property: property.to_string(),
        message: message.to_string(),
    }
}
