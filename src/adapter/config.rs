//! Adapter configuration types
//!
//! An `AdapterConfiguration` is the declarative, loosely-typed description of
//! an adapter. Protocol adapters turn its `properties` into strongly-typed
//! settings through a `PropertyReader`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::AdapterError;

/// Free-form connection properties
pub type Properties = HashMap<String, Value>;

// ============================================================================
// Adapter Type / Mode
// ============================================================================

/// Protocol family of an adapter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterType {
    #[serde(alias = "http")]
    Http,
    #[serde(alias = "jdbc")]
    Jdbc,
    #[serde(alias = "ftp")]
    Ftp,
    #[serde(alias = "sftp")]
    Sftp,
    #[serde(alias = "soap")]
    Soap,
    #[serde(alias = "rest")]
    Rest,
    #[serde(alias = "file")]
    File,
    #[serde(alias = "kafka")]
    Kafka,
    #[serde(alias = "jms")]
    Jms,
    #[serde(alias = "amqp")]
    Amqp,
    #[serde(alias = "mail")]
    Mail,
    #[serde(alias = "rfc")]
    Rfc,
    #[serde(alias = "idoc")]
    Idoc,
    #[serde(alias = "odata")]
    Odata,
}

impl AdapterType {
    pub const ALL: [AdapterType; 14] = [
        AdapterType::Http,
        AdapterType::Jdbc,
        AdapterType::Ftp,
        AdapterType::Sftp,
        AdapterType::Soap,
        AdapterType::Rest,
        AdapterType::File,
        AdapterType::Kafka,
        AdapterType::Jms,
        AdapterType::Amqp,
        AdapterType::Mail,
        AdapterType::Rfc,
        AdapterType::Idoc,
        AdapterType::Odata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterType::Http => "HTTP",
            AdapterType::Jdbc => "JDBC",
            AdapterType::Ftp => "FTP",
            AdapterType::Sftp => "SFTP",
            AdapterType::Soap => "SOAP",
            AdapterType::Rest => "REST",
            AdapterType::File => "FILE",
            AdapterType::Kafka => "KAFKA",
            AdapterType::Jms => "JMS",
            AdapterType::Amqp => "AMQP",
            AdapterType::Mail => "MAIL",
            AdapterType::Rfc => "RFC",
            AdapterType::Idoc => "IDOC",
            AdapterType::Odata => "ODATA",
        }
    }

    /// Message-queue variants share one adapter implementation
    pub fn is_message_queue(&self) -> bool {
        matches!(self, AdapterType::Kafka | AdapterType::Jms | AdapterType::Amqp)
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterType {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        AdapterType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| AdapterError::Configuration(format!("Unknown adapter type: {}", s)))
    }
}

/// Direction of data flow relative to the platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterMode {
    /// Receives or polls data into a flow
    #[serde(alias = "inbound")]
    Inbound,
    /// Delivers data out of a flow
    #[serde(alias = "outbound")]
    Outbound,
}

impl AdapterMode {
    pub const ALL: [AdapterMode; 2] = [AdapterMode::Inbound, AdapterMode::Outbound];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterMode::Inbound => "INBOUND",
            AdapterMode::Outbound => "OUTBOUND",
        }
    }
}

impl fmt::Display for AdapterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterMode {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INBOUND" => Ok(AdapterMode::Inbound),
            "OUTBOUND" => Ok(AdapterMode::Outbound),
            _ => Err(AdapterError::Configuration(format!("Unknown adapter mode: {}", s))),
        }
    }
}

// ============================================================================
// Adapter Configuration
// ============================================================================

/// Declarative adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfiguration {
    /// Adapter ID (assigned on create when absent)
    #[serde(default)]
    pub id: Option<String>,

    /// Human-readable name
    pub name: String,

    #[serde(rename = "type")]
    pub adapter_type: AdapterType,

    pub mode: AdapterMode,

    /// Connection properties
    #[serde(default)]
    pub properties: Properties,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

impl AdapterConfiguration {
    pub fn new(name: impl Into<String>, adapter_type: AdapterType, mode: AdapterMode) -> Self {
        Self {
            id: None,
            name: name.into(),
            adapter_type,
            mode,
            properties: HashMap::new(),
            active: true,
            description: None,
        }
    }

    /// Set a property, returning self for chaining
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn reader(&self) -> PropertyReader<'_> {
        PropertyReader::new(&self.properties)
    }
}

// ============================================================================
// Property Reader
// ============================================================================

/// Typed view over loosely-typed connection properties
///
/// Strings, numbers and booleans are accepted interchangeably where the
/// conversion is unambiguous; everything else is an `InvalidProperty` error.
#[derive(Debug, Clone, Copy)]
pub struct PropertyReader<'a> {
    props: &'a Properties,
}

impl<'a> PropertyReader<'a> {
    pub fn new(props: &'a Properties) -> Self {
        Self { props }
    }

    /// Raw value, treating JSON null as absent
    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.props.get(key).filter(|v| !v.is_null())
    }

    /// String form of a scalar property; blank strings count as absent
    pub fn string(&self, key: &str) -> Result<Option<String>, AdapterError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(invalid(key, "expected a string")),
        }
    }

    pub fn require_string(&self, key: &str) -> Result<String, AdapterError> {
        self.string(key)?
            .ok_or_else(|| AdapterError::MissingProperty(key.to_string()))
    }

    pub fn string_or(&self, key: &str, default: &str) -> Result<String, AdapterError> {
        Ok(self.string(key)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64, AdapterError> {
        match self.raw(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| invalid(key, "expected a non-negative integer")),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(default),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid(key, &format!("'{}' is not a non-negative integer", s))),
            Some(_) => Err(invalid(key, "expected a number")),
        }
    }

    pub fn u32_or(&self, key: &str, default: u32) -> Result<u32, AdapterError> {
        let value = self.u64_or(key, default as u64)?;
        u32::try_from(value).map_err(|_| invalid(key, "value out of range"))
    }

    pub fn u16_or(&self, key: &str, default: u16) -> Result<u16, AdapterError> {
        let value = self.u64_or(key, default as u64)?;
        u16::try_from(value).map_err(|_| invalid(key, "value out of range"))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, AdapterError> {
        match self.raw(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "" => Ok(default),
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(invalid(key, &format!("'{}' is not a boolean", s))),
            },
            Some(Value::Number(n)) => Ok(n.as_u64().map(|v| v != 0).unwrap_or(false)),
            Some(_) => Err(invalid(key, "expected a boolean")),
        }
    }

    /// List property given as a JSON array or a comma-separated string
    pub fn string_list(&self, key: &str) -> Result<Vec<String>, AdapterError> {
        match self.raw(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.trim().to_string()),
                    Value::Number(n) => Ok(n.to_string()),
                    _ => Err(invalid(key, "list entries must be strings")),
                })
                .collect(),
            Some(Value::String(s)) => Ok(s
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()),
            Some(_) => Err(invalid(key, "expected a list")),
        }
    }

    /// String map property (e.g. extra headers)
    pub fn string_map(&self, key: &str) -> Result<HashMap<String, String>, AdapterError> {
        match self.raw(key) {
            None => Ok(HashMap::new()),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => Ok((k.clone(), s.clone())),
                    Value::Number(n) => Ok((k.clone(), n.to_string())),
                    Value::Bool(b) => Ok((k.clone(), b.to_string())),
                    _ => Err(invalid(key, "map values must be scalars")),
                })
                .collect(),
            Some(_) => Err(invalid(key, "expected a map")),
        }
    }
}

fn invalid(key: &str, message: &str) -> AdapterError {
    AdapterError::InvalidProperty {
        property: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_adapter_type_parsing() {
        assert_eq!("http".parse::<AdapterType>().unwrap(), AdapterType::Http);
        assert_eq!("ODATA".parse::<AdapterType>().unwrap(), AdapterType::Odata);
        assert!("carrier-pigeon".parse::<AdapterType>().is_err());
        assert!(AdapterType::Kafka.is_message_queue());
        assert!(!AdapterType::Http.is_message_queue());
    }

    #[test]
    fn test_configuration_deserialize() {
        let yaml = r#"
name: orders-api
type: HTTP
mode: outbound
properties:
  url: https://api.example.com/orders
  connectionTimeout: 5000
"#;
        let config: AdapterConfiguration = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.adapter_type, AdapterType::Http);
        assert_eq!(config.mode, AdapterMode::Outbound);
        assert!(config.active);
        assert!(config.id.is_none());
        assert_eq!(config.reader().u64_or("connectionTimeout", 30000).unwrap(), 5000);
    }

    #[test]
    fn test_reader_loose_typing() {
        let p = props(json!({
            "port": "2121",
            "retries": 5,
            "passive": "false",
            "secure": true,
            "blank": "  ",
            "servers": "a:9092, b:9092",
        }));
        let reader = PropertyReader::new(&p);

        assert_eq!(reader.u16_or("port", 21).unwrap(), 2121);
        assert_eq!(reader.u32_or("retries", 3).unwrap(), 5);
        assert!(!reader.bool_or("passive", true).unwrap());
        assert!(reader.bool_or("secure", false).unwrap());
        assert_eq!(reader.string("blank").unwrap(), None);
        assert_eq!(reader.string_or("missing", "dflt").unwrap(), "dflt");
        assert_eq!(reader.string_list("servers").unwrap(), vec!["a:9092", "b:9092"]);
        assert_eq!(reader.string("retries").unwrap(), Some("5".to_string()));
    }

    #[test]
    fn test_reader_type_mismatch() {
        let p = props(json!({ "port": "twenty-one", "headers": [1, 2], "fetch": -5 }));
        let reader = PropertyReader::new(&p);

        assert!(matches!(
            reader.u16_or("port", 21),
            Err(AdapterError::InvalidProperty { .. })
        ));
        assert!(reader.string_map("headers").is_err());
        assert!(reader.u64_or("fetch", 1000).is_err());
        assert!(matches!(
            reader.require_string("missing"),
            Err(AdapterError::MissingProperty(_))
        ));
    }

    #[test]
    fn test_reader_range_check() {
        let p = props(json!({ "port": 70000 }));
        assert!(PropertyReader::new(&p).u16_or("port", 21).is_err());
    }
}
