use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(format!("Invalid log level: {}", other)),
        }
    }
}

/// Source-supplied instant, either text or epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub enum Timestamp {
    Epoch(f64),
    Text(String),
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::Text(String::new())
    }
}

impl From<Value> for Timestamp {
    /// Anything that is neither a number nor a string is kept as its JSON text.
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(millis) => Timestamp::Epoch(millis),
                None => Timestamp::Text(n.to_string()),
            },
            Value::String(text) => Timestamp::Text(text),
            Value::Null => Timestamp::default(),
            other => Timestamp::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Epoch(value) => write!(f, "{}", value),
            Timestamp::Text(value) => f.write_str(value),
        }
    }
}

/// A log record as delivered by the server, before it is given a local identity.
///
/// Fields that are missing, `null` or of the wrong shape take their defaults
/// so a single odd field never costs the whole record.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LogRecord {
    #[serde(default, deserialize_with = "timestamp_or_raw")]
    pub timestamp: Timestamp,
    #[serde(default, deserialize_with = "level_or_default")]
    pub level: LogLevel,
    #[serde(default, deserialize_with = "or_default")]
    pub logger: String,
    #[serde(default, deserialize_with = "or_default")]
    pub function: String,
    #[serde(default, deserialize_with = "or_default")]
    pub line: Option<u64>,
    #[serde(default, deserialize_with = "or_default")]
    pub message: String,
    #[serde(default, deserialize_with = "or_default")]
    pub client_id: Option<String>,
}

fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn level_or_default<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(level) => Ok(level.parse().unwrap_or_default()),
        _ => Ok(LogLevel::default()),
    }
}

fn timestamp_or_raw<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Timestamp::from)
}

/// A record held by the log store. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Local, session-unique identity assigned at ingestion.
    pub id: u64,
    pub client_id: String,
    pub record: LogRecord,
}

impl LogEntry {
    pub fn level(&self) -> LogLevel {
        self.record.level
    }

    pub fn message(&self) -> &str {
        &self.record.message
    }

    /// `logger:function:line`
    pub fn location(&self) -> String {
        let line = self
            .record
            .line
            .map(|line| line.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!("{}:{}:{}", self.record.logger, self.record.function, line)
    }
}

/// Per-level counts for one client, as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ClientStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default, rename = "DEBUG")]
    pub debug: u64,
    #[serde(default, rename = "INFO")]
    pub info: u64,
    #[serde(default, rename = "WARNING")]
    pub warning: u64,
    #[serde(default, rename = "ERROR")]
    pub error: u64,
    #[serde(default, rename = "CRITICAL")]
    pub critical: u64,
}

impl fmt::Display for ClientStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total {} (DEBUG: {}, INFO: {}, WARNING: {}, ERROR: {}, CRITICAL: {})",
            self.total, self.debug, self.info, self.warning, self.error, self.critical
        )
    }
}

/// Outbound requests sent over the stream connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    GetClients,
    GetLogs { client_id: String },
}
