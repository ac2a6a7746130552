use chrono::{DateTime, Utc};
use flate2::{write::GzEncoder, Compression};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use uuid::Uuid;

use crate::errors::MessageError;

pub const GELF_VERSION: &str = "1.0";

/// Additional field key GELF reserves for the server.
const RESERVED_ID_FIELD: &str = "id";

/// A GELF log event. Built once by the caller and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct GelfMessage {
    version: String,
    host: String,
    facility: String,
    short_message: String,
    full_message: Option<String>,
    timestamp: DateTime<Utc>,
    level: Option<u8>,
    file: Option<String>,
    line: Option<u32>,
    additional_fields: BTreeMap<String, Value>,
}

impl GelfMessage {
    /// Creates a message stamped with the current time.
    pub fn new(host: &str, facility: &str, short_message: &str) -> Self {
        GelfMessage {
            version: GELF_VERSION.to_string(),
            host: host.to_string(),
            facility: facility.to_string(),
            short_message: short_message.to_string(),
            full_message: None,
            timestamp: Utc::now(),
            level: None,
            file: None,
            line: None,
            additional_fields: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_full_message(mut self, full_message: &str) -> Self {
        self.full_message = Some(full_message.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Syslog severity, 0 (emergency) to 7 (debug).
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_source(mut self, file: &str, line: u32) -> Self {
        self.file = Some(file.to_string());
        self.line = Some(line);
        self
    }

    /// Adds a custom field. A leading `_` is optional; `id` is reserved and ignored.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        let key = key.strip_prefix('_').unwrap_or(key);
        if !key.is_empty() && key != RESERVED_ID_FIELD {
            self.additional_fields.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn facility(&self) -> &str {
        &self.facility
    }

    pub fn short_message(&self) -> &str {
        &self.short_message
    }

    pub fn full_message(&self) -> Option<&str> {
        self.full_message.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Option<u8> {
        self.level
    }

    pub fn additional_fields(&self) -> &BTreeMap<String, Value> {
        &self.additional_fields
    }

    /// Milliseconds since the Unix epoch.
    pub fn java_timestamp(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Whole seconds since the Unix epoch, as carried in the AMQP timestamp property.
    ///
    /// The property is unsigned, so times before the epoch are sent as `0`.
    pub fn amqp_timestamp(&self) -> u64 {
        u64::try_from(self.timestamp.timestamp()).unwrap_or(0)
    }

    /// Seconds with millisecond precision, e.g. `1700000000.250`.
    pub fn timestamp_string(&self) -> String {
        format!(
            "{}.{:03}",
            self.timestamp.timestamp(),
            self.timestamp.timestamp_subsec_millis()
        )
    }

    pub fn is_valid(&self) -> bool {
        let has_text = !self.short_message.is_empty()
            || self.full_message.as_deref().is_some_and(|m| !m.is_empty());

        has_text && !self.version.is_empty() && !self.host.is_empty() && !self.facility.is_empty()
    }

    /// The GELF JSON document for this message.
    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("version".into(), Value::from(self.version.as_str()));
        doc.insert("host".into(), Value::from(self.host.as_str()));

        let short_message = if self.short_message.is_empty() {
            self.full_message.as_deref().unwrap_or_default()
        } else {
            self.short_message.as_str()
        };
        doc.insert("short_message".into(), Value::from(short_message));
        if let Some(full_message) = &self.full_message {
            doc.insert("full_message".into(), Value::from(full_message.as_str()));
        }

        doc.insert(
            "timestamp".into(),
            Value::from(self.java_timestamp() as f64 / 1000.0),
        );
        doc.insert("facility".into(), Value::from(self.facility.as_str()));
        if let Some(level) = self.level {
            doc.insert("level".into(), Value::from(level));
        }
        if let Some(file) = &self.file {
            doc.insert("file".into(), Value::from(file.as_str()));
        }
        if let Some(line) = self.line {
            doc.insert("line".into(), Value::from(line));
        }

        for (key, value) in &self.additional_fields {
            doc.insert(format!("_{key}"), value.clone());
        }

        Value::Object(doc)
    }

    /// Gzip-compressed GELF JSON, ready to publish.
    pub fn to_amqp_buffer(&self) -> Result<Vec<u8>, MessageError> {
        let json = serde_json::to_vec(&self.to_json())?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }
}

/// Broker message id shared by every retry of one send, so consumers can
/// drop duplicates published around a reconnect.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeliveryId(String);

impl DeliveryId {
    pub fn for_message(message: &GelfMessage) -> Self {
        DeliveryId(format!(
            "gelf{}{}{}{}",
            message.host(),
            message.facility(),
            message.timestamp_string(),
            Uuid::new_v4()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
