//! Per-alias database settings.
//!
//! Mirrors one entry of a web framework's `DATABASES` mapping:
//!
//! ```json
//! {
//!     "NAME": "app",
//!     "USER": "web",
//!     "PASSWORD": "secret",
//!     "HOST": "db.internal",
//!     "PORT": 5432,
//!     "TIME_ZONE": "Europe/Berlin",
//!     "OPTIONS": { "MAX_CONNS": 8, "TEST_ON_BORROW": true, "sslmode": "require" }
//! }
//! ```
//!
//! Pool keys are consumed from `OPTIONS`; everything else is forwarded to the
//! driver as a connection parameter.

use std::collections::BTreeMap;
use std::fmt;

use dbpool_driver::ConnectionParams;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::lifecycle::{DEFAULT_PROBE_QUERY, ValidationPolicy};

/// `OPTIONS` key: upper bound on physical connections.
pub const MAX_CONNS: &str = "MAX_CONNS";
/// `OPTIONS` key: connections retained when idle.
pub const MIN_CONNS: &str = "MIN_CONNS";
/// `OPTIONS` key: enable the validation probe.
pub const TEST_ON_BORROW: &str = "TEST_ON_BORROW";
/// `OPTIONS` key: validation probe statement.
pub const TEST_ON_BORROW_QUERY: &str = "TEST_ON_BORROW_QUERY";
/// `OPTIONS` key consumed by the backend, never forwarded to the driver.
pub const AUTOCOMMIT: &str = "autocommit";

/// Settings for one database alias.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", default)]
pub struct DatabaseSettings {
    /// Database name. Required.
    pub name: String,
    /// User name; omitted from the connection when empty.
    pub user: String,
    /// Password; omitted from the connection when empty.
    pub password: String,
    /// Host; the driver default is used when empty.
    pub host: String,
    /// Port; the driver default is used when empty.
    #[serde(deserialize_with = "string_or_number")]
    pub port: String,
    /// Pool keys plus passthrough driver options.
    pub options: BTreeMap<String, Value>,
    /// Session timezone when the backend does not force UTC.
    pub time_zone: Option<String>,
}

impl DatabaseSettings {
    /// Settings for database `name` with everything else defaulted.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse settings from a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PoolError::Configuration(format!("invalid database settings: {e}")))
    }

    /// Set the user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port.to_string();
        self
    }

    /// Set the session timezone.
    #[must_use]
    pub fn time_zone(mut self, tz: impl Into<String>) -> Self {
        self.time_zone = Some(tz.into());
        self
    }

    /// Set an `OPTIONS` entry.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Split the settings into driver parameters and pool configuration.
    ///
    /// Pool keys and `autocommit` are removed from the options; the rest is
    /// forwarded as connection parameters. `NAME` is stored first so an
    /// explicit `database` option may override it, while non-empty `USER`,
    /// `PASSWORD`, `HOST` and `PORT` override their option counterparts.
    pub fn resolve(&self) -> Result<(ConnectionParams, PoolConfig)> {
        if self.name.trim().is_empty() {
            return Err(PoolError::Configuration(
                "You need to specify NAME in your database settings".into(),
            ));
        }

        let mut options = self.options.clone();
        let max = take_count(&mut options, MAX_CONNS)?.unwrap_or(1);
        let min = take_count(&mut options, MIN_CONNS)?.unwrap_or(max);
        let test_on_borrow = take_flag(&mut options, TEST_ON_BORROW)?.unwrap_or(false);
        let probe_query = take_text(&mut options, TEST_ON_BORROW_QUERY)?;
        options.remove(AUTOCOMMIT);

        let mut config = PoolConfig::new().min_connections(min).max_connections(max);
        if test_on_borrow {
            let query = probe_query.unwrap_or_else(|| DEFAULT_PROBE_QUERY.to_string());
            // One retry per pool slot after the first borrow, so a pool whose
            // idle connections all died still yields a fresh one.
            let attempts = max.saturating_add(1);
            config = config.test_on_borrow(ValidationPolicy::new(query).max_attempts(attempts));
        }
        config.validate()?;

        let mut params = ConnectionParams::new().with("database", self.name.clone());
        for (key, value) in options {
            if let Some(value) = option_to_param(&key, value)? {
                params.insert(key, value);
            }
        }
        for (key, value) in [
            ("user", &self.user),
            ("password", &self.password),
            ("host", &self.host),
            ("port", &self.port),
        ] {
            if !value.is_empty() {
                params.insert(key, value.clone());
            }
        }
        params.port().map_err(PoolError::from_construction)?;

        Ok((params, config))
    }

    /// Value of the backend's `autocommit` option, if set.
    pub fn autocommit(&self) -> Result<Option<bool>> {
        self.options
            .get(AUTOCOMMIT)
            .map(|value| parse_flag(AUTOCOMMIT, value))
            .transpose()
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("options", &self.options.keys().collect::<Vec<_>>())
            .field("time_zone", &self.time_zone)
            .finish()
    }
}

fn take_count(options: &mut BTreeMap<String, Value>, key: &str) -> Result<Option<u32>> {
    let Some(value) = options.remove(key) else {
        return Ok(None);
    };
    let count = match &value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    match count {
        Some(count) if count > 0 => Ok(Some(count)),
        _ => Err(PoolError::Configuration(format!(
            "{key} must be a positive integer, got {value}"
        ))),
    }
}

fn take_flag(options: &mut BTreeMap<String, Value>, key: &str) -> Result<Option<bool>> {
    options
        .remove(key)
        .map(|value| parse_flag(key, &value))
        .transpose()
}

fn parse_flag(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(invalid_flag(key, value)),
        },
        _ => Err(invalid_flag(key, value)),
    }
}

fn invalid_flag(key: &str, value: &Value) -> PoolError {
    PoolError::Configuration(format!("{key} must be a boolean, got {value}"))
}

fn take_text(options: &mut BTreeMap<String, Value>, key: &str) -> Result<Option<String>> {
    match options.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(PoolError::Configuration(format!(
            "{key} must be a string, got {other}"
        ))),
    }
}

fn option_to_param(key: &str, value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(_) | Value::Object(_) => Err(PoolError::Configuration(format!(
            "option {key} must be a scalar value"
        ))),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}
