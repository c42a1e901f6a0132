//! Connection parameters.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Driver-level connection parameters.
///
/// Holds the well-known target fields (`database`, `user`, `password`,
/// `host`, `port`) next to any passthrough options, all as strings. Keys are
/// kept sorted so two parameter sets built in a different order compare and
/// hash equal.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ConnectionParams {
    entries: BTreeMap<String, String>,
}

impl ConnectionParams {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a libpq-style connection string.
    ///
    /// ```text
    /// dbname=app user=web password='s3cr3t pass' host=db port=5432
    /// ```
    ///
    /// Values may be single-quoted; a backslash escapes the next character.
    /// `dbname` is stored under the canonical key `database`.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let mut params = Self::new();
        let mut chars = dsn.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
                key.push(c);
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}

            if chars.next() != Some('=') {
                return Err(Error::Config(format!(
                    "missing \"=\" after \"{key}\" in connection string"
                )));
            }
            if key.is_empty() {
                return Err(Error::Config(
                    "empty parameter name in connection string".into(),
                ));
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}

            let mut value = String::new();
            if chars.next_if_eq(&'\'').is_some() {
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => return Err(unterminated()),
                        },
                        Some(c) => value.push(c),
                        None => return Err(unterminated()),
                    }
                }
            } else {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                            continue;
                        }
                    }
                    value.push(c);
                }
            }

            params.insert(key, value);
        }

        Ok(params)
    }

    /// Render the parameters back into a libpq-style connection string.
    ///
    /// The password is included verbatim; use the `Debug` output for logs.
    #[must_use]
    pub fn to_dsn(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| {
                let key = if key == "database" { "dbname" } else { key };
                format!("{key}={}", quote_value(value))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = canonical_key(key.into());
        self.entries.insert(key, value.into());
    }

    /// Builder-style variant of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Remove a parameter, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Get a parameter by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Whether a parameter is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Database name.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.get("database")
    }

    /// User name.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.get("user")
    }

    /// Password.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.get("password")
    }

    /// Server host. `None` means the driver default (local socket).
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.get("host")
    }

    /// Server port. `Ok(None)` means the driver default.
    pub fn port(&self) -> Result<Option<u16>> {
        self.get("port")
            .map(|port| {
                port.parse()
                    .map_err(|_| Error::Config(format!("invalid port: {port}")))
            })
            .transpose()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no parameter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.entries {
            if key == "password" {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

fn canonical_key(key: String) -> String {
    if key == "dbname" {
        "database".to_string()
    } else {
        key
    }
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

fn unterminated() -> Error {
    Error::Config("unterminated quoted string in connection string".into())
}
