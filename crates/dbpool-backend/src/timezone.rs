//! Session timezone statements.

use dbpool_core::{PoolError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Timezone forced when timestamps are stored in UTC.
pub const UTC: &str = "UTC";

/// Check that `name` looks like an IANA zone name or a numeric UTC offset
/// such as `+05:30` or `-03`.
///
/// The name is interpolated into `SET TIME ZONE`, so anything outside
/// letters, digits, `_`, `+`, `-`, `:` and `/`-separated segments is refused.
pub fn validate_timezone(name: &str) -> Result<()> {
    #[allow(clippy::expect_used)]
    static TIMEZONE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^(?:[A-Za-z][A-Za-z0-9_+\-]*(?:/[A-Za-z0-9_+\-]+){0,2}|[+\-][0-9]{1,2}(?::[0-9]{2}){0,2})$",
        )
            .expect("timezone pattern is valid")
    });

    if name.is_empty() {
        return Err(PoolError::Configuration("timezone cannot be empty".into()));
    }

    if name.len() > 64 || !TIMEZONE_RE.is_match(name) {
        return Err(PoolError::Configuration(format!(
            "invalid timezone '{name}': expected a name like 'UTC', 'Europe/Berlin' or '+05:30'"
        )));
    }

    Ok(())
}

/// Statement switching the session to `name`.
pub fn set_time_zone_sql(name: &str) -> Result<String> {
    validate_timezone(name)?;
    Ok(format!("SET TIME ZONE '{name}'"))
}
