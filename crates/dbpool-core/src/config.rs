//! Pool configuration.

use crate::error::{PoolError, Result};
use crate::lifecycle::ValidationPolicy;

/// Sizing and validation settings for one alias's pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolConfig {
    /// Connections retained when idle.
    pub min_connections: u32,
    /// Upper bound on physical connections. Should match the number of
    /// units of work the process runs concurrently.
    pub max_connections: u32,
    /// Test-on-borrow policy, if enabled.
    pub validation: Option<ValidationPolicy>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 1,
            validation: None,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with a single connection and no validation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Validate connections before handing them out.
    #[must_use]
    pub fn test_on_borrow(mut self, policy: ValidationPolicy) -> Self {
        self.validation = Some(policy);
        self
    }

    /// Check the `1 <= min <= max` invariant and the validation policy.
    pub fn validate(&self) -> Result<()> {
        if self.min_connections == 0 {
            return Err(PoolError::Configuration(
                "MIN_CONNS must be at least 1".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Configuration(format!(
                "MIN_CONNS ({}) cannot exceed MAX_CONNS ({})",
                self.min_connections, self.max_connections
            )));
        }
        if let Some(policy) = &self.validation {
            if policy.query.trim().is_empty() {
                return Err(PoolError::Configuration(
                    "TEST_ON_BORROW_QUERY cannot be empty".into(),
                ));
            }
            if policy.max_attempts == 0 {
                return Err(PoolError::Configuration(
                    "validation needs at least one attempt".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_connection() {
        let config = PoolConfig::new();
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.max_connections, 1);
        assert!(config.validation.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_fluent() {
        let config = PoolConfig::new()
            .min_connections(5)
            .max_connections(50)
            .test_on_borrow(ValidationPolicy::new("SELECT 1").max_attempts(50));

        assert_eq!(config.min_connections, 5);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.validation.as_ref().map(|p| p.max_attempts), Some(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        assert!(PoolConfig::new().min_connections(0).validate().is_err());
        assert!(
            PoolConfig::new()
                .min_connections(3)
                .max_connections(2)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        let empty_query = PoolConfig::new().test_on_borrow(ValidationPolicy::new("  "));
        assert!(empty_query.validate().is_err());

        let no_attempts =
            PoolConfig::new().test_on_borrow(ValidationPolicy::default().max_attempts(0));
        assert!(no_attempts.validate().is_err());
    }
}
