//! Pool error types.

use thiserror::Error;

/// Result alias for registry and pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors surfaced by the registry and borrowed connections.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Settings for an alias are missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every validation attempt produced a dead connection.
    #[error("no usable connection for alias '{alias}' after {attempts} validation attempts")]
    Exhausted {
        /// Alias whose pool was exhausted.
        alias: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Error passed through unchanged from the driver.
    #[error(transparent)]
    Driver(#[from] dbpool_driver::Error),
}

impl PoolError {
    /// Whether the caller may back off and try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Whether the error is a configuration problem.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Map a driver error raised while building a pool, promoting driver
    /// configuration errors to [`PoolError::Configuration`].
    pub(crate) fn from_construction(err: dbpool_driver::Error) -> Self {
        match err {
            dbpool_driver::Error::Config(msg) => Self::Configuration(msg),
            other => Self::Driver(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let exhausted = PoolError::Exhausted {
            alias: "default".into(),
            attempts: 3,
        };
        assert!(exhausted.is_retryable());
        assert!(!exhausted.is_configuration());
        assert_eq!(
            exhausted.to_string(),
            "no usable connection for alias 'default' after 3 validation attempts"
        );

        let driver = PoolError::from(dbpool_driver::Error::ConnectionReleased);
        assert!(!driver.is_retryable());
        assert_eq!(driver.to_string(), "connection already released to its pool");
    }

    #[test]
    fn test_construction_config_errors_are_promoted() {
        let err = PoolError::from_construction(dbpool_driver::Error::Config("bad port".into()));
        assert!(err.is_configuration());

        let err = PoolError::from_construction(dbpool_driver::Error::PoolClosed);
        assert!(matches!(err, PoolError::Driver(_)));
    }
}
