//! User service configuration.

use common::{AppResult, RetryConfig, StoreBackend};

/// User service configuration.
#[derive(Debug, Clone, Default)]
pub struct UserServiceConfig {
    /// Storage backend chosen at startup
    pub backend: StoreBackend,
    /// Retry policy for the connect step
    pub retry: RetryConfig,
}

impl UserServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            backend: StoreBackend::from_env()?,
            retry: RetryConfig::from_env(),
        })
    }
}
