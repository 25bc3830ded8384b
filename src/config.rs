//! Process-level runtime configuration.
//!
//! The core holds no persistent state between requests, so configuration
//! is limited to what a `RoutingProvider` needs to talk to the external
//! geocoding/matrix/directions service plus a couple of operational knobs.
//! Resolved once at startup and passed down explicitly; never stashed in a
//! module-level singleton.

use std::env;
use std::time::Duration;

/// Credential and operational settings for the external routing provider.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// API key for the geocoding/matrix/directions vendor. Required to
    /// construct an HTTP `RoutingProvider`; synthetic providers used in
    /// tests and CLI demos don't need one.
    pub routing_api_key: String,
    /// Per-HTTP-call timeout.
    pub http_timeout: Duration,
    /// Retries for transient (5xx/timeout) provider failures before an
    /// address or matrix cell is recorded as unresolved.
    pub max_retries_external: u32,
}

impl RuntimeConfig {
    /// Resolve configuration from the environment.
    ///
    /// `ROUTING_API_KEY` is the one required credential described in the
    /// spec's external-interfaces section; `RUST_LOG` is read by
    /// `env_logger` directly and is not duplicated here.
    pub fn from_env() -> Result<Self, crate::error::OptimizerError> {
        let routing_api_key = env::var("ROUTING_API_KEY").map_err(|_| {
            crate::error::OptimizerError::Provider(
                "ROUTING_API_KEY environment variable is not set".to_string(),
            )
        })?;

        let http_timeout_secs = env::var("ROUTING_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        let max_retries_external = env::var("ROUTING_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(2);

        Ok(RuntimeConfig {
            routing_api_key,
            http_timeout: Duration::from_secs(http_timeout_secs),
            max_retries_external,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_is_a_provider_error() {
        // Safe to clear: tests run in a process that doesn't otherwise
        // depend on this variable being set.
        env::remove_var("ROUTING_API_KEY");
        assert!(RuntimeConfig::from_env().is_err());
    }
}
