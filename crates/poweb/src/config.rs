use std::time::Duration;

use poweb_common::types::{API_PREFIX, DEFAULT_LOCAL_PORT, DEFAULT_REMOTE_PORT};

/// Default inbound silence tolerated on a keep-alive collection session.
const DEFAULT_KEEPALIVE_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Address and TLS settings of one PoWeb gateway.
///
/// Immutable once constructed. The two presets cover the common
/// deployments: [`GatewayConfig::local`] for the loopback gateway of a
/// private endpoint, [`GatewayConfig::remote`] for a public gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    host: String,
    port: u16,
    use_tls: bool,
    keepalive_read_timeout: Duration,
}

impl GatewayConfig {
    /// Creates a configuration from explicit parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
            keepalive_read_timeout: DEFAULT_KEEPALIVE_READ_TIMEOUT,
        }
    }

    /// Overrides the inbound-silence window after which a keep-alive
    /// collection session is considered dead and reconnected.
    #[must_use]
    pub fn with_keepalive_read_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_read_timeout = timeout;
        self
    }

    /// Loopback gateway on the default local port, without TLS.
    #[must_use]
    pub fn local() -> Self {
        Self::new("127.0.0.1", DEFAULT_LOCAL_PORT, false)
    }

    /// Remote gateway on the default HTTPS port, with TLS.
    #[must_use]
    pub fn remote(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_REMOTE_PORT, true)
    }

    /// Returns the gateway host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the gateway port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns whether TLS is enabled.
    #[must_use]
    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    /// Returns the keep-alive read timeout.
    #[must_use]
    pub fn keepalive_read_timeout(&self) -> Duration {
        self.keepalive_read_timeout
    }

    /// Base URL of the unary HTTP endpoints, including the API prefix.
    #[must_use]
    pub fn http_base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, API_PREFIX)
    }

    /// Absolute WebSocket URL for the given path.
    #[must_use]
    pub fn ws_url(&self, path: &str) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, path)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("gateway host must not be empty".to_string());
        }
        if self.host.contains("://") {
            return Err(format!(
                "gateway host must not include a scheme, got: {}",
                self.host
            ));
        }
        if self.port == 0 {
            return Err("gateway port must be greater than 0".to_string());
        }
        if self.keepalive_read_timeout.is_zero() {
            return Err("keepalive read timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}
