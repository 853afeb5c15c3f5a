//! Connection configuration for the Cloud Foundry client.

use std::time::Duration;

use secrecy::SecretString;

use crate::errors::{ClientError, Result};

/// Default API port.
pub const DEFAULT_PORT: u16 = 443;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = "cloudfoundry-client/0.1.0";

/// Proxy configuration for outbound requests.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy host.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// Optional proxy username.
    pub username: Option<String>,
    /// Optional proxy password.
    pub password: Option<SecretString>,
}

impl ProxyConfig {
    /// Creates a proxy configuration without credentials.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Sets the proxy credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::new(password.into()));
        self
    }

    pub(crate) fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Immutable network configuration for a connection context.
///
/// Holds everything needed to reach the platform: the API host, TLS trust
/// policy, proxy settings and timeouts. Sub-service roots are resolved
/// lazily by the [`ConnectionContext`](crate::context::ConnectionContext)
/// built from this value.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Hostname of the API root, e.g. `api.example.com`. No scheme.
    pub api_host: String,
    /// API port.
    pub port: u16,
    /// Whether to connect over https. Disable only for test servers.
    pub secure: bool,
    /// Whether to skip TLS certificate verification.
    pub skip_tls_verification: bool,
    /// Optional proxy.
    pub proxy: Option<ProxyConfig>,
    /// Per-request timeout (connect through body read).
    pub request_timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// User-Agent header.
    pub user_agent: String,
}

impl ConnectionConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.api_host.is_empty() {
            return Err(ClientError::configuration("API host cannot be empty"));
        }

        if self.api_host.contains("://") {
            return Err(ClientError::configuration(
                "API host must be a bare hostname, without a scheme",
            ));
        }

        if self.user_agent.is_empty() {
            return Err(ClientError::configuration("User-Agent cannot be empty"));
        }

        Ok(())
    }

    /// The statically configured root URI of the controller API.
    pub fn api_root(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.api_host, self.port)
    }
}

/// Builder for [`ConnectionConfig`].
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    api_host: Option<String>,
    port: Option<u16>,
    secure: Option<bool>,
    skip_tls_verification: bool,
    proxy: Option<ProxyConfig>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ConnectionConfigBuilder {
    /// Sets the API host (required).
    pub fn api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = Some(host.into());
        self
    }

    /// Sets the API port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets whether to connect over https.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Skips TLS certificate verification.
    pub fn skip_tls_verification(mut self, skip: bool) -> Self {
        self.skip_tls_verification = skip;
        self
    }

    /// Sets the proxy configuration.
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the User-Agent header.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<ConnectionConfig> {
        let config = ConnectionConfig {
            api_host: self.api_host.unwrap_or_default(),
            port: self.port.unwrap_or(DEFAULT_PORT),
            secure: self.secure.unwrap_or(true),
            skip_tls_verification: self.skip_tls_verification,
            proxy: self.proxy,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_with_defaults() {
        let config = ConnectionConfig::builder()
            .api_host("api.example.com")
            .build()
            .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.secure);
        assert_eq!(config.api_root(), "https://api.example.com:443");
    }

    #[test]
    fn insecure_root_for_test_servers() {
        let config = ConnectionConfig::builder()
            .api_host("localhost")
            .port(8080)
            .secure(false)
            .build()
            .unwrap();

        assert_eq!(config.api_root(), "http://localhost:8080");
    }

    #[test]
    fn rejects_missing_host() {
        assert!(ConnectionConfig::builder().build().is_err());
    }

    #[test]
    fn rejects_host_with_scheme() {
        let result = ConnectionConfig::builder()
            .api_host("https://api.example.com")
            .build();

        assert!(result.is_err());
    }
}
