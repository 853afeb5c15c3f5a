//! Connection context: shared transport and sub-service root resolution.

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use url::Url;

use crate::config::ConnectionConfig;
use crate::errors::{ApiError, ClientError, Result};

/// Logical sub-services of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// The resource-management controller API.
    CloudController,
    /// The OAuth2 identity service.
    Uaa,
    /// The log/metrics streaming service.
    Doppler,
}

/// Payload of the controller's `/v2/info` discovery endpoint.
///
/// Only the fields used for root resolution are mapped; everything else the
/// server reports is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InfoPayload {
    /// Root of the login/authorization server.
    pub authorization_endpoint: Option<String>,
    /// Root of the identity service's token endpoint.
    pub token_endpoint: Option<String>,
    /// Root of the log/metrics streaming service (a `wss://` URI).
    pub doppler_logging_endpoint: Option<String>,
    /// Platform name, as reported.
    pub name: Option<String>,
    /// Controller API version.
    pub api_version: Option<String>,
}

/// Holds the shared HTTP client and the process-lifetime cache of resolved
/// sub-service roots.
///
/// The controller root is static, derived from the configured API host. The
/// identity and log-streaming roots are discovered by fetching `/v2/info`
/// once; concurrent first users share a single in-flight discovery call, and
/// a failed discovery is not cached so the next caller retries.
pub struct ConnectionContext {
    config: ConnectionConfig,
    http: Client,
    info: OnceCell<InfoPayload>,
}

impl ConnectionContext {
    /// Creates a context from a validated configuration.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone());

        if config.skip_tls_verification {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(proxy) = &config.proxy {
            let mut p = reqwest::Proxy::all(proxy.url())
                .map_err(|e| ClientError::configuration(format!("invalid proxy: {}", e)))?;
            if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
                use secrecy::ExposeSecret;
                p = p.basic_auth(username, password.expose_secret());
            }
            builder = builder.proxy(p);
        }

        let http = builder
            .build()
            .map_err(|e| ClientError::configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http,
            info: OnceCell::new(),
        })
    }

    /// The configuration this context was built from.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The shared HTTP client.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// The discovery payload, fetched once per process and cached.
    pub async fn info(&self) -> Result<&InfoPayload> {
        self.info.get_or_try_init(|| self.fetch_info()).await
    }

    /// Resolves the base URI of a logical sub-service.
    pub async fn root(&self, service: ServiceKind) -> Result<Url> {
        match service {
            ServiceKind::CloudController => parse_root(&self.config.api_root()),
            ServiceKind::Uaa => {
                let info = self.info().await?;
                let endpoint = info
                    .token_endpoint
                    .as_deref()
                    .ok_or_else(|| {
                        ClientError::protocol("discovery payload has no token_endpoint")
                    })?;
                parse_root(endpoint)
            }
            ServiceKind::Doppler => {
                let info = self.info().await?;
                let endpoint = info
                    .doppler_logging_endpoint
                    .as_deref()
                    .ok_or_else(|| {
                        ClientError::protocol("discovery payload has no doppler_logging_endpoint")
                    })?;
                parse_root(endpoint)
            }
        }
    }

    async fn fetch_info(&self) -> Result<InfoPayload> {
        let url = format!("{}/v2/info", self.config.api_root());
        tracing::debug!(%url, "fetching service discovery payload");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ClientError::transport(&e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(&e))?;

        if !status.is_success() {
            return Err(ClientError::Api(ApiError::from_response_body(
                status.as_u16(),
                &body,
            )));
        }

        serde_json::from_slice(&body).map_err(|e| {
            ClientError::protocol(format!("malformed discovery payload: {}", e))
        })
    }
}

fn parse_root(raw: &str) -> Result<Url> {
    Url::parse(raw)
        .map_err(|e| ClientError::protocol(format!("invalid service root {}: {}", raw, e)))
}
