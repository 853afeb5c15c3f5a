//! Cloud Foundry client facade.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConnectionConfig, ConnectionConfigBuilder};
use crate::context::{ConnectionContext, InfoPayload};
use crate::errors::Result;
use crate::jobs::{self, JobHandle};
use crate::logs::{self, LogEnvelope};
use crate::operator::Operator;
use crate::services::{ApplicationsService, OrganizationsService};
use crate::token::{Credentials, Token, TokenProvider};

use futures::stream::Stream;

/// Client for the platform's controller, identity and log-streaming services.
///
/// Owns the connection context (shared transport, root cache) and the token
/// provider; all resource operations flow through its request operator. A
/// client is cheap to share behind an `Arc`; constructing a fresh one yields
/// fully isolated caches.
pub struct CloudFoundryClient {
    context: Arc<ConnectionContext>,
    token_provider: Arc<TokenProvider>,
    operator: Operator,
}

impl CloudFoundryClient {
    /// Creates a client from a configuration and grant credentials.
    pub fn new(config: ConnectionConfig, credentials: Credentials) -> Result<Self> {
        let context = Arc::new(ConnectionContext::new(config)?);
        let token_provider = Arc::new(TokenProvider::new(credentials));
        let operator = Operator::new(Arc::clone(&context), Arc::clone(&token_provider));

        Ok(Self {
            context,
            token_provider,
            operator,
        })
    }

    /// Creates a client builder.
    pub fn builder() -> CloudFoundryClientBuilder {
        CloudFoundryClientBuilder::new()
    }

    /// The connection context.
    pub fn context(&self) -> &Arc<ConnectionContext> {
        &self.context
    }

    /// The request operator, for operations not covered by a service.
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// The organizations service.
    pub fn organizations(&self) -> OrganizationsService<'_> {
        OrganizationsService::new(&self.operator)
    }

    /// The applications service.
    pub fn applications(&self) -> ApplicationsService<'_> {
        ApplicationsService::new(&self.operator)
    }

    /// The controller's discovery payload, cached for the process lifetime.
    pub async fn info(&self) -> Result<InfoPayload> {
        self.context.info().await.cloned()
    }

    /// A currently valid bearer token.
    pub async fn token(&self) -> Result<Token> {
        self.token_provider.token(&self.context).await
    }

    /// Marks the cached token as no longer trustworthy.
    pub fn invalidate_token(&self) {
        self.token_provider.invalidate();
    }

    /// Waits for an accepted job to reach a terminal state.
    pub async fn wait_for_job(&self, handle: &JobHandle, timeout: Duration) -> Result<()> {
        jobs::wait_for_job(&self.operator, handle, timeout).await
    }

    /// Fetches the recent-log batch for an application.
    pub async fn recent_logs(
        &self,
        application_id: &str,
    ) -> Result<impl Stream<Item = Result<LogEnvelope>> + '_> {
        logs::recent_logs(&self.operator, application_id).await
    }

    /// Subscribes to an application's live log stream.
    #[cfg(feature = "websocket")]
    pub async fn stream_logs(
        &self,
        application_id: &str,
    ) -> Result<impl Stream<Item = Result<LogEnvelope>> + '_> {
        logs::stream_logs(&self.context, &self.token_provider, application_id).await
    }
}

/// Builder for [`CloudFoundryClient`].
pub struct CloudFoundryClientBuilder {
    config: ConnectionConfigBuilder,
    credentials: Option<Credentials>,
}

impl CloudFoundryClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::builder(),
            credentials: None,
        }
    }

    /// Sets the API host.
    pub fn api_host(mut self, host: impl Into<String>) -> Self {
        self.config = self.config.api_host(host);
        self
    }

    /// Sets the API port.
    pub fn port(mut self, port: u16) -> Self {
        self.config = self.config.port(port);
        self
    }

    /// Sets whether to connect over https.
    pub fn secure(mut self, secure: bool) -> Self {
        self.config = self.config.secure(secure);
        self
    }

    /// Skips TLS certificate verification.
    pub fn skip_tls_verification(mut self, skip: bool) -> Self {
        self.config = self.config.skip_tls_verification(skip);
        self
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.request_timeout(timeout);
        self
    }

    /// Sets the grant credentials (required).
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<CloudFoundryClient> {
        let credentials = self.credentials.ok_or_else(|| {
            crate::errors::ClientError::configuration("credentials are required")
        })?;
        CloudFoundryClient::new(self.config.build()?, credentials)
    }
}

impl Default for CloudFoundryClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_credentials() {
        let result = CloudFoundryClient::builder().api_host("api.example.com").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_constructs_a_client() {
        let result = CloudFoundryClient::builder()
            .api_host("api.example.com")
            .credentials(Credentials::password("user", "secret"))
            .build();

        assert!(result.is_ok());
    }
}
