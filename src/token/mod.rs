//! OAuth2 token acquisition, caching and refresh.
//!
//! A [`TokenProvider`] owns at most one cached token and at most one
//! in-flight grant exchange. Concurrent callers that find no fresh token
//! join the in-flight exchange and observe the same resulting token or the
//! same failure; a failed exchange clears the in-flight slot so a later call
//! can retry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::context::{ConnectionContext, ServiceKind};
use crate::errors::{ApiError, ClientError, Result};

/// Default client id used by grant strategies that do not name their own.
/// Matches the platform CLI's public OAuth2 client.
pub const DEFAULT_CLIENT_ID: &str = "cf";

/// Buffer subtracted from a token's lifetime before it is considered stale.
const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(300);

/// OAuth2 grant strategies for obtaining a bearer token.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Resource-owner password grant.
    Password {
        /// Account username.
        username: String,
        /// Account password.
        password: SecretString,
        /// OAuth2 client id used for the exchange.
        client_id: String,
        /// OAuth2 client secret used for the exchange.
        client_secret: SecretString,
    },
    /// Client-credentials grant.
    ClientCredentials {
        /// OAuth2 client id.
        client_id: String,
        /// OAuth2 client secret.
        client_secret: SecretString,
    },
    /// Refresh-token grant with a caller-supplied token.
    RefreshToken {
        /// The refresh token.
        token: SecretString,
        /// OAuth2 client id used for the exchange.
        client_id: String,
        /// OAuth2 client secret used for the exchange.
        client_secret: SecretString,
    },
}

impl Credentials {
    /// Password-grant credentials with the platform CLI's public client.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: SecretString::new(password.into()),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: SecretString::new(String::new()),
        }
    }

    /// Client-credentials-grant credentials.
    pub fn client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::ClientCredentials {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
        }
    }

    /// Refresh-token-grant credentials with the platform CLI's public client.
    pub fn refresh_token(token: impl Into<String>) -> Self {
        Self::RefreshToken {
            token: SecretString::new(token.into()),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: SecretString::new(String::new()),
        }
    }

    /// Overrides the OAuth2 client used for the exchange.
    pub fn with_client(
        mut self,
        id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let (id, secret) = (id.into(), SecretString::new(secret.into()));
        match &mut self {
            Self::Password {
                client_id,
                client_secret,
                ..
            }
            | Self::ClientCredentials {
                client_id,
                client_secret,
            }
            | Self::RefreshToken {
                client_id,
                client_secret,
                ..
            } => {
                *client_id = id;
                *client_secret = secret;
            }
        }
        self
    }

    fn client(&self) -> (&str, &SecretString) {
        match self {
            Self::Password {
                client_id,
                client_secret,
                ..
            }
            | Self::ClientCredentials {
                client_id,
                client_secret,
            }
            | Self::RefreshToken {
                client_id,
                client_secret,
                ..
            } => (client_id, client_secret),
        }
    }

    fn grant_params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Password {
                username, password, ..
            } => vec![
                ("grant_type", "password".to_string()),
                ("username", username.clone()),
                ("password", password.expose_secret().to_string()),
            ],
            Self::ClientCredentials { .. } => {
                vec![("grant_type", "client_credentials".to_string())]
            }
            Self::RefreshToken { token, .. } => vec![
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", token.expose_secret().to_string()),
            ],
        }
    }
}

/// A bearer token obtained from the identity service.
///
/// Superseded, never mutated: a refresh produces a new value, and in-flight
/// requests holding the old one complete normally.
#[derive(Debug, Clone)]
pub struct Token {
    value: SecretString,
    scheme: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// The token value.
    pub fn value(&self) -> &SecretString {
        &self.value
    }

    /// The authorization scheme, typically `bearer`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Expiry instant, if the server reported one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Renders the `Authorization` header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.scheme, self.value.expose_secret())
    }

    fn from_response(response: &TokenResponse) -> Self {
        Self {
            value: SecretString::new(response.access_token.clone()),
            scheme: response
                .token_type
                .clone()
                .unwrap_or_else(|| "bearer".to_string()),
            expires_at: response
                .expires_in
                .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds)),
        }
    }

    fn is_fresh(&self, buffer: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let buffer = chrono::Duration::from_std(buffer)
                    .unwrap_or_else(|_| chrono::Duration::seconds(0));
                Utc::now() + buffer < expires_at
            }
            // No expiry reported: valid until explicitly invalidated.
            None => true,
        }
    }
}

/// Token-endpoint response shape.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

type SharedExchange = Shared<BoxFuture<'static, std::result::Result<Token, ClientError>>>;

#[derive(Default)]
struct Inner {
    cached: Option<Token>,
    refresh_token: Option<SecretString>,
    pending: Option<SharedExchange>,
}

/// Obtains and caches bearer tokens for a single set of credentials.
pub struct TokenProvider {
    credentials: Credentials,
    refresh_buffer: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl TokenProvider {
    /// Creates a provider for the given grant strategy.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Overrides the staleness buffer applied to token expiry.
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Returns a currently valid token, performing at most one grant
    /// round-trip.
    ///
    /// A cached fresh token is returned without I/O. Otherwise the caller
    /// joins the single in-flight exchange, or starts one if none exists.
    pub async fn token(&self, context: &ConnectionContext) -> Result<Token> {
        if let Some(outcome) = self.fast_path() {
            return match outcome {
                FastPath::Cached(token) => Ok(token),
                FastPath::Join(exchange) => exchange.await,
            };
        }

        let token_url = Self::token_endpoint(context).await?;
        let http = context.http().clone();

        let exchange = {
            let mut inner = self.inner.lock().expect("token state poisoned");

            // Another caller may have finished or started an exchange while
            // the endpoint was being resolved.
            if let Some(token) = &inner.cached {
                if token.is_fresh(self.refresh_buffer) {
                    return Ok(token.clone());
                }
            }

            match &inner.pending {
                Some(pending) => pending.clone(),
                None => {
                    let exchange = Self::exchange(
                        http,
                        token_url,
                        self.credentials.clone(),
                        inner.refresh_token.clone(),
                        Arc::clone(&self.inner),
                    )
                    .boxed()
                    .shared();
                    inner.pending = Some(exchange.clone());
                    exchange
                }
            }
        };

        exchange.await
    }

    /// Marks the current token as no longer trustworthy.
    ///
    /// To be called by a consumer that received a 401 using it. An in-flight
    /// exchange is left undisturbed: its result is fresher than the token
    /// being invalidated, so it is cached and shared as usual.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock().expect("token state poisoned");
        if inner.cached.take().is_some() {
            tracing::warn!("bearer token invalidated; next request re-authenticates");
        }
    }

    fn fast_path(&self) -> Option<FastPath> {
        let inner = self.inner.lock().expect("token state poisoned");

        if let Some(token) = &inner.cached {
            if token.is_fresh(self.refresh_buffer) {
                return Some(FastPath::Cached(token.clone()));
            }
        }

        inner.pending.clone().map(FastPath::Join)
    }

    async fn token_endpoint(context: &ConnectionContext) -> Result<Url> {
        let mut url = context.root(ServiceKind::Uaa).await?;
        url.path_segments_mut()
            .map_err(|_| ClientError::protocol("identity root cannot carry a path"))?
            .pop_if_empty()
            .extend(["oauth", "token"]);
        Ok(url)
    }

    /// The single in-flight exchange. Updates provider state exactly once on
    /// completion, before releasing all waiters.
    async fn exchange(
        http: Client,
        token_url: Url,
        credentials: Credentials,
        refresh_token: Option<SecretString>,
        inner: Arc<Mutex<Inner>>,
    ) -> std::result::Result<Token, ClientError> {
        let result = Self::perform_grants(&http, &token_url, &credentials, refresh_token).await;

        let mut guard = inner.lock().expect("token state poisoned");
        guard.pending = None;

        match result {
            Ok(response) => {
                let token = Token::from_response(&response);
                guard.cached = Some(token.clone());
                if let Some(rotated) = response.refresh_token {
                    guard.refresh_token = Some(SecretString::new(rotated));
                }
                Ok(token)
            }
            Err(error) => Err(error),
        }
    }

    /// Prefers the refresh-token grant when a refresh token is held, falling
    /// back to the primary grant once if the identity service rejects it.
    async fn perform_grants(
        http: &Client,
        token_url: &Url,
        credentials: &Credentials,
        refresh_token: Option<SecretString>,
    ) -> std::result::Result<TokenResponse, ClientError> {
        if let Some(refresh_token) = refresh_token {
            let params = vec![
                ("grant_type", "refresh_token".to_string()),
                (
                    "refresh_token",
                    refresh_token.expose_secret().to_string(),
                ),
            ];
            match Self::grant_request(http, token_url, credentials, params).await {
                Err(ClientError::Authentication { status, .. }) => {
                    tracing::debug!(status, "refresh grant rejected, re-running primary grant");
                }
                other => return other,
            }
        }

        Self::grant_request(http, token_url, credentials, credentials.grant_params()).await
    }

    async fn grant_request(
        http: &Client,
        token_url: &Url,
        credentials: &Credentials,
        params: Vec<(&'static str, String)>,
    ) -> std::result::Result<TokenResponse, ClientError> {
        let (client_id, client_secret) = credentials.client();
        let basic = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            client_id,
            client_secret.expose_secret()
        ));

        let body = serde_urlencoded::to_string(&params)
            .map_err(|e| ClientError::configuration(format!("unencodable grant body: {}", e)))?;

        let response = http
            .post(token_url.clone())
            .header(AUTHORIZATION, format!("Basic {}", basic))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| ClientError::transport(&e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(&e))?;

        if !status.is_success() {
            let api = ApiError::from_response_body(status.as_u16(), &bytes);
            let description = api
                .errors
                .first()
                .map(ToString::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(ClientError::Authentication {
                status: status.as_u16(),
                description,
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::protocol(format!("malformed token response: {}", e)))
    }
}

enum FastPath {
    Cached(Token),
    Join(SharedExchange),
}
