//! # Cloud Foundry Client Library
//!
//! A production-ready client for the Cloud Foundry platform API:
//! - OAuth2 bearer-token acquisition, caching and refresh (password,
//!   client-credentials and refresh-token grants), with at most one grant
//!   exchange in flight per provider
//! - Generic request dispatch against dynamically discovered service roots
//!   (controller, identity, log streaming)
//! - Typed error taxonomy for transport, authentication, API, protocol and
//!   job failures
//! - Transparent sequential traversal of paginated collections
//! - Long-running-job polling with bounded backoff and caller timeouts
//! - Multipart-framed and WebSocket log retrieval
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cloudfoundry_client::{CloudFoundryClient, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CloudFoundryClient::builder()
//!         .api_host("api.run.example.com")
//!         .credentials(Credentials::password("user", "secret"))
//!         .build()?;
//!
//!     for organization in client.organizations().list_all().await? {
//!         println!("{}", organization.entity.name);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;

// Connection context and root resolution
pub mod context;

// Token acquisition and caching
pub mod token;

// Request dispatch and response translation
pub mod operator;

// Pagination handling
pub mod pagination;

// Long-running-job polling
pub mod jobs;

// Route decomposition
pub mod routes;

// Log retrieval
pub mod logs;

// API services
pub mod services;

// Client facade
pub mod client;

// Re-exports for convenience
pub use client::{CloudFoundryClient, CloudFoundryClientBuilder};
pub use config::{ConnectionConfig, ConnectionConfigBuilder, ProxyConfig};
pub use context::{ConnectionContext, InfoPayload, ServiceKind};
pub use errors::{ApiError, ClientError, ErrorDetail, Result};
pub use jobs::{JobHandle, JobState, JobStatus};
pub use logs::LogEnvelope;
pub use operator::{MultipartPart, Operator, RequestBody, RequestSpec};
pub use pagination::{paginate, paginate_collect, PageResponse, Paginated};
pub use routes::{decompose_route, DecomposedRoute, DomainSummary};
pub use token::{Credentials, Token, TokenProvider};
