//! Declarative endpoint layer over the request operator.
//!
//! Each remote endpoint is one [`Endpoint`] descriptor — method, target
//! service and path template — consumed by the generic operator. Services are
//! thin structs borrowing the operator; the DTOs here map only the fields
//! the services consume.

mod applications;
mod organizations;

pub use applications::{ApplicationSummary, ApplicationsService};
pub use organizations::{OrganizationEntity, OrganizationsService};

use reqwest::Method;
use serde::Deserialize;

use crate::context::ServiceKind;
use crate::operator::RequestSpec;

/// Descriptor of one remote endpoint.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// HTTP method.
    pub method: Method,
    /// Target logical service.
    pub service: ServiceKind,
    /// Path template; `{}`-wrapped segments are filled from arguments.
    pub path: &'static [&'static str],
}

impl Endpoint {
    /// Creates an endpoint descriptor.
    pub const fn new(
        method: Method,
        service: ServiceKind,
        path: &'static [&'static str],
    ) -> Self {
        Self {
            method,
            service,
            path,
        }
    }

    /// Builds a request spec, substituting template segments in order.
    pub fn spec(&self, args: &[&str]) -> RequestSpec {
        let mut remaining = args.iter();
        let segments: Vec<String> = self
            .path
            .iter()
            .map(|segment| {
                if segment.starts_with('{') {
                    remaining
                        .next()
                        .map(|value| value.to_string())
                        .unwrap_or_default()
                } else {
                    segment.to_string()
                }
            })
            .collect();
        debug_assert!(
            remaining.next().is_none(),
            "more arguments than template segments"
        );

        RequestSpec::new(self.method.clone(), segments)
    }
}

/// Metadata common to every legacy controller resource.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    /// Resource identifier.
    pub guid: String,
    /// Resource URL.
    pub url: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Last-update timestamp.
    pub updated_at: Option<String>,
}

/// A controller resource: metadata envelope plus typed entity.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Resource<E> {
    /// Resource metadata.
    pub metadata: Metadata,
    /// Resource entity.
    pub entity: E,
}
