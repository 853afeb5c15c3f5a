//! Application operations.

use bytes::Bytes;
use reqwest::Method;
use serde::Deserialize;

use crate::context::ServiceKind;
use crate::errors::Result;
use crate::jobs::JobHandle;
use crate::operator::{MultipartPart, Operator};
use crate::services::Endpoint;

const SUMMARY: Endpoint = Endpoint::new(
    Method::GET,
    ServiceKind::CloudController,
    &["v2", "apps", "{id}", "summary"],
);

const DELETE: Endpoint = Endpoint::new(
    Method::DELETE,
    ServiceKind::CloudController,
    &["v2", "apps", "{id}"],
);

const UPLOAD_BITS: Endpoint = Endpoint::new(
    Method::PUT,
    ServiceKind::CloudController,
    &["v2", "apps", "{id}", "bits"],
);

/// Summary of an application.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ApplicationSummary {
    /// Application identifier.
    pub guid: String,
    /// Application name.
    pub name: String,
    /// Requested state, e.g. `STARTED`.
    pub state: Option<String>,
    /// Requested instance count.
    pub instances: Option<u32>,
    /// Memory limit in megabytes.
    pub memory: Option<u64>,
    /// Count of running instances.
    pub running_instances: Option<u32>,
}

/// Operations on applications.
pub struct ApplicationsService<'a> {
    operator: &'a Operator,
}

impl<'a> ApplicationsService<'a> {
    pub(crate) fn new(operator: &'a Operator) -> Self {
        Self { operator }
    }

    /// Fetches an application's summary.
    pub async fn summary(&self, application_id: &str) -> Result<ApplicationSummary> {
        self.operator
            .execute(SUMMARY.service, SUMMARY.spec(&[application_id]))
            .await
    }

    /// Deletes an application asynchronously, returning the job to wait on.
    pub async fn delete(&self, application_id: &str) -> Result<JobHandle> {
        self.operator
            .execute_accepted(
                DELETE.service,
                DELETE.spec(&[application_id]).query("async", "true"),
            )
            .await
    }

    /// Uploads an application's bits as a multipart form, returning the
    /// processing job.
    ///
    /// `resources` is the controller's resource-matching document; pass an
    /// empty array to upload everything.
    pub async fn upload_bits(
        &self,
        application_id: &str,
        resources: serde_json::Value,
        application: Bytes,
    ) -> Result<JobHandle> {
        let spec = UPLOAD_BITS
            .spec(&[application_id])
            .query("async", "true")
            .part(MultipartPart::new(
                "resources",
                "application/json",
                resources.to_string().into_bytes(),
            ))
            .part(
                MultipartPart::new("application", "application/zip", application)
                    .with_filename("application.zip"),
            );

        self.operator.execute_accepted(UPLOAD_BITS.service, spec).await
    }
}
