//! Organization operations.

use futures::stream::Stream;
use reqwest::Method;
use serde::Deserialize;

use crate::context::ServiceKind;
use crate::errors::Result;
use crate::operator::Operator;
use crate::pagination::{paginate, paginate_collect, PageResponse};
use crate::services::{Endpoint, Resource};

const LIST: Endpoint = Endpoint::new(
    Method::GET,
    ServiceKind::CloudController,
    &["v2", "organizations"],
);

const GET: Endpoint = Endpoint::new(
    Method::GET,
    ServiceKind::CloudController,
    &["v2", "organizations", "{id}"],
);

/// Entity fields of an organization resource.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OrganizationEntity {
    /// Organization name.
    pub name: String,
    /// Lifecycle status, e.g. `active`.
    pub status: Option<String>,
    /// Assigned quota definition.
    pub quota_definition_guid: Option<String>,
}

/// Operations on organizations.
pub struct OrganizationsService<'a> {
    operator: &'a Operator,
}

impl<'a> OrganizationsService<'a> {
    pub(crate) fn new(operator: &'a Operator) -> Self {
        Self { operator }
    }

    /// Lists all organizations as a lazy sequence across all pages.
    pub fn list(&self) -> impl Stream<Item = Result<Resource<OrganizationEntity>>> + '_ {
        paginate(move |page| {
            self.operator.execute::<PageResponse<Resource<OrganizationEntity>>>(
                LIST.service,
                LIST.spec(&[]).query("page", page).query("results-per-page", 50),
            )
        })
    }

    /// Collects all organizations into a vector.
    pub async fn list_all(&self) -> Result<Vec<Resource<OrganizationEntity>>> {
        paginate_collect(move |page| {
            self.operator.execute::<PageResponse<Resource<OrganizationEntity>>>(
                LIST.service,
                LIST.spec(&[]).query("page", page).query("results-per-page", 50),
            )
        })
        .await
    }

    /// Fetches one organization by id.
    pub async fn get(&self, organization_id: &str) -> Result<Resource<OrganizationEntity>> {
        self.operator
            .execute(GET.service, GET.spec(&[organization_id]))
            .await
    }
}
