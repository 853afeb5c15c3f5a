//! Integration-style tests for the client against a mock platform.

use std::time::Duration;

use cloudfoundry_client::{ClientError, CloudFoundryClient, Credentials};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_platform() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "test-platform",
            "token_endpoint": server.uri(),
            "doppler_logging_endpoint": server.uri(),
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test-token",
            "token_type": "bearer",
            "expires_in": 600,
        })))
        .mount(&server)
        .await;

    server
}

fn client_for(server: &MockServer) -> CloudFoundryClient {
    let address = server.address();
    CloudFoundryClient::builder()
        .api_host(address.ip().to_string())
        .port(address.port())
        .secure(false)
        .credentials(Credentials::password("user", "secret"))
        .build()
        .unwrap()
}

fn organization(guid: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": {"guid": guid},
        "entity": {"name": name, "status": "active"},
    })
}

fn organizations_page(page: u32, total_pages: u32, names: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "total_results": 5,
        "total_pages": total_pages,
        "prev_url": null,
        "next_url": null,
        "resources": names
            .iter()
            .map(|name| organization(&format!("guid-{}-{}", page, name), name))
            .collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn lists_organizations_across_all_pages_in_order() {
    let server = mock_platform().await;

    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(organizations_page(1, 3, &["alpha", "bravo"])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(organizations_page(2, 3, &["charlie", "delta"])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(organizations_page(3, 3, &["echo"])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let organizations = client.organizations().list_all().await.unwrap();

    let names: Vec<_> = organizations
        .iter()
        .map(|resource| resource.entity.name.as_str())
        .collect();
    assert_eq!(names, vec!["alpha", "bravo", "charlie", "delta", "echo"]);

    // Page requests were issued strictly in increasing order.
    let pages: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/v2/organizations")
        .filter_map(|request| {
            request
                .url
                .query_pairs()
                .find(|(key, _)| key == "page")
                .map(|(_, value)| value.to_string())
        })
        .collect();
    assert_eq!(pages, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn collection_without_total_page_count_fails_loudly() {
    let server = mock_platform().await;

    Mock::given(method("GET"))
        .and(path("/v2/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "resources": [organization("guid-1", "alpha")],
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.organizations().list_all().await;

    assert!(matches!(result, Err(ClientError::Protocol { .. })));
}

#[tokio::test]
async fn deletes_an_application_and_waits_for_the_job() {
    let server = mock_platform().await;

    Mock::given(method("DELETE"))
        .and(path("/v2/apps/app-id"))
        .and(query_param("async", "true"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("location", "/v2/jobs/job-7")
                .set_body_json(serde_json::json!({})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/jobs/job-7"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"state": "queued"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/jobs/job-7"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"state": "succeeded"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let handle = client.applications().delete("app-id").await.unwrap();
    assert_eq!(handle.id, "job-7");

    client
        .wait_for_job(&handle, Duration::from_secs(30))
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_job_carries_the_server_reported_detail() {
    let server = mock_platform().await;

    Mock::given(method("GET"))
        .and(path("/v2/jobs/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "state": "failed",
            "errors": [{"code": 170004, "title": "CF-StagingError", "detail": "Start command not found"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let handle = cloudfoundry_client::JobHandle::from_location("/v2/jobs/job-9").unwrap();
    let result = client.wait_for_job(&handle, Duration::from_secs(30)).await;

    match result {
        Err(ClientError::JobFailed { errors }) => {
            assert_eq!(errors[0].title.as_deref(), Some("CF-StagingError"));
            assert_eq!(errors[0].detail, "Start command not found");
        }
        other => panic!("expected job failure, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_resource_translates_to_a_typed_api_error() {
    let server = mock_platform().await;

    Mock::given(method("GET"))
        .and(path("/v2/apps/missing/summary"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "code": 100004,
            "description": "The app could not be found",
            "error_code": "CF-AppNotFound",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let error = client.applications().summary("missing").await.unwrap_err();

    assert!(error.is_not_found());
    let api = error.as_api_error().unwrap();
    assert_eq!(api.errors[0].title.as_deref(), Some("CF-AppNotFound"));
}

#[tokio::test]
async fn concurrent_operations_share_a_single_grant_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_endpoint": server.uri(),
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(50))
                .set_body_json(serde_json::json!({
                    "access_token": "only-token",
                    "token_type": "bearer",
                    "expires_in": 600,
                })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/organizations/org-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(organization("org-1", "alpha")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let organizations = client.organizations();
    let results = join_all((0..5).map(|_| organizations.get("org-1"))).await;

    for result in results {
        assert_eq!(result.unwrap().entity.name, "alpha");
    }
}
