#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use strata_client::{
    AuthProvider, ClientSet, RetryPolicy, Transport, TransportOptions, get_all_pages, PageShape,
};
use strata_domain::{
    Auth, Coordinate, EnvironmentDefinition, EnvironmentKind, Secret, classic_api,
};
use tokio::sync::Semaphore;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_transport(server: &MockServer) -> Transport {
    let options = TransportOptions::default();
    Transport::new(
        &server.uri(),
        AuthProvider::Token(Secret::new("TENANT_TOKEN", "tenant-token-value")),
        Arc::new(Semaphore::new(options.concurrent_requests)),
        &options,
    )
    .expect("build transport")
}

fn classic_environment(server: &MockServer) -> EnvironmentDefinition {
    EnvironmentDefinition {
        name: "dev".to_string(),
        url: server.uri(),
        kind: EnvironmentKind::Classic,
        group: "default".to_string(),
        auth: Auth {
            token: Some(Secret::new("TENANT_TOKEN", "tenant-token-value")),
            oauth: None,
        },
    }
}

#[tokio::test]
async fn requests_carry_the_api_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ping"))
        .and(header("Authorization", "Api-Token tenant-token-value"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = token_transport(&server);
    let response = transport
        .get("/api/ping", Vec::new(), &RetryPolicy::reads())
        .await
        .expect("request succeeds");
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn rate_limited_put_waits_and_retries_once() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/config/v1/frequentIssueDetection"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/config/v1/frequentIssueDetection"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = token_transport(&server);
    let started = Instant::now();
    let response = transport
        .put_json(
            "/api/config/v1/frequentIssueDetection",
            json!({"enabled": true}),
            &RetryPolicy::upserts(),
        )
        .await
        .expect("retried request succeeds");

    assert_eq!(response.status, 200);
    assert!(
        started.elapsed() >= Duration::from_secs(1),
        "the Retry-After hint must be honoured"
    );
    assert_eq!(server.received_requests().await.expect("requests").len(), 2);
}

#[tokio::test]
async fn get_that_recovers_from_transient_errors_returns_the_final_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config/v1/autoTags"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/config/v1/autoTags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": [{"id": "t", "name": "tag"}]})))
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        base_delay: Duration::from_millis(10),
        ..RetryPolicy::reads()
    };
    let transport = token_transport(&server);
    let response = transport
        .get("/api/config/v1/autoTags", Vec::new(), &policy)
        .await
        .expect("request recovers");

    let body: serde_json::Value = response.json().expect("parse body");
    assert_eq!(body["values"][0]["name"], "tag");
}

#[tokio::test]
async fn non_retryable_status_fails_without_another_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/broken"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = token_transport(&server);
    let error = transport
        .get("/api/broken", Vec::new(), &RetryPolicy::reads())
        .await
        .expect_err("must fail");
    assert_eq!(error.status_code(), Some(400));
}

#[tokio::test]
async fn pagination_follows_next_page_keys_until_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/settings/objects"))
        .and(query_param("schemaIds", "builtin:tagging"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"objectId": "a"}, {"objectId": "b"}],
            "totalCount": 3,
            "nextPageKey": "page-2",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/settings/objects"))
        .and(query_param("nextPageKey", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"objectId": "c"}],
            "totalCount": 3,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = token_transport(&server);
    let items = get_all_pages(
        &transport,
        "/api/v2/settings/objects",
        vec![("schemaIds".to_string(), "builtin:tagging".to_string())],
        PageShape::standard("items"),
    )
    .await
    .expect("pagination succeeds");

    assert_eq!(items.len(), 3);
}

#[tokio::test]
async fn empty_page_with_more_advertised_is_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/settings/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [],
            "totalCount": 1,
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/settings/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"objectId": "late"}],
            "totalCount": 1,
        })))
        .mount(&server)
        .await;

    let transport = token_transport(&server);
    let items = get_all_pages(
        &transport,
        "/api/v2/settings/objects",
        Vec::new(),
        PageShape::standard("items"),
    )
    .await
    .expect("pagination succeeds");

    assert_eq!(items.len(), 1, "the empty page must be retried");
}

#[tokio::test]
async fn classic_upsert_posts_when_no_object_matches_by_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config/v1/dashboards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dashboards": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/config/v1/dashboards"))
        .and(body_partial_json(json!({"name": "My Dashboard"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "dash-1", "name": "My Dashboard"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let environment = classic_environment(&server);
    let clients = ClientSet::for_environment(&environment, &TransportOptions::default())
        .expect("client set");
    let api = classic_api("dashboard").expect("dashboard api");

    let entity = clients
        .upsert(
            &strata_domain::ConfigType::ClassicApi {
                api: api.id.to_string(),
                single_instance: false,
            },
            &Coordinate::new("infra", "dashboard", "main"),
            "My Dashboard",
            &json!({"name": "My Dashboard"}),
            None,
        )
        .await
        .expect("upsert succeeds");

    assert_eq!(entity.id, "dash-1");
    assert_eq!(entity.name, "My Dashboard");
}

#[tokio::test]
async fn classic_upsert_puts_when_a_name_matches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config/v1/autoTags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [{"id": "tag-7", "name": "owner-tag"}],
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/config/v1/autoTags/tag-7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let environment = classic_environment(&server);
    let clients = ClientSet::for_environment(&environment, &TransportOptions::default())
        .expect("client set");

    let entity = clients
        .upsert(
            &strata_domain::ConfigType::ClassicApi {
                api: "auto-tag".to_string(),
                single_instance: false,
            },
            &Coordinate::new("infra", "auto-tag", "owner"),
            "owner-tag",
            &json!({"name": "owner-tag"}),
            None,
        )
        .await
        .expect("upsert succeeds");

    assert_eq!(entity.id, "tag-7");
}

#[tokio::test]
async fn single_instance_apis_put_without_matching() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/config/v1/dataPrivacy"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let environment = classic_environment(&server);
    let clients = ClientSet::for_environment(&environment, &TransportOptions::default())
        .expect("client set");

    clients
        .upsert(
            &strata_domain::ConfigType::ClassicApi {
                api: "data-privacy".to_string(),
                single_instance: true,
            },
            &Coordinate::new("infra", "data-privacy", "global"),
            "data-privacy",
            &json!({"dataCollectionLevel": "anonymous"}),
            None,
        )
        .await
        .expect("upsert succeeds");

    let requests = server.received_requests().await.expect("requests");
    assert_eq!(requests.len(), 1, "no list request may precede the PUT");
}

#[tokio::test]
async fn settings_upsert_reuses_the_schema_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/settings/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [],
            "totalCount": 0,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/settings/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"objectId": "obj-1"}])))
        .expect(2)
        .mount(&server)
        .await;

    let environment = classic_environment(&server);
    let clients = ClientSet::for_environment(&environment, &TransportOptions::default())
        .expect("client set");
    let type_ = strata_domain::ConfigType::SettingsSchema {
        schema_id: "builtin:tagging".to_string(),
        scope: "environment".to_string(),
    };

    for id in ["one", "two"] {
        clients
            .upsert(
                &type_,
                &Coordinate::new("infra", "builtin:tagging", id),
                id,
                &json!({"tag": id}),
                None,
            )
            .await
            .expect("settings upsert succeeds");
    }

    // one GET (cached afterwards) + two POSTs
    let requests = server.received_requests().await.expect("requests");
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn deleting_a_missing_classic_object_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config/v1/managementZones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": []})))
        .mount(&server)
        .await;

    let environment = classic_environment(&server);
    let clients = ClientSet::for_environment(&environment, &TransportOptions::default())
        .expect("client set");

    clients
        .delete(&strata_domain::DeletePointer {
            project: None,
            config_type: "management-zone".to_string(),
            identifier: "gone".to_string(),
        })
        .await
        .expect("delete of a missing object succeeds");
}
