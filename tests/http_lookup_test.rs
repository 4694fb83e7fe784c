//! HTTP lookup client tests against a mock metadata API.

use bq_wait::config::WaitConfig;
use bq_wait::credential::{Secret, StaticToken};
use bq_wait::lookup::{is_retryable, HttpLookupClient, LookupClient, RemoteErrorKind};
use bq_wait::resource::ResourceIdentifier;
use chrono::DateTime;
use httpmock::prelude::*;
use serde_json::json;

const TABLE_PATH: &str = "/bigquery/v2/projects/proj/datasets/ds/tables/events";

fn client(server: &MockServer) -> HttpLookupClient {
    let config = WaitConfig {
        api_base_url: server.url("/bigquery/v2"),
        user_agent: "bq-wait-test".to_string(),
        ..Default::default()
    };
    HttpLookupClient::new(
        &config,
        Box::new(StaticToken::new(Secret::new("test-token"))),
        Some("proj".to_string()),
    )
    .unwrap()
}

fn id(spec: &str) -> ResourceIdentifier {
    ResourceIdentifier::parse(spec).unwrap()
}

#[test]
fn found_table_is_parsed() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path(TABLE_PATH)
            .header("Authorization", "Bearer test-token")
            .header("User-Agent", "bq-wait-test");
        then.status(200).json_body(json!({
            "id": "proj:ds.events",
            "friendlyName": "Daily Events",
            "tableReference": {"projectId": "proj", "datasetId": "ds", "tableId": "events"},
            "numRows": "1024",
            "lastModifiedTime": "1717203600000"
        }));
    });

    let snapshot = client(&server).get_table(&id("ds.events")).unwrap().unwrap();

    mock.assert();
    assert_eq!(snapshot.display_name, "Daily Events");
    assert_eq!(snapshot.num_rows, 1024);
    assert_eq!(
        snapshot.last_modified,
        DateTime::from_timestamp_millis(1_717_203_600_000).unwrap()
    );
}

#[test]
fn missing_friendly_name_falls_back_to_table_id() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(TABLE_PATH);
        then.status(200).json_body(json!({
            "tableReference": {"projectId": "proj", "datasetId": "ds", "tableId": "events"},
            "lastModifiedTime": "0"
        }));
    });

    let snapshot = client(&server).get_table(&id("proj.ds.events")).unwrap().unwrap();
    assert_eq!(snapshot.display_name, "events");
    assert_eq!(snapshot.num_rows, 0);
}

#[test]
fn not_found_is_none() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(TABLE_PATH);
        then.status(404).json_body(json!({
            "error": {"code": 404, "message": "Not found: Table proj:ds.events",
                      "errors": [{"reason": "notFound"}]}
        }));
    });

    assert_eq!(client(&server).get_table(&id("ds.events")).unwrap(), None);
}

#[test]
fn rate_limit_is_retryable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(TABLE_PATH);
        then.status(403).json_body(json!({
            "error": {"code": 403, "message": "Exceeded rate limits",
                      "errors": [{"reason": "rateLimitExceeded"}]}
        }));
    });

    let err = client(&server).get_table(&id("ds.events")).unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::RateLimited);
    assert!(is_retryable(&err));
    assert!(err.message.contains("Exceeded rate limits"), "{}", err);
}

#[test]
fn access_denied_is_fatal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(TABLE_PATH);
        then.status(403).json_body(json!({
            "error": {"code": 403, "message": "Access Denied",
                      "errors": [{"reason": "accessDenied"}]}
        }));
    });

    let err = client(&server).get_table(&id("ds.events")).unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::PermissionDenied);
    assert!(!is_retryable(&err));
}

#[test]
fn server_error_without_body_is_retryable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(TABLE_PATH);
        then.status(503).body("Service Unavailable");
    });

    let err = client(&server).get_table(&id("ds.events")).unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::ServerError);
    assert!(err.message.contains("503"), "{}", err);
}

#[test]
fn malformed_metadata_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(TABLE_PATH);
        then.status(200).json_body(json!({"friendlyName": "x", "lastModifiedTime": "yesterday"}));
    });

    let err = client(&server).get_table(&id("ds.events")).unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::Other);
    assert!(err.message.contains("lastModifiedTime"), "{}", err);
}

#[test]
fn partition_decorator_is_sent_in_path() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/bigquery/v2/projects/proj/datasets/ds/tables/events$20240601");
        then.status(200).json_body(json!({
            "friendlyName": "events",
            "numRows": "0",
            "lastModifiedTime": "1717200000000"
        }));
    });

    let snapshot = client(&server)
        .get_table(&id("ds.events$20240601"))
        .unwrap()
        .unwrap();
    mock.assert();
    assert_eq!(snapshot.num_rows, 0);
}
