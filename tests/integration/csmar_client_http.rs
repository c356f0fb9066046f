//! CsmarClient against a mock JSON gateway

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use csmar_downloader::api::{ApiError, CsmarApi, CsmarClient};
use csmar_downloader::models::{Credentials, Language};

use crate::common::test_data::{columns, date, interval};

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "msg": "success", "data": data }))
}

async fn logged_in_client(server: &MockServer) -> CsmarClient {
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(body_json(json!({ "account": "user@example.edu", "password": "secret", "lang": "1" })))
        .respond_with(ok(json!({ "token": "tok-123" })))
        .mount(server)
        .await;

    let client = CsmarClient::with_base_url(&server.uri(), Duration::from_secs(5)).unwrap();
    client
        .login(&Credentials::new("user@example.edu", "secret"), Language::English)
        .await
        .unwrap();
    client
}

#[test_log::test(tokio::test)]
async fn test_login_stores_session() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    assert_eq!(client.logged_in_as().await, Some("user@example.edu".to_string()));
}

#[test_log::test(tokio::test)]
async fn test_rejected_login_is_vendor_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 401, "msg": "invalid account or password", "data": null
        })))
        .mount(&server)
        .await;

    let client = CsmarClient::with_base_url(&server.uri(), Duration::from_secs(5)).unwrap();
    let result = client
        .login(&Credentials::new("user@example.edu", "wrong"), Language::English)
        .await;

    assert_matches!(result, Err(ApiError::Vendor { code: 401, .. }));
    assert_eq!(client.logged_in_as().await, None);
}

#[test_log::test(tokio::test)]
async fn test_requests_before_login_fail() {
    let server = MockServer::start().await;
    let client = CsmarClient::with_base_url(&server.uri(), Duration::from_secs(5)).unwrap();

    assert_matches!(client.list_databases().await, Err(ApiError::NotLoggedIn));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_listings_send_bearer_token() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/tables"))
        .and(query_param("database", "China Stock Market Series"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ok(json!([
            { "Table": "TRD_Dalyr", "Description": "Daily Stock Returns" },
            { "表名": "CD_Dividend", "描述": "分红" },
            "TRD_Year"
        ])))
        .mount(&server)
        .await;

    let tables = client.list_tables("China Stock Market Series").await.unwrap();

    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["TRD_Dalyr", "CD_Dividend", "TRD_Year"]);
    assert_eq!(tables[1].description, "分红");
    assert_eq!(tables[0].database, "China Stock Market Series");
}

#[test_log::test(tokio::test)]
async fn test_fields_accept_vendor_keys() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/fields"))
        .and(query_param("table", "FS_Combas"))
        .respond_with(ok(json!([
            { "field": "Stkcd", "Description": "Stock code", "Type": "varchar" },
            { "字段": "Accper" }
        ])))
        .mount(&server)
        .await;

    let fields = client.list_fields("FS_Combas").await.unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].data_type, "varchar");
    assert_eq!(fields[1].name, "Accper");
}

#[test_log::test(tokio::test)]
async fn test_count_and_query_carry_range() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;
    let range = interval(date(2020, 1, 1), date(2020, 12, 31));
    let expected_body = json!({
        "columns": ["Stkcd", "Accper"],
        "condition": "(Stkcd like '0%')",
        "table": "FS_Combas",
        "startTime": "2020-01-01",
        "endTime": "2020-12-31"
    });

    Mock::given(method("POST"))
        .and(path("/api/query/count"))
        .and(body_json(expected_body.clone()))
        .respond_with(ok(json!({ "count": "1,234" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/query"))
        .and(body_json(expected_body))
        .respond_with(ok(json!({
            "fields": ["Stkcd", "Accper"],
            "items": [["000001", "2020-12-31"], ["000002", "2020-12-31"]]
        })))
        .mount(&server)
        .await;

    let cols = columns(&["Stkcd", "Accper"]);
    let count = client
        .query_count(&cols, "(Stkcd like '0%')", "FS_Combas", Some(range))
        .await
        .unwrap();
    let rows = client
        .query(&cols, "(Stkcd like '0%')", "FS_Combas", Some(range))
        .await
        .unwrap();

    assert_eq!(count, Some(1234));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.record(1).unwrap()["Stkcd"], "000002");
}

#[test_log::test(tokio::test)]
async fn test_non_numeric_count_is_unknown() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/query/count"))
        .respond_with(ok(json!("pending")))
        .mount(&server)
        .await;

    let count = client
        .query_count(&columns(&["Stkcd"]), "", "CG_Co", None)
        .await
        .unwrap();
    assert_eq!(count, None);
}

#[test_log::test(tokio::test)]
async fn test_vendor_and_status_errors() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 5001, "msg": "Query exceeds the quantitative limit of 200000", "data": null
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/databases"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let query_error = client
        .query(&columns(&["Stkcd"]), "", "TRD_Dalyr", None)
        .await
        .unwrap_err();
    assert!(query_error.is_row_limit());
    assert_matches!(query_error, ApiError::Vendor { code: 5001, .. });

    assert_matches!(
        client.list_databases().await,
        Err(ApiError::Status { status: 503, ref body }) if body == "maintenance"
    );
}
