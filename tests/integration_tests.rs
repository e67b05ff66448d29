//! Integration tests using wiremock to simulate the target database API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use vws_client::backoff::{BackOffHandler, BackOffPolicy, ConstantBackOff};
use vws_client::types::{ResultCode, TargetRequest, TargetStatus};
use vws_client::{AccessKeys, Credential, Error, TargetService};
use wiremock::matchers::{body_json, header, header_exists, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn keys() -> AccessKeys {
    AccessKeys::new("server-access", "server-secret")
}

fn service(server: &MockServer) -> TargetService {
    TargetService::builder()
        .base_url(server.uri())
        .unwrap()
        .application_name("integration-tests")
        .build()
        .unwrap()
}

fn fast_retrying_service(server: &MockServer, max_tries: u32) -> TargetService {
    TargetService::builder()
        .base_url(server.uri())
        .unwrap()
        .application_name("integration-tests")
        .max_tries(max_tries)
        .back_off_handler(BackOffHandler::new(Arc::new(
            ConstantBackOff::new(Duration::from_millis(10), 10).unwrap(),
        )))
        .build()
        .unwrap()
}

fn tower() -> TargetRequest {
    TargetRequest {
        name: "tower".to_string(),
        width: 32.0,
        image: "aW1hZ2U=".to_string(),
        active_flag: Some(true),
        application_metadata: None,
    }
}

#[tokio::test]
async fn test_list_targets() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result_code": "Success",
            "transaction_id": "T1",
            "results": ["T_ID"]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = service(&mock_server)
        .target_list()
        .list(&keys())
        .send()
        .await
        .unwrap();

    assert_eq!(response.base.result_code, ResultCode::Success);
    assert_eq!(response.base.transaction_id, "T1");
    assert_eq!(response.results, vec!["T_ID".to_string()]);
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.attempts, 1);
    assert!(!response.was_retried());
}

#[tokio::test]
async fn test_requests_are_signed_and_identified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/summary"))
        .and(header_regex("authorization", r"^VWS server-access:[A-Za-z0-9+/]{27}=$"))
        .and(header_exists("date"))
        .and(header("content-type", "application/json"))
        .and(header_regex("user-agent", r"^integration-tests vws-client/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result_code": "Success",
            "transaction_id": "T5",
            "name": "db",
            "active_images": 3,
            "inactive_images": 1,
            "failed_images": 0
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let credential = Arc::new(Credential::new());
    let service = TargetService::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .application_name("integration-tests")
        .credential(credential.clone())
        .build()
        .unwrap();

    let summary = service
        .target_list()
        .database_summary(&keys())
        .execute()
        .await
        .unwrap();

    assert_eq!(summary.name, "db");
    assert_eq!(summary.active_images, 3);

    let requests = mock_server.received_requests().await.unwrap();
    let sent = requests[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(sent, format!("VWS {}", credential.last_token().unwrap()));
}

#[tokio::test]
async fn test_get_target() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/targets/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result_code": "Success",
            "transaction_id": "T2",
            "status": "success",
            "target_record": {
                "target_id": "abc123",
                "active_flag": true,
                "name": "tower",
                "width": 32.0,
                "tracking_rating": 4,
                "reco_rating": ""
            }
        })))
        .mount(&mock_server)
        .await;

    let target = service(&mock_server)
        .target_list()
        .get(&keys(), "abc123")
        .execute()
        .await
        .unwrap();

    assert_eq!(target.status, TargetStatus::Success);
    assert_eq!(target.target_record.target_id, "abc123");
    assert_eq!(target.target_record.tracking_rating, 4);
}

#[tokio::test]
async fn test_repeated_get_is_stable_and_signed_per_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/targets/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result_code": "Success",
            "transaction_id": "T2",
            "status": "processing",
            "target_record": {
                "target_id": "abc123",
                "active_flag": false,
                "name": "tower",
                "width": 32.0,
                "tracking_rating": -1,
                "reco_rating": ""
            }
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let service = service(&mock_server);
    let first = service
        .target_list()
        .get(&keys(), "abc123")
        .execute()
        .await
        .unwrap();
    // Date has one-second resolution
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let second = service
        .target_list()
        .get(&keys(), "abc123")
        .execute()
        .await
        .unwrap();

    assert_eq!(first, second);

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    let mut authorizations = Vec::new();
    for request in &received {
        let date = request.headers.get("date").unwrap().to_str().unwrap();
        let expected = vws_client::credential::access_token(
            &keys(),
            &vws_client::credential::signing_string(
                &request.method,
                None,
                "application/json",
                date,
                "/targets/abc123",
            ),
        )
        .unwrap();
        let authorization = request.headers.get("authorization").unwrap().to_str().unwrap();
        assert_eq!(authorization, format!("VWS {}", expected));
        authorizations.push(authorization.to_string());
    }
    assert_ne!(authorizations[0], authorizations[1]);
}

#[tokio::test]
async fn test_unknown_target_is_a_service_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/targets/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "result_code": "UnknownTarget",
            "transaction_id": "T404"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .target_list()
        .get(&keys(), "missing")
        .execute()
        .await;

    match result {
        Err(Error::ServiceApi {
            service,
            status,
            error,
        }) => {
            assert_eq!(service, "target");
            assert_eq!(status.as_u16(), 404);
            assert_eq!(error.result_code, ResultCode::UnknownTarget);
            assert_eq!(error.transaction_id, "T404");
        }
        other => panic!("Expected ServiceApi error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unparseable_error_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/targets/abc"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .target_list()
        .delete(&keys(), "abc")
        .execute()
        .await;

    match result {
        Err(Error::ErrorResponseParse { raw_response, .. }) => {
            assert_eq!(raw_response, "<html>oops</html>");
        }
        other => panic!("Expected ErrorResponseParse, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_success_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .target_list()
        .list(&keys())
        .execute()
        .await;

    match result {
        Err(Error::ResponseParse {
            raw_response,
            service,
            ..
        }) => {
            assert_eq!(raw_response, "not json");
            assert_eq!(service, "target");
        }
        other => panic!("Expected ResponseParse, got {:?}", other),
    }
}

#[tokio::test]
async fn test_insert_and_update_send_json_bodies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/targets"))
        .and(body_json(json!({
            "name": "tower",
            "width": 32.0,
            "image": "aW1hZ2U=",
            "active_flag": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result_code": "TargetCreated",
            "transaction_id": "T3",
            "target_id": "new-id"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/targets/new-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result_code": "Success",
            "transaction_id": "T4"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let targets = service(&mock_server).target_list();

    let inserted = targets.insert(&keys(), &tower()).execute().await.unwrap();
    assert_eq!(inserted.base.result_code, ResultCode::TargetCreated);
    assert_eq!(inserted.target_id, "new-id");

    let updated = targets
        .update(&keys(), &inserted.target_id, &tower())
        .execute()
        .await
        .unwrap();
    assert_eq!(updated.base.transaction_id, "T4");
}

#[tokio::test]
async fn test_check_similar_and_target_summary() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/duplicates/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result_code": "Success",
            "transaction_id": "T6",
            "similar_targets": ["def", "ghi"]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/summary/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result_code": "Success",
            "transaction_id": "T7",
            "database_name": "db",
            "target_name": "tower",
            "upload_date": "2024-01-02",
            "active_flag": true,
            "status": "processing",
            "tracking_rating": -1,
            "reco_rating": "",
            "total_recos": 10,
            "current_month_recos": 2,
            "previous_month_recos": 8
        })))
        .mount(&mock_server)
        .await;

    let targets = service(&mock_server).target_list();

    let similar = targets.check_similar(&keys(), "abc").execute().await.unwrap();
    assert_eq!(similar.similar_targets, vec!["def", "ghi"]);

    let summary = targets.target_summary(&keys(), "abc").execute().await.unwrap();
    assert_eq!(summary.status, TargetStatus::Processing);
    assert_eq!(summary.total_recos, 10);
    assert_eq!(summary.tracking_rating, -1);
}

#[tokio::test]
async fn test_service_unavailable_is_retried_until_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "result_code": "Fail",
            "transaction_id": "busy"
        })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result_code": "Success",
            "transaction_id": "T8",
            "results": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = fast_retrying_service(&mock_server, 3)
        .target_list()
        .list(&keys())
        .send()
        .await
        .unwrap();

    assert_eq!(response.attempts, 3);
    assert!(response.was_retried());
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn test_retries_stop_at_max_tries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "result_code": "Fail",
            "transaction_id": "busy"
        })))
        .expect(3)
        .mount(&mock_server)
        .await;

    let result = fast_retrying_service(&mock_server, 3)
        .target_list()
        .list(&keys())
        .execute()
        .await;

    assert!(matches!(
        result,
        Err(Error::ServiceApi { status, .. }) if status.as_u16() == 503
    ));
}

#[tokio::test]
async fn test_non_503_errors_are_not_retried_by_default() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "result_code": "Fail",
            "transaction_id": "T9"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = fast_retrying_service(&mock_server, 3)
        .target_list()
        .list(&keys())
        .execute()
        .await;

    assert_eq!(result.unwrap_err().status().map(|s| s.as_u16()), Some(500));
}

#[tokio::test]
async fn test_back_off_disabled_by_policy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "result_code": "Fail",
            "transaction_id": "busy"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = TargetService::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .back_off_policy(BackOffPolicy::NONE)
        .build()
        .unwrap();

    assert!(service.target_list().list(&keys()).execute().await.is_err());
}

#[tokio::test]
async fn test_missing_parameter_fails_before_any_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = service(&mock_server)
        .target_list()
        .get(&keys(), "")
        .execute()
        .await;

    assert!(matches!(result, Err(Error::ParameterValidation { .. })));
}

#[tokio::test]
async fn test_redirect_is_followed_without_authorization() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/v2/targets"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/targets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result_code": "Success",
            "transaction_id": "T10",
            "results": ["x"]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = service(&mock_server)
        .target_list()
        .list(&keys())
        .send()
        .await
        .unwrap();

    assert_eq!(response.results, vec!["x"]);
    assert_eq!(response.attempts, 2);
}

#[tokio::test]
async fn test_raw_and_stream_execution() {
    use futures::TryStreamExt;

    let mock_server = MockServer::start().await;
    let body = r#"{"result_code":"Success","transaction_id":"T11","results":["a"]}"#;

    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let request = service(&mock_server).target_list().list(&keys());

    assert_eq!(request.execute_raw().await.unwrap(), body);

    let chunks: Vec<bytes::Bytes> = request
        .execute_as_stream()
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(chunks.concat(), body.as_bytes());
}

#[tokio::test]
async fn test_url_length_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = TargetService::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .max_url_length(40)
        .build()
        .unwrap();

    let result = service
        .target_list()
        .get(&keys(), "a".repeat(64))
        .execute()
        .await;

    assert!(matches!(result, Err(Error::UrlTooLong { max: 40, .. })));
}
