//! HTTP-level tests against the fully wired router (stub scanner, in-memory
//! status store, temp-dir object stores).

use axum::body::Body;
use axum::Router;
use http::{header, Request, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;
use veriscan_api::setup::initialize_app;
use veriscan_core::Config;

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

async fn test_app() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::for_tests();
    config.raw_store_path = dir.path().join("raw").to_string_lossy().into_owned();
    config.clean_store_path = dir.path().join("clean").to_string_lossy().into_owned();

    let (_state, _replication, router) = initialize_app(config).await.expect("app init");
    (router, dir)
}

fn multipart_upload(file_name: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/v0/files")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .expect("request")
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Poll the status endpoint until the file reaches a terminal status.
async fn poll_until_terminal(router: &Router, file_id: &str) -> Value {
    for _ in 0..100 {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v0/files/{}/status", file_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        let status = json["status"].as_str().unwrap().to_string();
        if status != "PENDING" && status != "SCANNING" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("file {} never reached a terminal status", file_id);
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (router, _dir) = test_app().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v0/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn clean_upload_reaches_clean_via_polling() {
    let (router, _dir) = test_app().await;

    let response = router
        .clone()
        .oneshot(multipart_upload("report.pdf", b"a perfectly ordinary report"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let accepted = response_json(response).await;
    assert_eq!(accepted["status"], "PENDING");
    let file_id = accepted["file_id"].as_str().unwrap().to_string();

    let terminal = poll_until_terminal(&router, &file_id).await;
    assert_eq!(terminal["status"], "CLEAN");
    assert_eq!(terminal["file_name"], "report.pdf");
}

#[tokio::test]
async fn infected_upload_reaches_infected_with_detail() {
    let (router, _dir) = test_app().await;

    let mut content = b"attachment ".to_vec();
    content.extend_from_slice(veriscan_services::stub::INFECTED_MARKER);

    let response = router
        .clone()
        .oneshot(multipart_upload("invoice.zip", &content))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let accepted = response_json(response).await;
    let file_id = accepted["file_id"].as_str().unwrap().to_string();

    let terminal = poll_until_terminal(&router, &file_id).await;
    assert_eq!(terminal["status"], "INFECTED");
    assert!(terminal["detail"]
        .as_str()
        .unwrap()
        .contains("threat detected"));
}

#[tokio::test]
async fn disallowed_extension_is_rejected() {
    let (router, _dir) = test_app().await;

    let response = router
        .oneshot(multipart_upload("setup.exe", b"not today"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn unknown_file_id_returns_404() {
    let (router, _dir) = test_app().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/v0/files/{}/status",
                    uuid::Uuid::new_v4()
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = response_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn openapi_spec_is_served() {
    let (router, _dir) = test_app().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v0/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert!(json["paths"]["/api/v0/files"].is_object());
}
