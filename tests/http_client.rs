use std::time::Duration;

use http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use wallet_sdk::core::util::{AsyncHttpClient, ReqwestClient};
use wiremock::{
    matchers::{body_string, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn forwards_method_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("grant_type=authorization_code&code=c"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-request-id", "r-1")
                .set_body_string("created"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("{}/token", server.uri()))
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(b"grant_type=authorization_code&code=c".to_vec())
        .unwrap();
    let response = ReqwestClient::new()
        .unwrap()
        .execute(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-request-id"], "r-1");
    assert_eq!(response.body().as_slice(), b"created");
}

#[tokio::test]
async fn error_statuses_are_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .mount(&server)
        .await;

    let request = Request::builder()
        .uri(format!("{}/missing", server.uri()))
        .body(Vec::new())
        .unwrap();
    let response = ReqwestClient::new()
        .unwrap()
        .execute(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.body().as_slice(), b"missing");
}

#[tokio::test]
async fn slow_servers_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let request = Request::builder()
        .uri(server.uri())
        .body(Vec::new())
        .unwrap();
    let err = ReqwestClient::with_timeout(Duration::from_millis(100))
        .unwrap()
        .execute(request)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("http request failed"));
}
