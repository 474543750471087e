#![allow(dead_code)]

use std::time::Duration;

use heyitech_alarm::{Credentials, DeviceClient, LOGIN_PATH, STATUS_PATH};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

pub const DEVICE_ID: &str = "dev-1";
pub const TOKEN: &str = "tok-1";

pub fn creds() -> Credentials {
    Credentials::new("alice", "s3cret-pass")
}

pub fn client(server: &MockServer) -> DeviceClient {
    DeviceClient::builder(server.uri())
        .build()
        .expect("client should build")
}

/// Base URL of a port nothing listens on.
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

/// Decoded `requestJson` form field of a recorded request.
pub fn request_json(req: &Request) -> Value {
    let (_, raw) = url::form_urlencoded::parse(&req.body)
        .find(|(k, _)| k == "requestJson")
        .expect("request should carry a requestJson field");
    serde_json::from_str(&raw).expect("requestJson should be JSON")
}

/// Matches requests whose decoded `requestJson` satisfies the predicate.
pub struct RequestJson<F>(F);

pub fn body_json<F>(predicate: F) -> RequestJson<F>
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    RequestJson(predicate)
}

impl<F> Match for RequestJson<F>
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    fn matches(&self, request: &Request) -> bool {
        url::form_urlencoded::parse(&request.body)
            .find(|(k, _)| k == "requestJson")
            .and_then(|(_, raw)| serde_json::from_str::<Value>(&raw).ok())
            .is_some_and(|v| (self.0)(&v))
    }
}

pub fn login_mock() -> Mock {
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tokenId": TOKEN, "code": 0})))
}

pub async fn mount_login(server: &MockServer) {
    login_mock().mount(server).await;
}

pub fn status_mock(body: Value) -> Mock {
    Mock::given(method("POST"))
        .and(path(STATUS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
}

pub async fn count_requests(server: &MockServer, endpoint: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == endpoint)
        .count()
}

pub async fn wait_for_request(server: &MockServer, endpoint: &str) {
    wait_for_requests(server, endpoint, 1).await;
}

pub async fn wait_for_requests(server: &MockServer, endpoint: &str, count: usize) {
    for _ in 0..200 {
        if count_requests(server, endpoint).await >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("fewer than {count} requests reached {endpoint}");
}
