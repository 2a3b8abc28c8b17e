//! Safe fetcher behavior against live mock servers

use crate::{loopback, resolver, serve_raw, trusting, url_for, TEST_HOST};
use network_shield::destination::StaticResolver;
use network_shield::{DestinationRules, FetchRequest, SafeFetcher, ShieldError, TransientError};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(resolver: StaticResolver) -> SafeFetcher {
    SafeFetcher::new(Arc::new(resolver), "TestBot/1.0 (+https://example.com/bot)")
}

fn request(server: &MockServer) -> FetchRequest {
    FetchRequest::default()
        .with_timeout(Duration::from_secs(5))
        .with_rules(trusting(server))
}

#[tokio::test]
async fn test_fetch_through_pinned_host() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("three openings"))
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher(resolver())
        .get_text(&url_for(&server, "/jobs"), &request(&server))
        .await
        .unwrap();

    assert_eq!(result.text, "three openings");
    assert_eq!(result.status_code, 200);
    assert_eq!(result.bytes_len, 14);
    assert_eq!(result.final_url, url_for(&server, "/jobs"));
}

#[tokio::test]
async fn test_trusted_literal_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let result = fetcher(StaticResolver::new())
        .get_text(&format!("{}/ok", server.uri()), &request(&server))
        .await
        .unwrap();
    assert_eq!(result.text, "ok");
}

#[tokio::test]
async fn test_untrusted_loopback_blocked_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = fetcher(resolver())
        .get_text(&url_for(&server, "/jobs"), &FetchRequest::default())
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), "blocked_ip");
    server.verify().await;
}

#[tokio::test]
async fn test_redirect_to_loopback_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "http://127.0.0.1/private"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher(resolver())
        .get_text(&url_for(&server, "/start"), &request(&server))
        .await
        .unwrap_err();

    let security = err.as_security().expect("redirect must be a security error");
    assert_eq!(security.reason.code(), "blocked_ip");
    assert_eq!(security.url, "http://127.0.0.1/private");
    assert!(security.to_string().contains("category=loopback"));
}

#[tokio::test]
async fn test_redirect_to_other_local_port_blocked() {
    let server = MockServer::start().await;
    let location = format!("http://127.0.0.1:{}/admin", server.address().port() + 1);
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(307).insert_header("Location", location.as_str()))
        .mount(&server)
        .await;

    let err = fetcher(resolver())
        .get_text(&url_for(&server, "/start"), &request(&server))
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "blocked_ip");
}

#[tokio::test]
async fn test_relative_redirect_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved here"))
        .mount(&server)
        .await;

    let result = fetcher(resolver())
        .get_text(&url_for(&server, "/old"), &request(&server))
        .await
        .unwrap();

    assert_eq!(result.text, "moved here");
    assert_eq!(result.final_url, url_for(&server, "/new"));
}

#[tokio::test]
async fn test_rebind_blocked_at_next_hop() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/next"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&server)
        .await;

    let private: IpAddr = "10.1.2.3".parse().unwrap();
    let resolver = Arc::new(
        StaticResolver::new()
            .with_host(TEST_HOST, [loopback()])
            .with_host(TEST_HOST, [private]),
    );
    let fetcher = SafeFetcher::new(resolver.clone(), "TestBot/1.0");

    let err = fetcher
        .get_text(&url_for(&server, "/start"), &request(&server))
        .await
        .unwrap_err();

    let security = err.as_security().unwrap();
    assert_eq!(security.reason.code(), "blocked_ip");
    assert!(security.to_string().contains("ip=10.1.2.3"));
    assert_eq!(resolver.lookups(TEST_HOST), 2);
    server.verify().await;
}

#[tokio::test]
async fn test_zero_redirects_fails_closed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/next"))
        .mount(&server)
        .await;

    let err = fetcher(resolver())
        .get_text(&url_for(&server, "/start"), &request(&server).with_max_redirects(0))
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), "max_redirects_exceeded");
}

#[tokio::test]
async fn test_redirect_loop_capped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/b"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/a"))
        .mount(&server)
        .await;

    let err = fetcher(resolver())
        .get_text(&url_for(&server, "/a"), &request(&server).with_max_redirects(3))
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), "max_redirects_exceeded");
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
}

#[tokio::test]
async fn test_redirect_without_location_is_final() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/odd"))
        .respond_with(ResponseTemplate::new(302).set_body_string("no location"))
        .mount(&server)
        .await;

    let result = fetcher(resolver())
        .get_text(&url_for(&server, "/odd"), &request(&server))
        .await
        .unwrap();
    assert_eq!(result.status_code, 302);
    assert_eq!(result.text, "no location");
}

#[tokio::test]
async fn test_body_over_cap_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
        .mount(&server)
        .await;

    let err = fetcher(resolver())
        .get_text(&url_for(&server, "/big"), &request(&server).with_max_bytes(10))
        .await
        .unwrap_err();

    assert!(err.is_security());
    assert_eq!(err.reason_code(), "max_bytes_exceeded");
}

#[tokio::test]
async fn test_trailing_dot_host_stays_pinned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pinned"))
        .expect(1)
        .mount(&server)
        .await;

    // careers.test. has no system DNS entry; only the pin can reach it
    let url = format!("http://{}.:{}/jobs", TEST_HOST, server.address().port());
    let resolver = Arc::new(resolver());
    let result = SafeFetcher::new(resolver.clone(), "TestBot/1.0")
        .get_text(&url, &request(&server))
        .await
        .unwrap();

    assert_eq!(result.text, "pinned");
    assert_eq!(resolver.lookups(TEST_HOST), 2);
}

const CHUNKED_BODY: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: text/plain\r\n\
Transfer-Encoding: chunked\r\n\
Connection: close\r\n\
\r\n\
6\r\nabcdef\r\n\
6\r\nghijkl\r\n\
0\r\n\r\n";

fn raw_request(addr: std::net::SocketAddr) -> FetchRequest {
    FetchRequest::default()
        .with_timeout(Duration::from_secs(5))
        .with_rules(DestinationRules::default().trust_endpoint(addr))
}

fn raw_url(addr: std::net::SocketAddr, path: &str) -> String {
    format!("http://{}:{}{}", TEST_HOST, addr.port(), path)
}

#[tokio::test]
async fn test_streamed_body_over_cap_without_length() {
    let addr = serve_raw(CHUNKED_BODY).await;

    let err = fetcher(resolver())
        .get_text(&raw_url(addr, "/stream"), &raw_request(addr).with_max_bytes(10))
        .await
        .unwrap_err();

    assert!(err.is_security());
    assert_eq!(err.reason_code(), "max_bytes_exceeded");
}

#[tokio::test]
async fn test_streamed_body_within_cap() {
    let addr = serve_raw(CHUNKED_BODY).await;

    let result = fetcher(resolver())
        .get_text(&raw_url(addr, "/stream"), &raw_request(addr).with_max_bytes(12))
        .await
        .unwrap();
    assert_eq!(result.text, "abcdefghijkl");
    assert_eq!(result.bytes_len, 12);
}

#[tokio::test]
async fn test_unreadable_location_fails_closed() {
    let addr = serve_raw(
        b"HTTP/1.1 302 Found\r\n\
Location: /caf\xe9\r\n\
Content-Length: 6\r\n\
Connection: close\r\n\
\r\n\
secret",
    )
    .await;

    let err = fetcher(resolver())
        .get_text(&raw_url(addr, "/start"), &raw_request(addr))
        .await
        .unwrap_err();

    assert!(err.is_security());
    assert_eq!(err.reason_code(), "invalid_redirect");
}

#[tokio::test]
async fn test_error_status_returned_to_caller() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;

    let result = fetcher(resolver())
        .get_text(&url_for(&server, "/gone"), &request(&server))
        .await
        .unwrap();
    assert_eq!(result.status_code, 404);
}

#[tokio::test]
async fn test_declared_charset_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/latin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![0x63, 0x61, 0x66, 0xe9], "text/plain; charset=iso-8859-1"),
        )
        .mount(&server)
        .await;

    let result = fetcher(resolver())
        .get_text(&url_for(&server, "/latin"), &request(&server))
        .await
        .unwrap();
    assert_eq!(result.text, "café");
    assert_eq!(result.bytes_len, 4);
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = fetcher(resolver())
        .get_text(
            &url_for(&server, "/slow"),
            &request(&server).with_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ShieldError::Transient(TransientError::Timeout { .. })
    ));
    assert_eq!(err.reason_code(), "network_error");
}

#[tokio::test]
async fn test_custom_headers_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(wiremock::matchers::header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher(resolver())
        .get_text(
            &url_for(&server, "/api"),
            &request(&server).with_header("Accept", "application/json"),
        )
        .await
        .unwrap();
    assert_eq!(result.text, "{}");
    server.verify().await;
}
