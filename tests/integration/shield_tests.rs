//! Retry orchestration, breaker, politeness and dispatch end-to-end

use crate::{loopback, resolver, trusting, url_for, TEST_HOST};
use network_shield::destination::StaticResolver;
use network_shield::dispatch::DispatchError;
use network_shield::provenance::AttemptOutcome;
use network_shield::{
    AllowlistPolicy, Config, NetworkShield, RetrySettings, ScrapeMode, ShieldError, TransientError,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> Config {
    let mut config = Config::default();
    config.user_agent.crawler_name = "TestBot".to_string();
    config.fetch.timeout_s = 5.0;
    config.politeness.min_host_interval_ms = 0;
    config
}

fn shield_with(server: &MockServer, mode: ScrapeMode, config: Config) -> NetworkShield {
    let policy = AllowlistPolicy::new(mode, [TEST_HOST], false);
    NetworkShield::with_resolver(config, policy, Arc::new(resolver()), trusting(server))
}

fn shield(server: &MockServer, mode: ScrapeMode) -> NetworkShield {
    shield_with(server, mode, test_config())
}

fn quick_retries(max_attempts: u32) -> RetrySettings {
    RetrySettings {
        max_attempts,
        backoff_base: Duration::from_millis(10),
        backoff_max: Duration::from_millis(40),
    }
}

#[tokio::test]
async fn test_success_records_provenance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("openings"))
        .mount(&server)
        .await;

    let shield = shield(&server, ScrapeMode::Live);
    let url = url_for(&server, "/jobs");

    let (text, meta) = shield
        .fetch_text_with_retry("acme", &url, &quick_retries(3))
        .await
        .unwrap();
    assert_eq!(text, "openings");
    assert_eq!(meta.attempt_number, 1);
    assert_eq!(meta.status_code, 200);
    assert!(meta.robots_allowed);

    // robots.txt is cached for the run
    shield
        .fetch_text_with_retry("acme", &url, &quick_retries(3))
        .await
        .unwrap();

    let record = shield.recorder().provider("acme").unwrap();
    assert_eq!(record.attempts_made, 2);
    assert!(record.live_attempted);
    assert_eq!(record.mode, ScrapeMode::Live);
    assert_eq!(record.robots_final_allowed, Some(true));
    assert_eq!(record.attempts[1].attempt_number, 2);
    assert_eq!(
        record.policy_snapshot.unwrap().policy.allowed_domains,
        vec![TEST_HOST.to_string()]
    );
    server.verify().await;
}

#[tokio::test]
async fn test_retries_transient_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let shield = shield(&server, ScrapeMode::Live);
    let (text, meta) = shield
        .fetch_text_with_retry("acme", &url_for(&server, "/flaky"), &quick_retries(3))
        .await
        .unwrap();

    assert_eq!(text, "recovered");
    assert_eq!(meta.attempt_number, 2);

    let record = shield.recorder().provider("acme").unwrap();
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::Retryable);
    assert_eq!(record.attempts[0].reason, "503");
    assert_eq!(record.attempts[0].sleep_before_next_s, 0.01);
    assert_eq!(record.attempts[1].outcome, AttemptOutcome::Success);
    assert_eq!(shield.breaker().consecutive_failures(TEST_HOST), 0);
}

#[tokio::test]
async fn test_exhaustion_returns_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.breaker.failure_threshold = 10;
    let shield = shield_with(&server, ScrapeMode::Live, config);

    let err = shield
        .fetch_text_with_retry("acme", &url_for(&server, "/down"), &quick_retries(3))
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), "500");
    let record = shield.recorder().provider("acme").unwrap();
    assert_eq!(record.attempts_made, 3);
    assert_eq!(record.attempts[2].sleep_before_next_s, 0.0);
    server.verify().await;
}

#[tokio::test]
async fn test_breaker_fails_fourth_call_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.breaker.failure_threshold = 3;
    config.breaker.cooldown_s = 600.0;
    let shield = shield_with(&server, ScrapeMode::Live, config);
    let url = url_for(&server, "/down");

    for _ in 0..3 {
        let err = shield
            .fetch_text_with_retry("acme", &url, &quick_retries(1))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "503");
    }
    assert!(shield.breaker().is_open(TEST_HOST));

    let err = shield
        .fetch_text_with_retry("acme", &url, &quick_retries(1))
        .await
        .unwrap_err();
    match err {
        ShieldError::Transient(TransientError::CircuitOpen { host, retry_in }) => {
            assert_eq!(host, TEST_HOST);
            assert!(retry_in > Duration::from_secs(590));
        }
        other => panic!("expected an open circuit, got {other}"),
    }

    let record = shield.recorder().provider("acme").unwrap();
    assert_eq!(record.attempts[3].outcome, AttemptOutcome::CircuitOpen);
    server.verify().await;

    shield.reset_politeness_state();
    assert!(!shield.breaker().is_open(TEST_HOST));
}

#[tokio::test]
async fn test_cancelled_half_open_attempt_does_not_wedge_host() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("back"))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.breaker.failure_threshold = 1;
    config.breaker.cooldown_s = 0.1;
    let shield = shield_with(&server, ScrapeMode::Live, config);

    shield
        .fetch_text_with_retry("acme", &url_for(&server, "/down"), &quick_retries(1))
        .await
        .unwrap_err();
    assert!(shield.breaker().is_open(TEST_HOST));
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The caller's own deadline drops the half-open attempt mid-request
    let cancelled = tokio::time::timeout(
        Duration::from_millis(200),
        shield.fetch_text_with_retry("acme", &url_for(&server, "/slow"), &quick_retries(1)),
    )
    .await;
    assert!(cancelled.is_err());

    let (text, _) = shield
        .fetch_text_with_retry("acme", &url_for(&server, "/ok"), &quick_retries(1))
        .await
        .unwrap();
    assert_eq!(text, "back");
    assert_eq!(shield.breaker().consecutive_failures(TEST_HOST), 0);
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let shield = shield(&server, ScrapeMode::Live);
    let err = shield
        .fetch_text_with_retry("acme", &url_for(&server, "/missing"), &quick_retries(3))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ShieldError::Transient(TransientError::HttpStatus { status: 404, .. })
    ));
    let record = shield.recorder().provider("acme").unwrap();
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::Failed);
    server.verify().await;
}

#[tokio::test]
async fn test_security_error_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "http://127.0.0.1/private"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let shield = shield(&server, ScrapeMode::Live);
    let err = shield
        .fetch_text_with_retry("acme", &url_for(&server, "/start"), &quick_retries(3))
        .await
        .unwrap_err();

    assert!(err.is_security());
    let record = shield.recorder().provider("acme").unwrap();
    assert_eq!(record.attempts_made, 1);
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::Blocked);
    // The egress policy rejects the hop before its address is classified
    assert_eq!(record.attempts[0].reason, "host_not_in_allowlist");
    assert_eq!(shield.breaker().consecutive_failures(TEST_HOST), 0);
    server.verify().await;
}

#[tokio::test]
async fn test_redirect_off_allowlist_blocked() {
    let server = MockServer::start().await;
    let location = format!("http://elsewhere.test:{}/", server.address().port());
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", location.as_str()))
        .mount(&server)
        .await;

    let resolver = Arc::new(
        StaticResolver::new()
            .with_host(TEST_HOST, [loopback()])
            .with_host("elsewhere.test", [loopback()]),
    );
    let policy = AllowlistPolicy::new(ScrapeMode::Live, [TEST_HOST], false);
    let shield =
        NetworkShield::with_resolver(test_config(), policy, resolver.clone(), trusting(&server));

    let err = shield
        .fetch_text_with_retry("acme", &url_for(&server, "/start"), &quick_retries(3))
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), "host_not_in_allowlist");
    assert_eq!(resolver.lookups("elsewhere.test"), 0);
}

#[tokio::test]
async fn test_robots_disallow_is_logged_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("listing"))
        .mount(&server)
        .await;

    let shield = shield(&server, ScrapeMode::Live);
    let (text, meta) = shield
        .fetch_text_with_retry("acme", &url_for(&server, "/jobs"), &quick_retries(1))
        .await
        .unwrap();

    assert_eq!(text, "listing");
    assert!(!meta.robots_allowed);
    let record = shield.recorder().provider("acme").unwrap();
    assert_eq!(record.robots_final_allowed, Some(false));
}

#[tokio::test]
async fn test_snapshot_mode_makes_no_network_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = Arc::new(resolver());
    let policy = AllowlistPolicy::new(ScrapeMode::Snapshot, [TEST_HOST], false);
    let shield =
        NetworkShield::with_resolver(test_config(), policy, resolver.clone(), trusting(&server));
    let url = url_for(&server, "/jobs");

    let err = shield
        .fetch_text_with_retry("acme", &url, &quick_retries(3))
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "snapshot_mode");

    let outcome = shield
        .fetch_or_snapshot("acme", &url, &quick_retries(3), || {
            Ok::<_, std::io::Error>("stored".to_string())
        })
        .await
        .unwrap();
    assert_eq!(outcome.value, "stored");
    assert!(!outcome.live_attempted);
    assert!(!outcome.fallback_triggered);

    assert_eq!(resolver.total_lookups(), 0);
    server.verify().await;
}

#[tokio::test]
async fn test_empty_allowlist_rejects_in_live_and_auto() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    for mode in [ScrapeMode::Live, ScrapeMode::Auto] {
        let resolver = Arc::new(resolver());
        let policy = AllowlistPolicy::new(mode, Vec::<String>::new(), false);
        let shield =
            NetworkShield::with_resolver(test_config(), policy, resolver.clone(), trusting(&server));

        let err = shield
            .fetch_text_with_retry("acme", &url_for(&server, "/jobs"), &quick_retries(3))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "host_not_in_allowlist");
        assert_eq!(resolver.total_lookups(), 0);
    }
    server.verify().await;
}

#[tokio::test]
async fn test_auto_falls_back_on_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let shield = shield(&server, ScrapeMode::Auto);
    let outcome = shield
        .fetch_or_snapshot("acme", &url_for(&server, "/down"), &quick_retries(2), || {
            Ok::<_, std::io::Error>("stored".to_string())
        })
        .await
        .unwrap();

    assert_eq!(outcome.value, "stored");
    assert!(outcome.live_attempted);
    assert!(outcome.fallback_triggered);
    assert!(outcome.fallback_reason.unwrap().contains("HttpStatusError"));

    let record = shield.recorder().provider("acme").unwrap();
    assert!(record.fallback_triggered);
    assert!(record.fallback_reason.unwrap().contains("HttpStatusError"));

    let json = shield.recorder().to_json();
    assert_eq!(json["acme"]["fallback_triggered"], true);
    assert_eq!(json["acme"]["mode"], "auto");
}

#[tokio::test]
async fn test_auto_never_falls_back_on_security_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "http://169.254.169.254/latest"),
        )
        .mount(&server)
        .await;

    let shield = shield(&server, ScrapeMode::Auto);
    let err = shield
        .fetch_or_snapshot("acme", &url_for(&server, "/start"), &quick_retries(3), || {
            Ok::<_, std::io::Error>("stored".to_string())
        })
        .await
        .unwrap_err();

    match err {
        DispatchError::Live(e) => assert_eq!(e.reason_code(), "host_not_in_allowlist"),
        other => panic!("expected the live error, got {other}"),
    }
    assert!(!shield.recorder().provider("acme").unwrap().fallback_triggered);
}

#[tokio::test]
async fn test_provenance_written_to_configured_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("provenance.json");
    let mut config = test_config();
    config.output.provenance_path = Some(out.display().to_string());

    let shield = shield_with(&server, ScrapeMode::Live, config).with_config_hash("abc123");
    shield
        .fetch_text_with_retry("acme", &url_for(&server, "/jobs"), &quick_retries(1))
        .await
        .unwrap();

    assert_eq!(shield.write_provenance().unwrap(), Some(out.clone()));
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["acme"]["attempts_made"], 1);
    assert_eq!(written["acme"]["live_attempted"], true);
    assert_eq!(written["acme"]["policy_snapshot"]["config_hash"], "abc123");
    assert_eq!(written["acme"]["policy_snapshot"]["mode"], "live");
}
