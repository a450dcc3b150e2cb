//! Transport-level retry and classification behavior against a mock
//! upstream.

use std::time::Duration;

use llm_router::error::RouterError;
use llm_router::health::HealthMetrics;
use llm_router::transport::{HttpTransport, TransportConfig};
use llm_router::types::ProviderId;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_transport(max_retries: u32) -> HttpTransport {
    HttpTransport::new(
        TransportConfig::new()
            .with_max_retries(max_retries)
            .with_backoff_unit(Duration::from_millis(10))
            .with_rate_limit_fallback(Duration::from_millis(10)),
    )
}

#[tokio::test]
async fn rate_limit_honors_retry_after_and_attempt_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/things"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "1")
                .set_body_string("slow down"),
        )
        .expect(3) // initial attempt + 2 retries, no more
        .mount(&server)
        .await;

    let transport = fast_transport(2);
    let health = HealthMetrics::new();
    let url = format!("{}/v1/things", server.uri());

    let started = std::time::Instant::now();
    let err = transport
        .execute(&health, |client| client.post(&url))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RouterError::RateLimited {
            retry_after: Some(after),
            ..
        } if after == Duration::from_secs(1)
    ));
    // Two sleeps of the advertised one second each.
    assert!(started.elapsed() >= Duration::from_secs(2));

    let snap = health.snapshot(ProviderId::OpenAi);
    assert_eq!(snap.request_count, 3);
    assert_eq!(snap.error_count, 3);
}

#[tokio::test]
async fn authentication_failures_are_never_retried() {
    for status in [401u16, 403] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = fast_transport(3);
        let health = HealthMetrics::new();
        let url = server.uri();

        let err = transport
            .execute(&health, |client| client.post(&url))
            .await
            .unwrap_err();

        assert!(matches!(err, RouterError::Authentication(_)), "{status}");
        let snap = health.snapshot(ProviderId::OpenAi);
        assert_eq!(snap.request_count, 1);
        assert_eq!(snap.error_count, 1);
    }
}

#[tokio::test]
async fn server_errors_retry_then_surface_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;

    let transport = fast_transport(2);
    let health = HealthMetrics::new();
    let url = server.uri();

    let err = transport
        .execute(&health, |client| client.post(&url))
        .await
        .unwrap_err();

    match err {
        RouterError::Upstream { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert_eq!(health.snapshot(ProviderId::OpenAi).error_count, 3);
}

#[tokio::test]
async fn transient_failure_recovers_within_the_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = fast_transport(3);
    let health = HealthMetrics::new();
    let url = server.uri();

    let value = transport
        .execute_json(&health, |client| client.post(&url))
        .await
        .unwrap();

    assert_eq!(value["ok"], true);
    let snap = health.snapshot(ProviderId::OpenAi);
    assert_eq!(snap.request_count, 3);
    assert_eq!(snap.error_count, 2);
}

#[tokio::test]
async fn per_attempt_timeout_counts_as_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(
        TransportConfig::new()
            .with_max_retries(0)
            .with_timeout(Duration::from_millis(50)),
    );
    let health = HealthMetrics::new();
    let url = server.uri();

    let err = transport
        .execute(&health, |client| client.post(&url))
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::Transport(_)));
    assert!(err.is_retryable());
    let snap = health.snapshot(ProviderId::OpenAi);
    assert_eq!(snap.request_count, 1);
    assert_eq!(snap.error_count, 1);
}

#[tokio::test]
async fn unparseable_success_body_is_a_json_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = fast_transport(2);
    let health = HealthMetrics::new();
    let url = server.uri();

    let err = transport
        .execute_json(&health, |client| client.post(&url))
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::Json(_)));
    // One physical attempt, one recorded failure for the bad body.
    let snap = health.snapshot(ProviderId::OpenAi);
    assert_eq!(snap.request_count, 1);
    assert_eq!(snap.error_count, 1);
}
