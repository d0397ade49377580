//! Integration tests for the fetch client and rate gate.
//!
//! These tests run the client against a mock HTTP server and verify status
//! classification and the shared backoff behaviour on HTTP 429.

use std::time::{Duration, Instant};

use trackbatch_core::fetch::{FetchClient, FetchError, RateGate};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map_or(0, |requests| requests.len())
}

// ==================== Status Classification ====================

#[tokio::test]
async fn test_get_json_success_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":1,"title":"Song"}"#))
        .mount(&server)
        .await;

    let client = FetchClient::new(RateGate::new());
    let body = client
        .get_json(&format!("{}/tracks/1", server.uri()), &[])
        .await
        .expect("request should succeed");

    assert_eq!(body["title"], "Song");
}

#[tokio::test]
async fn test_post_json_created_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/playlists"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({"title": "mix"})))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"id":9}"#))
        .mount(&server)
        .await;

    let client = FetchClient::new(RateGate::new());
    let body = client
        .post_json(
            &format!("{}/playlists", server.uri()),
            &[],
            &serde_json::json!({"title": "mix"}),
        )
        .await
        .expect("201 should be accepted");

    assert_eq!(body["id"], 9);
}

#[tokio::test]
async fn test_headers_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "OAuth abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let client = FetchClient::new(RateGate::new());
    let result = client
        .get_json(
            &format!("{}/me", server.uri()),
            &[("Authorization", "OAuth abc")],
        )
        .await;

    assert!(result.is_ok(), "Header should match: {:?}", result.err());
}

#[tokio::test]
async fn test_non_success_status_keeps_body_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("track gone"))
        .mount(&server)
        .await;

    let client = FetchClient::new(RateGate::new());
    let err = client
        .get_json(&format!("{}/tracks/404", server.uri()), &[])
        .await
        .unwrap_err();

    match err {
        FetchError::Upstream { status, body, .. } => {
            assert_eq!(status, 404);
            assert_eq!(body, "track gone");
        }
        other => panic!("Expected Upstream, got {other:?}"),
    }
    assert_eq!(request_count(&server).await, 1, "4xx must not be retried");
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let client = FetchClient::new(RateGate::new());
    let err = client.get_json(&server.uri(), &[]).await.unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_invalid_json_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = FetchClient::new(RateGate::new());
    let err = client.get_json(&server.uri(), &[]).await.unwrap_err();

    assert!(matches!(err, FetchError::Parse { .. }), "Got: {err:?}");
}

// ==================== Rate Limiting ====================

#[tokio::test]
async fn test_rate_limited_call_waits_retry_after_plus_margin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/7"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tracks/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":7}"#))
        .mount(&server)
        .await;

    let gate = RateGate::new();
    let client = FetchClient::new(gate.clone());
    let started = Instant::now();
    let body = client
        .get_json(&format!("{}/tracks/7", server.uri()), &[])
        .await
        .expect("retry should succeed");

    assert_eq!(body["id"], 7);
    assert!(
        started.elapsed() >= Duration::from_secs(3),
        "Should wait Retry-After + 1s margin, waited {:?}",
        started.elapsed()
    );
    assert_eq!(request_count(&server).await, 2);
    assert_eq!(gate.episodes(), 1);
    assert!(gate.is_open());
}

#[tokio::test]
async fn test_concurrent_rate_limits_share_one_episode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "1")
                .set_delay(Duration::from_millis(300)),
        )
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let gate = RateGate::with_margin(Duration::from_millis(200));
    let client = FetchClient::new(gate.clone());
    let url = server.uri();

    let calls: Vec<_> = (0..3)
        .map(|_| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move { client.get_json(&url, &[]).await })
        })
        .collect();
    for handle in calls {
        let result = handle.await.expect("task should not panic");
        assert!(result.is_ok(), "Call should recover: {:?}", result.err());
    }

    assert_eq!(gate.episodes(), 1, "Concurrent 429s should close the gate once");
    assert_eq!(request_count(&server).await, 6);
}

#[tokio::test]
async fn test_rate_limit_exhaustion_escalates_to_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "0")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let gate = RateGate::with_margin(Duration::from_millis(10));
    let client = FetchClient::new(gate).with_max_attempts(2);
    let err = client.get_json(&server.uri(), &[]).await.unwrap_err();

    match err {
        FetchError::Upstream { status, body, .. } => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("Expected Upstream, got {other:?}"),
    }
    assert_eq!(request_count(&server).await, 2);
}
