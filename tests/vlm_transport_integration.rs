//! Integration tests for the curl transport against a local HTTP server

use std::process::Command;

use httpmock::prelude::*;
use serde_json::json;

use scene_vision::oracle::vision::SERVICE_UNAVAILABLE_ISSUE;
use scene_vision::vlm::{CurlTransport, VlmConfig, VlmError, analyze_images};
use scene_vision::{ComparisonContext, ComparisonOracle, Severity, VisionOracle};

fn curl_available() -> bool {
    Command::new("curl").arg("--version").output().is_ok()
}

fn config(server: &MockServer) -> VlmConfig {
    VlmConfig::new(server.url("/v1/chat/completions"))
        .model("test-vision")
        .request_timeout(10)
}

#[test]
fn test_curl_transport_posts_and_reads_content() {
    if !curl_available() {
        eprintln!("curl not found, skipping");
        return;
    }
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer test-key");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": "Layout looks excellent."}}]
            }));
    });

    let text = analyze_images(&CurlTransport, &config(&server), "test-key", "Describe.", &[b"png".as_slice()])
        .expect("analysis");

    mock.assert();
    assert_eq!(text, "Layout looks excellent.");
}

#[test]
fn test_curl_transport_sends_escaped_credential_and_body() {
    if !curl_available() {
        eprintln!("curl not found, skipping");
        return;
    }
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", r#"Bearer sk-"quoted"\slash"#)
            .body_includes(r#""model":"test-vision""#);
        then.status(200)
            .json_body(json!({"choices": [{"message": {"content": "Fine."}}]}));
    });

    let text = analyze_images(
        &CurlTransport,
        &config(&server),
        r#"sk-"quoted"\slash"#,
        "Describe.",
        &[b"png".as_slice()],
    )
    .expect("analysis");

    mock.assert();
    assert_eq!(text, "Fine.");
}

#[test]
fn test_curl_transport_reports_http_status() {
    if !curl_available() {
        eprintln!("curl not found, skipping");
        return;
    }
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(503).body("Service Unavailable");
    });

    let err = analyze_images(&CurlTransport, &config(&server), "test-key", "Describe.", &[b"png".as_slice()])
        .unwrap_err();
    match err {
        VlmError::Http { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "Service Unavailable");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_vision_oracle_degrades_on_server_error() {
    if !curl_available() {
        eprintln!("curl not found, skipping");
        return;
    }
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(500).body("boom");
    });

    let oracle = VisionOracle::new(CurlTransport, config(&server), Some("test-key".to_string()));
    let result = oracle.compare(b"current", Some(b"baseline".as_slice()), &ComparisonContext::new("home", "chromium"));

    mock.assert();
    assert!(!result.is_valid());
    assert_eq!(result.score(), 0);
    assert_eq!(result.issues(), &[SERVICE_UNAVAILABLE_ISSUE.to_string()]);
    assert_eq!(result.severity, Severity::Critical);
}

#[test]
fn test_vision_oracle_treats_malformed_body_as_failure() {
    if !curl_available() {
        eprintln!("curl not found, skipping");
        return;
    }
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200).body("<html>not json</html>");
    });

    let oracle = VisionOracle::new(CurlTransport, config(&server), Some("test-key".to_string()));
    let result = oracle.analyze_quality(b"current");
    assert_eq!(result.score, 0);
    assert!(result.analysis_text.starts_with("AI analysis failed: Invalid response"));
}
