//! Vision Language Model (VLM) client for chat-completion endpoints.
//!
//! Provides:
//! - Request building with one or more data-URI embedded PNGs
//! - A [`ChatTransport`] seam so scoring can be exercised without a network
//! - [`CurlTransport`], which shells out to `curl` with a bearer credential.
//!   The credential reaches curl through a config on stdin and the body
//!   through a temporary file, so neither shows up in the process list.
//!
//! # Configuration
//!
//! VLM settings can be configured via environment variables:
//! - `SCENE_VISION_VLM_ENDPOINT`: API endpoint URL
//! - `SCENE_VISION_VLM_MODEL`: Model name
//! - `SCENE_VISION_VLM_MAX_TOKENS`: Max tokens in response
//! - `SCENE_VISION_VLM_TIMEOUT`: Whole-request timeout (seconds)
//! - `SCENE_VISION_VLM_CONNECT_TIMEOUT`: Connection timeout (seconds)

use base64::Engine;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

use crate::config::VlmSettings;

/// Result type for VLM operations
pub type VlmResult<T> = Result<T, VlmError>;

/// Errors that can occur during VLM operations
#[derive(Debug, thiserror::Error)]
pub enum VlmError {
    /// Failed to reach the VLM endpoint
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Endpoint answered with a non-success status
    #[error("VLM API error: HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Request exceeded its time budget
    #[error("No response within {0:?}")]
    Timeout(Duration),
    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// The credential cannot be sent as a header
    #[error("API key contains control characters")]
    InvalidCredential,
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for VLM client
#[derive(Debug, Clone)]
pub struct VlmConfig {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name to use
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Timeout for initial connection (seconds)
    pub connection_timeout: u64,
    /// Timeout for the whole request (seconds)
    pub request_timeout: u64,
}

impl VlmConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::from_settings(&crate::config::Config::defaults().vlm)
        }
    }

    pub fn from_settings(settings: &VlmSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            connection_timeout: settings.connect_timeout,
            request_timeout: settings.request_timeout,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = seconds;
        self
    }
}

/// Sends a chat-completion request body and returns the raw response body
pub trait ChatTransport {
    fn send(&self, config: &VlmConfig, api_key: &str, body: &serde_json::Value) -> VlmResult<String>;
}

/// Build a chat-completion request: the prompt, then each PNG as a data URI
pub fn build_request(config: &VlmConfig, prompt: &str, images: &[&[u8]]) -> serde_json::Value {
    let mut content = vec![serde_json::json!({
        "type": "text",
        "text": prompt
    })];

    for image in images {
        let img_base64 = base64::engine::general_purpose::STANDARD.encode(image);
        content.push(serde_json::json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:image/png;base64,{}", img_base64),
                "detail": "high"
            }
        }));
    }

    serde_json::json!({
        "model": config.model,
        "messages": [{
            "role": "user",
            "content": content
        }],
        "max_tokens": config.max_tokens
    })
}

/// Pull the assistant text out of a chat-completion response body
pub fn extract_content(body: &str) -> VlmResult<String> {
    let response: serde_json::Value =
        serde_json::from_str(body).map_err(|e| VlmError::InvalidResponse(e.to_string()))?;

    if let Some(message) = response["error"]["message"].as_str() {
        return Err(VlmError::InvalidResponse(format!("service error: {}", message)));
    }

    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| VlmError::InvalidResponse("missing choices[0].message.content".to_string()))
}

/// Send a prompt with images and return the model's text answer
pub fn analyze_images<T: ChatTransport + ?Sized>(
    transport: &T,
    config: &VlmConfig,
    api_key: &str,
    prompt: &str,
    images: &[&[u8]],
) -> VlmResult<String> {
    let request = build_request(config, prompt, images);
    debug!(endpoint = %config.endpoint, model = %config.model, images = images.len(), "sending VLM request");
    let body = transport.send(config, api_key, &request)?;
    extract_content(&body)
}

/// Transport that runs `curl`
#[derive(Debug, Clone, Default)]
pub struct CurlTransport;

/// Marker curl prints after the body so the status code can be split off
const STATUS_MARKER: &str = "\n__SCENE_VISION_STATUS__:";

/// curl config text carrying the bearer header, read from stdin with `--config -`
fn curl_auth_config(api_key: &str) -> VlmResult<String> {
    if api_key.chars().any(char::is_control) {
        return Err(VlmError::InvalidCredential);
    }
    let escaped = api_key.replace('\\', "\\\\").replace('"', "\\\"");
    Ok(format!("header = \"Authorization: Bearer {}\"\n", escaped))
}

fn curl_args(config: &VlmConfig, body_path: &std::path::Path) -> Vec<String> {
    vec![
        "-s".to_string(),
        "-X".to_string(),
        "POST".to_string(),
        config.endpoint.clone(),
        "-H".to_string(),
        "Content-Type: application/json".to_string(),
        "--config".to_string(),
        "-".to_string(),
        "--data-binary".to_string(),
        format!("@{}", body_path.display()),
        "--connect-timeout".to_string(),
        config.connection_timeout.to_string(),
        "--max-time".to_string(),
        config.request_timeout.to_string(),
        "-w".to_string(),
        format!("{}%{{http_code}}", STATUS_MARKER),
    ]
}

impl ChatTransport for CurlTransport {
    fn send(&self, config: &VlmConfig, api_key: &str, body: &serde_json::Value) -> VlmResult<String> {
        let auth = curl_auth_config(api_key)?;
        let mut body_file = tempfile::NamedTempFile::new()?;
        serde_json::to_writer(&mut body_file, body).map_err(|e| VlmError::InvalidResponse(e.to_string()))?;
        body_file.flush()?;

        let mut child = Command::new("curl")
            .args(curl_args(config, body_file.path()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(auth.as_bytes()),
            None => Ok(()),
        };
        // Reap the child before reporting a failed write
        let output = child.wait_with_output()?;
        written?;

        // curl exit code 28: operation timed out
        if output.status.code() == Some(28) {
            return Err(VlmError::Timeout(Duration::from_secs(config.request_timeout)));
        }
        if !output.status.success() {
            return Err(VlmError::ConnectionFailed(format!(
                "curl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (response, status) = stdout
            .rsplit_once(STATUS_MARKER)
            .ok_or_else(|| VlmError::InvalidResponse("missing HTTP status".to_string()))?;
        let status: u16 = status.trim().parse().unwrap_or(0);

        if !(200..300).contains(&status) {
            return Err(VlmError::Http {
                status,
                body: response.chars().take(500).collect(),
            });
        }

        Ok(response.to_string())
    }
}
