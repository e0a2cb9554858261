// Chat-completion client for OpenAI-compatible APIs (Groq by default).
//
// One request per quiz: a system and a user message go out with JSON output
// requested, and the text of the first choice comes back. No streaming and no
// retries.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_TEMPERATURE: f64 = 1.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("No content received from AI")]
    EmptyContent,

    #[error("Malformed API response: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// ChatCompletion seam
// ---------------------------------------------------------------------------

/// Anything that can turn a system + user prompt into completion text.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Connection settings for the completion provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub api_url: String,
    pub model: String,
    pub temperature: f64,
    pub api_key: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// GroqClient
// ---------------------------------------------------------------------------

pub struct GroqClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl GroqClient {
    pub fn new(api_key: String, settings: &ChatSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: settings.api_url.clone(),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }

    fn request_body(&self, system: &str, user: &str) -> Value {
        serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        })
    }
}

#[async_trait]
impl ChatCompletion for GroqClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        debug!(model = %self.model, url = %self.api_url, "requesting chat completion");

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(system, user))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "chat completion failed");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        extract_content(&body)
    }
}

/// Pull `choices[0].message.content` out of a completion response.
pub(crate) fn extract_content(body: &Value) -> Result<String, LlmError> {
    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(LlmError::EmptyContent)
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// Either a live provider client or disabled for lack of an API key.
pub enum LlmClient {
    Active(GroqClient),
    Disabled,
}

impl LlmClient {
    /// `Active` when an API key is present, otherwise `Disabled`.
    pub fn from_settings(settings: &ChatSettings) -> Self {
        match &settings.api_key {
            Some(key) if !key.is_empty() => LlmClient::Active(GroqClient::new(key.clone(), settings)),
            _ => LlmClient::Disabled,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LlmClient::Active(_))
    }
}

#[async_trait]
impl ChatCompletion for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        match self {
            LlmClient::Active(client) => client.complete(system, user).await,
            LlmClient::Disabled => Err(LlmError::NotConfigured),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn settings(api_url: String, key: Option<&str>) -> ChatSettings {
        ChatSettings {
            api_url,
            api_key: key.map(String::from),
            ..ChatSettings::default()
        }
    }

    /// Read one HTTP request (headers plus a Content-Length body).
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serve a single canned response and hand back the raw request.
    async fn mock_server(status_line: &'static str, body: String) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            let _ = tx.send(request);
        });

        (format!("http://{addr}/openai/v1/chat/completions"), rx)
    }

    // -- extract_content --

    #[test]
    fn extracts_first_choice_content() {
        let body = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "{\"questions\":[]}" } },
                { "message": { "role": "assistant", "content": "ignored" } }
            ]
        });
        assert_eq!(extract_content(&body).unwrap(), "{\"questions\":[]}");
    }

    #[test]
    fn missing_or_empty_content_is_an_error() {
        for body in [
            serde_json::json!({}),
            serde_json::json!({ "choices": [] }),
            serde_json::json!({ "choices": [{ "message": {} }] }),
            serde_json::json!({ "choices": [{ "message": { "content": "" } }] }),
        ] {
            let err = extract_content(&body).unwrap_err();
            assert!(matches!(err, LlmError::EmptyContent));
            assert_eq!(err.to_string(), "No content received from AI");
        }
    }

    // -- LlmClient construction --

    #[test]
    fn from_settings_with_key_is_active() {
        let client = LlmClient::from_settings(&settings(DEFAULT_API_URL.into(), Some("gsk_test")));
        assert!(client.is_active());
    }

    #[test]
    fn from_settings_without_or_with_empty_key_is_disabled() {
        assert!(!LlmClient::from_settings(&settings(DEFAULT_API_URL.into(), None)).is_active());
        assert!(!LlmClient::from_settings(&settings(DEFAULT_API_URL.into(), Some(""))).is_active());
    }

    #[tokio::test]
    async fn disabled_client_refuses() {
        let err = LlmClient::Disabled.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
    }

    // -- Mock provider --

    #[tokio::test]
    async fn mock_provider_round_trip() {
        let reply = serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "{\"quiz_id\":\"x\"}" } }]
        })
        .to_string();
        let (url, request_rx) = mock_server("200 OK", reply).await;

        let client = LlmClient::from_settings(&settings(url, Some("gsk_test")));
        let content = client.complete("system text", "user text").await.unwrap();
        assert_eq!(content, "{\"quiz_id\":\"x\"}");

        let request = request_rx.await.unwrap();
        assert!(request.starts_with("POST /openai/v1/chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer gsk_test"));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["temperature"], 1.0);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "system text");
        assert_eq!(body["messages"][1]["content"], "user text");
    }

    #[tokio::test]
    async fn provider_error_status_is_reported() {
        let (url, _rx) = mock_server(
            "429 Too Many Requests",
            r#"{"error":{"message":"rate limited"}}"#.to_string(),
        )
        .await;

        let client = LlmClient::from_settings(&settings(url, Some("gsk_test")));
        match client.complete("s", "u").await.unwrap_err() {
            LlmError::Status { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("rate limited"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_reply_without_content() {
        let (url, _rx) = mock_server("200 OK", r#"{"choices":[]}"#.to_string()).await;
        let client = LlmClient::from_settings(&settings(url, Some("gsk_test")));
        assert!(matches!(
            client.complete("s", "u").await.unwrap_err(),
            LlmError::EmptyContent
        ));
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let client = LlmClient::from_settings(&settings(format!("http://{addr}"), Some("k")));
        assert!(matches!(
            client.complete("s", "u").await.unwrap_err(),
            LlmError::Transport(_)
        ));
    }
}
