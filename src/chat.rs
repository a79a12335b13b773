//! Text chat over the generateContent endpoint.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ChatSettings;
use crate::error::AssistantError;
use crate::protocol::{Content, ServerPart};

/// Reply used when the model answers with no text at all.
pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't process that. Please try again.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ServerPart>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Text parts of the first candidate, joined.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

fn classify_failure(status: u16, body: &str) -> AssistantError {
    let lower = body.to_ascii_lowercase();
    if matches!(status, 401 | 403)
        || lower.contains("api key not valid")
        || lower.contains("api_key_invalid")
        || body.contains("Requested entity was not found")
    {
        AssistantError::Credential(format!("HTTP {}: {}", status, body.trim()))
    } else {
        AssistantError::Unavailable(format!("HTTP Error: {}", status))
    }
}

/// Stateless chat client. Each call builds its own HTTP client so the key
/// resolved for that call is the one used.
pub struct ChatClient {
    settings: ChatSettings,
}

impl ChatClient {
    pub fn new(settings: ChatSettings) -> Self {
        Self { settings }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }

    /// Prior turns followed by the new user turn.
    pub fn request(&self, message: &str, mut history: Vec<Content>) -> GenerateRequest {
        history.push(Content::text(Some("user"), message));
        GenerateRequest {
            contents: history,
            system_instruction: Content::text(None, self.settings.system_instruction.clone()),
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
            },
        }
    }

    pub async fn reply(
        &self,
        api_key: Option<String>,
        message: &str,
        history: Vec<Content>,
    ) -> Result<String, AssistantError> {
        let api_key =
            api_key.ok_or_else(|| AssistantError::Credential("no API key selected".into()))?;
        let body = self.request(message, history);
        let client = Client::new();

        log::info!(
            "Sending chat request to {} ({} prior turns)",
            self.settings.model,
            body.contents.len() - 1
        );

        let resp = client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Unavailable(format!("Request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let err = classify_failure(status.as_u16(), &text);
            log::warn!("Chat request failed: {}", err);
            return Err(err);
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| AssistantError::Unavailable(format!("JSON parse error: {}", e)))?;

        let text = parsed.text();
        if text.trim().is_empty() {
            return Ok(FALLBACK_REPLY.to_string());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn settings(base_url: &str) -> ChatSettings {
        ChatSettings {
            base_url: base_url.to_string(),
            model: "test-model".to_string(),
            temperature: 0.7,
            system_instruction: "You are a school assistant.".to_string(),
        }
    }

    fn header_end(raw: &[u8]) -> Option<usize> {
        raw.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// One-shot HTTP server; yields the raw request it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/v1beta", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if let Some(end) = header_end(&raw) {
                    let head = String::from_utf8_lossy(&raw[..end]).to_string();
                    if raw.len() >= end + content_length(&head) {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8(raw).unwrap()
        });
        (base, handle)
    }

    #[test]
    fn request_appends_user_turn_after_history() {
        let client = ChatClient::new(settings("https://example.test/v1beta"));
        let history = vec![Content::text(Some("model"), "Welcome!")];
        let json = serde_json::to_value(client.request("Admission dates?", history)).unwrap();

        assert_eq!(json["contents"][0]["role"], "model");
        assert_eq!(json["contents"][1]["role"], "user");
        assert_eq!(json["contents"][1]["parts"][0]["text"], "Admission dates?");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You are a school assistant.");
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/test-model:generateContent"
        );
    }

    #[test]
    fn failures_are_classified() {
        assert!(classify_failure(403, "").is_credential());
        assert!(classify_failure(400, r#"{"error":{"message":"API key not valid."}}"#).is_credential());
        assert!(classify_failure(404, "Requested entity was not found.").is_credential());
        assert!(matches!(
            classify_failure(503, "overloaded"),
            AssistantError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = ChatClient::new(settings("http://127.0.0.1:9"));
        let err = client.reply(None, "hi", Vec::new()).await.unwrap_err();
        assert!(err.is_credential());
    }

    #[tokio::test]
    async fn reply_joins_text_parts_of_first_candidate() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Classes start "},{"text":"at 8 AM."}]}}]}"#,
        )
        .await;
        let client = ChatClient::new(settings(&base));

        let reply = client
            .reply(Some("secret".into()), "When do classes start?", Vec::new())
            .await
            .unwrap();
        assert_eq!(reply, "Classes start at 8 AM.");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1beta/models/test-model:generateContent"));
        assert!(raw.to_ascii_lowercase().contains("x-goog-api-key: secret"));
        let body: Value = serde_json::from_str(&raw[header_end(raw.as_bytes()).unwrap()..]).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "When do classes start?");
    }

    #[tokio::test]
    async fn empty_reply_uses_fallback_text() {
        let (base, _server) = serve_once("200 OK", r#"{"candidates":[]}"#).await;
        let client = ChatClient::new(settings(&base));
        let reply = client.reply(Some("k".into()), "hello", Vec::new()).await.unwrap();
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn rejected_key_is_a_credential_error() {
        let (base, _server) = serve_once(
            "400 Bad Request",
            r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#,
        )
        .await;
        let client = ChatClient::new(settings(&base));
        let err = client.reply(Some("bad".into()), "hello", Vec::new()).await.unwrap_err();
        assert!(err.is_credential(), "{}", err);
        assert_eq!(err.user_message(), "Please select a valid API key to continue.");
    }
}
