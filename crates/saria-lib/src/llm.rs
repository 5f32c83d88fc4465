//! Generation collaborator — Gemini `generateContent` client.
//!
//! The relay treats generation as an opaque call: no retries here, no
//! aborting an in-flight request. Voice turns carry the recorded audio
//! inline and the model both transcribes and answers in one round trip.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;
use tracing::debug;

use saria_core::error::RelayError;
use saria_core::types::GenerateRequest;

/// Priming text sent ahead of inline audio.
const VOICE_PROMPT: &str = "You are a helpful voice assistant. Transcribe and reply.";

/// Seam between the orchestrator and the generative-language backend.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> Result<String, RelayError>;
}

/// Gemini REST configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gemini-1.5-flash".into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        }
    }
}

pub struct GeminiClient {
    cfg: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(cfg: GeminiConfig) -> Self {
        Self {
            cfg,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.cfg.base_url, self.cfg.model, self.cfg.api_key
        )
    }

    fn request_body(req: &GenerateRequest) -> serde_json::Value {
        match req {
            GenerateRequest::Audio { bytes, mime_type } => json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": VOICE_PROMPT },
                        {
                            "inlineData": {
                                "mimeType": mime_type,
                                "data": BASE64.encode(bytes),
                            }
                        },
                    ],
                }],
            }),
            GenerateRequest::Text { message } => json!({
                "contents": [{ "role": "user", "parts": [{ "text": message }] }],
            }),
        }
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, req: GenerateRequest) -> Result<String, RelayError> {
        let body = Self::request_body(&req);
        let resp = self
            .http
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Generation(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(RelayError::Generation(format!("upstream {status}: {detail}")));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| RelayError::Generation(format!("invalid response: {e}")))?;

        let text = extract_reply(&value);
        debug!("generation: {} reply chars", text.len());
        Ok(text)
    }
}

/// Stitch the text parts of the first candidate — the model can return
/// several parts per reply.
fn extract_reply(value: &serde_json::Value) -> String {
    let Some(parts) = value
        .pointer("/candidates/0/content/parts")
        .and_then(|parts| parts.as_array())
    else {
        return String::new();
    };
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|text| text.as_str()))
        .collect::<String>()
        .trim()
        .to_string()
}
