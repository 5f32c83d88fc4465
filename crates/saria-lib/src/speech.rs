//! Speech collaborator — Google Translate TTS client.
//!
//! The translate endpoint caps request length, so long replies are fetched
//! per chunk and the MP3 payloads concatenated (frame-aligned MP3 streams
//! play back to back). Failures here are reported to the orchestrator,
//! which logs them and carries on without audio.

use async_trait::async_trait;
use tracing::debug;

use saria_core::error::RelayError;
use saria_core::text_prep::{MAX_SPEECH_CHUNK_LEN, split_for_speech};

const TRANSLATE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Seam between the orchestrator and the speech backend.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` in language `lang` (BCP-47 primary tag), returning
    /// encoded audio bytes.
    async fn synthesize(&self, text: &str, lang: &str) -> Result<Vec<u8>, RelayError>;
}

/// Unofficial Google Translate TTS endpoint, MP3 output.
#[derive(Default)]
pub struct TranslateTts {
    http: reqwest::Client,
}

impl TranslateTts {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Synthesizer for TranslateTts {
    async fn synthesize(&self, text: &str, lang: &str) -> Result<Vec<u8>, RelayError> {
        let chunks = split_for_speech(text, MAX_SPEECH_CHUNK_LEN);
        let mut audio = Vec::new();

        for chunk in &chunks {
            let resp = self
                .http
                .get(TRANSLATE_TTS_URL)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", lang),
                    ("q", chunk.as_str()),
                ])
                .send()
                .await
                .map_err(|e| RelayError::Speech(format!("request failed: {e}")))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(RelayError::Speech(format!("endpoint returned {status}")));
            }

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| RelayError::Speech(format!("body read failed: {e}")))?;
            audio.extend_from_slice(&bytes);
        }

        debug!(
            "speech: {} bytes from {} chunk(s) ({lang})",
            audio.len(),
            chunks.len()
        );
        Ok(audio)
    }
}
