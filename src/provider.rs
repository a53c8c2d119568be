use anyhow::{Context, Result};
use serde::Deserialize;

/// Remote voice synthesis backend. Implemented over HTTP in production and by
/// a call-recording fake in tests.
pub trait VoiceProvider: Send + Sync {
    /// Creates a voice clone from a raw audio sample, returning the
    /// provider-side voice id. Clones count against a provider capacity
    /// limit, so temporary clones must be deleted after use.
    fn clone_voice(&self, name: &str, sample: &[u8]) -> Result<String>;

    fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;

    /// Best-effort removal of a provider-side voice slot.
    fn delete_voice(&self, voice_id: &str) -> Result<()>;
}

pub struct HttpVoiceProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct CloneResponse {
    voice_id: String,
}

impl HttpVoiceProvider {
    pub fn new(
        client: reqwest::blocking::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl VoiceProvider for HttpVoiceProvider {
    fn clone_voice(&self, name: &str, sample: &[u8]) -> Result<String> {
        let url = format!("{}/v1/voices/add", self.base_url);
        let form = reqwest::blocking::multipart::Form::new()
            .text("name", name.to_string())
            .part(
                "files",
                reqwest::blocking::multipart::Part::bytes(sample.to_vec())
                    .file_name("sample.mp3")
                    .mime_str("audio/mpeg")
                    .context("build sample part")?,
            );
        let resp: CloneResponse = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("clone voice '{name}'"))?
            .json()
            .context("decode clone response")?;
        tracing::info!(voice_id = %resp.voice_id, name = %name, "voice cloned");
        Ok(resp.voice_id)
    }

    fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/v1/text-to-speech/{voice_id}", self.base_url);
        let bytes = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("synthesize with voice {voice_id}"))?
            .bytes()
            .context("read synthesized audio")?;
        Ok(bytes.to_vec())
    }

    fn delete_voice(&self, voice_id: &str) -> Result<()> {
        let url = format!("{}/v1/voices/{voice_id}", self.base_url);
        self.client
            .delete(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("delete voice {voice_id}"))?;
        tracing::info!(voice_id = %voice_id, "voice deleted");
        Ok(())
    }
}
