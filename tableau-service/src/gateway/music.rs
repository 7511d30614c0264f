use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::audio::{RawAudio, decode_wav};
use crate::error::BackendError;

use super::backends::{MusicRequest, MusicSynthesizer, endpoint_url, ensure_success};

/// Music synthesis service client.
///
/// `POST {music_url}/generate` with `{ model, prompt, duration }`; the service
/// answers with the raw track as a WAV body.
pub struct MusicGenClient {
    client: Client,
}

impl MusicGenClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    duration: f64,
}

#[async_trait]
impl MusicSynthesizer for MusicGenClient {
    async fn synthesize(&self, request: MusicRequest) -> Result<RawAudio, BackendError> {
        let url = endpoint_url(&request.endpoint, "generate");

        let response = self
            .client
            .post(&url)
            .json(&GenerateBody {
                model: &request.model,
                prompt: &request.prompt,
                duration: request.duration_secs,
            })
            .send()
            .await
            .map_err(|e| BackendError::Connection {
                url: url.clone(),
                source: e,
            })?;
        let response = ensure_success(response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                message: e.to_string(),
            })?;

        let audio = decode_wav(&bytes)?;
        debug!(
            model = %request.model,
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            duration_secs = audio.duration_secs(),
            "Music track received"
        );
        Ok(audio)
    }
}
