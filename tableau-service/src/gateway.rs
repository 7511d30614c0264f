//! Model gateway: uniform capability calls over the external model services.
//!
//! Every call takes a fresh configuration snapshot, so endpoints, prompts and
//! model handles always reflect the latest committed configuration.

mod backends;
mod music;
mod openai;
mod stable_diffusion;
mod structured;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use strum::{Display, IntoStaticStr};
use tracing::{debug, warn};

use crate::audio::master_track;
use crate::codec::encode_payload;
use crate::config::{ConfigState, ConfigStore};
use crate::error::{BackendError, ServiceError, ServiceResult};

pub use backends::Backends;
pub use structured::PromptPair;

use backends::{ChatMessage, CompletionRequest, Img2ImgRequest, MusicRequest, TranscriptionRequest};
use stable_diffusion::build_img2img_payload;

/// The capabilities the gateway exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    Transcribe,
    CompleteStructured,
    GenerateImage,
    GenerateMusic,
    CaptionImage,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

pub struct ModelGateway {
    store: Arc<ConfigStore>,
    backends: Backends,
}

impl ModelGateway {
    pub fn new(store: Arc<ConfigStore>, backends: Backends) -> Self {
        Self { store, backends }
    }

    /// Speech to text. No retry.
    pub async fn transcribe(&self, audio: Vec<u8>) -> ServiceResult<String> {
        let state = self.store.snapshot();
        let request = TranscriptionRequest {
            endpoint: state.config().services.transcription_url.clone(),
            model: state.handles().transcription.name.clone(),
            audio,
        };

        self.guarded(Capability::Transcribe, &state, async {
            self.backends
                .transcriber
                .transcribe(request)
                .await
                .map_err(|e| ServiceError::backend(Capability::Transcribe, e))
        })
        .await
    }

    /// img2img from the configured base payload; returns the first image
    pub async fn generate_image(&self, prompt: &str, base_image: &[u8]) -> ServiceResult<Vec<u8>> {
        let state = self.store.snapshot();
        let payload =
            build_img2img_payload(&state.config().sd_payload, prompt, encode_payload(base_image));
        let request = Img2ImgRequest {
            endpoint: state.config().services.stable_diffusion_url.clone(),
            payload,
        };

        self.guarded(Capability::GenerateImage, &state, async {
            let images = self
                .backends
                .images
                .img2img(request)
                .await
                .map_err(|e| ServiceError::backend(Capability::GenerateImage, e))?;

            images.into_iter().next().ok_or_else(|| {
                ServiceError::backend(
                    Capability::GenerateImage,
                    BackendError::InvalidResponse {
                        message: "img2img returned no images".to_string(),
                    },
                )
            })
        })
        .await
    }

    /// Synthesize a track with the current music handle, then master it to WAV
    pub async fn generate_music(&self, prompt: &str) -> ServiceResult<Vec<u8>> {
        let state = self.store.snapshot();
        let model = state.handles().music.clone();
        let request = MusicRequest {
            endpoint: state.config().services.music_url.clone(),
            model: model.name.clone(),
            prompt: prompt.to_string(),
            duration_secs: model.duration_secs,
        };

        self.guarded(Capability::GenerateMusic, &state, async {
            let audio = self
                .backends
                .music
                .synthesize(request)
                .await
                .map_err(|e| ServiceError::backend(Capability::GenerateMusic, e))?;

            debug!(generation = model.generation, "Mastering music track");
            tokio::task::spawn_blocking(move || master_track(audio))
                .await
                .map_err(|e| ServiceError::Internal {
                    message: format!("Music post-processing task failed: {}", e),
                })?
                .map_err(|e| ServiceError::backend(Capability::GenerateMusic, e.into()))
        })
        .await
    }

    /// Free-text description of an image
    pub async fn caption_image(&self, image: &[u8]) -> ServiceResult<String> {
        let state = self.store.snapshot();
        let openai = &state.config().openai;
        let api_key = completion_api_key(&state)
            .map_err(|e| ServiceError::backend(Capability::CaptionImage, e))?;

        let request = CompletionRequest {
            endpoint: openai.base_url.clone(),
            api_key,
            model: openai.model.clone(),
            messages: vec![ChatMessage::user_with_image(
                openai.img_to_comment.clone(),
                &encode_payload(image),
            )],
            functions: None,
        };

        self.guarded(Capability::CaptionImage, &state, async {
            let reply = self
                .backends
                .completer
                .complete(request)
                .await
                .map_err(|e| ServiceError::backend(Capability::CaptionImage, e))?;

            reply
                .content
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .ok_or_else(|| {
                    ServiceError::backend(
                        Capability::CaptionImage,
                        BackendError::InvalidResponse {
                            message: "caption reply had no content".to_string(),
                        },
                    )
                })
        })
        .await
    }

    /// Run one capability call under the configured timeout, recording metrics
    async fn guarded<T, F>(
        &self,
        capability: Capability,
        state: &ConfigState,
        call: F,
    ) -> ServiceResult<T>
    where
        F: Future<Output = ServiceResult<T>>,
    {
        let timeout = state.config().pipeline.request_timeout();
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout {
                capability,
                secs: timeout.as_secs(),
            }),
        };

        record_call(capability, started.elapsed(), result.is_ok());
        if let Err(e) = &result {
            warn!(capability = %capability, error = %e, "Capability call failed");
        }
        result
    }
}

fn record_call(capability: Capability, elapsed: Duration, succeeded: bool) {
    histogram!("tableau_capability_duration_seconds", "capability" => capability.as_str())
        .record(elapsed.as_secs_f64());
    if !succeeded {
        counter!("tableau_capability_failures_total", "capability" => capability.as_str())
            .increment(1);
    }
}

/// API key from the credential handle, or an error before any call is made
fn completion_api_key(state: &ConfigState) -> Result<String, BackendError> {
    state
        .handles()
        .credential
        .api_key()
        .map(str::to_string)
        .ok_or(BackendError::MissingCredential)
}
