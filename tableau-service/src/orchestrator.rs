//! Per-request pipeline: Intake, Dispatch, Assemble.
//!
//! Intake decodes the payloads and transcribes the optional voice clip. The
//! prompt step either asks the completion service for prompts or takes the
//! configured ones. Dispatch runs image and music generation as one try-join;
//! the first failure drops the other future. Assemble adds the optional caption.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Deserialize;
use strum::Display;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::codec::decode_payload;
use crate::config::ConfigStore;
use crate::error::{ServiceError, ServiceResult};
use crate::gateway::{ModelGateway, PromptPair};

/// Body of a generation request, base64 payloads as sent by clients
#[derive(Debug, Default, Deserialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub img: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug)]
pub struct GenerationResult {
    pub image: Vec<u8>,
    /// 16-bit PCM WAV
    pub audio: Vec<u8>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Copy, Display)]
#[strum(serialize_all = "snake_case")]
enum Stage {
    Intake,
    Prompt,
    Dispatch,
    Assemble,
}

/// Decoded inputs ready for dispatch
struct Intake {
    base_image: Vec<u8>,
    transcript: Option<String>,
}

pub struct Orchestrator {
    gateway: ModelGateway,
    store: Arc<ConfigStore>,
}

impl Orchestrator {
    pub fn new(gateway: ModelGateway, store: Arc<ConfigStore>) -> Self {
        Self { gateway, store }
    }

    pub async fn generate(&self, request: GenerationRequest) -> ServiceResult<GenerationResult> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let result = self
            .run(request)
            .instrument(info_span!("generate", %request_id))
            .await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!("tableau_generations_total", "outcome" => outcome).increment(1);
        histogram!("tableau_generation_duration_seconds").record(started.elapsed().as_secs_f64());

        result
    }

    async fn run(&self, request: GenerationRequest) -> ServiceResult<GenerationResult> {
        debug!(stage = %Stage::Intake, voice = request.voice.is_some(), "Generation started");
        let intake = self.intake(request).await?;

        // One snapshot for the request's pipeline switches
        let pipeline = self.store.snapshot().config().pipeline.clone();

        debug!(stage = %Stage::Prompt, generated = pipeline.prompt_generation);
        let prompts = match (&intake.transcript, pipeline.prompt_generation) {
            (Some(transcript), true) => self.gateway.complete_structured(transcript).await?,
            _ => PromptPair {
                img_prompt: pipeline.img_prompt,
                bgm_prompt: pipeline.bgm_prompt,
            },
        };

        debug!(
            stage = %Stage::Dispatch,
            img_prompt = %prompts.img_prompt,
            bgm_prompt = %prompts.bgm_prompt
        );
        let (image, audio) = futures::future::try_join(
            self.gateway
                .generate_image(&prompts.img_prompt, &intake.base_image),
            self.gateway.generate_music(&prompts.bgm_prompt),
        )
        .await?;

        debug!(stage = %Stage::Assemble, caption = pipeline.caption);
        let caption = if pipeline.caption {
            Some(self.gateway.caption_image(&image).await?)
        } else {
            None
        };

        info!(
            image_bytes = image.len(),
            audio_bytes = audio.len(),
            captioned = caption.is_some(),
            "Generation completed"
        );
        Ok(GenerationResult {
            image,
            audio,
            caption,
        })
    }

    /// Decode both payloads before any model is called, then transcribe
    async fn intake(&self, request: GenerationRequest) -> ServiceResult<Intake> {
        let img = request
            .img
            .as_deref()
            .filter(|img| !img.trim().is_empty())
            .ok_or_else(|| ServiceError::InvalidRequest {
                message: "`img` is required".to_string(),
            })?;
        let base_image = decode_payload("img", img)?;

        let voice = request
            .voice
            .as_deref()
            .filter(|voice| !voice.trim().is_empty())
            .map(|voice| decode_payload("voice", voice))
            .transpose()?;

        let transcript = match voice {
            Some(audio) => {
                let text = self.gateway.transcribe(audio).await?;
                debug!(transcript = %text, "Voice transcribed");
                Some(text)
            }
            None => None,
        };

        Ok(Intake {
            base_image,
            transcript,
        })
    }
}
