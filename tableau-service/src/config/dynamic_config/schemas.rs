//! Configuration struct definitions for DynamicConfig sections.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI-compatible completion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Empty or null falls back to the OPENAI_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "super::defaults::default_openai_url")]
    pub base_url: String,

    #[serde(default = "super::defaults::default_openai_model")]
    pub model: String,

    /// Prepended to the transcript when asking for image and music prompts
    #[serde(default = "super::defaults::default_img_and_voice_to_prompt")]
    pub img_and_voice_to_prompt: String,

    /// Function definitions sent with the prompt request.
    /// Derived from the prompt reply type when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions_prompt: Option<serde_json::Value>,

    /// Prepended to a malformed function-call payload in the repair round
    #[serde(default = "super::defaults::default_json_fix_prompt")]
    pub json_fix_prompt: String,

    #[serde(default = "super::defaults::default_img_to_comment")]
    pub img_to_comment: String,
}

/// Endpoints of the external model services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "super::defaults::default_stable_diffusion_url")]
    pub stable_diffusion_url: String,

    #[serde(default = "super::defaults::default_music_url")]
    pub music_url: String,

    #[serde(default = "super::defaults::default_transcription_url")]
    pub transcription_url: String,
}

/// Request pipeline switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ask the completion service for image and music prompts before dispatch
    #[serde(default)]
    pub prompt_generation: bool,

    /// Attach a caption of the generated image to the response
    #[serde(default)]
    pub caption: bool,

    /// Image prompt used when prompt generation is off
    #[serde(default)]
    pub img_prompt: String,

    /// Music prompt used when prompt generation is off
    #[serde(default = "super::defaults::default_bgm_prompt")]
    pub bgm_prompt: String,

    /// Upper bound for each individual model call
    #[serde(default = "super::defaults::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
