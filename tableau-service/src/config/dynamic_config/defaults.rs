//! Default value functions for DynamicConfig.

use serde_json::{Map, Value, json};

use super::schemas::{OpenAiConfig, PipelineConfig, ServicesConfig};

// ==================== Top-level Section Defaults ====================

pub(crate) fn default_music_model() -> String {
    "facebook/musicgen-small".to_string()
}

pub(crate) fn default_bgm_duration() -> f64 {
    8.0
}

pub(crate) fn default_whisper_model() -> String {
    "base".to_string()
}

pub(crate) fn default_openai() -> OpenAiConfig {
    OpenAiConfig {
        api_key: None,
        base_url: default_openai_url(),
        model: default_openai_model(),
        img_and_voice_to_prompt: default_img_and_voice_to_prompt(),
        functions_prompt: None,
        json_fix_prompt: default_json_fix_prompt(),
        img_to_comment: default_img_to_comment(),
    }
}

pub(crate) fn default_sd_payload() -> Map<String, Value> {
    let payload = json!({
        "prompt": "masterpiece, best quality, ",
        "negative_prompt": "lowres, blurry, watermark",
        "init_images": [],
        "steps": 20,
        "cfg_scale": 7,
        "denoising_strength": 0.6
    });
    match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub(crate) fn default_services() -> ServicesConfig {
    ServicesConfig {
        stable_diffusion_url: default_stable_diffusion_url(),
        music_url: default_music_url(),
        transcription_url: default_transcription_url(),
    }
}

pub(crate) fn default_pipeline() -> PipelineConfig {
    PipelineConfig {
        prompt_generation: false,
        caption: false,
        img_prompt: String::new(),
        bgm_prompt: default_bgm_prompt(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

// ==================== OpenAI Defaults ====================

pub(crate) fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

pub(crate) fn default_openai_model() -> String {
    "gpt-4".to_string()
}

pub(crate) fn default_img_and_voice_to_prompt() -> String {
    "You turn a photo and a spoken request into two prompts: a Stable Diffusion \
     img2img prompt that restyles the photo, and a MusicGen prompt for matching \
     background music. The spoken request was: "
        .to_string()
}

pub(crate) fn default_json_fix_prompt() -> String {
    "The following function arguments are not valid JSON. Reply with the \
     corrected JSON object only: "
        .to_string()
}

pub(crate) fn default_img_to_comment() -> String {
    "Describe this picture in two sentences and add a short comment on its mood.".to_string()
}

// ==================== Service Endpoint Defaults ====================

pub(crate) fn default_stable_diffusion_url() -> String {
    "http://127.0.0.1:7860".to_string()
}

pub(crate) fn default_music_url() -> String {
    "http://127.0.0.1:7861".to_string()
}

pub(crate) fn default_transcription_url() -> String {
    "http://127.0.0.1:7862".to_string()
}

// ==================== Pipeline Defaults ====================

pub(crate) fn default_bgm_prompt() -> String {
    "calm ambient background music".to_string()
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    300
}
