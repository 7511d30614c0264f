//! Dynamic configuration that can be updated at runtime via API.
//!
//! The persisted document is an open JSON object. `DynamicConfig` is the typed
//! view over its well-known keys; unknown keys are carried along untouched.

mod defaults;
mod keys;
mod merging;
mod schemas;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use keys::{HandleKind, ReloadTrigger, TYPED_SECTIONS};
pub use merging::{Patch, fill_missing, merge_patch};

use schemas::{OpenAiConfig, PipelineConfig, ServicesConfig};

use defaults::{
    default_bgm_duration, default_music_model, default_openai, default_pipeline,
    default_sd_payload, default_services, default_whisper_model,
};

/// Typed view of the configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicConfig {
    #[serde(default = "default_music_model")]
    pub music_model: String,

    /// Generated track length in seconds
    #[serde(rename = "BGM_duration", default = "default_bgm_duration")]
    pub bgm_duration: f64,

    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,

    #[serde(default = "default_openai")]
    pub openai: OpenAiConfig,

    /// Base img2img payload
    #[serde(default = "default_sd_payload")]
    pub sd_payload: Map<String, Value>,

    #[serde(default = "default_services")]
    pub services: ServicesConfig,

    #[serde(default = "default_pipeline")]
    pub pipeline: PipelineConfig,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            music_model: default_music_model(),
            bgm_duration: default_bgm_duration(),
            whisper_model: default_whisper_model(),
            openai: default_openai(),
            sd_payload: default_sd_payload(),
            services: default_services(),
            pipeline: default_pipeline(),
        }
    }
}

impl DynamicConfig {
    /// Parse the typed view out of a configuration document
    pub fn from_document(document: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let config: DynamicConfig = serde_json::from_value(Value::Object(document.clone()))?;
        if !config.bgm_duration.is_finite() || config.bgm_duration <= 0.0 {
            return Err(serde::de::Error::custom(
                "BGM_duration must be a positive number of seconds",
            ));
        }
        if config.pipeline.request_timeout_secs == 0 {
            return Err(serde::de::Error::custom(
                "pipeline.request_timeout_secs must be at least 1",
            ));
        }
        Ok(config)
    }

    /// The built-in document written when no configuration file exists
    pub fn default_document() -> Map<String, Value> {
        match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_document_round_trips() {
        let document = DynamicConfig::default_document();
        assert!(document.contains_key("BGM_duration"));
        assert!(document.contains_key("sd_payload"));
        assert!(!document["openai"].as_object().unwrap().contains_key("functions_prompt"));

        let parsed = DynamicConfig::from_document(&document).unwrap();
        assert_eq!(parsed.whisper_model, "base");
        assert_eq!(parsed.pipeline.request_timeout_secs, 300);
    }

    #[test]
    fn test_unknown_keys_are_ignored_by_typed_view() {
        let mut document = DynamicConfig::default_document();
        document.insert("theme".to_string(), json!("dark"));
        assert!(DynamicConfig::from_document(&document).is_ok());
    }

    #[test]
    fn test_wrongly_typed_section_is_rejected() {
        let mut document = DynamicConfig::default_document();
        document.insert("openai".to_string(), json!("not an object"));
        assert!(DynamicConfig::from_document(&document).is_err());

        let mut document = DynamicConfig::default_document();
        document.insert("BGM_duration".to_string(), json!(0));
        assert!(DynamicConfig::from_document(&document).is_err());

        let mut document = DynamicConfig::default_document();
        document.insert(
            "pipeline".to_string(),
            json!({ "request_timeout_secs": 0 }),
        );
        assert!(DynamicConfig::from_document(&document).is_err());
    }
}
