//! Backend contracts for the external model services.
//!
//! The gateway depends on these traits instead of concrete HTTP clients, which
//! keeps request orchestration testable without network access.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::audio::RawAudio;
use crate::config::StaticConfig;
use crate::error::{BackendError, ServiceError, ServiceResult};

use super::music::MusicGenClient;
use super::openai::OpenAiClient;
use super::stable_diffusion::StableDiffusionClient;

/// Chat message in OpenAI wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message with an image for vision models
    pub fn user_with_image(content: impl Into<String>, image_base64: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: content.into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{}", image_base64),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Function definitions; when set the reply is expected as a function call
    pub functions: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// First choice of a chat completion
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionReply {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub function_call: Option<FunctionCall>,
}

impl CompletionReply {
    pub fn function_arguments(&self) -> Option<&str> {
        self.function_call.as_ref().map(|call| call.arguments.as_str())
    }

    /// The reply as text, for diagnostics
    pub fn raw(&self) -> String {
        match (&self.function_call, &self.content) {
            (Some(call), _) => call.arguments.clone(),
            (None, Some(content)) => content.clone(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub endpoint: String,
    pub model: String,
    pub audio: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Img2ImgRequest {
    pub endpoint: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct MusicRequest {
    pub endpoint: String,
    pub model: String,
    pub prompt: String,
    pub duration_secs: f64,
}

/// Speech-to-text service
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, BackendError>;
}

/// Chat completion service (function-call and free-text replies)
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, BackendError>;
}

/// Image-to-image synthesis service
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Returns the produced images, decoded
    async fn img2img(&self, request: Img2ImgRequest) -> Result<Vec<Vec<u8>>, BackendError>;
}

/// Music synthesis service
#[async_trait]
pub trait MusicSynthesizer: Send + Sync {
    async fn synthesize(&self, request: MusicRequest) -> Result<RawAudio, BackendError>;
}

/// The set of backends the gateway dispatches to
#[derive(Clone)]
pub struct Backends {
    pub transcriber: Arc<dyn Transcriber>,
    pub completer: Arc<dyn ChatCompleter>,
    pub images: Arc<dyn ImageSynthesizer>,
    pub music: Arc<dyn MusicSynthesizer>,
}

impl Backends {
    /// HTTP backends sharing one connection pool
    pub fn http(static_config: &StaticConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .connect_timeout(static_config.http.connect_timeout())
            .user_agent(concat!("tableau-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        let openai = Arc::new(OpenAiClient::new(client.clone()));
        Ok(Self {
            transcriber: openai.clone(),
            completer: openai,
            images: Arc::new(StableDiffusionClient::new(client.clone())),
            music: Arc::new(MusicGenClient::new(client)),
        })
    }
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn endpoint_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a non-success response into a status error carrying the body
pub(crate) async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(BackendError::Status { status, message })
}
