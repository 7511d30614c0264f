use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BackendError;

use super::backends::{
    ChatCompleter, ChatMessage, CompletionReply, CompletionRequest, Transcriber,
    TranscriptionRequest, endpoint_url, ensure_success,
};

/// OpenAI-compatible API client (chat completions and audio transcriptions)
pub struct OpenAiClient {
    client: Client,
}

impl OpenAiClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatCompleter for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, BackendError> {
        let url = endpoint_url(&request.endpoint, "chat/completions");

        let body = ChatCompletionBody {
            model: &request.model,
            messages: &request.messages,
            functions: request.functions.as_ref(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Connection {
                url: url.clone(),
                source: e,
            })?;
        let response = ensure_success(response).await?;

        let completion: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    message: e.to_string(),
                })?;

        let reply = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| BackendError::InvalidResponse {
                message: "completion returned no choices".to_string(),
            })?;

        debug!(
            model = %request.model,
            function_call = reply.function_call.is_some(),
            "Completion received"
        );
        Ok(reply)
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, BackendError> {
        let url = endpoint_url(&request.endpoint, "v1/audio/transcriptions");

        let form = Form::new()
            .part("file", Part::bytes(request.audio).file_name("voice.wav"))
            .text("model", request.model.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Connection {
                url: url.clone(),
                source: e,
            })?;
        let response = ensure_success(response).await?;

        let transcription: TranscriptionResponse =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    message: e.to_string(),
                })?;

        Ok(transcription.text.trim().to_string())
    }
}

// Internal OpenAI API types

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: CompletionReply,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}
