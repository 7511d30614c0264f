//! Structured prompt generation with a single repair round.
//!
//! The completion service is asked for a `generate_prompts` function call. If
//! the arguments are not valid JSON the malformed text is sent back once with
//! the fix-up instruction. Two completion calls at most, then the request fails.

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::ConfigState;
use crate::error::{ServiceError, ServiceResult};

use super::backends::{ChatMessage, CompletionReply, CompletionRequest};
use super::{Capability, ModelGateway, completion_api_key};

pub const PROMPT_FUNCTION_NAME: &str = "generate_prompts";

/// Prompts for the two generation calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PromptPair {
    /// Stable Diffusion img2img prompt describing the restyled picture
    pub img_prompt: String,
    /// MusicGen prompt describing the background music
    pub bgm_prompt: String,
}

/// Function definitions used when none are configured
pub fn default_functions() -> Value {
    json!([{
        "name": PROMPT_FUNCTION_NAME,
        "description": "Produce an image prompt and a background music prompt",
        "parameters": schema_for!(PromptPair),
    }])
}

enum RepairState {
    Primary,
    Repair { malformed: String },
}

impl ModelGateway {
    /// Ask the completion service for a [`PromptPair`] describing `context`
    pub async fn complete_structured(&self, context: &str) -> ServiceResult<PromptPair> {
        let state = self.store.snapshot();
        let api_key = completion_api_key(&state)
            .map_err(|e| ServiceError::backend(Capability::CompleteStructured, e))?;

        let mut repair = RepairState::Primary;
        loop {
            match repair {
                RepairState::Primary => {
                    let prompt = format!(
                        "{}{}",
                        state.config().openai.img_and_voice_to_prompt,
                        context
                    );
                    let reply = self.complete_once(&state, &api_key, prompt).await?;

                    let Some(arguments) = reply.function_arguments() else {
                        warn!("Completion reply carried no function call");
                        return Err(ServiceError::MalformedReply { raw: reply.raw() });
                    };

                    match parse_prompt_pair(arguments) {
                        Some(pair) => return Ok(pair),
                        None => {
                            debug!("Function arguments did not parse, requesting repair");
                            repair = RepairState::Repair {
                                malformed: arguments.to_string(),
                            };
                        }
                    }
                }
                RepairState::Repair { malformed } => {
                    let prompt = format!("{}{}", state.config().openai.json_fix_prompt, malformed);
                    let reply = self.complete_once(&state, &api_key, prompt).await?;

                    let candidate = reply
                        .function_arguments()
                        .map(str::to_string)
                        .or_else(|| reply.content.clone())
                        .unwrap_or_default();

                    return parse_prompt_pair(&candidate).ok_or_else(|| {
                        warn!("Repaired reply still malformed");
                        ServiceError::MalformedReply { raw: reply.raw() }
                    });
                }
            }
        }
    }

    async fn complete_once(
        &self,
        state: &ConfigState,
        api_key: &str,
        prompt: String,
    ) -> ServiceResult<CompletionReply> {
        let openai = &state.config().openai;
        let functions = openai
            .functions_prompt
            .clone()
            .unwrap_or_else(default_functions);

        let request = CompletionRequest {
            endpoint: openai.base_url.clone(),
            api_key: api_key.to_string(),
            model: openai.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            functions: Some(functions),
        };

        self.guarded(Capability::CompleteStructured, state, async {
            self.backends
                .completer
                .complete(request)
                .await
                .map_err(|e| ServiceError::backend(Capability::CompleteStructured, e))
        })
        .await
    }
}

/// Parse function arguments, tolerating a surrounding Markdown code fence
fn parse_prompt_pair(arguments: &str) -> Option<PromptPair> {
    let trimmed = arguments.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::super::testing::{StubBackends, test_store};
    use super::*;

    const VALID: &str = r#"{"img_prompt": "ukiyo-e harbor", "bgm_prompt": "koto and flute"}"#;

    fn gateway(stubs: &StubBackends) -> (tempfile::TempDir, ModelGateway) {
        let (dir, store) = test_store();
        (dir, ModelGateway::new(store, stubs.backends()))
    }

    #[tokio::test]
    async fn test_valid_reply_needs_one_call() {
        let stubs = StubBackends::new();
        stubs.completer.push_function_call(VALID);
        let (_dir, gateway) = gateway(&stubs);

        let pair = gateway.complete_structured("make it Japanese").await.unwrap();
        assert_eq!(pair.img_prompt, "ukiyo-e harbor");
        assert_eq!(pair.bgm_prompt, "koto and flute");
        assert_eq!(stubs.completer.calls(), 1);

        let request = stubs.completer.last_request().unwrap();
        assert!(request.functions.is_some());
    }

    #[tokio::test]
    async fn test_always_malformed_stops_after_two_calls() {
        let stubs = StubBackends::new();
        stubs.completer.push_function_call("{\"img_prompt\": ");
        stubs.completer.push_function_call("still {not json");
        stubs.completer.push_function_call(VALID);
        let (_dir, gateway) = gateway(&stubs);

        let err = gateway.complete_structured("anything").await.unwrap_err();
        match err {
            ServiceError::MalformedReply { raw } => assert_eq!(raw, "still {not json"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stubs.completer.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_function_call_fails_after_one_call() {
        let stubs = StubBackends::new();
        stubs.completer.push_text("I cannot call functions today");
        let (_dir, gateway) = gateway(&stubs);

        let err = gateway.complete_structured("anything").await.unwrap_err();
        assert!(matches!(err, ServiceError::MalformedReply { .. }));
        assert_eq!(stubs.completer.calls(), 1);
    }

    #[tokio::test]
    async fn test_repair_round_recovers() {
        let stubs = StubBackends::new();
        stubs
            .completer
            .push_function_call("{'img_prompt': 'harbor', 'bgm_prompt': 'jazz'}");
        stubs
            .completer
            .push_text("```json\n{\"img_prompt\": \"harbor\", \"bgm_prompt\": \"jazz\"}\n```");
        let (_dir, gateway) = gateway(&stubs);

        let pair = gateway.complete_structured("anything").await.unwrap();
        assert_eq!(pair.bgm_prompt, "jazz");
        assert_eq!(stubs.completer.calls(), 2);

        // The repair round carries the malformed text after the fix prompt
        let request = stubs.completer.last_request().unwrap();
        let sent = serde_json::to_string(&request.messages).unwrap();
        assert!(sent.contains("'img_prompt': 'harbor'"));
    }

    #[test]
    fn test_default_functions_describe_prompt_pair() {
        let functions = default_functions();
        assert_eq!(functions[0]["name"], PROMPT_FUNCTION_NAME);
        let properties = &functions[0]["parameters"]["properties"];
        assert!(properties.get("img_prompt").is_some());
        assert!(properties.get("bgm_prompt").is_some());
    }
}
