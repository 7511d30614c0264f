//! Scriptable in-memory backends for gateway, orchestrator and router tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::audio::RawAudio;
use crate::config::ConfigStore;
use crate::error::BackendError;

use super::backends::{
    Backends, ChatCompleter, CompletionReply, CompletionRequest, FunctionCall, ImageSynthesizer,
    Img2ImgRequest, MusicRequest, MusicSynthesizer, Transcriber, TranscriptionRequest,
};

/// Smallest thing that looks like a PNG to a client
pub const PNG_STUB: &[u8] = b"\x89PNG\r\n\x1a\n\0\0";

/// Store in a temp dir whose environment provides `OPENAI_API_KEY=sk-test`
pub fn test_store() -> (tempfile::TempDir, Arc<ConfigStore>) {
    test_store_with(|key| (key == "OPENAI_API_KEY").then(|| "sk-test".to_string()))
}

pub fn test_store_with(
    env: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
) -> (tempfile::TempDir, Arc<ConfigStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::open_with_env(dir.path().join("config.json"), Arc::new(env)).unwrap();
    (dir, Arc::new(store))
}

fn failure(what: &str) -> BackendError {
    BackendError::Status {
        status: 500,
        message: format!("{what} stub failure"),
    }
}

/// Shared behaviour knobs for one stub
#[derive(Default)]
struct Script {
    calls: AtomicUsize,
    delay: Mutex<Duration>,
    fail: Mutex<bool>,
}

impl Script {
    async fn enter(&self, what: &str) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.fail.lock().unwrap() {
            return Err(failure(what));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct StubTranscriber {
    script: Script,
    last_model: Mutex<Option<String>>,
}

impl StubTranscriber {
    pub fn output(&self) -> String {
        "paint it like a rainy night in Tokyo".to_string()
    }

    pub fn fail(&self) {
        *self.script.fail.lock().unwrap() = true;
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn last_model(&self) -> Option<String> {
        self.last_model.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, BackendError> {
        *self.last_model.lock().unwrap() = Some(request.model);
        self.script.enter("transcription").await?;
        Ok(self.output())
    }
}

/// Completion stub replaying queued replies; a valid prompt call once drained
#[derive(Default)]
pub struct StubCompleter {
    script: Script,
    replies: Mutex<VecDeque<CompletionReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubCompleter {
    pub fn push_function_call(&self, arguments: &str) {
        self.replies.lock().unwrap().push_back(CompletionReply {
            content: None,
            function_call: Some(FunctionCall {
                name: "generate_prompts".to_string(),
                arguments: arguments.to_string(),
            }),
        });
    }

    pub fn push_text(&self, content: &str) {
        self.replies.lock().unwrap().push_back(CompletionReply {
            content: Some(content.to_string()),
            function_call: None,
        });
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatCompleter for StubCompleter {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, BackendError> {
        self.requests.lock().unwrap().push(request);
        self.script.enter("completion").await?;
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or_else(|| CompletionReply {
            content: None,
            function_call: Some(FunctionCall {
                name: "generate_prompts".to_string(),
                arguments: r#"{"img_prompt": "neon reflections", "bgm_prompt": "city pop"}"#
                    .to_string(),
            }),
        }))
    }
}

#[derive(Default)]
pub struct StubImages {
    script: Script,
    payloads: Mutex<Vec<Map<String, Value>>>,
    empty: Mutex<bool>,
}

impl StubImages {
    pub fn output(&self) -> Vec<u8> {
        PNG_STUB.to_vec()
    }

    pub fn delay(&self, delay: Duration) {
        *self.script.delay.lock().unwrap() = delay;
    }

    pub fn fail(&self) {
        *self.script.fail.lock().unwrap() = true;
    }

    /// Answer with an empty image list
    pub fn return_nothing(&self) {
        *self.empty.lock().unwrap() = true;
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn last_payload(&self) -> Option<Map<String, Value>> {
        self.payloads.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ImageSynthesizer for StubImages {
    async fn img2img(&self, request: Img2ImgRequest) -> Result<Vec<Vec<u8>>, BackendError> {
        self.payloads.lock().unwrap().push(request.payload);
        self.script.enter("img2img").await?;
        if *self.empty.lock().unwrap() {
            return Ok(Vec::new());
        }
        Ok(vec![self.output()])
    }
}

#[derive(Default)]
pub struct StubMusic {
    script: Script,
    requests: Mutex<Vec<MusicRequest>>,
    completed: AtomicUsize,
}

impl StubMusic {
    pub fn delay(&self, delay: Duration) {
        *self.script.delay.lock().unwrap() = delay;
    }

    pub fn fail(&self) {
        *self.script.fail.lock().unwrap() = true;
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion (not cancelled mid-flight)
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<MusicRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MusicSynthesizer for StubMusic {
    async fn synthesize(&self, request: MusicRequest) -> Result<RawAudio, BackendError> {
        self.requests.lock().unwrap().push(request);
        self.script.enter("music").await?;
        self.completed.fetch_add(1, Ordering::SeqCst);

        let sample_rate = 8_000;
        let samples = (0..sample_rate / 10)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32).sin() * 0.1)
            .collect();
        Ok(RawAudio {
            samples,
            sample_rate,
            channels: 1,
        })
    }
}

/// All four stubs, shared with the [`Backends`] they produce
pub struct StubBackends {
    pub transcriber: Arc<StubTranscriber>,
    pub completer: Arc<StubCompleter>,
    pub images: Arc<StubImages>,
    pub music: Arc<StubMusic>,
}

impl StubBackends {
    pub fn new() -> Self {
        Self {
            transcriber: Arc::new(StubTranscriber::default()),
            completer: Arc::new(StubCompleter::default()),
            images: Arc::new(StubImages::default()),
            music: Arc::new(StubMusic::default()),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            transcriber: self.transcriber.clone(),
            completer: self.completer.clone(),
            images: self.images.clone(),
            music: self.music.clone(),
        }
    }
}
