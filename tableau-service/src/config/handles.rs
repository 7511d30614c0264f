//! In-memory model handles derived from the configuration document.
//!
//! Handles are immutable and carry a generation number. A reload never edits a
//! handle in place; it builds a new one, so anything holding an older snapshot
//! keeps a consistent view until it takes the next snapshot.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use strum::Display;
use tracing::info;

use super::dynamic_config::{DynamicConfig, HandleKind, ReloadTrigger};

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Lookup used for environment fallbacks (injectable for tests)
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub fn process_env() -> EnvLookup {
    Arc::new(|key: &str| std::env::var(key).ok())
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Music synthesis model selection
#[derive(Debug)]
pub struct MusicModel {
    pub name: String,
    pub duration_secs: f64,
    pub generation: u64,
}

impl MusicModel {
    fn load(config: &DynamicConfig) -> Self {
        Self {
            name: config.music_model.clone(),
            duration_secs: config.bgm_duration,
            generation: next_generation(),
        }
    }
}

/// Transcription model selection
#[derive(Debug)]
pub struct TranscriptionModel {
    pub name: String,
    pub generation: u64,
}

impl TranscriptionModel {
    fn load(config: &DynamicConfig) -> Self {
        Self {
            name: config.whisper_model.clone(),
            generation: next_generation(),
        }
    }
}

/// Where the completion API key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CredentialSource {
    Configured,
    Environment,
    Missing,
}

/// Completion service credential
pub struct Credential {
    api_key: Option<String>,
    pub source: CredentialSource,
    pub generation: u64,
}

impl Credential {
    fn load(config: &DynamicConfig, env: &EnvLookup) -> Self {
        let (api_key, source) = resolve_api_key(config.openai.api_key.as_deref(), env);
        Self {
            api_key,
            source,
            generation: next_generation(),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("source", &self.source)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Use the configured key if non-empty, else the environment, else nothing
pub fn resolve_api_key(
    configured: Option<&str>,
    env: &EnvLookup,
) -> (Option<String>, CredentialSource) {
    if let Some(key) = configured.map(str::trim).filter(|k| !k.is_empty()) {
        return (Some(key.to_string()), CredentialSource::Configured);
    }
    match env(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
        Some(key) => (Some(key), CredentialSource::Environment),
        None => (None, CredentialSource::Missing),
    }
}

/// All handles derived from one configuration document
#[derive(Debug, Clone)]
pub struct ModelHandles {
    pub music: Arc<MusicModel>,
    pub transcription: Arc<TranscriptionModel>,
    pub credential: Arc<Credential>,
}

impl ModelHandles {
    pub fn load(config: &DynamicConfig, env: &EnvLookup) -> Self {
        Self {
            music: Arc::new(MusicModel::load(config)),
            transcription: Arc::new(TranscriptionModel::load(config)),
            credential: Arc::new(Credential::load(config, env)),
        }
    }

    /// Rebuild only the handles named by the triggers; the rest are shared
    pub fn reload(
        &self,
        triggers: &[ReloadTrigger],
        config: &DynamicConfig,
        env: &EnvLookup,
    ) -> Self {
        let mut next = self.clone();
        let kinds: HashSet<HandleKind> = triggers.iter().map(|t| t.handle()).collect();

        for kind in kinds {
            match kind {
                HandleKind::Music => {
                    next.music = Arc::new(MusicModel::load(config));
                    info!(
                        model = %next.music.name,
                        duration_secs = next.music.duration_secs,
                        generation = next.music.generation,
                        "Music model reloaded"
                    );
                }
                HandleKind::Transcription => {
                    next.transcription = Arc::new(TranscriptionModel::load(config));
                    info!(
                        model = %next.transcription.name,
                        generation = next.transcription.generation,
                        "Transcription model reloaded"
                    );
                }
                HandleKind::Credential => {
                    next.credential = Arc::new(Credential::load(config, env));
                    info!(
                        source = %next.credential.source,
                        generation = next.credential.generation,
                        "Completion credential reloaded"
                    );
                }
            }
        }

        next
    }
}
