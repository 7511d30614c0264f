//! Top-level keys with special handling: typed sections and reload triggers.

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Sections backed by typed structs; missing inner keys get their defaults
pub const TYPED_SECTIONS: &[&str] = &["openai", "services", "pipeline"];

/// Keys that trigger a handle reload when their value changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display, EnumIter)]
pub enum ReloadTrigger {
    #[strum(serialize = "music_model")]
    MusicModel,
    #[strum(serialize = "BGM_duration")]
    BgmDuration,
    #[strum(serialize = "whisper_model")]
    WhisperModel,
    #[strum(serialize = "openai")]
    OpenAi,
}

/// The in-memory resource a trigger re-initializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum HandleKind {
    Music,
    Transcription,
    Credential,
}

impl ReloadTrigger {
    pub fn handle(self) -> HandleKind {
        match self {
            ReloadTrigger::MusicModel | ReloadTrigger::BgmDuration => HandleKind::Music,
            ReloadTrigger::WhisperModel => HandleKind::Transcription,
            ReloadTrigger::OpenAi => HandleKind::Credential,
        }
    }

    /// Triggers among a set of mutated top-level keys
    pub fn from_keys<'a>(keys: impl IntoIterator<Item = &'a String>) -> Vec<ReloadTrigger> {
        keys.into_iter()
            .filter_map(|key| key.parse::<ReloadTrigger>().ok())
            .collect()
    }
}
