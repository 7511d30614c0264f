//! Persistent, hot-reloadable configuration store.
//!
//! The document, its typed view and the model handles derived from it live in
//! one immutable [`ConfigState`]. Readers take a snapshot through `ArcSwap`
//! (lock-free); writers are serialized by a mutex, persist the new document,
//! rebuild triggered handles, and publish the new state with a single swap.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};

use super::dynamic_config::{
    DynamicConfig, Patch, ReloadTrigger, TYPED_SECTIONS, fill_missing, merge_patch,
};
use super::handles::{EnvLookup, ModelHandles, process_env};

/// One committed configuration: document, typed view, and handles
#[derive(Debug)]
pub struct ConfigState {
    document: Map<String, Value>,
    config: DynamicConfig,
    handles: ModelHandles,
}

impl ConfigState {
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn config(&self) -> &DynamicConfig {
        &self.config
    }

    pub fn handles(&self) -> &ModelHandles {
        &self.handles
    }
}

/// Configuration store backed by a JSON file
pub struct ConfigStore {
    path: PathBuf,
    state: ArcSwap<ConfigState>,
    write_lock: Mutex<()>,
    env: EnvLookup,
}

impl ConfigStore {
    /// Open the store, resolving credentials from the process environment
    pub fn open(path: impl Into<PathBuf>) -> ServiceResult<Self> {
        Self::open_with_env(path, process_env())
    }

    /// Open the store with an explicit environment lookup.
    ///
    /// A missing file is created from the built-in defaults. An existing file
    /// gains any well-known keys it lacks, and typed sections gain missing
    /// fields. `sd_payload` and unknown keys are kept as written.
    pub fn open_with_env(path: impl Into<PathBuf>, env: EnvLookup) -> ServiceResult<Self> {
        let path = path.into();
        let defaults = DynamicConfig::default_document();

        let document = if path.exists() {
            let mut document = read_document(&path)?;
            if fill_missing(&mut document, &defaults, TYPED_SECTIONS) {
                info!(path = %path.display(), "Added missing default settings to configuration");
                persist(&path, &document)?;
            }
            document
        } else {
            info!(path = %path.display(), "Configuration file not found, writing defaults");
            persist(&path, &defaults)?;
            defaults
        };

        let config = DynamicConfig::from_document(&document).map_err(|e| ServiceError::Config {
            message: format!("Invalid configuration in {}: {}", path.display(), e),
        })?;
        let handles = ModelHandles::load(&config, &env);

        info!(
            path = %path.display(),
            music_model = %handles.music.name,
            whisper_model = %handles.transcription.name,
            credential = %handles.credential.source,
            "Configuration loaded"
        );

        Ok(Self {
            path,
            state: ArcSwap::from_pointee(ConfigState {
                document,
                config,
                handles,
            }),
            write_lock: Mutex::new(()),
            env,
        })
    }

    /// Current committed state (lock-free read)
    pub fn snapshot(&self) -> Arc<ConfigState> {
        self.state.load_full()
    }

    /// Full configuration document
    pub fn get(&self) -> Map<String, Value> {
        self.state.load().document.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a patch, persist the full document, reload triggered handles.
    ///
    /// The in-memory state only changes after the file has been replaced, so a
    /// failed write leaves both memory and disk at the previous configuration.
    pub fn update(&self, patch: impl Into<Patch>) -> ServiceResult<Arc<ConfigState>> {
        let _guard = self.write_lock.lock().map_err(|_| ServiceError::Internal {
            message: "configuration writer lock poisoned".to_string(),
        })?;

        let current = self.state.load_full();
        let mut document = current.document.clone();
        let mutated = merge_patch(&mut document, patch.into());

        if mutated.is_empty() {
            debug!("Configuration patch changed nothing");
            return Ok(current);
        }

        let config =
            DynamicConfig::from_document(&document).map_err(|e| ServiceError::InvalidRequest {
                message: format!("Rejected configuration update: {}", e),
            })?;

        persist(&self.path, &document)?;

        let triggers = ReloadTrigger::from_keys(&mutated);
        let handles = current.handles.reload(&triggers, &config, &self.env);

        let next = Arc::new(ConfigState {
            document,
            config,
            handles,
        });
        self.state.store(next.clone());

        info!(keys = ?mutated, reloaded = ?triggers, "Configuration updated");
        Ok(next)
    }

    /// Update a single top-level key
    #[cfg(test)]
    pub fn set(&self, key: impl Into<String>, value: Value) -> ServiceResult<Arc<ConfigState>> {
        self.update(Patch::entry(key, value))
    }
}

fn read_document(path: &Path) -> ServiceResult<Map<String, Value>> {
    let contents = std::fs::read_to_string(path).map_err(|e| ServiceError::Config {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;
    match serde_json::from_str(&contents) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ServiceError::Config {
            message: format!("{} must contain a JSON object", path.display()),
        }),
        Err(e) => Err(ServiceError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        }),
    }
}

/// Write the whole document next to the target, flush, then rename over it
fn persist(path: &Path, document: &Map<String, Value>) -> ServiceResult<()> {
    let persistence_error = |source: std::io::Error| ServiceError::Persistence {
        path: path.display().to_string(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(persistence_error)?;
    serde_json::to_writer_pretty(&mut file, document)
        .map_err(|e| persistence_error(e.into()))?;
    file.write_all(b"\n").map_err(persistence_error)?;
    file.as_file().sync_all().map_err(persistence_error)?;
    file.persist(path).map_err(|e| persistence_error(e.error))?;

    Ok(())
}
