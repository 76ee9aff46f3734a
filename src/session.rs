//! Best-effort session persistence.
//!
//! The engine snapshots its steps, generated data, session log, and site
//! configuration through a byte-oriented store. Saves never fail the
//! workflow; a load that does not parse falls back to a clean state.

use crate::config::EngineConfig;
use crate::engine::state::EngineState;
use crate::events::SessionLogEntry;
use crate::step::Step;
use crate::store::DataStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

const SNAPSHOT_KEY: &str = "workflow-session";

/// Byte-oriented key/value persistence.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    /// Best effort: implementations log failures instead of returning them.
    fn put(&self, key: &str, value: &[u8]);
}

/// Serialized engine state.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub steps: Vec<Step>,
    pub store: DataStore,
    pub session_log: Vec<SessionLogEntry>,
    pub config: EngineConfig,
}

impl Snapshot {
    pub fn capture(state: &EngineState) -> Self {
        Self {
            steps: state.steps.clone(),
            store: state.store.clone(),
            session_log: state.events.session_entries().to_vec(),
            config: state.config.clone(),
        }
    }

    pub fn apply(self, state: &mut EngineState) {
        state.steps = self.steps;
        state.store = self.store;
        state.config = self.config;
        for entry in self.session_log {
            state.events.log_session(entry);
        }
    }

    pub fn save(&self, store: &dyn SessionStore) {
        match serde_json::to_vec(self) {
            Ok(bytes) => store.put(SNAPSHOT_KEY, &bytes),
            Err(err) => warn!(error = %err, "failed to serialize session snapshot"),
        }
    }

    pub fn load(store: &dyn SessionStore) -> Option<Self> {
        let bytes = store.get(SNAPSHOT_KEY)?;
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(error = %err, "corrupt session snapshot, starting clean");
                None
            }
        }
    }
}

/// File-backed session store, one file per key.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default location under the platform data directory.
    pub fn default_location() -> Self {
        let dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sitewright");
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    fn put(&self, key: &str, value: &[u8]) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(error = %err, "failed to create session directory");
            return;
        }
        if let Err(err) = fs::write(self.path_for(key), value) {
            warn!(error = %err, "failed to write session snapshot");
        }
    }
}
