//! Persistent state stores
//!
//! One JSON file per concern in a configurable data directory. All writes go
//! through [`JsonFile::save`], which writes to a temp file and renames, and
//! every store commits in-memory state only after the persist succeeded.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod changelog;
pub mod configs;
pub mod dead_streams;
pub mod json_file;
pub mod patterns;
pub mod settings;
pub mod updates;

pub use changelog::Changelog;
pub use configs::{
    AccountStreamLimits, AutomationConfig, BlobStore, DiversificationConfig,
    DiversificationStrategy, ProfileConfigMap, ScoreWeights, StreamCheckerConfig,
};
pub use dead_streams::DeadStreamTracker;
pub use json_file::JsonFile;
pub use patterns::RegexPatternStore;
pub use settings::SettingsStore;
pub use updates::UpdateTracker;

/// Shared record of store-level corruption, surfaced through `/status`
///
/// A store registers itself here when its persisted JSON could not be
/// interpreted at load time, and clears the entry on its next successful
/// write. The scheduler pauses automatic ticks while any entry is present.
#[derive(Clone, Default)]
pub struct StoreHealth {
    errors: Arc<RwLock<HashMap<String, String>>>,
}

impl StoreHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, store: &str, message: String) {
        self.errors.write().await.insert(store.to_string(), message);
    }

    pub async fn clear(&self, store: &str) {
        self.errors.write().await.remove(store);
    }

    pub async fn is_healthy(&self) -> bool {
        self.errors.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.errors.read().await.clone()
    }
}
