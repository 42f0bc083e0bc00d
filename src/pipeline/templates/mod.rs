//! Learned extraction templates, keyed by layout fingerprint.

pub mod eviction;
pub mod fingerprint;
pub mod memory;
pub mod sqlite;
pub mod types;

pub use eviction::*;
pub use fingerprint::*;
pub use memory::*;
pub use sqlite::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Template serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Template store lock poisoned")]
    Poisoned,

    #[error("Corrupt template record: {0}")]
    Corrupt(String),
}

/// Fingerprint-keyed template cache shared by concurrent pipeline runs.
///
/// Operations on one key are linearizable: a completed `put(F)` is visible
/// to every later `lookup(F)`. Concurrent puts to the same key race and the
/// last write wins. No operation spans more than one key.
pub trait TemplateStore: Send + Sync {
    fn lookup(&self, fingerprint: &str) -> Result<Option<ExtractionTemplate>, StoreError>;

    /// Insert or replace the template stored under `fingerprint`.
    fn put(&self, fingerprint: &str, template: ExtractionTemplate) -> Result<(), StoreError>;

    /// Count a reuse. Unknown fingerprints are ignored.
    fn record_hit(&self, fingerprint: &str) -> Result<(), StoreError>;

    /// Point an advisory key at a full fingerprint (last write wins).
    fn link_alias(&self, alias: &str, fingerprint: &str) -> Result<(), StoreError>;

    fn resolve_alias(&self, alias: &str) -> Result<Option<String>, StoreError>;

    /// Remove a template. Returns whether one was present.
    fn remove(&self, fingerprint: &str) -> Result<bool, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// All templates, ordered by fingerprint.
    fn entries(&self) -> Result<Vec<ExtractionTemplate>, StoreError>;

    /// Drop every template and alias.
    fn clear(&self) -> Result<(), StoreError>;
}
