//! Persistence for registry records.
//!
//! [`RegistryStore`] is the seam between the module manager and whatever
//! holds the module table. Map-valued fields are serialized by the backend
//! and come back typed.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;

use crate::error::{RegistryError, Result};
use crate::models::{RecordUpdate, RegistryRecord};
use crate::script::{Script, StatementExecutor};

pub use memory::MemoryRegistryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRegistryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRegistryStore;

/// Identifier the backend assigns to an inserted row.
pub type RecordId = i64;

/// Registry change that commits together with a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomicChange {
    Insert(RegistryRecord),
    Delete(String),
    /// Empty the table, then insert these records in order.
    ReplaceAll(Vec<RegistryRecord>),
}

#[async_trait]
pub trait RegistryStore: StatementExecutor {
    /// Fetch the record with this slug, enabled or not
    async fn get(&self, slug: &str) -> Result<Option<RegistryRecord>>;

    /// All records in storage order
    async fn get_all(&self) -> Result<Vec<RegistryRecord>>;

    /// Insert a new record. Fails with `DuplicateSlug` if the slug is taken.
    async fn insert(&self, record: &RegistryRecord) -> Result<RecordId>;

    /// Apply a partial update. Returns the number of affected records.
    async fn update(&self, slug: &str, update: &RecordUpdate) -> Result<u64>;

    /// Returns the number of deleted records.
    async fn delete(&self, slug: &str) -> Result<u64>;

    /// Remove every record.
    async fn clear(&self) -> Result<()>;

    async fn exists(&self, slug: &str) -> Result<bool> {
        Ok(self.get(slug).await?.is_some())
    }

    /// Run `script` and apply `change` as one unit: either all of it takes
    /// effect or none of it does.
    ///
    /// Backends without transactions keep this default and cannot be used
    /// with [`crate::InstallMode::Transactional`].
    async fn apply_atomic(&self, script: &Script, change: AtomicChange) -> Result<()> {
        let _ = (script, change);
        Err(RegistryError::UnsupportedOperation(
            "this registry store does not support transactions".to_string(),
        ))
    }
}

/// Serialized columns shared by the SQL backends.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) mod columns {
    use crate::error::{RegistryError, Result};
    use crate::locale::LocalizedText;
    use crate::models::Controllers;

    pub const SELECT_COLUMNS: &str = "slug, name, description, version, type, skip_xss, \
        is_frontend, is_backend, is_backend_menu, controllers, enabled, is_core";

    pub fn text_to_json(text: &LocalizedText) -> Result<String> {
        Ok(serde_json::to_string(text)?)
    }

    pub fn controllers_to_json(controllers: &Controllers) -> Result<String> {
        Ok(serde_json::to_string(controllers)?)
    }

    pub fn text_from_json(slug: &str, field: &str, json: &str) -> Result<LocalizedText> {
        serde_json::from_str(json).map_err(|e| RegistryError::CorruptedRecord {
            slug: slug.to_string(),
            reason: format!("{}: {}", field, e),
        })
    }

    pub fn controllers_from_json(slug: &str, json: &str) -> Result<Controllers> {
        serde_json::from_str(json).map_err(|e| RegistryError::CorruptedRecord {
            slug: slug.to_string(),
            reason: format!("controllers: {}", e),
        })
    }
}
