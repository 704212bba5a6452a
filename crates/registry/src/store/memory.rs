use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{AtomicChange, RecordId, RegistryStore};
use crate::error::{RegistryError, Result};
use crate::models::{RecordUpdate, RegistryRecord};
use crate::script::{Script, StatementExecutor};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    rows: Vec<(RecordId, RegistryRecord)>,
    next_id: RecordId,
    executed: Vec<String>,
}

impl MemoryState {
    fn insert(&mut self, record: &RegistryRecord) -> Result<RecordId> {
        if self.rows.iter().any(|(_, row)| row.slug == record.slug) {
            return Err(RegistryError::DuplicateSlug(record.slug.clone()));
        }

        self.next_id += 1;
        self.rows.push((self.next_id, record.clone()));
        Ok(self.next_id)
    }

    fn delete(&mut self, slug: &str) -> u64 {
        let before = self.rows.len();
        self.rows.retain(|(_, row)| row.slug != slug);
        (before - self.rows.len()) as u64
    }

    fn apply(&mut self, change: AtomicChange) -> Result<()> {
        match change {
            AtomicChange::Insert(record) => {
                self.insert(&record)?;
            }
            AtomicChange::Delete(slug) => {
                self.delete(&slug);
            }
            AtomicChange::ReplaceAll(records) => {
                self.rows.clear();
                for record in &records {
                    self.insert(record)?;
                }
            }
        }
        Ok(())
    }
}

/// Registry table held in memory, in insertion order.
///
/// Raw statements are not interpreted; they are recorded so callers can see
/// what a script did. Statements containing a rejected pattern fail, which
/// stands in for a database refusing a query. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistryStore {
    state: Arc<Mutex<MemoryState>>,
    rejected_patterns: Arc<Mutex<Vec<String>>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every statement containing `pattern` fail.
    pub async fn reject_statements_containing(&self, pattern: impl Into<String>) {
        self.rejected_patterns.lock().await.push(pattern.into());
    }

    /// Statements executed so far, in order.
    pub async fn executed_statements(&self) -> Vec<String> {
        self.state.lock().await.executed.clone()
    }

    async fn check_statement(&self, statement: &str) -> Result<()> {
        let rejected = self.rejected_patterns.lock().await;
        if rejected.iter().any(|pattern| statement.contains(pattern.as_str())) {
            return Err(RegistryError::StatementRejected(statement.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StatementExecutor for MemoryRegistryStore {
    async fn execute_raw(&self, statement: &str) -> Result<()> {
        self.check_statement(statement).await?;
        self.state.lock().await.executed.push(statement.to_string());
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn get(&self, slug: &str) -> Result<Option<RegistryRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .iter()
            .find(|(_, row)| row.slug == slug)
            .map(|(_, row)| row.clone()))
    }

    async fn get_all(&self) -> Result<Vec<RegistryRecord>> {
        let state = self.state.lock().await;
        Ok(state.rows.iter().map(|(_, row)| row.clone()).collect())
    }

    async fn insert(&self, record: &RegistryRecord) -> Result<RecordId> {
        self.state.lock().await.insert(record)
    }

    async fn update(&self, slug: &str, update: &RecordUpdate) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut affected = 0;
        for (_, row) in state.rows.iter_mut().filter(|(_, row)| row.slug == slug) {
            row.apply(update);
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&self, slug: &str) -> Result<u64> {
        Ok(self.state.lock().await.delete(slug))
    }

    async fn clear(&self) -> Result<()> {
        self.state.lock().await.rows.clear();
        Ok(())
    }

    async fn apply_atomic(&self, script: &Script, change: AtomicChange) -> Result<()> {
        let mut state = self.state.lock().await;
        let snapshot = state.clone();

        for (index, statement) in script.statements().iter().enumerate() {
            if let Err(e) = self.check_statement(statement).await {
                debug!("Rolling back in-memory transaction at statement #{}", index);
                *state = snapshot;
                return Err(RegistryError::ScriptExecution {
                    index,
                    statement: statement.clone(),
                    source: Box::new(e),
                });
            }
            state.executed.push(statement.clone());
        }

        if let Err(e) = state.apply(change) {
            *state = snapshot;
            return Err(e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::LocalizedText;
    use crate::models::Controllers;

    fn record(slug: &str) -> RegistryRecord {
        RegistryRecord {
            slug: slug.to_string(),
            name: LocalizedText::single(slug),
            description: LocalizedText::single("A test module"),
            version: "1.0".to_string(),
            module_type: String::new(),
            skip_xss: false,
            is_frontend: false,
            is_backend: false,
            is_backend_menu: false,
            controllers: Controllers::new(),
            enabled: true,
            is_core: false,
        }
    }

    #[tokio::test]
    async fn test_insert_preserves_order_and_uniqueness() {
        let store = MemoryRegistryStore::new();
        assert_eq!(store.insert(&record("pages")).await.unwrap(), 1);
        assert_eq!(store.insert(&record("blog")).await.unwrap(), 2);

        assert!(matches!(
            store.insert(&record("pages")).await,
            Err(RegistryError::DuplicateSlug(slug)) if slug == "pages"
        ));

        let slugs: Vec<_> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.slug)
            .collect();
        assert_eq!(slugs, vec!["pages", "blog"]);
    }

    #[tokio::test]
    async fn test_update_and_delete_counts() {
        let store = MemoryRegistryStore::new();
        store.insert(&record("blog")).await.unwrap();

        let update = RecordUpdate::new().enabled(false);
        assert_eq!(store.update("blog", &update).await.unwrap(), 1);
        assert_eq!(store.update("ghost", &update).await.unwrap(), 0);
        assert!(!store.get("blog").await.unwrap().unwrap().enabled);

        assert_eq!(store.delete("blog").await.unwrap(), 1);
        assert_eq!(store.delete("blog").await.unwrap(), 0);
        assert!(!store.exists("blog").await.unwrap());
    }

    #[tokio::test]
    async fn test_atomic_rolls_back_on_script_failure() {
        let store = MemoryRegistryStore::new();
        store.reject_statements_containing("BOOM").await;

        let script = Script::from(vec!["CREATE TABLE a".to_string(), "BOOM".to_string()]);
        let result = store
            .apply_atomic(&script, AtomicChange::Insert(record("blog")))
            .await;

        assert!(matches!(
            result,
            Err(RegistryError::ScriptExecution { index: 1, .. })
        ));
        assert!(store.executed_statements().await.is_empty());
        assert!(!store.exists("blog").await.unwrap());
    }

    #[tokio::test]
    async fn test_atomic_replace_all() {
        let store = MemoryRegistryStore::new();
        store.insert(&record("old")).await.unwrap();

        store
            .apply_atomic(
                &Script::default(),
                AtomicChange::ReplaceAll(vec![record("a"), record("b")]),
            )
            .await
            .unwrap();

        let slugs: Vec<_> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.slug)
            .collect();
        assert_eq!(slugs, vec!["a", "b"]);

        // A duplicate inside the batch leaves the previous contents in place.
        let result = store
            .apply_atomic(
                &Script::default(),
                AtomicChange::ReplaceAll(vec![record("c"), record("c")]),
            )
            .await;
        assert!(matches!(result, Err(RegistryError::DuplicateSlug(_))));
        assert_eq!(store.get_all().await.unwrap().len(), 2);
    }
}
