use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{debug, info};

use super::columns::{
    SELECT_COLUMNS, controllers_from_json, controllers_to_json, text_from_json, text_to_json,
};
use super::{AtomicChange, RecordId, RegistryStore};
use crate::config::validate_table_name;
use crate::error::{RegistryError, Result};
use crate::models::{RecordUpdate, RegistryRecord};
use crate::script::{Script, StatementExecutor};

/// Registry table in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRegistryStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteRegistryStore {
    /// Connect to `url` (e.g. `sqlite://modules.db?mode=rwc`) and make sure the
    /// registry table exists.
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        Self::with_pool(pool, table).await
    }

    /// Private in-memory database. A single connection is kept alive so the
    /// data outlives individual queries.
    pub async fn in_memory(table: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool, table).await
    }

    pub async fn with_pool(pool: SqlitePool, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                version TEXT NOT NULL DEFAULT '',
                type TEXT NOT NULL DEFAULT '',
                skip_xss INTEGER NOT NULL DEFAULT 0,
                is_frontend INTEGER NOT NULL DEFAULT 0,
                is_backend INTEGER NOT NULL DEFAULT 0,
                is_backend_menu INTEGER NOT NULL DEFAULT 0,
                controllers TEXT NOT NULL DEFAULT '{{}}',
                enabled INTEGER NOT NULL DEFAULT 1,
                is_core INTEGER NOT NULL DEFAULT 0
            )",
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        debug!("Ensured registry table '{}'", self.table);
        Ok(())
    }

    fn record_from_row(row: &SqliteRow) -> Result<RegistryRecord> {
        let slug: String = row.try_get("slug")?;
        let name: String = row.try_get("name")?;
        let description: String = row.try_get("description")?;
        let controllers: String = row.try_get("controllers")?;

        Ok(RegistryRecord {
            name: text_from_json(&slug, "name", &name)?,
            description: text_from_json(&slug, "description", &description)?,
            controllers: controllers_from_json(&slug, &controllers)?,
            version: row.try_get("version")?,
            module_type: row.try_get("type")?,
            skip_xss: row.try_get("skip_xss")?,
            is_frontend: row.try_get("is_frontend")?,
            is_backend: row.try_get("is_backend")?,
            is_backend_menu: row.try_get("is_backend_menu")?,
            enabled: row.try_get("enabled")?,
            is_core: row.try_get("is_core")?,
            slug,
        })
    }

    async fn insert_on(
        &self,
        conn: &mut SqliteConnection,
        record: &RegistryRecord,
    ) -> Result<RecordId> {
        let sql = format!(
            "INSERT INTO {} (slug, name, description, version, type, skip_xss, is_frontend, \
             is_backend, is_backend_menu, controllers, enabled, is_core) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        );

        let result = sqlx::query(&sql)
            .bind(&record.slug)
            .bind(text_to_json(&record.name)?)
            .bind(text_to_json(&record.description)?)
            .bind(&record.version)
            .bind(&record.module_type)
            .bind(record.skip_xss)
            .bind(record.is_frontend)
            .bind(record.is_backend)
            .bind(record.is_backend_menu)
            .bind(controllers_to_json(&record.controllers)?)
            .bind(record.enabled)
            .bind(record.is_core)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_unique_violation(e, &record.slug))?;

        Ok(result.last_insert_rowid())
    }

    async fn delete_on(&self, conn: &mut SqliteConnection, slug: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE slug = ?", self.table);
        let result = sqlx::query(&sql).bind(slug).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }
}

fn map_unique_violation(err: sqlx::Error, slug: &str) -> RegistryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RegistryError::DuplicateSlug(slug.to_string())
        }
        _ => err.into(),
    }
}

#[async_trait]
impl StatementExecutor for SqliteRegistryStore {
    async fn execute_raw(&self, statement: &str) -> Result<()> {
        sqlx::raw_sql(statement).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for SqliteRegistryStore {
    async fn get(&self, slug: &str) -> Result<Option<RegistryRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE slug = ? LIMIT 1",
            SELECT_COLUMNS, self.table
        );
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn get_all(&self) -> Result<Vec<RegistryRecord>> {
        let sql = format!("SELECT {} FROM {} ORDER BY id", SELECT_COLUMNS, self.table);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::record_from_row).collect()
    }

    async fn insert(&self, record: &RegistryRecord) -> Result<RecordId> {
        let mut conn = self.pool.acquire().await?;
        self.insert_on(&mut conn, record).await
    }

    async fn update(&self, slug: &str, update: &RecordUpdate) -> Result<u64> {
        if update.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("UPDATE {} SET ", self.table));
        {
            let mut set = builder.separated(", ");
            if let Some(name) = &update.name {
                set.push("name = ").push_bind_unseparated(text_to_json(name)?);
            }
            if let Some(description) = &update.description {
                set.push("description = ")
                    .push_bind_unseparated(text_to_json(description)?);
            }
            if let Some(version) = &update.version {
                set.push("version = ").push_bind_unseparated(version.clone());
            }
            if let Some(module_type) = &update.module_type {
                set.push("type = ").push_bind_unseparated(module_type.clone());
            }
            if let Some(value) = update.skip_xss {
                set.push("skip_xss = ").push_bind_unseparated(value);
            }
            if let Some(value) = update.is_frontend {
                set.push("is_frontend = ").push_bind_unseparated(value);
            }
            if let Some(value) = update.is_backend {
                set.push("is_backend = ").push_bind_unseparated(value);
            }
            if let Some(value) = update.is_backend_menu {
                set.push("is_backend_menu = ").push_bind_unseparated(value);
            }
            if let Some(controllers) = &update.controllers {
                set.push("controllers = ")
                    .push_bind_unseparated(controllers_to_json(controllers)?);
            }
            if let Some(value) = update.enabled {
                set.push("enabled = ").push_bind_unseparated(value);
            }
            if let Some(value) = update.is_core {
                set.push("is_core = ").push_bind_unseparated(value);
            }
        }
        builder.push(" WHERE slug = ").push_bind(slug.to_string());

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, slug: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.delete_on(&mut conn, slug).await
    }

    async fn clear(&self) -> Result<()> {
        let sql = format!("DELETE FROM {}", self.table);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn apply_atomic(&self, script: &Script, change: AtomicChange) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let conn: &mut SqliteConnection = &mut tx;

        for (index, statement) in script.statements().iter().enumerate() {
            if let Err(e) = conn.execute(sqlx::raw_sql(statement)).await {
                // Dropping the transaction rolls it back.
                return Err(RegistryError::ScriptExecution {
                    index,
                    statement: statement.clone(),
                    source: Box::new(e.into()),
                });
            }
        }

        match change {
            AtomicChange::Insert(record) => {
                self.insert_on(&mut *conn, &record).await?;
            }
            AtomicChange::Delete(slug) => {
                self.delete_on(&mut *conn, &slug).await?;
            }
            AtomicChange::ReplaceAll(records) => {
                let sql = format!("DELETE FROM {}", self.table);
                sqlx::query(&sql).execute(&mut *conn).await?;
                for record in &records {
                    self.insert_on(&mut *conn, record).await?;
                }
                info!("Replaced registry contents with {} records", records.len());
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::LocalizedText;
    use crate::models::{Controller, Controllers};

    fn record(slug: &str) -> RegistryRecord {
        RegistryRecord {
            slug: slug.to_string(),
            name: LocalizedText::single("Blog").with("nl", "Weblog"),
            description: LocalizedText::single("Articles"),
            version: "2.0".to_string(),
            module_type: "content".to_string(),
            skip_xss: true,
            is_frontend: true,
            is_backend: false,
            is_backend_menu: true,
            controllers: Controllers::new()
                .with(Controller::new("admin").with_method("index"))
                .with(Controller::new("rss")),
            enabled: true,
            is_core: false,
        }
    }

    #[tokio::test]
    async fn test_round_trips_serialized_columns() {
        let store = SqliteRegistryStore::in_memory("modules").await.unwrap();
        store.insert(&record("blog")).await.unwrap();

        let stored = store.get("blog").await.unwrap().unwrap();
        assert_eq!(stored, record("blog"));
        assert_eq!(stored.controllers.names(), vec!["admin", "rss"]);
    }

    #[tokio::test]
    async fn test_duplicate_slug() {
        let store = SqliteRegistryStore::in_memory("modules").await.unwrap();
        store.insert(&record("blog")).await.unwrap();

        assert!(matches!(
            store.insert(&record("blog")).await,
            Err(RegistryError::DuplicateSlug(slug)) if slug == "blog"
        ));
    }

    #[tokio::test]
    async fn test_partial_update() {
        let store = SqliteRegistryStore::in_memory("modules").await.unwrap();
        store.insert(&record("blog")).await.unwrap();

        let update = RecordUpdate::new()
            .enabled(false)
            .name(LocalizedText::single("News"));
        assert_eq!(store.update("blog", &update).await.unwrap(), 1);
        assert_eq!(store.update("ghost", &update).await.unwrap(), 0);
        assert_eq!(store.update("blog", &RecordUpdate::new()).await.unwrap(), 0);

        let stored = store.get("blog").await.unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.name, LocalizedText::single("News"));
        assert_eq!(stored.version, "2.0");
    }

    #[tokio::test]
    async fn test_raw_statements_and_atomic_rollback() {
        let store = SqliteRegistryStore::in_memory("modules").await.unwrap();
        store
            .execute_raw("CREATE TABLE blog (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();

        let script = Script::from(vec![
            "INSERT INTO blog (id) VALUES (1)".to_string(),
            "INSERT INTO missing_table (id) VALUES (1)".to_string(),
        ]);
        let result = store
            .apply_atomic(&script, AtomicChange::Insert(record("blog")))
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::ScriptExecution { index: 1, .. })
        ));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blog")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(!store.exists("blog").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_all_in_insert_order() {
        let store = SqliteRegistryStore::in_memory("default_modules").await.unwrap();
        for slug in ["pages", "blog", "users"] {
            store.insert(&record(slug)).await.unwrap();
        }
        store.delete("blog").await.unwrap();

        let slugs: Vec<_> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.slug)
            .collect();
        assert_eq!(slugs, vec!["pages", "users"]);

        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }
}
