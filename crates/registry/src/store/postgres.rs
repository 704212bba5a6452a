use async_trait::async_trait;
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{GenericClient, NoTls, Row};
use tracing::{debug, info};

use super::columns::{
    SELECT_COLUMNS, controllers_from_json, controllers_to_json, text_from_json, text_to_json,
};
use super::{AtomicChange, RecordId, RegistryStore};
use crate::config::validate_table_name;
use crate::error::{RegistryError, Result};
use crate::models::{RecordUpdate, RegistryRecord};
use crate::script::{Script, StatementExecutor};

type PgPool = Pool<PostgresConnectionManager<NoTls>>;
type Param = Box<dyn ToSql + Sync + Send>;

/// Registry table in a PostgreSQL database, reached through a bb8 pool.
#[derive(Clone)]
pub struct PostgresRegistryStore {
    pool: PgPool,
    table: String,
}

impl PostgresRegistryStore {
    /// Connect with a libpq-style connection string and make sure the registry
    /// table exists.
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        let manager = PostgresConnectionManager::new_from_stringlike(url, NoTls)?;
        let pool = Pool::builder().build(manager).await?;
        Self::with_pool(pool, table).await
    }

    pub async fn with_pool(pool: PgPool, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                version TEXT NOT NULL DEFAULT '',
                type TEXT NOT NULL DEFAULT '',
                skip_xss BOOLEAN NOT NULL DEFAULT FALSE,
                is_frontend BOOLEAN NOT NULL DEFAULT FALSE,
                is_backend BOOLEAN NOT NULL DEFAULT FALSE,
                is_backend_menu BOOLEAN NOT NULL DEFAULT FALSE,
                controllers TEXT NOT NULL DEFAULT '{{}}',
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                is_core BOOLEAN NOT NULL DEFAULT FALSE
            )",
            self.table
        );
        let conn = self.pool.get().await?;
        conn.batch_execute(&ddl).await?;
        debug!("Ensured registry table '{}'", self.table);
        Ok(())
    }

    fn record_from_row(row: &Row) -> Result<RegistryRecord> {
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

    async fn insert_on<C: GenericClient + Sync>(
        &self,
        client: &C,
        record: &RegistryRecord,
    ) -> Result<RecordId> {
        let sql = format!(
            "INSERT INTO {} (slug, name, description, version, type, skip_xss, is_frontend, \
             is_backend, is_backend_menu, controllers, enabled, is_core) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING id",
            self.table
        );
        let name = text_to_json(&record.name)?;
        let description = text_to_json(&record.description)?;
        let controllers = controllers_to_json(&record.controllers)?;

        let row = client
            .query_one(
                sql.as_str(),
                &[
                    &record.slug,
                    &name,
                    &description,
                    &record.version,
                    &record.module_type,
                    &record.skip_xss,
                    &record.is_frontend,
                    &record.is_backend,
                    &record.is_backend_menu,
                    &controllers,
                    &record.enabled,
                    &record.is_core,
                ],
            )
            .await
            .map_err(|e| map_unique_violation(e, &record.slug))?;

        Ok(row.try_get(0)?)
    }

    async fn delete_on<C: GenericClient + Sync>(&self, client: &C, slug: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE slug = $1", self.table);
        Ok(client.execute(sql.as_str(), &[&slug]).await?)
    }
}

fn map_unique_violation(err: tokio_postgres::Error, slug: &str) -> RegistryError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        RegistryError::DuplicateSlug(slug.to_string())
    } else {
        err.into()
    }
}

/// `SET` assignments and their parameters for a partial update.
fn update_assignments(update: &RecordUpdate) -> Result<(Vec<&'static str>, Vec<Param>)> {
    let mut columns = Vec::new();
    let mut params: Vec<Param> = Vec::new();

    if let Some(name) = &update.name {
        columns.push("name");
        params.push(Box::new(text_to_json(name)?));
    }
    if let Some(description) = &update.description {
        columns.push("description");
        params.push(Box::new(text_to_json(description)?));
    }
    if let Some(version) = &update.version {
        columns.push("version");
        params.push(Box::new(version.clone()));
    }
    if let Some(module_type) = &update.module_type {
        columns.push("type");
        params.push(Box::new(module_type.clone()));
    }
    for (column, value) in [
        ("skip_xss", update.skip_xss),
        ("is_frontend", update.is_frontend),
        ("is_backend", update.is_backend),
        ("is_backend_menu", update.is_backend_menu),
    ] {
        if let Some(value) = value {
            columns.push(column);
            params.push(Box::new(value));
        }
    }
    if let Some(controllers) = &update.controllers {
        columns.push("controllers");
        params.push(Box::new(controllers_to_json(controllers)?));
    }
    for (column, value) in [("enabled", update.enabled), ("is_core", update.is_core)] {
        if let Some(value) = value {
            columns.push(column);
            params.push(Box::new(value));
        }
    }

    Ok((columns, params))
}

#[async_trait]
impl StatementExecutor for PostgresRegistryStore {
    async fn execute_raw(&self, statement: &str) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(statement).await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for PostgresRegistryStore {
    async fn get(&self, slug: &str) -> Result<Option<RegistryRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE slug = $1 LIMIT 1",
            SELECT_COLUMNS, self.table
        );
        let conn = self.pool.get().await?;
        let row = conn.query_opt(sql.as_str(), &[&slug]).await?;
        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn get_all(&self) -> Result<Vec<RegistryRecord>> {
        let sql = format!("SELECT {} FROM {} ORDER BY id", SELECT_COLUMNS, self.table);
        let conn = self.pool.get().await?;
        let rows = conn.query(sql.as_str(), &[]).await?;
        rows.iter().map(Self::record_from_row).collect()
    }

    async fn insert(&self, record: &RegistryRecord) -> Result<RecordId> {
        let conn = self.pool.get().await?;
        self.insert_on(&*conn, record).await
    }

    async fn update(&self, slug: &str, update: &RecordUpdate) -> Result<u64> {
        let (columns, mut params) = update_assignments(update)?;
        if columns.is_empty() {
            return Ok(0);
        }

        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ${}", column, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE slug = ${}",
            self.table,
            assignments,
            columns.len() + 1
        );
        params.push(Box::new(slug.to_string()));

        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let conn = self.pool.get().await?;
        Ok(conn.execute(sql.as_str(), &refs).await?)
    }

    async fn delete(&self, slug: &str) -> Result<u64> {
        let conn = self.pool.get().await?;
        self.delete_on(&*conn, slug).await
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(format!("DELETE FROM {}", self.table).as_str(), &[])
            .await?;
        Ok(())
    }

    async fn apply_atomic(&self, script: &Script, change: AtomicChange) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let tx = conn.transaction().await?;

        for (index, statement) in script.statements().iter().enumerate() {
            if let Err(e) = tx.batch_execute(statement).await {
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
                self.insert_on(&tx, &record).await?;
            }
            AtomicChange::Delete(slug) => {
                self.delete_on(&tx, &slug).await?;
            }
            AtomicChange::ReplaceAll(records) => {
                tx.execute(format!("DELETE FROM {}", self.table).as_str(), &[])
                    .await?;
                for record in &records {
                    self.insert_on(&tx, record).await?;
                }
                info!("Replaced registry contents with {} records", records.len());
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
