use std::path::PathBuf;

use eyre::{Result, WrapErr};
use modreg_registry::{ModuleManager, RegistryStore, RequestContext, SqliteRegistryStore};
use tracing::debug;

use crate::cli::Cli;
use crate::config::Config;

/// Build a manager for the database and module roots named in `config`.
pub async fn open_manager(config: &Config) -> Result<ModuleManager> {
    let store = open_store(config).await?;
    let manager = ModuleManager::with_config(
        store,
        Box::new(config.access.clone()),
        config.registry.clone(),
    )?;
    Ok(manager)
}

/// Locale and group for this invocation: flags win over the saved session.
pub fn request_context(cli: &Cli, config: &Config) -> RequestContext {
    let locale = cli
        .locale
        .clone()
        .unwrap_or_else(|| config.session.locale.clone());

    RequestContext {
        locale,
        group_id: cli.group.or(config.session.group_id),
    }
}

async fn open_store(config: &Config) -> Result<Box<dyn RegistryStore>> {
    let url = config.database.url.as_str();
    let table = config.registry.table.as_str();

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        return connect_postgres(url, table).await;
    }

    let parent = sqlite_file_path(url)
        .and_then(|path| path.parent().map(PathBuf::from))
        .filter(|parent| !parent.as_os_str().is_empty());
    if let Some(parent) = parent {
        tokio::fs::create_dir_all(&parent)
            .await
            .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
    }

    debug!("Opening SQLite registry at {}", url);
    let store = SqliteRegistryStore::connect(url, table)
        .await
        .wrap_err_with(|| format!("Failed to open registry database {}", url))?;
    Ok(Box::new(store))
}

#[cfg(feature = "postgres")]
async fn connect_postgres(url: &str, table: &str) -> Result<Box<dyn RegistryStore>> {
    debug!("Opening PostgreSQL registry");
    let store = modreg_registry::PostgresRegistryStore::connect(url, table).await?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_url: &str, _table: &str) -> Result<Box<dyn RegistryStore>> {
    Err(eyre::eyre!(
        "PostgreSQL support is not compiled in; rebuild with the 'postgres' feature"
    ))
}

/// File behind a `sqlite:` URL, if it names one.
fn sqlite_file_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}
