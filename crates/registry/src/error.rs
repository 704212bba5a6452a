use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Manifest not found at '{}'", path.display())]
    ManifestNotFound { path: PathBuf },

    #[error("Invalid manifest at '{}': {reason}", path.display())]
    ManifestParse { path: PathBuf, reason: String },

    #[error("No '{requested}' or default 'en' entry in localized text")]
    MissingDefaultLocale { requested: String },

    #[error("Module '{0}' is already registered")]
    DuplicateSlug(String),

    #[error("Script statement #{index} failed: {source}")]
    ScriptExecution {
        index: usize,
        statement: String,
        source: Box<RegistryError>,
    },

    #[error("Store not available: {0}")]
    StoreUnavailable(String),

    #[error("Invalid module slug '{slug}': {reason}")]
    InvalidSlug { slug: String, reason: String },

    #[error("Invalid descriptor for module '{slug}': {reason}")]
    InvalidDescriptor { slug: String, reason: String },

    #[error("Statement rejected: {0}")]
    StatementRejected(String),

    #[error("Corrupted record for module '{slug}': {reason}")]
    CorruptedRecord { slug: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO operation '{operation}' failed on path '{}': {source}", path.display())]
    IoOperation {
        operation: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(sqlx::Error),

    #[cfg(feature = "postgres")]
    #[error("Postgres error: {0}")]
    Postgres(tokio_postgres::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

impl RegistryError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            RegistryError::StoreUnavailable(_) => true,
            RegistryError::ScriptExecution { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RegistryError::ManifestNotFound { .. }
                | RegistryError::InvalidSlug { .. }
                | RegistryError::DuplicateSlug(_)
                | RegistryError::InvalidDescriptor { .. }
                | RegistryError::Configuration(_)
        )
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                RegistryError::StoreUnavailable(err.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                RegistryError::StoreUnavailable(err.to_string())
            }
            other => RegistryError::Sqlite(other),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for RegistryError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            RegistryError::StoreUnavailable(err.to_string())
        } else {
            RegistryError::Postgres(err)
        }
    }
}

#[cfg(feature = "postgres")]
impl From<bb8::RunError<tokio_postgres::Error>> for RegistryError {
    fn from(err: bb8::RunError<tokio_postgres::Error>) -> Self {
        match err {
            bb8::RunError::User(err) => err.into(),
            bb8::RunError::TimedOut => {
                RegistryError::StoreUnavailable("connection pool timed out".to_string())
            }
        }
    }
}
