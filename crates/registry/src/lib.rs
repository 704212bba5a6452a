//! Modreg Registry - module discovery, installation and lookup for a CMS
//!
//! This crate keeps a database-backed registry of the modules a content
//! management system knows about. Modules live in directories under a core
//! root and an addon root, each described by an XML manifest. The registry
//! stores one record per module with localized display strings and
//! controller metadata, and hands out locale-resolved views of them.
//!
//! # Features
//!
//! - **Manifest Parsing**: `details.xml` with localized names and embedded scripts
//! - **Lifecycle**: install, uninstall, enable, disable and bulk import
//! - **Lookup**: per-module views, filtered listings and controller metadata
//! - **Storage Backends**: in-memory, SQLite (`sqlite`, default) and PostgreSQL (`postgres`)
//! - **Access Control**: backend listings filtered through an [`AccessPolicy`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use modreg_registry::{
//!     AllowAll, ModuleFilter, ModuleManager, RegistryConfig, RequestContext,
//!     SqliteRegistryStore,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RegistryConfig::new("application/modules", "third_party/modules");
//! let store = SqliteRegistryStore::connect("sqlite://modules.db?mode=rwc", &config.table).await?;
//! let manager = ModuleManager::with_config(Box::new(store), Box::new(AllowAll), config)?;
//!
//! // Install a third-party module and list what the admin menu shows
//! manager.install("blog").await?;
//!
//! let ctx = RequestContext::new("nl").with_group(1);
//! let filter = ModuleFilter::new().backend().backend_menu(true);
//! for module in manager.list_modules(&filter, false, &ctx).await? {
//!     println!("{} ({})", module.name, module.version);
//! }
//! # Ok(())
//! # }
//! ```
pub mod access;
pub mod config;
pub mod error;
pub mod locale;
pub mod manager;
pub mod manifest;
pub mod models;
pub mod script;
pub mod store;

// Re-export commonly used types
pub use access::{AccessPolicy, AllowAll, GroupAccessPolicy};
pub use config::{InstallMode, RegistryConfig};
pub use error::{RegistryError, Result};
pub use locale::{DEFAULT_LOCALE, LocalizedText, resolve};
pub use manager::{ImportReport, ModuleManager, SkippedModule};
pub use manifest::{ModuleDescriptor, parse_manifest, parse_manifest_str};
pub use models::{
    Controller, Controllers, ModuleFilter, ModuleLookup, ModuleView, RecordUpdate,
    RegistryRecord, RequestContext, validate_slug,
};
pub use script::{STATEMENT_DELIMITER, Script, StatementExecutor, run_script};
pub use store::{AtomicChange, MemoryRegistryStore, RecordId, RegistryStore};

#[cfg(feature = "postgres")]
pub use store::PostgresRegistryStore;
#[cfg(feature = "sqlite")]
pub use store::SqliteRegistryStore;

/// Version of the registry crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
