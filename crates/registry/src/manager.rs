//! Module lifecycle orchestration.
//!
//! [`ModuleManager`] ties manifest parsing, install/uninstall scripts and the
//! registry store together. With [`InstallMode::Sequential`] the steps are
//! not transactional: a script that fails half way leaves its earlier
//! statements applied, and `import_all` empties the table before it
//! repopulates it, so a concurrent reader can observe an empty registry.
//! Nothing here coordinates concurrent writers; callers that need that must
//! serialize access themselves or use [`InstallMode::Transactional`].

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::access::AccessPolicy;
use crate::config::{InstallMode, RegistryConfig};
use crate::error::{RegistryError, Result};
use crate::manifest::{ModuleDescriptor, manifest_path, parse_manifest};
use crate::models::{
    ModuleFilter, ModuleLookup, ModuleView, RecordUpdate, RegistryRecord, RequestContext,
    validate_slug,
};
use crate::script::{Script, run_script};
use crate::store::{AtomicChange, RecordId, RegistryStore};

/// A module directory `import_all` could not register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedModule {
    pub slug: String,
    pub path: PathBuf,
    pub reason: String,
}

/// What `import_all` registered and what it left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub skipped: Vec<SkippedModule>,
}

/// Central manager for the module registry
pub struct ModuleManager {
    store: Box<dyn RegistryStore>,
    access: Box<dyn AccessPolicy>,
    config: RegistryConfig,
}

impl ModuleManager {
    /// Create a manager with the default configuration
    pub fn new(store: Box<dyn RegistryStore>, access: Box<dyn AccessPolicy>) -> Self {
        Self {
            store,
            access,
            config: RegistryConfig::default(),
        }
    }

    /// Create a manager with custom configuration
    pub fn with_config(
        store: Box<dyn RegistryStore>,
        access: Box<dyn AccessPolicy>,
        config: RegistryConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            access,
            config,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RegistryStore {
        self.store.as_ref()
    }

    /// Look up an enabled module and resolve its display strings for
    /// `ctx.locale`.
    pub async fn get(&self, slug: &str, ctx: &RequestContext) -> Result<ModuleLookup> {
        if validate_slug(slug).is_err() {
            return Ok(ModuleLookup::InvalidSlug);
        }

        match self.store.get(slug).await? {
            None => Ok(ModuleLookup::NotFound),
            Some(record) if !record.enabled => Ok(ModuleLookup::Disabled),
            Some(record) => Ok(ModuleLookup::Found(record.to_view(&ctx.locale)?)),
        }
    }

    /// Register a module from a descriptor. Scripts are not run.
    pub async fn add(&self, descriptor: &ModuleDescriptor) -> Result<RecordId> {
        let record = descriptor.to_record();
        record.validate()?;

        let id = self.store.insert(&record).await?;
        debug!("Registered module '{}' as record {}", record.slug, id);
        Ok(id)
    }

    /// Apply a partial update. Updating an unknown slug succeeds without
    /// effect; call [`Self::exists`] first to tell the cases apart.
    pub async fn update(&self, slug: &str, update: &RecordUpdate) -> Result<()> {
        validate_slug(slug)?;

        for (field, text) in [("name", &update.name), ("description", &update.description)] {
            if text.as_ref().is_some_and(|text| !text.has_default()) {
                return Err(RegistryError::InvalidDescriptor {
                    slug: slug.to_string(),
                    reason: format!("{} has no non-empty 'en' entry", field),
                });
            }
        }

        let affected = self.store.update(slug, update).await?;
        debug!("Updated module '{}' ({} records)", slug, affected);
        Ok(())
    }

    pub async fn delete(&self, slug: &str) -> Result<()> {
        validate_slug(slug)?;
        let removed = self.store.delete(slug).await?;
        debug!("Deleted module '{}' ({} records)", slug, removed);
        Ok(())
    }

    /// Whether a record exists for `slug`, enabled or not.
    pub async fn exists(&self, slug: &str) -> Result<bool> {
        if validate_slug(slug).is_err() {
            return Ok(false);
        }
        self.store.exists(slug).await
    }

    /// Switch a registered module on. Returns `false` if there is no record.
    pub async fn enable(&self, slug: &str) -> Result<bool> {
        self.set_enabled(slug, true).await
    }

    /// Switch a registered module off. Returns `false` if there is no record.
    pub async fn disable(&self, slug: &str) -> Result<bool> {
        self.set_enabled(slug, false).await
    }

    async fn set_enabled(&self, slug: &str, enabled: bool) -> Result<bool> {
        if !self.exists(slug).await? {
            debug!("Cannot toggle unknown module '{}'", slug);
            return Ok(false);
        }

        self.store
            .update(slug, &RecordUpdate::new().enabled(enabled))
            .await?;
        info!(
            "{} module '{}'",
            if enabled { "Enabled" } else { "Disabled" },
            slug
        );
        Ok(true)
    }

    /// List modules matching `filter`, in storage order.
    ///
    /// Disabled modules are left out unless `include_disabled` is set. The
    /// backend filter additionally requires the access policy to grant
    /// `ctx.group_id` admin access; without a group nothing passes it.
    pub async fn list_modules(
        &self,
        filter: &ModuleFilter,
        include_disabled: bool,
        ctx: &RequestContext,
    ) -> Result<Vec<ModuleView>> {
        let mut modules = Vec::new();

        for record in self.store.get_all().await? {
            if !include_disabled && !record.enabled {
                continue;
            }

            let module = record.to_view(&ctx.locale)?;

            if filter.is_frontend && !module.is_frontend {
                continue;
            }

            if filter.is_backend {
                if !module.is_backend {
                    continue;
                }

                let allowed = match ctx.group_id {
                    Some(group_id) => {
                        self.access
                            .has_admin_access(group_id, &module.slug)
                            .await?
                    }
                    None => false,
                };
                if !allowed {
                    continue;
                }
            }

            if filter.is_core.is_some_and(|is_core| is_core != module.is_core) {
                continue;
            }

            if filter
                .is_backend_menu
                .is_some_and(|is_backend_menu| is_backend_menu != module.is_backend_menu)
            {
                continue;
            }

            modules.push(module);
        }

        Ok(modules)
    }

    /// Controller names of an enabled module, in manifest order.
    pub async fn controller_names(&self, slug: &str) -> Result<Vec<String>> {
        Ok(self
            .enabled_record(slug)
            .await?
            .map(|record| record.controllers.names())
            .unwrap_or_default())
    }

    /// Methods of one controller of an enabled module, in declaration order.
    pub async fn controller_methods(&self, slug: &str, controller: &str) -> Result<Vec<String>> {
        Ok(self
            .enabled_record(slug)
            .await?
            .map(|record| record.controllers.methods(controller))
            .unwrap_or_default())
    }

    async fn enabled_record(&self, slug: &str) -> Result<Option<RegistryRecord>> {
        if validate_slug(slug).is_err() {
            return Ok(None);
        }
        Ok(self.store.get(slug).await?.filter(|record| record.enabled))
    }

    /// Install a third-party module from its manifest.
    ///
    /// Returns `false` without touching anything when the module has no
    /// manifest. Otherwise the install script runs first and the record is
    /// added after it; in sequential mode a failing script leaves its earlier
    /// statements applied and adds no record.
    pub async fn install(&self, slug: &str) -> Result<bool> {
        validate_slug(slug)?;

        let path = self.addon_manifest_path(slug);
        if !manifest_exists(&path).await? {
            warn!("No manifest for module '{}' at {}", slug, path.display());
            return Ok(false);
        }

        let mut descriptor = parse_manifest(&path).await?;
        descriptor.slug = slug.to_string();
        descriptor.is_core = false;
        descriptor.enabled = true;

        let record = descriptor.to_record();
        record.validate()?;

        match self.config.install_mode {
            InstallMode::Sequential => {
                let executed = run_script(&descriptor.install_script, self.store.as_ref()).await?;
                debug!("Ran {} install statements for '{}'", executed, slug);
                self.add(&descriptor).await?;
            }
            InstallMode::Transactional => {
                self.store
                    .apply_atomic(&descriptor.install_script, AtomicChange::Insert(record))
                    .await?;
            }
        }

        info!(
            "Installed module '{}' version {}",
            slug, descriptor.version
        );
        Ok(true)
    }

    /// Uninstall a third-party module.
    ///
    /// The uninstall script comes from the manifest currently on disk, which
    /// may differ from the one the module was installed with. Returns `false`
    /// and leaves the record alone when the manifest is gone. In sequential
    /// mode the record is deleted even when the script fails; the script error
    /// is returned afterwards.
    pub async fn uninstall(&self, slug: &str) -> Result<bool> {
        validate_slug(slug)?;

        let path = self.addon_manifest_path(slug);
        if !manifest_exists(&path).await? {
            warn!("No manifest for module '{}' at {}", slug, path.display());
            return Ok(false);
        }

        let descriptor = parse_manifest(&path).await?;

        match self.config.install_mode {
            InstallMode::Sequential => {
                let script_result =
                    run_script(&descriptor.uninstall_script, self.store.as_ref()).await;
                if let Err(e) = &script_result {
                    warn!("Uninstall script for module '{}' failed: {}", slug, e);
                }

                self.store.delete(slug).await?;

                if let Err(e) = script_result {
                    warn!("Removed module '{}' despite the failed uninstall script", slug);
                    return Err(e);
                }
            }
            InstallMode::Transactional => {
                self.store
                    .apply_atomic(
                        &descriptor.uninstall_script,
                        AtomicChange::Delete(slug.to_string()),
                    )
                    .await?;
            }
        }

        info!("Uninstalled module '{}'", slug);
        Ok(true)
    }

    /// Rebuild the registry from the module directories on disk.
    ///
    /// Every subdirectory of the core root and then the addon root that holds
    /// a manifest is registered, enabled, and flagged core according to its
    /// root. Existing records, including any enabled flags changed by hand,
    /// are discarded first. Directories without a manifest are ignored;
    /// manifests that fail to parse or clash on slug are skipped and reported.
    pub async fn import_all(&self) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        match self.config.install_mode {
            InstallMode::Sequential => {
                self.store.clear().await?;
                info!("Cleared module registry for import");

                for (root, is_core) in self.module_roots() {
                    for (slug, path) in module_directories(&root, &self.config.manifest_file) {
                        let record = match self.load_for_import(&slug, &path, is_core).await {
                            Ok(record) => record,
                            Err(e) => {
                                report.skip(slug, path, e);
                                continue;
                            }
                        };

                        match self.store.insert(&record).await {
                            Ok(_) => report.imported.push(slug),
                            Err(e @ RegistryError::DuplicateSlug(_)) => report.skip(slug, path, e),
                            Err(e) => return Err(e),
                        }
                    }
                }
            }
            InstallMode::Transactional => {
                let mut records = Vec::new();
                let mut seen = HashSet::new();

                for (root, is_core) in self.module_roots() {
                    for (slug, path) in module_directories(&root, &self.config.manifest_file) {
                        if seen.contains(&slug) {
                            report.skip(slug.clone(), path, RegistryError::DuplicateSlug(slug));
                            continue;
                        }

                        // Only a loaded module claims its slug.
                        match self.load_for_import(&slug, &path, is_core).await {
                            Ok(record) => {
                                seen.insert(slug.clone());
                                report.imported.push(slug);
                                records.push(record);
                            }
                            Err(e) => report.skip(slug, path, e),
                        }
                    }
                }

                self.store
                    .apply_atomic(&Script::default(), AtomicChange::ReplaceAll(records))
                    .await?;
            }
        }

        info!(
            "Imported {} modules ({} skipped)",
            report.imported.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn load_for_import(
        &self,
        slug: &str,
        path: &Path,
        is_core: bool,
    ) -> Result<RegistryRecord> {
        validate_slug(slug)?;

        let mut descriptor = parse_manifest(path).await?;
        descriptor.slug = slug.to_string();
        descriptor.is_core = is_core;
        descriptor.enabled = true;

        let record = descriptor.to_record();
        record.validate()?;
        Ok(record)
    }

    fn module_roots(&self) -> [(PathBuf, bool); 2] {
        [
            (self.config.core_modules_dir.clone(), true),
            (self.config.addon_modules_dir.clone(), false),
        ]
    }

    fn addon_manifest_path(&self, slug: &str) -> PathBuf {
        manifest_path(
            &self.config.addon_modules_dir,
            slug,
            &self.config.manifest_file,
        )
    }
}

impl ImportReport {
    fn skip(&mut self, slug: String, path: PathBuf, error: RegistryError) {
        warn!("Skipping module '{}' during import: {}", slug, error);
        self.skipped.push(SkippedModule {
            slug,
            path,
            reason: error.to_string(),
        });
    }
}

/// Whether `path` is a regular file. Anything else at that path counts as
/// no manifest.
async fn manifest_exists(path: &Path) -> Result<bool> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RegistryError::IoOperation {
            operation: "check manifest".to_string(),
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Immediate subdirectories of `root` that hold a manifest, sorted by name,
/// as `(directory name, manifest path)`.
fn module_directories(root: &Path, manifest_file: &str) -> Vec<(String, PathBuf)> {
    if !root.is_dir() {
        debug!("Module root {} does not exist", root.display());
        return Vec::new();
    }

    let mut modules = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read module directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let manifest = path.join(manifest_file);
        if !manifest.is_file() {
            continue;
        }

        match entry.file_name().to_str() {
            Some(name) => modules.push((name.to_string(), manifest)),
            None => warn!("Skipping module directory with non UTF-8 name: {}", path.display()),
        }
    }

    modules
}
