use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::locale::{DEFAULT_LOCALE, LocalizedText};

/// A controller exposed by a module and the methods it declares, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    pub name: String,
    pub methods: Vec<String>,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(method.into());
        self
    }
}

/// Controllers keyed by name, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Controllers(IndexMap<String, Controller>);

impl Controllers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a controller. A repeated name replaces the earlier entry but keeps
    /// its position.
    pub fn insert(&mut self, controller: Controller) {
        self.0.insert(controller.name.clone(), controller);
    }

    pub fn with(mut self, controller: Controller) -> Self {
        self.insert(controller);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Controller> {
        self.0.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn methods(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|controller| controller.methods.clone())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Controller> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The durable row for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub slug: String,
    pub name: LocalizedText,
    pub description: LocalizedText,
    pub version: String,
    pub module_type: String,
    pub skip_xss: bool,
    pub is_frontend: bool,
    pub is_backend: bool,
    pub is_backend_menu: bool,
    pub controllers: Controllers,
    pub enabled: bool,
    pub is_core: bool,
}

impl RegistryRecord {
    /// Check the invariants every stored record must satisfy.
    pub fn validate(&self) -> Result<()> {
        validate_slug(&self.slug)?;

        for (field, text) in [("name", &self.name), ("description", &self.description)] {
            if !text.has_default() {
                return Err(RegistryError::InvalidDescriptor {
                    slug: self.slug.clone(),
                    reason: format!("{} has no non-empty '{}' entry", field, DEFAULT_LOCALE),
                });
            }
        }

        Ok(())
    }

    /// Localized view of this record for `locale`.
    pub fn to_view(&self, locale: &str) -> Result<ModuleView> {
        Ok(ModuleView {
            name: self.name.resolve(locale)?.to_string(),
            slug: self.slug.clone(),
            version: self.version.clone(),
            module_type: self.module_type.clone(),
            description: self.description.resolve(locale)?.to_string(),
            skip_xss: self.skip_xss,
            is_frontend: self.is_frontend,
            is_backend: self.is_backend,
            is_backend_menu: self.is_backend_menu,
            controllers: self.controllers.clone(),
            enabled: self.enabled,
            is_core: self.is_core,
        })
    }

    /// Apply the set fields of `update` in place.
    pub fn apply(&mut self, update: &RecordUpdate) {
        let update = update.clone();
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(version) = update.version {
            self.version = version;
        }
        if let Some(module_type) = update.module_type {
            self.module_type = module_type;
        }
        if let Some(skip_xss) = update.skip_xss {
            self.skip_xss = skip_xss;
        }
        if let Some(is_frontend) = update.is_frontend {
            self.is_frontend = is_frontend;
        }
        if let Some(is_backend) = update.is_backend {
            self.is_backend = is_backend;
        }
        if let Some(is_backend_menu) = update.is_backend_menu {
            self.is_backend_menu = is_backend_menu;
        }
        if let Some(controllers) = update.controllers {
            self.controllers = controllers;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(is_core) = update.is_core {
            self.is_core = is_core;
        }
    }
}

/// Partial update of a registry record. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub name: Option<LocalizedText>,
    pub description: Option<LocalizedText>,
    pub version: Option<String>,
    pub module_type: Option<String>,
    pub skip_xss: Option<bool>,
    pub is_frontend: Option<bool>,
    pub is_backend: Option<bool>,
    pub is_backend_menu: Option<bool>,
    pub controllers: Option<Controllers>,
    pub enabled: Option<bool>,
    pub is_core: Option<bool>,
}

impl RecordUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: LocalizedText) -> Self {
        self.name = Some(name);
        self
    }

    pub fn description(mut self, description: LocalizedText) -> Self {
        self.description = Some(description);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn module_type(mut self, module_type: impl Into<String>) -> Self {
        self.module_type = Some(module_type.into());
        self
    }

    pub fn skip_xss(mut self, value: bool) -> Self {
        self.skip_xss = Some(value);
        self
    }

    pub fn is_frontend(mut self, value: bool) -> Self {
        self.is_frontend = Some(value);
        self
    }

    pub fn is_backend(mut self, value: bool) -> Self {
        self.is_backend = Some(value);
        self
    }

    pub fn is_backend_menu(mut self, value: bool) -> Self {
        self.is_backend_menu = Some(value);
        self
    }

    pub fn controllers(mut self, controllers: Controllers) -> Self {
        self.controllers = Some(controllers);
        self
    }

    pub fn enabled(mut self, value: bool) -> Self {
        self.enabled = Some(value);
        self
    }

    pub fn is_core(mut self, value: bool) -> Self {
        self.is_core = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A module as seen by the rest of the application, with display strings
/// resolved for one locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleView {
    pub name: String,
    pub slug: String,
    pub version: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub description: String,
    pub skip_xss: bool,
    pub is_frontend: bool,
    pub is_backend: bool,
    pub is_backend_menu: bool,
    pub controllers: Controllers,
    pub enabled: bool,
    pub is_core: bool,
}

impl ModuleView {
    /// Structurally valid empty view handed to callers that cannot deal with
    /// a missing module. Everything is blank except `enabled`.
    pub fn placeholder() -> Self {
        Self {
            name: String::new(),
            slug: String::new(),
            version: String::new(),
            module_type: String::new(),
            description: String::new(),
            skip_xss: false,
            is_frontend: false,
            is_backend: false,
            is_backend_menu: false,
            controllers: Controllers::new(),
            enabled: true,
            is_core: false,
        }
    }
}

/// Outcome of looking up a single module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleLookup {
    Found(ModuleView),
    /// The module is registered but switched off.
    Disabled,
    NotFound,
    /// The slug could never name a module.
    InvalidSlug,
}

impl ModuleLookup {
    pub fn found(self) -> Option<ModuleView> {
        match self {
            ModuleLookup::Found(view) => Some(view),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ModuleLookup::Found(_))
    }

    /// Legacy shape: placeholder for unknown or malformed slugs, `None` for
    /// disabled modules.
    pub fn into_view_or_placeholder(self) -> Option<ModuleView> {
        match self {
            ModuleLookup::Found(view) => Some(view),
            ModuleLookup::Disabled => None,
            ModuleLookup::NotFound | ModuleLookup::InvalidSlug => Some(ModuleView::placeholder()),
        }
    }
}

/// Capability filter for [`crate::ModuleManager::list_modules`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleFilter {
    /// Only modules with a frontend.
    pub is_frontend: bool,
    /// Only modules with a backend the current actor may administer.
    pub is_backend: bool,
    pub is_core: Option<bool>,
    pub is_backend_menu: Option<bool>,
}

impl ModuleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frontend(mut self) -> Self {
        self.is_frontend = true;
        self
    }

    pub fn backend(mut self) -> Self {
        self.is_backend = true;
        self
    }

    pub fn core(mut self, is_core: bool) -> Self {
        self.is_core = Some(is_core);
        self
    }

    pub fn backend_menu(mut self, is_backend_menu: bool) -> Self {
        self.is_backend_menu = Some(is_backend_menu);
        self
    }
}

/// Who is asking and in which language, supplied per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub locale: String,
    pub group_id: Option<u32>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            group_id: None,
        }
    }
}

impl RequestContext {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            group_id: None,
        }
    }

    pub fn with_group(mut self, group_id: u32) -> Self {
        self.group_id = Some(group_id);
        self
    }
}

/// Reject slugs that are empty, oversized, or could escape a module root.
pub fn validate_slug(slug: &str) -> Result<()> {
    let invalid = |reason: &str| RegistryError::InvalidSlug {
        slug: slug.to_string(),
        reason: reason.to_string(),
    };

    if slug.is_empty() {
        return Err(invalid("slug cannot be empty"));
    }

    if slug.contains("..") || slug.contains('/') || slug.contains('\\') {
        return Err(invalid("slug contains invalid path characters"));
    }

    if slug.chars().any(char::is_whitespace) {
        return Err(invalid("slug contains whitespace"));
    }

    if slug.len() > 255 {
        return Err(invalid("slug too long"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RegistryRecord {
        RegistryRecord {
            slug: "blog".to_string(),
            name: LocalizedText::single("Blog").with("nl", "Weblog"),
            description: LocalizedText::single("Post articles"),
            version: "2.0".to_string(),
            module_type: "content".to_string(),
            skip_xss: false,
            is_frontend: true,
            is_backend: true,
            is_backend_menu: false,
            controllers: Controllers::new()
                .with(Controller::new("admin").with_method("index").with_method("create")),
            enabled: true,
            is_core: false,
        }
    }

    #[test]
    fn test_controller_replacement_keeps_position() {
        let mut controllers = Controllers::new()
            .with(Controller::new("admin").with_method("index"))
            .with(Controller::new("rss"));
        controllers.insert(Controller::new("admin").with_method("edit"));

        assert_eq!(controllers.names(), vec!["admin", "rss"]);
        assert_eq!(controllers.methods("admin"), vec!["edit"]);
        assert!(controllers.methods("missing").is_empty());
    }

    #[test]
    fn test_view_resolves_locale() {
        let view = record().to_view("nl").unwrap();
        assert_eq!(view.name, "Weblog");
        assert_eq!(view.description, "Post articles");
        assert_eq!(view.controllers.names(), vec!["admin"]);
    }

    #[test]
    fn test_validate_requires_english() {
        let mut record = record();
        assert!(record.validate().is_ok());

        record.description = LocalizedText::new().with("nl", "Artikelen");
        assert!(matches!(
            record.validate(),
            Err(RegistryError::InvalidDescriptor { .. })
        ));

        record.description = LocalizedText::single("").with("nl", "Artikelen");
        assert!(matches!(
            record.validate(),
            Err(RegistryError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_apply_partial_update() {
        let mut record = record();
        record.apply(&RecordUpdate::new().enabled(false).version("2.1"));

        assert!(!record.enabled);
        assert_eq!(record.version, "2.1");
        assert_eq!(record.module_type, "content");
        assert!(RecordUpdate::new().is_empty());
    }

    #[test]
    fn test_slug_validation() {
        assert!(validate_slug("blog").is_ok());
        assert!(validate_slug("page-types_2").is_ok());
        for bad in ["", "../etc", "a/b", "a\\b", "two words"] {
            assert!(validate_slug(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(validate_slug(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_legacy_lookup_shape() {
        let placeholder = ModuleLookup::NotFound.into_view_or_placeholder().unwrap();
        assert!(placeholder.enabled);
        assert!(placeholder.slug.is_empty());
        assert!(ModuleLookup::Disabled.into_view_or_placeholder().is_none());
        assert!(ModuleLookup::InvalidSlug.found().is_none());
    }
}
