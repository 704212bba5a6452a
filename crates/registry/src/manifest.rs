//! Module manifest (`details.xml`) parsing.
//!
//! A manifest looks like:
//!
//! ```xml
//! <module version="2.0" type="content">
//!     <name>
//!         <en>Blog</en>
//!         <nl>Weblog</nl>
//!     </name>
//!     <description>
//!         <en>Post articles.</en>
//!     </description>
//!     <is_frontend>1</is_frontend>
//!     <is_backend>1</is_backend>
//!     <controllers>
//!         <controller name="admin">
//!             <method>index</method>
//!             <method>create</method>
//!         </controller>
//!     </controllers>
//!     <install><![CDATA[
//!         CREATE TABLE blog (id INTEGER PRIMARY KEY);
//!         -- command split --
//!         INSERT INTO settings (slug) VALUES ('blog_per_page');
//!     ]]></install>
//!     <uninstall>DROP TABLE blog;</uninstall>
//! </module>
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tokio::fs;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::locale::LocalizedText;
use crate::models::{Controller, Controllers, RegistryRecord};
use crate::script::Script;

/// Everything a manifest declares about a module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub slug: String,
    pub name: LocalizedText,
    pub description: LocalizedText,
    pub version: String,
    pub module_type: String,
    pub skip_xss: bool,
    pub is_frontend: bool,
    pub is_backend: bool,
    pub is_backend_menu: bool,
    pub is_core: bool,
    pub enabled: bool,
    pub controllers: Controllers,
    pub install_script: Script,
    pub uninstall_script: Script,
}

impl ModuleDescriptor {
    /// The persisted part of this descriptor. Scripts are not stored.
    pub fn to_record(&self) -> RegistryRecord {
        RegistryRecord {
            slug: self.slug.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            module_type: self.module_type.clone(),
            skip_xss: self.skip_xss,
            is_frontend: self.is_frontend,
            is_backend: self.is_backend,
            is_backend_menu: self.is_backend_menu,
            controllers: self.controllers.clone(),
            enabled: self.enabled,
            is_core: self.is_core,
        }
    }
}

/// Read and parse the manifest at `path`.
pub async fn parse_manifest(path: impl AsRef<Path>) -> Result<ModuleDescriptor> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => RegistryError::ManifestNotFound {
            path: path.to_path_buf(),
        },
        _ => RegistryError::IoOperation {
            operation: "read manifest".to_string(),
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let descriptor = parse_manifest_str(&content, path)?;
    debug!(
        "Parsed manifest {} ({} controllers)",
        path.display(),
        descriptor.controllers.len()
    );
    Ok(descriptor)
}

/// Parse manifest text. `path` is only used in error messages.
pub fn parse_manifest_str(content: &str, path: &Path) -> Result<ModuleDescriptor> {
    let parse_error = |reason: String| RegistryError::ManifestParse {
        path: path.to_path_buf(),
        reason,
    };

    let document = Document::parse(content).map_err(|e| parse_error(e.to_string()))?;
    let root = document.root_element();

    let mut descriptor = ModuleDescriptor {
        version: root.attribute("version").unwrap_or_default().to_string(),
        module_type: root.attribute("type").unwrap_or_default().to_string(),
        ..Default::default()
    };

    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "slug" => descriptor.slug = element_text(child).trim().to_string(),
            "name" => descriptor.name = localized(child),
            "description" => descriptor.description = localized(child),
            "skip_xss" => descriptor.skip_xss = truthy(child),
            "is_frontend" => descriptor.is_frontend = truthy(child),
            "is_backend" => descriptor.is_backend = truthy(child),
            "is_backend_menu" => descriptor.is_backend_menu = truthy(child),
            "controller" => descriptor
                .controllers
                .insert(controller(child).map_err(&parse_error)?),
            "controllers" if child.has_attribute("name") => descriptor
                .controllers
                .insert(controller(child).map_err(&parse_error)?),
            "controllers" => {
                for nested in child
                    .children()
                    .filter(|n| n.is_element() && n.has_tag_name("controller"))
                {
                    descriptor
                        .controllers
                        .insert(controller(nested).map_err(&parse_error)?);
                }
            }
            "install" => descriptor.install_script = Script::parse(&element_text(child)),
            "uninstall" => descriptor.uninstall_script = Script::parse(&element_text(child)),
            _ => {}
        }
    }

    Ok(descriptor)
}

/// Path of the manifest for `slug` under `root`.
pub fn manifest_path(root: &Path, slug: &str, manifest_file: &str) -> PathBuf {
    root.join(slug).join(manifest_file)
}

/// All text below `node`, CDATA included.
fn element_text(node: Node) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect()
}

/// Only the literal `1` switches a flag on.
fn truthy(node: Node) -> bool {
    element_text(node).trim() == "1"
}

/// Either one child per locale, or a bare value taken as English. Locales
/// with blank text are left out.
fn localized(node: Node) -> LocalizedText {
    let mut entries = node.children().filter(Node::is_element).peekable();

    if entries.peek().is_none() {
        let text = element_text(node);
        let text = text.trim();
        return if text.is_empty() {
            LocalizedText::new()
        } else {
            LocalizedText::single(text)
        };
    }

    entries
        .map(|entry| {
            (
                entry.tag_name().name().to_string(),
                element_text(entry).trim().to_string(),
            )
        })
        .filter(|(_, text)| !text.is_empty())
        .collect()
}

fn controller(node: Node) -> std::result::Result<Controller, String> {
    let name = node
        .attribute("name")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| "controller without a name attribute".to_string())?;

    let methods = node
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("method"))
        .map(|method| element_text(method).trim().to_string())
        .filter(|method| !method.is_empty())
        .collect();

    Ok(Controller {
        name: name.to_string(),
        methods,
    })
}
