//! Shared fixtures: a temporary CMS tree with core and addon module roots.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use modreg_registry::{InstallMode, RegistryConfig};
use tempfile::TempDir;

pub struct ModuleTree {
    dir: TempDir,
}

impl ModuleTree {
    pub fn new() -> Self {
        let tree = Self {
            dir: TempDir::new().unwrap(),
        };
        fs::create_dir_all(tree.core_root()).unwrap();
        fs::create_dir_all(tree.addon_root()).unwrap();
        tree
    }

    pub fn core_root(&self) -> PathBuf {
        self.dir.path().join("application/modules")
    }

    pub fn addon_root(&self) -> PathBuf {
        self.dir.path().join("third_party/modules")
    }

    pub fn config(&self, mode: InstallMode) -> RegistryConfig {
        RegistryConfig::new(self.core_root(), self.addon_root()).with_install_mode(mode)
    }

    pub fn add_core(&self, dir: &str, manifest: &str) {
        write_manifest(self.core_root().join(dir), manifest);
    }

    pub fn add_addon(&self, dir: &str, manifest: &str) {
        write_manifest(self.addon_root().join(dir), manifest);
    }

    pub fn remove_addon_manifest(&self, dir: &str) {
        fs::remove_file(self.addon_root().join(dir).join("details.xml")).unwrap();
    }
}

fn write_manifest(dir: PathBuf, manifest: &str) {
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("details.xml"), manifest).unwrap();
}

/// A manifest with English and Dutch names and the given flags and scripts.
pub fn manifest(
    name: &str,
    is_frontend: bool,
    is_backend: bool,
    is_backend_menu: bool,
    install: &str,
    uninstall: &str,
) -> String {
    let flag = |on: bool| if on { "1" } else { "0" };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<module version="1.2" type="addon">
    <name>
        <en>{name}</en>
        <nl>{name} NL</nl>
    </name>
    <description>
        <en>The {name} module.</en>
    </description>
    <is_frontend>{}</is_frontend>
    <is_backend>{}</is_backend>
    <is_backend_menu>{}</is_backend_menu>
    <controllers>
        <controller name="admin">
            <method>index</method>
            <method>edit</method>
        </controller>
        <controller name="public" />
    </controllers>
    <install><![CDATA[{install}]]></install>
    <uninstall><![CDATA[{uninstall}]]></uninstall>
</module>"#,
        flag(is_frontend),
        flag(is_backend),
        flag(is_backend_menu),
    )
}

/// A frontend and backend module without scripts.
pub fn simple_manifest(name: &str) -> String {
    manifest(name, true, true, false, "", "")
}
