use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// How install, uninstall and import sequence their side effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// Scripts and registry writes run one after another; a failure part way
    /// leaves earlier statements applied.
    #[default]
    Sequential,
    /// Scripts and registry writes commit or roll back together.
    Transactional,
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallMode::Sequential => write!(f, "sequential"),
            InstallMode::Transactional => write!(f, "transactional"),
        }
    }
}

impl FromStr for InstallMode {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(InstallMode::Sequential),
            "transactional" => Ok(InstallMode::Transactional),
            other => Err(RegistryError::Configuration(format!(
                "unknown install mode '{}' (expected 'sequential' or 'transactional')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Modules bundled with the application, registered as core.
    #[serde(default = "default_core_modules_dir")]
    pub core_modules_dir: PathBuf,
    /// Third-party modules. Install and uninstall only look here.
    #[serde(default = "default_addon_modules_dir")]
    pub addon_modules_dir: PathBuf,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub install_mode: InstallMode,
}

fn default_core_modules_dir() -> PathBuf {
    PathBuf::from("application/modules")
}

fn default_addon_modules_dir() -> PathBuf {
    PathBuf::from("third_party/modules")
}

fn default_manifest_file() -> String {
    "details.xml".to_string()
}

fn default_table() -> String {
    "modules".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            core_modules_dir: default_core_modules_dir(),
            addon_modules_dir: default_addon_modules_dir(),
            manifest_file: default_manifest_file(),
            table: default_table(),
            install_mode: InstallMode::default(),
        }
    }
}

impl RegistryConfig {
    pub fn new(core_modules_dir: impl Into<PathBuf>, addon_modules_dir: impl Into<PathBuf>) -> Self {
        Self {
            core_modules_dir: core_modules_dir.into(),
            addon_modules_dir: addon_modules_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_install_mode(mut self, install_mode: InstallMode) -> Self {
        self.install_mode = install_mode;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.core_modules_dir.as_os_str().is_empty() {
            return Err(RegistryError::Configuration(
                "core_modules_dir cannot be empty".to_string(),
            ));
        }

        if self.addon_modules_dir.as_os_str().is_empty() {
            return Err(RegistryError::Configuration(
                "addon_modules_dir cannot be empty".to_string(),
            ));
        }

        let manifest_file = self.manifest_file.trim();
        if manifest_file.is_empty() || manifest_file.contains(['/', '\\']) {
            return Err(RegistryError::Configuration(format!(
                "manifest_file '{}' must be a plain file name",
                self.manifest_file
            )));
        }

        validate_table_name(&self.table)
    }
}

/// Table names are spliced into SQL, so only plain identifiers are allowed.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');

    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(RegistryError::Configuration(format!(
            "table '{}' is not a valid identifier",
            table
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.manifest_file, "details.xml");
        assert_eq!(config.table, "modules");
        assert_eq!(config.install_mode, InstallMode::Sequential);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"install_mode": "transactional", "table": "default_modules"}"#)
                .unwrap();
        assert_eq!(config.install_mode, InstallMode::Transactional);
        assert_eq!(config.table, "default_modules");
        assert_eq!(config.addon_modules_dir, PathBuf::from("third_party/modules"));
    }

    #[test]
    fn test_rejects_bad_table_names() {
        for table in ["", "1modules", "modules; DROP TABLE users", "mod-ules"] {
            let config = RegistryConfig::default().with_table(table);
            assert!(config.validate().is_err(), "{table:?} should be rejected");
        }
    }

    #[test]
    fn test_install_mode_names() {
        assert_eq!(
            "Transactional".parse::<InstallMode>().unwrap(),
            InstallMode::Transactional
        );
        assert_eq!(InstallMode::Sequential.to_string(), "sequential");
        assert!("atomic".parse::<InstallMode>().is_err());
    }

    #[test]
    fn test_rejects_manifest_paths() {
        let config = RegistryConfig {
            manifest_file: "../details.xml".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
