use directories::ProjectDirs;
use eyre::Result;
use modreg_registry::{GroupAccessPolicy, InstallMode, RegistryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub access: GroupAccessPolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Who the CLI acts as when listing modules.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    pub locale: String,
    pub group_id: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: format!(
                "sqlite://{}?mode=rwc",
                get_default_data_dir().join("modules.db").display()
            ),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            group_id: None,
        }
    }
}

impl Config {
    pub fn get_config_path() -> PathBuf {
        get_default_config_dir().join("config.json")
    }

    pub fn get_data_dir() -> PathBuf {
        get_default_data_dir()
    }

    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path).await,
            None => Self::load_from(&Self::get_config_path()).await,
        }
    }

    /// Load the config at `path`, writing the defaults there on first use.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let default_config = Self::default();
            default_config.save_to(path).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to `path`, or to the default location when none is given.
    pub async fn save(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => self.save_to(path).await,
            None => self.save_to(&Self::get_config_path()).await,
        }
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["registry", "core_modules_dir"] => {
                self.registry.core_modules_dir = PathBuf::from(value);
            }
            ["registry", "addon_modules_dir"] => {
                self.registry.addon_modules_dir = PathBuf::from(value);
            }
            ["registry", "manifest_file"] => {
                self.registry.manifest_file = value.to_string();
            }
            ["registry", "table"] => {
                self.registry.table = value.to_string();
            }
            ["registry", "install_mode"] => {
                self.registry.install_mode = value.parse::<InstallMode>()?;
            }
            ["database", "url"] => {
                self.database.url = value.to_string();
            }
            ["session", "locale"] => {
                if value.trim().is_empty() {
                    return Err(eyre::eyre!("Locale cannot be empty"));
                }
                self.session.locale = value.trim().to_string();
            }
            ["session", "group_id"] => {
                self.session.group_id = parse_optional_group(value)?;
            }
            ["access", "admin_group"] => {
                self.access.admin_group = parse_optional_group(value)?;
            }
            _ => {
                return Err(eyre::eyre!("Unknown configuration key: {}", key));
            }
        }

        self.registry.validate()?;
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        let value = match parts.as_slice() {
            ["registry", "core_modules_dir"] => {
                self.registry.core_modules_dir.display().to_string()
            }
            ["registry", "addon_modules_dir"] => {
                self.registry.addon_modules_dir.display().to_string()
            }
            ["registry", "manifest_file"] => self.registry.manifest_file.clone(),
            ["registry", "table"] => self.registry.table.clone(),
            ["registry", "install_mode"] => self.registry.install_mode.to_string(),
            ["database", "url"] => self.database.url.clone(),
            ["session", "locale"] => self.session.locale.clone(),
            ["session", "group_id"] => self
                .session
                .group_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            ["access", "admin_group"] => self
                .access
                .admin_group
                .map(|id| id.to_string())
                .unwrap_or_default(),
            _ => {
                return Err(eyre::eyre!("Unknown configuration key: {}", key));
            }
        };

        Ok(value)
    }

    pub fn show_all(&self) -> String {
        let grants = if self.access.grants.is_empty() {
            "(none configured)".to_string()
        } else {
            let mut grants: Vec<_> = self
                .access
                .grants
                .iter()
                .map(|(group, slugs)| {
                    let mut slugs: Vec<_> = slugs.iter().map(String::as_str).collect();
                    slugs.sort_unstable();
                    format!("{}: {}", group, slugs.join(", "))
                })
                .collect();
            grants.sort();
            grants.join("; ")
        };

        format!(
            "Configuration:\n\
             Registry:\n\
             ├─ core_modules_dir: {}\n\
             ├─ addon_modules_dir: {}\n\
             ├─ manifest_file: {}\n\
             ├─ table: {}\n\
             └─ install_mode: {}\n\
             Database:\n\
             └─ url: {}\n\
             Session:\n\
             ├─ locale: {}\n\
             └─ group_id: {}\n\
             Access:\n\
             ├─ admin_group: {}\n\
             └─ grants: {}",
            self.registry.core_modules_dir.display(),
            self.registry.addon_modules_dir.display(),
            self.registry.manifest_file,
            self.registry.table,
            self.registry.install_mode,
            self.database.url,
            self.session.locale,
            display_group(self.session.group_id),
            display_group(self.access.admin_group),
            grants
        )
    }

    pub async fn reset(path: Option<&Path>) -> Result<Self> {
        let config = Self::default();
        config.save(path).await?;
        Ok(config)
    }
}

/// Empty input clears the group.
fn parse_optional_group(value: &str) -> Result<Option<u32>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    value
        .parse::<u32>()
        .map(Some)
        .map_err(|_| eyre::eyre!("Invalid group id: {}", value))
}

fn display_group(group: Option<u32>) -> String {
    group
        .map(|id| id.to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}

/// Get the default configuration directory
fn get_default_config_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("org", "modreg", "modreg") {
        proj_dirs.config_dir().to_path_buf()
    } else {
        // Fallback to current directory if we can't determine project dirs
        PathBuf::from(".modreg").join("config")
    }
}

/// Get the default data directory
fn get_default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("org", "modreg", "modreg") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".modreg").join("data")
    }
}
