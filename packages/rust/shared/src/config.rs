//! Application configuration for hubkit.
//!
//! User config lives at `~/.hubkit/hubkit.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "hubkit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".hubkit";

// ---------------------------------------------------------------------------
// Config structs (matching hubkit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Component identifier defaults.
    #[serde(default)]
    pub components: ComponentsConfig,

    /// View model loader behaviour.
    #[serde(default)]
    pub loader: LoaderSection,
}

/// `[components]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentsConfig {
    /// Namespace used for components that don't declare one.
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// Component name used for components that don't declare one.
    #[serde(default = "default_fallback_name")]
    pub fallback_name: String,
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
            fallback_name: default_fallback_name(),
        }
    }
}

fn default_namespace() -> String {
    "default".into()
}
fn default_fallback_name() -> String {
    "row".into()
}

/// `[loader]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderSection {
    /// Build a skeleton model from operations that provide initial content.
    #[serde(default = "default_true")]
    pub initial_content: bool,

    /// Remember each view's last loaded model as the next loader's initial model.
    #[serde(default = "default_true")]
    pub register_initial_models: bool,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            initial_content: true,
            register_initial_models: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loader config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime loader configuration, passed explicitly to loader factories.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Namespace for components without one.
    pub default_namespace: String,
    /// Component name for components without one.
    pub fallback_name: String,
    /// Whether loaders build a skeleton initial model.
    pub initial_content: bool,
    /// Whether loaded models are registered as initial models.
    pub register_initial_models: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for LoaderConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_namespace: config.components.default_namespace.clone(),
            fallback_name: config.components.fallback_name.clone(),
            initial_content: config.loader.initial_content,
            register_initial_models: config.loader.register_initial_models,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.hubkit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| HubError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.hubkit/hubkit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HubError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| HubError::config(format!("failed to parse {}: {e}", path.display())))?;

    if config.components.default_namespace.contains(':') {
        return Err(HubError::config(format!(
            "default_namespace '{}' must not contain ':'",
            config.components.default_namespace
        )));
    }

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HubError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| HubError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HubError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
