use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_program() -> String {
    "paper-robot".to_string()
}

/// Application config, read once at startup from `config.toml`.
///
/// User-facing settings (API key, model, ...) live in the settings store
/// instead, see [`crate::settings`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    /// Executable of the external search tool, looked up on `PATH`.
    #[serde(default = "default_program")]
    pub program: String,
    /// Directory the tool runs in. Its relative `outputDir` resolves here.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            program: default_program(),
            working_dir: None,
        }
    }
}

impl ToolConfig {
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 420,
            height: 760,
            min_width: 320,
            min_height: 480,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&Self::get_config_path())
    }

    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Error parsing {}: {}. Using defaults.", config_path.display(), e),
                },
                Err(e) => tracing::warn!("Error reading {}: {}. Using defaults.", config_path.display(), e),
            }
        } else if let Some(parent) = config_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        Config::default()
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/paper-panel")
        } else {
            PathBuf::from(".")
        }
    }
}
