//! Configuration file support for the studio

use crate::session::FileSessionStore;
use imagent::GeminiConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variables consulted for the API key, in order
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub inference: GeminiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session storage file (defaults to the platform data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where results are written
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Edge length of images produced by the offline backend
    #[serde(default = "default_placeholder_size")]
    pub placeholder_size: u32,
}

// Defaults

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_placeholder_size() -> u32 {
    512
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            placeholder_size: default_placeholder_size(),
        }
    }
}

impl SessionConfig {
    pub fn store(&self) -> FileSessionStore {
        match &self.storage_path {
            Some(path) => FileSessionStore::new(path),
            None => FileSessionStore::default_location(),
        }
    }
}

impl StudioConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: StudioConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// `<config dir>/imagecraft/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("imagecraft").join("config.toml"))
    }

    /// Load from `path` (or the default location), falling back to defaults
    /// when no file exists, then apply environment overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) if path.exists() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok());
        Ok(config)
    }

    /// Fill the API key from the environment when one is set there
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let from_env = API_KEY_VARS
            .iter()
            .filter_map(|var| lookup(var))
            .find(|key| !key.trim().is_empty());
        if let Some(key) = from_env {
            self.inference.api_key = Some(key);
        }
    }
}
