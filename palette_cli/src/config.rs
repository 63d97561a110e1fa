use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const APP_DIR: &str = "palette-curator";
pub const CONFIG_FILENAME: &str = "config.json";
pub const STATE_FILENAME: &str = "state.json";

/// CLI settings. Every field may be omitted from the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Key-value store file; `None` means the platform data dir.
    pub state_file: Option<PathBuf>,
    pub debounce_ms: u32,
    /// Palettes per page in `list`.
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_file: None,
            debounce_ms: 300,
            page_size: 20,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path.push(CONFIG_FILENAME);
        path
    }

    fn default_state_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path.push(STATE_FILENAME);
        path
    }

    /// Load from an explicit path (must exist) or the default location
    /// (missing file means defaults).
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::default_path();
                if !path.exists() {
                    debug!(path = %path.display(), "no config file, using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };

        let text = fs::read_to_string(&path)
            .with_context(|| format!("read config file '{}'", path.display()))?;
        let mut config: Config = serde_json::from_str(&text)
            .with_context(|| format!("parse config file '{}'", path.display()))?;
        config.validate_and_clamp();
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn validate_and_clamp(&mut self) {
        if self.page_size == 0 {
            warn!("page_size must be at least 1, using 20");
            self.page_size = 20;
        }
    }

    /// `--state` wins over the config file, which wins over the default.
    pub fn state_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.state_file.clone())
            .unwrap_or_else(Self::default_state_path)
    }
}
