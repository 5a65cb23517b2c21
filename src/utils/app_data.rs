use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::store::DEFAULT_COMPILED_CACHE_SIZE;

const APP_NAME: &str = "mcbench";
const CONFIG_FILE: &str = "config.json";
const STORE_FILE: &str = "queries.json";
const DATA_ROOT_DIR: &str = "data";

/// Application configuration stored in the app data directory.
/// Command-line flags take precedence over every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Benchmark corpus root; `<app data>/data` when unset
    #[serde(default)]
    pub data_root: Option<PathBuf>,

    /// Query store file; `<app data>/queries.json` when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Scan worker threads. 0 uses the number of CPU cores.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Number of compiled queries kept in memory
    #[serde(default = "default_compiled_cache_size")]
    pub compiled_cache_size: usize,
}

fn default_workers() -> usize {
    0 // 0 means use CPU count
}

fn default_compiled_cache_size() -> usize {
    DEFAULT_COMPILED_CACHE_SIZE
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: None,
            store_path: None,
            workers: default_workers(),
            compiled_cache_size: default_compiled_cache_size(),
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            let config: AppConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the effective worker count (resolves 0 to CPU count)
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus()
        } else {
            self.workers
        }
    }

    pub fn resolved_data_root(&self) -> Result<PathBuf> {
        match &self.data_root {
            Some(root) => Ok(root.clone()),
            None => Ok(get_app_data_dir()?.join(DATA_ROOT_DIR)),
        }
    }

    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_app_data_dir()?.join(STORE_FILE)),
        }
    }
}

/// Get the number of CPUs available
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory for the config and query store
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)
        .with_context(|| format!("Failed to create {}", app_dir.display()))?;
    Ok(app_dir)
}
