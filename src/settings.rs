use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::grid::{DeletePolicy, GridOptions};
use crate::rollup::ParentTotals;

pub const LEDGER_FILE: &str = "tally.db";
pub const CACHE_FILE: &str = "cache.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub parent_totals: ParentTotals,
    #[serde(default)]
    pub delete_policy: DeletePolicy,
}

fn default_user_id() -> String {
    "local".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            user_id: default_user_id(),
            parent_totals: ParentTotals::default(),
            delete_policy: DeletePolicy::default(),
        }
    }
}

impl Settings {
    pub fn grid_options(&self) -> GridOptions {
        GridOptions {
            parent_totals: self.parent_totals,
            delete_policy: self.delete_policy,
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(LEDGER_FILE)
    }

    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(CACHE_FILE)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("tally")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("tally")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if !path.exists() {
        return Settings::default();
    }
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
        Settings::default()
    })
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| TallyError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
