use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::Dataset;

pub const DATA_ROOT_ENV: &str = "FINPIPE_DATA_ROOT";

/// Inclusive validity window applied to some sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_root: String,
    /// Rules CSV; relative paths resolve against `data_root`.
    #[serde(default = "default_rules_file")]
    pub rules_file: String,
    #[serde(default = "default_date_window")]
    pub date_window: Option<DateWindow>,
    /// Source keys the window applies to.
    #[serde(default = "default_windowed_sources")]
    pub windowed_sources: Vec<String>,
    #[serde(default = "default_write_processed")]
    pub write_processed: bool,
}

fn default_rules_file() -> String {
    "category_rules.csv".to_string()
}

fn default_date_window() -> Option<DateWindow> {
    Some(DateWindow {
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
        end: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap_or_default(),
    })
}

fn default_windowed_sources() -> Vec<String> {
    vec!["bank_a".to_string(), "bank_b".to_string()]
}

fn default_write_processed() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_root: "data".to_string(),
            rules_file: default_rules_file(),
            date_window: default_date_window(),
            windowed_sources: default_windowed_sources(),
            write_processed: default_write_processed(),
        }
    }
}

impl Settings {
    pub fn data_root(&self) -> PathBuf {
        PathBuf::from(&self.data_root)
    }

    pub fn raw_dir(&self, dataset: Dataset) -> PathBuf {
        self.data_root().join("raw").join(dataset.as_str())
    }

    pub fn processed_dir(&self, dataset: Dataset) -> PathBuf {
        self.data_root().join("processed").join(dataset.as_str())
    }

    pub fn db_path(&self, dataset: Dataset) -> PathBuf {
        self.data_root().join(format!("{dataset}_finance.db"))
    }

    pub fn rules_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.rules_file);
        if path.is_absolute() {
            path
        } else {
            self.data_root().join(path)
        }
    }

    pub fn window_for(&self, source_key: &str) -> Option<DateWindow> {
        if self.windowed_sources.iter().any(|k| k == source_key) {
            self.date_window
        } else {
            None
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("finpipe")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Settings file merged over defaults, then `FINPIPE_DATA_ROOT`.
pub fn load_settings() -> Result<Settings> {
    let path = settings_path();
    let mut settings = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| PipelineError::Settings(format!("{}: {e}", path.display())))?
    } else {
        Settings::default()
    };
    if let Ok(root) = std::env::var(DATA_ROOT_ENV) {
        if !root.trim().is_empty() {
            settings.data_root = root;
        }
    }
    Ok(settings)
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| PipelineError::Settings(e.to_string()))?;
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
