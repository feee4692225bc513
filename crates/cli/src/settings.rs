use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use facescan_core::scan::scan_config::ScanConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine config directory")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub poll_interval_ms: u64,
    pub presentation_delay_ms: u64,
    pub notification_ttl_ms: u64,
    pub upload_analysis_delay_ms: u64,
    pub bind_timeout_ms: u64,
    /// BlazeFace score threshold (0.0-1.0).
    pub confidence: f64,
    /// Where to fetch the BlazeFace model when it is not cached.
    pub model_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let config = ScanConfig::default();
        Self {
            poll_interval_ms: config.poll_interval.as_millis() as u64,
            presentation_delay_ms: config.presentation_delay.as_millis() as u64,
            notification_ttl_ms: config.notification_ttl.as_millis() as u64,
            upload_analysis_delay_ms: config.upload_analysis_delay.as_millis() as u64,
            bind_timeout_ms: config.bind_timeout.as_millis() as u64,
            confidence: 0.5,
            model_url: None,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceScan").join("settings.json"))
    }

    /// Per-user settings, or defaults when the file is missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            log::warn!("{e}; using default settings");
            Self::default()
        })
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the per-user settings file and returns its path.
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            presentation_delay: Duration::from_millis(self.presentation_delay_ms),
            notification_ttl: Duration::from_millis(self.notification_ttl_ms),
            upload_analysis_delay: Duration::from_millis(self.upload_analysis_delay_ms),
            bind_timeout: Duration::from_millis(self.bind_timeout_ms),
            ..ScanConfig::default()
        }
    }
}
