//! User settings storage.
//!
//! Persists user-configurable settings to disk at `{data_dir}/settings.json`.
//! Environment variables are used as initial defaults when no settings file
//! exists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::modes::DEFAULT_MODE;

/// Model assumed when neither file nor environment names one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";

/// User-mutable settings blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Active efficiency mode name.
    #[serde(default = "default_mode_name")]
    pub efficiency_mode: String,
    /// Model override applied when a mode prefers `auto`.
    #[serde(default = "default_model_name")]
    pub ai_model: String,
    /// Whether high-risk tools may execute without per-call rejection.
    #[serde(default)]
    pub high_risk_tools_enabled: bool,
    /// Whether terminal notices (dropped queue entries etc.) are surfaced.
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

fn default_mode_name() -> String {
    DEFAULT_MODE.to_string()
}

fn default_model_name() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            efficiency_mode: default_mode_name(),
            ai_model: default_model_name(),
            high_risk_tools_enabled: false,
            notifications_enabled: true,
        }
    }
}

/// In-memory store for user settings with disk persistence.
#[derive(Debug)]
pub struct SettingsStore {
    settings: RwLock<Settings>,
    storage_path: PathBuf,
}

impl SettingsStore {
    /// Create a new settings store, loading from disk if available.
    ///
    /// If no settings file exists, uses environment variables as defaults:
    /// - `GOALPILOT_MODE` - initial efficiency mode
    /// - `GOALPILOT_MODEL` - initial model override
    pub async fn new(data_dir: &Path) -> Self {
        let storage_path = data_dir.join("settings.json");

        let settings = if storage_path.exists() {
            match Self::load_from_path(&storage_path) {
                Ok(s) => {
                    tracing::info!("Loaded settings from {}", storage_path.display());
                    s
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load settings from {}: {}, using defaults",
                        storage_path.display(),
                        e
                    );
                    Self::defaults_from_env()
                }
            }
        } else {
            tracing::info!(
                "No settings file found at {}, using environment defaults",
                storage_path.display()
            );
            Self::defaults_from_env()
        };

        Self {
            settings: RwLock::new(settings),
            storage_path,
        }
    }

    fn defaults_from_env() -> Settings {
        Settings {
            efficiency_mode: std::env::var("GOALPILOT_MODE")
                .unwrap_or_else(|_| default_mode_name()),
            ai_model: std::env::var("GOALPILOT_MODEL").unwrap_or_else(|_| default_model_name()),
            ..Settings::default()
        }
    }

    fn load_from_path(path: &Path) -> Result<Settings, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    async fn save_to_disk(&self) -> Result<(), std::io::Error> {
        let settings = self.settings.read().await;

        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(&*settings)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&self.storage_path, contents)?;
        tracing::debug!("Saved settings to {}", self.storage_path.display());
        Ok(())
    }

    /// Get a clone of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Switch the active efficiency mode.
    ///
    /// Returns `(changed, previous_value)`.
    pub async fn set_efficiency_mode(
        &self,
        mode: String,
    ) -> Result<(bool, String), std::io::Error> {
        let mut settings = self.settings.write().await;
        let previous = settings.efficiency_mode.clone();

        if previous != mode {
            settings.efficiency_mode = mode;
            drop(settings); // Release lock before saving
            self.save_to_disk().await?;
            Ok((true, previous))
        } else {
            Ok((false, previous))
        }
    }

    /// Grant or revoke high-risk tool execution.
    pub async fn set_high_risk_enabled(&self, enabled: bool) -> Result<(), std::io::Error> {
        let mut settings = self.settings.write().await;
        settings.high_risk_tools_enabled = enabled;
        drop(settings);
        self.save_to_disk().await
    }

    /// Replace the whole blob and persist it.
    pub async fn update(&self, new_settings: Settings) -> Result<(), std::io::Error> {
        let mut settings = self.settings.write().await;
        *settings = new_settings;
        drop(settings);
        self.save_to_disk().await
    }

    /// Reload settings from disk, keeping the in-memory copy when no file
    /// exists.
    pub async fn reload(&self) -> Result<(), std::io::Error> {
        if self.storage_path.exists() {
            let loaded = Self::load_from_path(&self.storage_path)?;
            let mut settings = self.settings.write().await;
            *settings = loaded;
            tracing::info!("Reloaded settings from {}", self.storage_path.display());
        }
        Ok(())
    }
}

/// Shared settings store wrapped in Arc for concurrent access.
pub type SharedSettingsStore = Arc<SettingsStore>;
