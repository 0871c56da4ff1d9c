// # Schedule Settings File
//
// Persists the periodic-sync settings changed at runtime, so a daemon
// restart keeps the interval and the auto-sync switch an operator last set.
//
// ## Location
//
// By default the file sits next to the state file as `settings.json`. It is
// small and rewritten whole on every change, with the same write-then-rename
// sequence as the state file.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "schedule": { "interval_minutes": 15, "enabled": true },
//   "updated_at": "2026-01-09T12:00:00Z"
// }
// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::config::ScheduleConfig;

/// Settings file format version
const SETTINGS_FILE_VERSION: &str = "1.0";

/// File name used when the location is derived from the state file
pub const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Serialize, Deserialize)]
struct SettingsFileFormat {
    version: String,
    schedule: ScheduleConfig,
    updated_at: DateTime<Utc>,
}

/// Persisted schedule settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettingsFile {
    path: PathBuf,
}

impl ScheduleSettingsFile {
    /// Use the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `settings.json` in the directory holding `state_path`
    pub fn beside(state_path: impl AsRef<Path>) -> Self {
        let dir = state_path
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(dir.join(SETTINGS_FILE_NAME))
    }

    /// Path of the settings file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved settings
    ///
    /// # Returns
    ///
    /// - `Ok(Some(settings))`: File found; the interval is clamped into range
    /// - `Ok(None)`: Nothing saved yet
    /// - `Err(Error::Persistence)`: The file exists but cannot be read or parsed
    pub async fn load(&self) -> Result<Option<ScheduleConfig>, Error> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::persistence(format!(
                    "Failed to read settings file {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let file: SettingsFileFormat = serde_json::from_str(&content).map_err(|e| {
            Error::persistence(format!(
                "Invalid settings file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if file.version != SETTINGS_FILE_VERSION {
            tracing::warn!(
                "Settings file version mismatch: expected {}, found {}",
                SETTINGS_FILE_VERSION,
                file.version
            );
        }

        let schedule = file.schedule;
        Ok(Some(ScheduleConfig::new(
            schedule.interval_minutes,
            schedule.enabled,
        )))
    }

    /// Replace the saved settings atomically
    pub async fn save(&self, schedule: &ScheduleConfig) -> Result<(), Error> {
        let file = SettingsFileFormat {
            version: SETTINGS_FILE_VERSION.to_string(),
            schedule: *schedule,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::persistence(format!("Failed to serialize settings: {}", e)))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let temp_path = self.path.with_extension("tmp");
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.sync_all().await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(
            "Schedule settings saved to {}: every {} min, enabled={}",
            self.path.display(),
            schedule.interval_minutes,
            schedule.enabled
        );
        Ok(())
    }
}
