use crate::calendar::{self, CalendarError};
use crate::world::UserId;
use chrono_tz::Tz;
use serde::Deserialize;
use std::{env, fs, path::{Path, PathBuf}};
use thiserror::Error;

const SETTINGS_FILENAME: &str = "settings.json";

/// Overrides the settings file location.
pub const SETTINGS_ENV: &str = "HABITRACK_SETTINGS";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub tcp_socket_binding: String,
    pub tcp_socket_port: u16,
    #[serde(default = "default_save_file")]
    pub save_file: PathBuf,
    /// IANA zone used for day and week bucketing when a request names none.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// tracing-subscriber filter, used when RUST_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Seed the demo habits for this user on an empty save file.
    #[serde(default)]
    pub seed_user_id: Option<UserId>,
}

fn default_save_file() -> PathBuf {
    PathBuf::from("habits.redb")
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Cannot read settings file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Cannot parse JSON content from file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("Invalid default_timezone: {0}")]
    Timezone(#[from] CalendarError),
}

impl Settings {
    /// Load from `$HABITRACK_SETTINGS`, or `settings.json` in the working directory.
    pub fn load() -> Result<Settings, SettingsError> {
        let path = env::var_os(SETTINGS_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILENAME));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Settings, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        // Fail at boot rather than on the first request.
        settings.timezone()?;
        Ok(settings)
    }

    pub fn timezone(&self) -> Result<Tz, CalendarError> {
        calendar::parse_timezone(&self.default_timezone)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.tcp_socket_binding, self.tcp_socket_port)
    }
}
