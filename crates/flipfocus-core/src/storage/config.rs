//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Session durations for each mode
//! - The ambient track played while focusing
//!
//! Configuration is stored at `~/.config/flipfocus/config.toml`. These are
//! the launch defaults; a persisted session snapshot takes precedence once
//! one exists.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::{ConfigError, Result};
use crate::session::{AmbientTrack, Session, MAX_MINUTES};

/// Session duration configuration, all in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationsConfig {
    #[serde(default = "default_timer_minutes")]
    pub timer_minutes: u32,
    #[serde(default = "default_pomodoro_minutes")]
    pub pomodoro_minutes: u32,
    #[serde(default = "default_break_minutes")]
    pub break_minutes: u32,
}

/// Ambient audio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_ambient")]
    pub ambient: AmbientTrack,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/flipfocus/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub durations: DurationsConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

// Default functions
fn default_timer_minutes() -> u32 {
    25
}
fn default_pomodoro_minutes() -> u32 {
    25
}
fn default_break_minutes() -> u32 {
    5
}
fn default_ambient() -> AmbientTrack {
    AmbientTrack::None
}

impl Default for DurationsConfig {
    fn default() -> Self {
        Self {
            timer_minutes: default_timer_minutes(),
            pomodoro_minutes: default_pomodoro_minutes(),
            break_minutes: default_break_minutes(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ambient: default_ambient(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            durations: DurationsConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl Config {
    fn lookup_path<'a>(root: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }
        key.split('.').try_fold(root, |node, part| node.get(part))
    }

    fn update_path(root: &mut serde_json::Value, key: &str, value: &str) -> Result<(), ConfigError> {
        let unknown_key = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".to_string(),
        };

        let (parents, leaf) = match key.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown_key());
        }

        let mut node = &mut *root;
        if let Some(parents) = parents {
            for part in parents.split('.') {
                node = node.get_mut(part).ok_or_else(unknown_key)?;
            }
        }

        let obj = node.as_object_mut().ok_or_else(unknown_key)?;
        let existing = obj.get(leaf).ok_or_else(unknown_key)?;
        let parsed = Self::parse_like(existing, value, key)?;
        obj.insert(leaf.to_string(), parsed);
        Ok(())
    }

    /// Parse `value` into the same JSON shape as `existing`, so a numeric
    /// field stays numeric and a bool stays bool.
    fn parse_like(
        existing: &serde_json::Value,
        value: &str,
        key: &str,
    ) -> Result<serde_json::Value, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        match existing {
            serde_json::Value::Bool(_) => value
                .parse::<bool>()
                .map(serde_json::Value::Bool)
                .map_err(|_| invalid(format!("cannot parse '{value}' as bool"))),
            serde_json::Value::Number(_) => {
                if let Ok(n) = value.parse::<u64>() {
                    Ok(serde_json::Value::Number(n.into()))
                } else if let Ok(n) = value.parse::<f64>() {
                    serde_json::Number::from_f64(n)
                        .map(serde_json::Value::Number)
                        .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))
                } else {
                    Err(invalid(format!("cannot parse '{value}' as number")))
                }
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))
            }
            _ => Ok(serde_json::Value::String(value.to_string())),
        }
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)
                    .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::lookup_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key and persist it. Returns an error if the
    /// key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::update_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        self.save()?;
        Ok(())
    }

    /// Session a fresh engine starts from when no persisted snapshot
    /// exists. Out-of-range durations in a hand-edited file are clamped
    /// rather than failing the launch.
    pub fn initial_session(&self) -> Session {
        let mut session = Session {
            timer_minutes: self.durations.timer_minutes.clamp(1, MAX_MINUTES),
            pomodoro_minutes: self.durations.pomodoro_minutes.clamp(1, MAX_MINUTES),
            break_minutes: self.durations.break_minutes.clamp(1, MAX_MINUTES),
            ambient_track: self.audio.ambient,
            ..Session::default()
        };
        session.clock_secs = session.idle_preview_secs();
        session
    }
}
