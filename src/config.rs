//! Configuration management for the control core
//!
//! Runtime configuration loaded from JSON, so poll cadence and delay
//! granularity can be tuned without recompiling the host library.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::SessionError;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Delay controller and display poller parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Display poller cadence in milliseconds
    pub poll_interval_ms: u64,
    /// Granularity of a single increase/decrease step
    pub delay_step_ms: i64,
    /// Upper bound for the buffering delay
    pub max_delay_ms: i64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            delay_step_ms: 50,
            max_delay_ms: 10_000,
        }
    }
}

/// Engine adapter wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound of the engine-to-control delay report channel
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notification_capacity: 64,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Falls back to the default configuration (with a warning) when the
    /// file is missing, unparsable, or fails validation.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                        config
                    }
                    Err(err) => {
                        log::warn!(
                            "[Config] Rejected configuration from {:?}: {}. Using defaults.",
                            path.as_ref(),
                            err
                        );
                        Self::default()
                    }
                },
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/stream_audio_config.json")
    }

    /// Check value ranges the control core relies on
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.control.poll_interval_ms == 0 {
            return Err(SessionError::invalid_input(
                "poll_interval_ms must be greater than 0",
            ));
        }
        if self.control.delay_step_ms <= 0 {
            return Err(SessionError::invalid_input(
                "delay_step_ms must be greater than 0",
            ));
        }
        if self.control.max_delay_ms < 0 {
            return Err(SessionError::invalid_input(
                "max_delay_ms must not be negative",
            ));
        }
        if self.engine.notification_capacity == 0 {
            return Err(SessionError::invalid_input(
                "notification_capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.control.poll_interval_ms, 1000);
        assert_eq!(config.control.delay_step_ms, 50);
        assert_eq!(config.control.max_delay_ms, 10_000);
        assert_eq!(config.engine.notification_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_section_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "control": { "delay_step_ms": 20 } }"#).unwrap();
        assert_eq!(parsed.control.delay_step_ms, 20);
        assert_eq!(parsed.control.poll_interval_ms, 1000);
        assert_eq!(parsed.engine.notification_capacity, 64);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.control.poll_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(SessionError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/stream_audio_config.json");
        assert_eq!(config, AppConfig::default());
    }
}
