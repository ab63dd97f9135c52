/// Engine tuning: timer cadence, lookahead horizon and session defaults
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock interval between scheduler wakes, in milliseconds.
    pub lookahead_ms: u64,
    /// Horizon past the audio clock within which steps are emitted.
    pub schedule_ahead_secs: f64,
    /// Offset added to the audio clock when playback starts.
    pub start_delay_secs: f64,
    pub master_gain: f32,
    /// Length of the looping white-noise buffer.
    pub noise_seconds: f32,
    pub default_tempo: u16,
    pub default_swing: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 25,
            schedule_ahead_secs: 0.1,
            start_delay_secs: 0.05,
            master_gain: 0.9,
            noise_seconds: 2.0,
            default_tempo: 110,
            default_swing: 0.1,
        }
    }
}

impl EngineConfig {
    /// Load the user config if one exists, otherwise defaults.
    pub fn load() -> Self {
        let Some(path) = user_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring config at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.lookahead_ms == 0 {
            return Err(EngineError::Config("lookahead_ms must be positive".into()));
        }
        if self.schedule_ahead_secs <= 0.0 || self.start_delay_secs < 0.0 {
            return Err(EngineError::Config(
                "schedule_ahead_secs must be positive and start_delay_secs non-negative".into(),
            ));
        }
        if self.noise_seconds < 2.0 {
            return Err(EngineError::Config("noise_seconds must be at least 2".into()));
        }
        if !(60..=180).contains(&self.default_tempo) {
            return Err(EngineError::Config("default_tempo must be within 60..=180".into()));
        }
        if !(0.0..=0.5).contains(&self.default_swing) {
            return Err(EngineError::Config("default_swing must be within 0..=0.5".into()));
        }
        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("beatbox").join("config.toml"))
}

/// Default location of the named-preset store.
pub fn default_presets_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("beatbox").join("presets.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lookahead_ms = 10\nmaster_gain = 0.5").unwrap();

        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.lookahead_ms, 10);
        assert_eq!(config.master_gain, 0.5);
        assert_eq!(config.schedule_ahead_secs, 0.1);
        assert_eq!(config.default_tempo, 110);
    }

    #[test]
    fn out_of_range_tempo_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_tempo = 300").unwrap();

        let err = EngineConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
