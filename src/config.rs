use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::app_dirs::AppDirs;
use crate::exercise::{ExerciseKind, SessionKind};
use crate::flow::FlowConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to write config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Phase durations for one exercise kind, in milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingProfile {
    pub question_ms: u64,
    pub options_ms: u64,
    pub result_ms: u64,
}

impl TimingProfile {
    pub const fn new(question_ms: u64, options_ms: u64, result_ms: u64) -> Self {
        Self {
            question_ms,
            options_ms,
            result_ms,
        }
    }
}

impl From<TimingProfile> for FlowConfig {
    fn from(t: TimingProfile) -> Self {
        FlowConfig::from_millis(t.question_ms, t.options_ms, t.result_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub reading: TimingProfile,
    pub listening: TimingProfile,
    pub speaking: TimingProfile,
    pub items_per_session: usize,
    pub default_mode: SessionKind,
    pub deck: String,
    /// How long simulated speech grading takes before a result shows
    pub grading_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reading: TimingProfile::new(1_500, 5_000, 1_500),
            listening: TimingProfile::new(1_000, 6_000, 1_500),
            speaking: TimingProfile::new(1_000, 8_000, 2_000),
            items_per_session: 10,
            default_mode: SessionKind::Learn,
            deck: "german".to_string(),
            grading_delay_ms: 400,
        }
    }
}

impl Config {
    pub fn timing(&self, kind: ExerciseKind) -> TimingProfile {
        match kind {
            ExerciseKind::Reading => self.reading,
            ExerciseKind::Listening => self.listening,
            ExerciseKind::Speaking => self.speaking,
        }
    }

    pub fn flow_config(&self, kind: ExerciseKind) -> FlowConfig {
        self.timing(kind).into()
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("wordflow_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing file means defaults; a broken one is logged and ignored
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring unreadable config");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        assert_eq!(store.load(), cfg);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("nope.json"));
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "speaking": { "question_ms": 0, "options_ms": 12000, "result_ms": 3000 }, "default_mode": "review" }"#,
        )
        .unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.speaking, TimingProfile::new(0, 12_000, 3_000));
        assert_eq!(cfg.default_mode, SessionKind::Review);
        assert_eq!(cfg.reading, Config::default().reading);
        assert_eq!(cfg.items_per_session, 10);
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }

    #[test]
    fn timing_profiles_become_flow_configs() {
        let cfg = Config::default();
        let flow = cfg.flow_config(ExerciseKind::Listening);
        assert_eq!(flow.question_duration, Duration::from_millis(1_000));
        assert_eq!(flow.options_duration, Duration::from_millis(6_000));
        assert_eq!(flow.result_duration, Duration::from_millis(1_500));
    }
}
