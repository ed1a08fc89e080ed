//! Configuration: directories and editor settings.
//!
//! Directory priority:
//! 1. CLI `--config-dir`
//! 2. `ANNOTRACK_CONFIG_DIR` environment variable
//! 3. Current folder, if it already holds `annotrack.json`
//! 4. Platform directory from dirs-next (`~/.config/annotrack` on Linux)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::entities::taxonomy::{LabelSet, LabelTaxonomy, read_conf};

pub const APP_NAME: &str = "annotrack";
pub const SETTINGS_FILE: &str = "annotrack.json";
pub const LOG_FILE: &str = "annotrack.log";
const CONFIG_ENV: &str = "ANNOTRACK_CONFIG_DIR";

#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.resolve(dirs_next::config_dir())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve(dirs_next::data_dir())
    }

    fn resolve(&self, platform: Option<PathBuf>) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        if let Ok(cwd) = std::env::current_dir() {
            if cwd.join(SETTINGS_FILE).exists() {
                return cwd;
            }
        }
        platform
            .map(|d| d.join(APP_NAME))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir().join(name)
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir().join(name)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.config_dir(), self.data_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }
}

/// Editor behavior knobs, persisted as `annotrack.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Widest view window in samples
    pub max_view_span: i64,
    /// Cursor steps per second of wall time during playback
    pub animation_rate: f64,
    /// Playback timer period
    pub animation_interval_ms: u64,
    /// Upper bound on plot redraws per second
    pub plot_refresh_hz: f64,
    /// Initial width of a right-click selection
    pub selection_width: i64,
    /// Throttle for live-stream dataset notifications
    pub live_update_interval_ms: u64,
    /// Relative grab distance for hit-testing handles (0..1)
    pub grab_tolerance: f64,
    pub classes_conf: Option<PathBuf>,
    pub attention_conf: Option<PathBuf>,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_view_span: 30_000,
            animation_rate: 30.0,
            animation_interval_ms: 33,
            plot_refresh_hz: 25.0,
            selection_width: 10,
            live_update_interval_ms: 1000,
            grab_tolerance: 0.01,
            classes_conf: None,
            attention_conf: None,
        }
    }
}

impl EditorSettings {
    /// Load from the config directory; defaults on a missing or malformed file.
    pub fn load(paths: &PathConfig) -> Self {
        Self::load_from(&paths.config_file(SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(settings) => {
                    debug!("loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    warn!("ignoring malformed settings {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write settings: {}", path.display()))
    }

    pub fn animation_interval(&self) -> Duration {
        Duration::from_millis(self.animation_interval_ms)
    }

    pub fn redraw_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.plot_refresh_hz.max(1.0))
    }

    pub fn live_update_interval(&self) -> Duration {
        Duration::from_millis(self.live_update_interval_ms)
    }

    /// Merge a recording's class lists with the configured taxonomy files.
    pub fn taxonomy(&self, classes: &[String], attention: &[String]) -> LabelTaxonomy {
        let configured = |p: &Option<PathBuf>| p.as_deref().map(read_conf).unwrap_or_default();
        LabelTaxonomy::new(
            LabelSet::merged(classes, &configured(&self.classes_conf)),
            LabelSet::merged(attention, &configured(&self.attention_conf)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::segment::LabelMode;

    #[test]
    fn test_custom_dir_wins() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config.config_file("a.json"), PathBuf::from("/custom/a.json"));
        assert_eq!(config.data_file(LOG_FILE), PathBuf::from("/custom/annotrack.log"));
    }

    #[test]
    fn test_settings_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"max_view_span": 500}"#).unwrap();
        let s = EditorSettings::load_from(&path);
        assert_eq!(s.max_view_span, 500);
        assert_eq!(s.plot_refresh_hz, 25.0);
    }

    #[test]
    fn test_malformed_settings_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{ nope").unwrap();
        assert_eq!(EditorSettings::load_from(&path), EditorSettings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let s = EditorSettings {
            selection_width: 42,
            ..Default::default()
        };
        s.save(&path).unwrap();
        assert_eq!(EditorSettings::load_from(&path), s);
    }

    #[test]
    fn test_taxonomy_merges_conf_files() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("classes.ini");
        std::fs::write(&conf, "NONE\nclap\n").unwrap();
        let s = EditorSettings {
            classes_conf: Some(conf),
            ..Default::default()
        };
        let tax = s.taxonomy(&["NONE".into(), "wave".into()], &[]);
        assert_eq!(tax.code_of(LabelMode::Gestures, "clap"), Some(2));
        assert_eq!(tax.name_of(LabelMode::Attention, 0), Some("NONE"));
    }
}
