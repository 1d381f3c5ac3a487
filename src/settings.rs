use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf, sync::RwLock};

use crate::camera::{CameraRequest, Facing};
use crate::geo::WatchOptions;
use crate::models::TargetSite;
use crate::verification::{FlowConfig, Platform};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    pub fix_accuracy_m: f64,
    pub location_timeout_ms: u64,
    pub high_accuracy: bool,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            fix_accuracy_m: 100.0,
            location_timeout_ms: 20_000,
            high_accuracy: true,
            ideal_width: 1920,
            ideal_height: 1080,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSettings {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-2.5-flash".into(),
            timeout_ms: 20_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub site: TargetSite,
    pub capture: CaptureSettings,
    pub analysis: AnalysisSettings,
    pub tick_interval_ms: u64,
    /// Browser user agent, only used to pick remediation text.
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site: TargetSite {
                latitude: 58.3585,
                longitude: 24.5365,
                display_name: "Pärnu, Laine 6a".into(),
            },
            capture: CaptureSettings::default(),
            analysis: AnalysisSettings::default(),
            tick_interval_ms: 1_000,
            user_agent: String::new(),
        }
    }
}

impl Settings {
    pub fn flow_config(&self) -> FlowConfig {
        let (platform, browser) = Platform::detect(&self.user_agent);
        FlowConfig {
            fix_accuracy_m: self.capture.fix_accuracy_m,
            watch: WatchOptions {
                high_accuracy: self.capture.high_accuracy,
                timeout: Duration::from_millis(self.capture.location_timeout_ms),
                maximum_age: Duration::ZERO,
            },
            camera: CameraRequest {
                facing: Facing::Environment,
                ideal_width: self.capture.ideal_width,
                ideal_height: self.capture.ideal_height,
            },
            jpeg_quality: self.capture.jpeg_quality,
            platform,
            browser,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Fill an empty API key from the environment.
    pub fn apply_env_defaults(&mut self) {
        if self.analysis.api_key.trim().is_empty() {
            self.analysis.api_key = api_key_from_env().unwrap_or_default();
        }
    }
}

fn api_key_from_env() -> Option<String> {
    API_KEY_VARS.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Missing file means defaults. A malformed file also falls back to
    /// defaults, with a warning, so a bad edit never locks workers out.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    log_warn!("ignoring malformed settings at {}: {err}", path.display());
                    Settings::default()
                }
            }
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Current settings with environment defaults applied. The env key is
    /// never written back to disk.
    pub fn settings(&self) -> Settings {
        let mut settings = match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        settings.apply_env_defaults();
        settings
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_configuration() {
        let settings = Settings::default();
        let flow = settings.flow_config();
        assert_eq!(flow.fix_accuracy_m, 100.0);
        assert_eq!(flow.watch.timeout, Duration::from_secs(20));
        assert_eq!(flow.camera.facing, Facing::Environment);
        assert_eq!(flow.jpeg_quality, 85);
        assert_eq!(settings.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.settings().site.display_name, "Pärnu, Laine 6a");
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = Settings::default();
        settings.site.display_name = "Tallinn, Sadama 1".into();
        settings.capture.fix_accuracy_m = 50.0;
        store.update(settings).unwrap();

        let reloaded = SettingsStore::new(path).unwrap().settings();
        assert_eq!(reloaded.site.display_name, "Tallinn, Sadama 1");
        assert_eq!(reloaded.capture.fix_accuracy_m, 50.0);
        assert_eq!(reloaded.capture.jpeg_quality, 85);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"capture":{"fixAccuracyM":25.0}}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();
        assert_eq!(settings.capture.fix_accuracy_m, 25.0);
        assert_eq!(settings.capture.location_timeout_ms, 20_000);
        assert_eq!(settings.tick_interval_ms, 1_000);
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.settings().capture, CaptureSettings::default());
    }
}
