//! Configuration management for the soundboard.
//!
//! Configuration is stored in ~/.soundboard/config.yaml:
//!
//! ```yaml
//! mixer:
//!   buffer_ms: 1000
//!   idle_delay_ms: 10
//!   gain: 0.8
//! ffmpeg: /usr/bin/ffmpeg
//! sounds:
//!   airhorn:
//!     path: airhorn.mp3
//!     gain: 0.5
//!   rain:
//!     path: rain.pcm
//!     background: true
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use soundboard_audio::pcm::MixerOptions;

use crate::paths::Paths;

/// Soundboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Mixer tuning.
    #[serde(default)]
    pub mixer: MixerSettings,

    /// Transcoder used for anything that is not raw PCM.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    /// Named sounds, playable by name instead of path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sounds: BTreeMap<String, Sound>,

    /// Path to the config file (not serialized).
    #[serde(skip)]
    config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mixer: MixerSettings::default(),
            ffmpeg: default_ffmpeg(),
            sounds: BTreeMap::new(),
            config_path: PathBuf::new(),
        }
    }
}

/// Mixer tuning knobs, mapped onto [`MixerOptions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    /// Largest tick and per-source buffer, in milliseconds.
    pub buffer_ms: u64,
    /// Longest idle wait while no source has data, in milliseconds.
    pub idle_delay_ms: u64,
    /// Mixer-wide linear gain.
    pub gain: f32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        let opts = MixerOptions::default();
        Self {
            buffer_ms: opts.buffer_duration.as_millis() as u64,
            idle_delay_ms: opts.idle_delay.as_millis() as u64,
            gain: opts.gain,
        }
    }
}

impl MixerSettings {
    /// Converts the settings into mixer options.
    pub fn to_options(&self) -> MixerOptions {
        MixerOptions::default()
            .with_buffer_duration(Duration::from_millis(self.buffer_ms))
            .with_idle_delay(Duration::from_millis(self.idle_delay_ms))
            .with_gain(self.gain)
    }
}

/// A named sound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sound {
    /// File path, relative paths resolve against the config directory.
    pub path: String,

    /// Per-source linear gain.
    #[serde(default = "default_gain")]
    pub gain: f32,

    /// Fill from a background thread even for raw PCM files.
    #[serde(default, skip_serializing_if = "is_false")]
    pub background: bool,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_gain() -> f32 {
    1.0
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Config {
    /// Gets the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Paths::new().ok().map(|paths| paths.config_file())
    }

    /// Returns the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Returns the config directory path.
    pub fn dir(&self) -> Option<&Path> {
        self.config_path.parent()
    }

    /// Gets a sound by name.
    pub fn sound(&self, name: &str) -> Option<&Sound> {
        self.sounds.get(name)
    }

    /// Resolves a sound's file path against the config directory.
    pub fn sound_path(&self, sound: &Sound) -> PathBuf {
        let path = Path::new(&sound.path);
        match self.dir() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Lists all sound names in order.
    pub fn list_sounds(&self) -> Vec<&str> {
        self.sounds.keys().map(|s| s.as_str()).collect()
    }
}

/// Loads the configuration, creating an empty one if none exists yet.
pub fn load_config(custom_path: Option<&str>) -> anyhow::Result<Config> {
    let config_path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_config_path()
            .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut cfg = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("parse {}", config_path.display()))?
    } else {
        let cfg = Config::default();
        let content = serde_yaml::to_string(&cfg)?;
        std::fs::write(&config_path, content)?;
        cfg
    };

    cfg.config_path = config_path;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let cfg = load_config(Some(path.to_str().unwrap())).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.path(), path.as_path());
        assert_eq!(cfg.ffmpeg, "ffmpeg");
        assert_eq!(cfg.mixer.buffer_ms, 1000);
        assert_eq!(cfg.mixer.idle_delay_ms, 10);
        assert!(cfg.list_sounds().is_empty());
    }

    #[test]
    fn test_load_sounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
mixer:
  buffer_ms: 20
  gain: 0.5
sounds:
  rain:
    path: rain.pcm
    background: true
  horn:
    path: /srv/horn.mp3
    gain: 0.25
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.list_sounds(), vec!["horn", "rain"]);
        assert_eq!(cfg.mixer.idle_delay_ms, 10);

        let rain = cfg.sound("rain").unwrap();
        assert!(rain.background);
        assert_eq!(rain.gain, 1.0);
        assert_eq!(cfg.sound_path(rain), dir.path().join("rain.pcm"));

        let horn = cfg.sound("horn").unwrap();
        assert_eq!(horn.gain, 0.25);
        assert_eq!(cfg.sound_path(horn), PathBuf::from("/srv/horn.mp3"));

        let opts = cfg.mixer.to_options();
        assert_eq!(opts.buffer_bytes(), 3840);
        assert_eq!(opts.gain, 0.5);
    }

    #[test]
    fn test_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "mixer: [not, a, map]").unwrap();

        let err = load_config(Some(path.to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}
