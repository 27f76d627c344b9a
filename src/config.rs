use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::error::ServiceError;
use crate::services::SettingsProvider;

/// How words are presented while the pacing clock runs.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReadingMode {
    /// one word at a time
    #[default]
    Rsvp,
    /// the whole text with the current word highlighted
    Highlight,
    /// fixed-size groups of words
    Chunking,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReaderSettings {
    pub speed_ms: u64,
    pub muted: bool,
    pub mode: ReadingMode,
    pub chunk_size: usize,
    pub highlight_width: u16,
    pub highlight_height: u16,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            speed_ms: 200,
            muted: false,
            mode: ReadingMode::Rsvp,
            chunk_size: 3,
            highlight_width: 600,
            highlight_height: 300,
        }
    }
}

impl ReaderSettings {
    /// Clamps values the pacing clock cannot work with.
    pub fn sanitized(mut self) -> Self {
        self.speed_ms = self.speed_ms.clamp(1, MAX_SPEED_MS);
        self.chunk_size = self.chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }
}

/// Slowest pace accepted: one word per minute.
pub const MAX_SPEED_MS: u64 = 60_000;
pub const MAX_CHUNK_SIZE: usize = 64;

pub trait ConfigStore {
    fn load(&self) -> ReaderSettings;
    fn save(&self, cfg: &ReaderSettings) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("skimr_config.json"));
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

    /// Like [`ConfigStore::load`] but reports unreadable or corrupt files.
    /// A missing file is not an error.
    pub fn try_load(&self) -> Result<ReaderSettings, ServiceError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice::<ReaderSettings>(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ReaderSettings::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> ReaderSettings {
        self.try_load().unwrap_or_default()
    }

    fn save(&self, cfg: &ReaderSettings) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}

impl SettingsProvider for FileConfigStore {
    fn settings(&self) -> Result<ReaderSettings, ServiceError> {
        self.try_load()
    }
}

/// Command-line values that win over stored settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsOverrides {
    pub speed_ms: Option<u64>,
    pub mode: Option<ReadingMode>,
    pub chunk_size: Option<usize>,
    pub muted: bool,
}

impl SettingsOverrides {
    pub fn apply(&self, mut settings: ReaderSettings) -> ReaderSettings {
        if let Some(speed) = self.speed_ms {
            settings.speed_ms = speed;
        }
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if let Some(size) = self.chunk_size {
            settings.chunk_size = size;
        }
        settings.muted |= self.muted;
        settings
    }
}

/// A provider with overrides layered on top. Overrides still apply when the
/// inner provider fails, on top of the defaults.
pub struct LayeredSettings<P> {
    inner: P,
    overrides: SettingsOverrides,
}

impl<P: SettingsProvider> LayeredSettings<P> {
    pub fn new(inner: P, overrides: SettingsOverrides) -> Self {
        Self { inner, overrides }
    }
}

impl<P: SettingsProvider> SettingsProvider for LayeredSettings<P> {
    fn settings(&self) -> Result<ReaderSettings, ServiceError> {
        let base = match self.inner.settings() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "stored settings unreadable, layering over defaults");
                ReaderSettings::default()
            }
        };
        Ok(self.overrides.apply(base))
    }
}
