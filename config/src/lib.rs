//! Configuration loading for the saga language server.
//!
//! Settings come from `~/.saga/config.toml` and may be overridden per
//! session by the client's `initializationOptions`.
//!
//! ```toml
//! [server]
//! diagnostics_debounce_ms = 300
//! watch_debounce_ms = 500
//! incremental_reload_limit = 5
//! hover_preview_chars = 500
//! root_markers = ["saga.toml", ".saga"]
//! entities_dir = "entities"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_DIAGNOSTICS_DEBOUNCE_MS: u64 = 300;
const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 500;
const DEFAULT_INCREMENTAL_RELOAD_LIMIT: usize = 5;
const DEFAULT_HOVER_PREVIEW_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SagaConfig {
    #[serde(default)]
    pub server: ServerSettings,
}

/// Tunables for the language server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Quiet period before a document's diagnostics are published.
    pub diagnostics_debounce_ms: u64,
    /// Quiet period before buffered file-watch events are processed.
    pub watch_debounce_ms: u64,
    /// Most entity-file changes that may be applied incrementally.
    pub incremental_reload_limit: usize,
    /// Character budget for file previews in hovers.
    pub hover_preview_chars: usize,
    /// File or directory names marking a project root.
    pub root_markers: Vec<String>,
    /// Directory under the project root holding entity definitions.
    pub entities_dir: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            diagnostics_debounce_ms: DEFAULT_DIAGNOSTICS_DEBOUNCE_MS,
            watch_debounce_ms: DEFAULT_WATCH_DEBOUNCE_MS,
            incremental_reload_limit: DEFAULT_INCREMENTAL_RELOAD_LIMIT,
            hover_preview_chars: DEFAULT_HOVER_PREVIEW_CHARS,
            root_markers: vec!["saga.toml".to_string(), ".saga".to_string()],
            entities_dir: "entities".to_string(),
        }
    }
}

/// Per-session overrides; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsOverrides {
    diagnostics_debounce_ms: Option<u64>,
    watch_debounce_ms: Option<u64>,
    incremental_reload_limit: Option<usize>,
    hover_preview_chars: Option<usize>,
    root_markers: Option<Vec<String>>,
    entities_dir: Option<String>,
}

impl ServerSettings {
    #[must_use]
    pub fn diagnostics_debounce(&self) -> Duration {
        Duration::from_millis(self.diagnostics_debounce_ms)
    }

    #[must_use]
    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// Apply the client's `initializationOptions`.
    ///
    /// Keys are camelCase. Unknown keys are ignored; a malformed object is
    /// logged and leaves the settings unchanged.
    pub fn apply_overrides(&mut self, options: &serde_json::Value) {
        if options.is_null() {
            return;
        }
        let overrides: SettingsOverrides = match serde_json::from_value(options.clone()) {
            Ok(overrides) => overrides,
            Err(err) => {
                tracing::warn!("Ignoring malformed initializationOptions: {err}");
                return;
            }
        };
        if let Some(ms) = overrides.diagnostics_debounce_ms {
            self.diagnostics_debounce_ms = ms;
        }
        if let Some(ms) = overrides.watch_debounce_ms {
            self.watch_debounce_ms = ms;
        }
        if let Some(limit) = overrides.incremental_reload_limit {
            self.incremental_reload_limit = limit;
        }
        if let Some(chars) = overrides.hover_preview_chars {
            self.hover_preview_chars = chars;
        }
        if let Some(markers) = overrides.root_markers.filter(|m| !m.is_empty()) {
            self.root_markers = markers;
        }
        if let Some(dir) = overrides.entities_dir.filter(|d| !d.trim().is_empty()) {
            self.entities_dir = dir;
        }
    }
}

impl SagaConfig {
    /// Load the user config. A missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".saga").join("config.toml"))
}
