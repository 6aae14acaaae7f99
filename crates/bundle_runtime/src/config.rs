//! Configuration file accessor.
//!
//! Reading and writing the file belongs to an external configuration
//! component; the runtime only knows where the file lives and which format
//! its extension declares.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of a module's configuration file.
pub const PLUGIN_CONFIG_FILENAME: &str = "config.json";

/// File formats a module configuration may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    Json,
    Yaml,
    Txt,
    Unknown,
}

impl ConfigFormat {
    /// The file extension including the leading dot, if the format has one.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            ConfigFormat::Json => Some(".json"),
            ConfigFormat::Yaml => Some(".yml"),
            ConfigFormat::Txt => Some(".txt"),
            ConfigFormat::Unknown => None,
        }
    }

    /// Detects the format from a path's extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => ConfigFormat::Json,
            Some("yml") | Some("yaml") => ConfigFormat::Yaml,
            Some("txt") => ConfigFormat::Txt,
            _ => ConfigFormat::Unknown,
        }
    }
}

/// Where a module's configuration file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfiguration {
    path: PathBuf,
    format: ConfigFormat,
}

impl PluginConfiguration {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = ConfigFormat::from_path(&path);
        Self { path, format }
    }

    /// The default configuration file inside a data directory.
    pub fn in_directory(directory: &Path) -> Self {
        Self::new(directory.join(PLUGIN_CONFIG_FILENAME))
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }
}
