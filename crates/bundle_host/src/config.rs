//! Configuration management for the bundle host.
//!
//! This module handles loading and validation of the host configuration
//! from a TOML file, plus the conversions into runtime types.

use bundle_runtime::NativeRequirements;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Module names the host knows how to compose.
pub const KNOWN_MODULES: [&str; 2] = ["greeter", "core"];

/// Host configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Runtime settings
    pub runtime: RuntimeSettings,
    /// Which modules to compose
    pub modules: ModuleSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Runtime settings shared by every module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Root under which each module gets its data directory
    pub data_root: String,
    /// Directory searched for native libraries (module data directory if unset)
    #[serde(default)]
    pub library_dir: Option<String>,
    /// Native library every module needs
    #[serde(default)]
    pub critical_module: Option<String>,
    /// Must be set together with `critical_module`
    #[serde(default)]
    pub require_critical: bool,
    /// Optional processor library
    #[serde(default = "default_processor_module")]
    pub processor_module: Option<String>,
}

fn default_processor_module() -> Option<String> {
    Some(bundle_runtime::DEFAULT_PROCESSOR_MODULE.to_string())
}

/// Module composition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSettings {
    /// Modules to enable, in order
    pub enabled: Vec<String>,
    /// Hand the greeter's bundle to the core module
    #[serde(default = "default_chain")]
    pub chain_greeter_into_core: bool,
}

fn default_chain() -> bool {
    true
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeSettings {
                data_root: "data".to_string(),
                library_dir: None,
                critical_module: None,
                require_critical: false,
                processor_module: default_processor_module(),
            },
            modules: ModuleSettings {
                enabled: KNOWN_MODULES.iter().map(|name| name.to_string()).collect(),
                chain_greeter_into_core: true,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written at
    /// `path` and returned.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Native library requirements applied to every module.
    pub fn native_requirements(&self) -> NativeRequirements {
        NativeRequirements {
            critical: if self.runtime.require_critical {
                self.runtime.critical_module.clone()
            } else {
                None
            },
            processor: self.runtime.processor_module.clone(),
            search_dir: self.runtime.library_dir.as_ref().map(PathBuf::from),
        }
    }

    pub fn data_root(&self) -> PathBuf {
        PathBuf::from(&self.runtime.data_root)
    }

    pub fn module_enabled(&self, name: &str) -> bool {
        self.modules.enabled.iter().any(|enabled| enabled == name)
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.runtime.data_root.is_empty() {
            return Err("Data root cannot be empty".to_string());
        }

        match (&self.runtime.critical_module, self.runtime.require_critical) {
            (None, true) => {
                return Err("require_critical is set but no critical_module is configured".to_string())
            }
            (Some(module), false) => {
                return Err(format!(
                    "critical_module {} would never be loaded: set require_critical = true or remove it",
                    module
                ))
            }
            _ => {}
        }

        for name in &self.modules.enabled {
            if !KNOWN_MODULES.contains(&name.as_str()) {
                return Err(format!(
                    "Unknown module: {}. Must be one of: {:?}",
                    name, KNOWN_MODULES
                ));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            ));
        }

        Ok(())
    }
}
