//! Host module boundary.
//!
//! The host process owns the real module objects (their data directory,
//! declared name, version). The runtime only sees them through the
//! [`HostModule`] trait and identifies each loaded instance by a
//! [`PluginId`] minted when its lifecycle controller is created.

use crate::bundle::Bundle;
use crate::config::PluginConfiguration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Identity of one loaded module instance.
///
/// Two modules with the same declared name still get different ids, so the
/// registry partitions by instance, never by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginId(pub Uuid);

impl PluginId {
    /// Creates a new random plugin ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a plugin ID from its string form.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for PluginId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the runtime needs to know about a module loaded by the host.
pub trait HostModule: Send + Sync {
    /// The name declared in the module's descriptor.
    fn declared_name(&self) -> &str;

    /// Version string from the module's descriptor.
    fn version(&self) -> &str;

    /// Directory holding the module's persistent data.
    ///
    /// Its absence marks the module's first activation.
    fn data_directory(&self) -> &Path;

    /// Returns the module's payload source when it is a bundle loader.
    fn as_bundle(&self) -> Option<&dyn Bundle> {
        None
    }

    /// The module's configuration file descriptor.
    fn configuration(&self) -> PluginConfiguration {
        PluginConfiguration::in_directory(self.data_directory())
    }
}

/// A host module described purely by static data.
#[derive(Debug, Clone)]
pub struct StaticModule {
    name: String,
    version: String,
    data_directory: PathBuf,
}

impl StaticModule {
    pub fn new(name: impl Into<String>, version: impl Into<String>, data_directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            data_directory: data_directory.into(),
        }
    }
}

impl HostModule for StaticModule {
    fn declared_name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn data_directory(&self) -> &Path {
        &self.data_directory
    }
}
