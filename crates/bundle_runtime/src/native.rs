//! Native module boundary.
//!
//! Some modules depend on native libraries: a critical one without which the
//! module cannot work, and an optional processor. Loading goes through a
//! [`ModuleLoader`] so hosts and tests can substitute their own mechanism.

use crate::error::NativeError;
use crate::host::PluginId;
use crate::multimap::MultiMap;
use dashmap::DashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the optional processor library.
pub const DEFAULT_PROCESSOR_MODULE: &str = "bundle_processor";

/// A loaded native module.
pub trait NativeModule: Send + Sync {
    fn name(&self) -> &str;
}

/// Loads native modules by name.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, name: &str, search_dir: &Path) -> Result<Box<dyn NativeModule>, NativeError>;
}

/// Loads platform shared libraries with `libloading`.
///
/// `name` is expanded with the platform's naming convention, so
/// `bundle_processor` becomes `libbundle_processor.so` on Linux.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryLoader;

struct LoadedLibrary {
    name: String,
    _library: libloading::Library,
}

impl NativeModule for LoadedLibrary {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ModuleLoader for LibraryLoader {
    fn load(&self, name: &str, search_dir: &Path) -> Result<Box<dyn NativeModule>, NativeError> {
        let path = search_dir.join(libloading::library_filename(name));
        if !path.exists() {
            return Err(NativeError::NotFound(path.display().to_string()));
        }

        let library = unsafe { libloading::Library::new(&path) }
            .map_err(|e| NativeError::Load(format!("{}: {}", path.display(), e)))?;

        info!("📦 Loaded native library {}", path.display());
        Ok(Box::new(LoadedLibrary {
            name: name.to_string(),
            _library: library,
        }))
    }
}

/// Native libraries a module needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeRequirements {
    /// Enable aborts when this one cannot be loaded.
    pub critical: Option<String>,
    /// Load failures are only logged.
    pub processor: Option<String>,
    /// Where libraries are looked up; the module's data directory if unset.
    pub search_dir: Option<PathBuf>,
}

impl NativeRequirements {
    /// Only the default processor, no critical module.
    pub fn standard() -> Self {
        Self {
            critical: None,
            processor: Some(DEFAULT_PROCESSOR_MODULE.to_string()),
            search_dir: None,
        }
    }
}

/// Native modules loaded per plugin.
pub struct NativeModules {
    loader: Arc<dyn ModuleLoader>,
    names: MultiMap<PluginId, String>,
    modules: DashMap<(PluginId, String), Box<dyn NativeModule>>,
}

impl NativeModules {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            names: MultiMap::new(),
            modules: DashMap::new(),
        }
    }

    /// Uses [`LibraryLoader`].
    pub fn with_libraries() -> Self {
        Self::new(Arc::new(LibraryLoader))
    }

    /// Loads `name` for `plugin` unless it is already loaded.
    ///
    /// Returns `Ok(false)` when nothing had to be loaded.
    pub fn ensure_loaded(&self, plugin: PluginId, name: &str, search_dir: &Path) -> Result<bool, NativeError> {
        if self.is_loaded(&plugin, name) {
            debug!("Native module {} already loaded for {}", name, plugin);
            return Ok(false);
        }

        let module = self.loader.load(name, search_dir)?;
        self.modules.insert((plugin, name.to_string()), module);
        self.names.put(plugin, name.to_string());
        Ok(true)
    }

    pub fn is_loaded(&self, plugin: &PluginId, name: &str) -> bool {
        self.names.contains_value(plugin, &name.to_string())
    }

    /// Names loaded for `plugin`, in load order.
    pub fn loaded_for(&self, plugin: &PluginId) -> Vec<String> {
        self.names.get(plugin)
    }

    /// Unloads one module. Returns whether it was loaded.
    pub fn release(&self, plugin: &PluginId, name: &str) -> bool {
        let removed = self.names.remove_value(plugin, &name.to_string());
        self.modules.remove(&(*plugin, name.to_string()));
        if removed {
            debug!("Released native module {} of {}", name, plugin);
        }
        removed
    }

    /// Unloads everything loaded for `plugin`, newest first.
    pub fn release_all(&self, plugin: &PluginId) -> usize {
        let names = self.names.remove(plugin);
        for name in names.iter().rev() {
            self.modules.remove(&(*plugin, name.clone()));
        }
        names.len()
    }
}

impl fmt::Debug for NativeModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModules")
            .field("loaded", &self.modules.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Named(String);

    impl NativeModule for Named {
        fn name(&self) -> &str {
            &self.0
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl ModuleLoader for CountingLoader {
        fn load(&self, name: &str, _search_dir: &Path) -> Result<Box<dyn NativeModule>, NativeError> {
            if name == "missing" {
                return Err(NativeError::NotFound(name.to_string()));
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Named(name.to_string())))
        }
    }

    #[test]
    fn test_library_loader_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LibraryLoader.load("does_not_exist", dir.path()).err().unwrap();
        assert!(matches!(err, NativeError::NotFound(_)));
    }

    #[test]
    fn test_modules_load_once_per_plugin() {
        let loader = Arc::new(CountingLoader::default());
        let natives = NativeModules::new(loader.clone());
        let plugin = PluginId::new();
        let other = PluginId::new();
        let dir = Path::new(".");

        assert!(natives.ensure_loaded(plugin, "proc", dir).unwrap());
        assert!(!natives.ensure_loaded(plugin, "proc", dir).unwrap());
        assert!(natives.ensure_loaded(other, "proc", dir).unwrap());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert!(natives.ensure_loaded(plugin, "missing", dir).is_err());
        assert_eq!(natives.loaded_for(&plugin), vec!["proc".to_string()]);
    }

    #[test]
    fn test_release() {
        let natives = NativeModules::new(Arc::new(CountingLoader::default()));
        let plugin = PluginId::new();
        natives.ensure_loaded(plugin, "a", Path::new(".")).unwrap();
        natives.ensure_loaded(plugin, "b", Path::new(".")).unwrap();

        assert!(natives.release(&plugin, "a"));
        assert!(!natives.release(&plugin, "a"));
        assert_eq!(natives.release_all(&plugin), 1);
        assert!(natives.loaded_for(&plugin).is_empty());
    }

    #[test]
    fn test_standard_requirements() {
        let requirements = NativeRequirements::standard();
        assert_eq!(requirements.critical, None);
        assert_eq!(requirements.processor.as_deref(), Some(DEFAULT_PROCESSOR_MODULE));
    }
}
