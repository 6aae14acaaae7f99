//! Module lifecycle controller.
//!
//! Each loaded module holds one [`LifecycleController`] and delegates its
//! host's enable/disable callbacks to it. Module specific behaviour plugs in
//! through [`ModuleHooks`].
//!
//! State machine:
//!
//! ```text
//! Uninitialized -> Enabling -> Enabled -> Disabling -> Disabled
//!                     |                                  |
//!                     +--(failure)--> Disabled <---------+
//! ```
//!
//! A disabled controller may be enabled again.

use crate::bundle::exchange_bundle;
use crate::current_timestamp_millis;
use crate::error::{HandleError, LifecycleError};
use crate::handle::HandleItem;
use crate::host::{HostModule, PluginId};
use crate::message::{ConsoleSink, MessageStatus, PluginMessage, TracingConsole};
use crate::native::{NativeModules, NativeRequirements};
use crate::prefix::Prefix;
use crate::registry::{ActivationReport, HandleRegistry};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Enabling,
    Enabled,
    Disabling,
    Disabled,
}

/// Extension points of the lifecycle.
///
/// Every method has a default, so modules only override what they need.
pub trait ModuleHooks: Send + Sync {
    /// Runs after the prefix and messaging are set up.
    ///
    /// `sibling` is `Some` when this module is the base of a chain and is
    /// being handed its child. The default runs the bundle exchange.
    fn enable_inner(
        &self,
        controller: &LifecycleController,
        sibling: Option<&dyn HostModule>,
    ) -> Result<(), LifecycleError> {
        exchange_bundle(controller, sibling);
        Ok(())
    }

    /// Last step of a successful enable.
    fn enable_finished(&self, _controller: &LifecycleController) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn disable_inner(&self, _controller: &LifecycleController) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Last step of a disable.
    fn disable_finished(&self, _controller: &LifecycleController) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Called by [`LifecycleController::reload`] under the reload lock.
    fn reload(&self, _controller: &LifecycleController) -> Result<(), LifecycleError> {
        Ok(())
    }
}

/// Hooks that keep every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl ModuleHooks for DefaultHooks {}

/// Drives one module through its lifecycle.
pub struct LifecycleController {
    id: PluginId,
    host: Arc<dyn HostModule>,
    sibling: Option<Arc<dyn HostModule>>,
    registry: Arc<HandleRegistry>,
    natives: Option<Arc<NativeModules>>,
    requirements: NativeRequirements,
    hooks: Arc<dyn ModuleHooks>,
    state: RwLock<LifecycleState>,
    enabled_at: RwLock<Option<u64>>,
    disabled_at: RwLock<Option<u64>>,
    message: RwLock<PluginMessage>,
    first_enable: RwLock<bool>,
    init_guard: Mutex<()>,
    reload_guard: Mutex<()>,
}

/// Builder for [`LifecycleController`].
pub struct LifecycleBuilder {
    host: Arc<dyn HostModule>,
    registry: Arc<HandleRegistry>,
    sibling: Option<Arc<dyn HostModule>>,
    natives: Option<Arc<NativeModules>>,
    requirements: NativeRequirements,
    hooks: Arc<dyn ModuleHooks>,
    console: Arc<dyn ConsoleSink>,
}

impl LifecycleBuilder {
    /// Sets the module's extension hooks, replacing [`DefaultHooks`].
    ///
    /// # Arguments
    ///
    /// * `hooks` - Hooks owned by this controller alone
    pub fn hooks(mut self, hooks: impl ModuleHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Like [`hooks`](Self::hooks), for hooks the caller keeps a handle to.
    pub fn shared_hooks(mut self, hooks: Arc<dyn ModuleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Makes this module the base of a chain, with `sibling` as its child.
    ///
    /// During enable the default [`ModuleHooks::enable_inner`] hands the
    /// sibling to [`exchange_bundle`]. Without a sibling the exchange is
    /// skipped.
    pub fn sibling(mut self, sibling: Arc<dyn HostModule>) -> Self {
        self.sibling = Some(sibling);
        self
    }

    /// Routes the module's console messages to `console` instead of
    /// [`TracingConsole`].
    pub fn console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
        self.console = console;
        self
    }

    /// Attaches a native module loader and the libraries to load with it.
    ///
    /// # Arguments
    ///
    /// * `natives` - Loader and per-plugin bookkeeping, usually shared by
    ///   every controller of the host
    /// * `requirements` - Critical and processor libraries for this module
    pub fn natives(mut self, natives: Arc<NativeModules>, requirements: NativeRequirements) -> Self {
        self.natives = Some(natives);
        self.requirements = requirements;
        self
    }

    /// Sets the native requirements without a loader.
    ///
    /// A critical module declared this way can never be satisfied, so enable
    /// fails with [`LifecycleError::CriticalDependencyMissing`]. The
    /// processor is skipped.
    pub fn requirements(mut self, requirements: NativeRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    /// Finishes the controller. It starts `Uninitialized` with a fresh
    /// [`PluginId`] and the prefix derived from the module name.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use bundle_runtime::*;
    /// use std::sync::Arc;
    ///
    /// let module = Arc::new(StaticModule::new("Alpha", "1.0.0", "data/alpha"));
    /// let controller = LifecycleController::builder(module, Arc::new(HandleRegistry::new()))
    ///     .console(Arc::new(BufferedConsole::new()))
    ///     .build();
    /// assert_eq!(controller.state(), LifecycleState::Uninitialized);
    /// ```
    pub fn build(self) -> LifecycleController {
        let prefix = Prefix::for_module(self.host.declared_name());
        LifecycleController {
            id: PluginId::new(),
            host: self.host,
            sibling: self.sibling,
            registry: self.registry,
            natives: self.natives,
            requirements: self.requirements,
            hooks: self.hooks,
            state: RwLock::new(LifecycleState::Uninitialized),
            enabled_at: RwLock::new(None),
            disabled_at: RwLock::new(None),
            message: RwLock::new(PluginMessage::new(prefix, self.console)),
            first_enable: RwLock::new(false),
            init_guard: Mutex::new(()),
            reload_guard: Mutex::new(()),
        }
    }
}

impl LifecycleController {
    pub fn builder(host: Arc<dyn HostModule>, registry: Arc<HandleRegistry>) -> LifecycleBuilder {
        LifecycleBuilder {
            host,
            registry,
            sibling: None,
            natives: None,
            requirements: NativeRequirements::default(),
            hooks: Arc::new(DefaultHooks),
            console: Arc::new(TracingConsole),
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Enables the module.
    ///
    /// The enable timestamp is recorded before any other work. Then the
    /// native libraries are loaded, the prefix is reset to the module's own,
    /// the data directory is created on first run and the hooks run:
    /// `enable_inner` with the sibling, then `enable_finished`.
    ///
    /// On failure the controller falls back to `Disabled` and the timestamp
    /// is kept. Natives loaded and handles activated during this call are
    /// released, so a later enable starts clean.
    ///
    /// # Returns
    ///
    /// `Ok(())` once the controller is `Enabled`.
    ///
    /// # Errors
    ///
    /// * [`LifecycleError::AlreadyEnabled`] while enabling or enabled
    /// * [`LifecycleError::TransitionInProgress`] while disabling
    /// * [`LifecycleError::CriticalDependencyMissing`] when the critical
    ///   native module cannot be loaded
    /// * Any error returned by a hook
    pub fn enable(&self) -> Result<(), LifecycleError> {
        {
            let mut state = self.state.write();
            match *state {
                LifecycleState::Enabling | LifecycleState::Enabled => {
                    return Err(LifecycleError::AlreadyEnabled)
                }
                LifecycleState::Disabling => {
                    return Err(LifecycleError::TransitionInProgress(LifecycleState::Disabling))
                }
                LifecycleState::Uninitialized | LifecycleState::Disabled => {}
            }
            *state = LifecycleState::Enabling;
            *self.enabled_at.write() = Some(current_timestamp_millis());
            *self.disabled_at.write() = None;
        }

        match self.run_enable() {
            Ok(()) => {
                *self.state.write() = LifecycleState::Enabled;
                info!("✅ {} enabled ({})", self.host.declared_name(), self.id);
                Ok(())
            }
            Err(e) => {
                error!("❌ Failed to enable {}: {}", self.host.declared_name(), e);
                self.message()
                    .send_status(MessageStatus::Failed, "&cEnable failed: {0}", &[&e]);
                if let Some(natives) = &self.natives {
                    natives.release_all(&self.id);
                }
                let released = self.registry.deactivate_all(&self.id);
                if released > 0 {
                    debug!(
                        "Released {} handles activated by the failed enable of {}",
                        released,
                        self.host.declared_name()
                    );
                }
                *self.state.write() = LifecycleState::Disabled;
                Err(e)
            }
        }
    }

    fn run_enable(&self) -> Result<(), LifecycleError> {
        self.load_natives()?;

        let prefix = Prefix::for_module(self.host.declared_name());
        let rebound = self.message.read().with_prefix(prefix);
        *self.message.write() = rebound;
        self.message().send_to_console(
            "&fEnabling {0} v{1}",
            &[&self.host.declared_name(), &self.host.version()],
        );

        self.initialize_first_run()?;

        self.hooks.enable_inner(self, self.sibling.as_deref())?;
        self.hooks.enable_finished(self)
    }

    fn load_natives(&self) -> Result<(), LifecycleError> {
        let search_dir = self.native_search_dir();

        if let Some(critical) = &self.requirements.critical {
            let natives = self.natives.as_ref().ok_or_else(|| LifecycleError::CriticalDependencyMissing {
                module: critical.clone(),
                reason: "no native module loader configured".to_string(),
            })?;
            natives
                .ensure_loaded(self.id, critical, &search_dir)
                .map_err(|e| LifecycleError::CriticalDependencyMissing {
                    module: critical.clone(),
                    reason: e.to_string(),
                })?;
        }

        if let (Some(processor), Some(natives)) = (&self.requirements.processor, &self.natives) {
            if let Err(e) = natives.ensure_loaded(self.id, processor, &search_dir) {
                warn!(
                    "⚠️ Processor module {} unavailable for {}: {}",
                    processor,
                    self.host.declared_name(),
                    e
                );
            }
        }
        Ok(())
    }

    fn native_search_dir(&self) -> PathBuf {
        self.requirements
            .search_dir
            .clone()
            .unwrap_or_else(|| self.host.data_directory().to_path_buf())
    }

    fn initialize_first_run(&self) -> Result<(), LifecycleError> {
        let _guard = self.init_guard.lock();
        let directory = self.host.data_directory();
        let first = !directory.exists();
        if first {
            std::fs::create_dir_all(directory)?;
            debug!("Created data directory {}", directory.display());
            self.message()
                .send_to_console("&aCreated data directory {0}", &[&directory.display()]);
        }
        *self.first_enable.write() = first;
        Ok(())
    }

    /// Disables the module.
    ///
    /// Releases the module's native libraries and live handles, then runs
    /// `disable_inner` and `disable_finished`. The disable timestamp is never
    /// earlier than the enable timestamp. The controller ends up `Disabled`
    /// even when a hook fails; the hook error is returned.
    ///
    /// # Errors
    ///
    /// * [`LifecycleError::AlreadyDisabled`] unless the module is enabled
    /// * [`LifecycleError::TransitionInProgress`] while enabling
    pub fn disable(&self) -> Result<(), LifecycleError> {
        {
            let mut state = self.state.write();
            match *state {
                LifecycleState::Enabled => {}
                LifecycleState::Enabling | LifecycleState::Disabling => {
                    return Err(LifecycleError::TransitionInProgress(*state))
                }
                LifecycleState::Uninitialized | LifecycleState::Disabled => {
                    return Err(LifecycleError::AlreadyDisabled)
                }
            }
            *state = LifecycleState::Disabling;
            let enabled_at = self.enabled_at.read().unwrap_or(0);
            *self.disabled_at.write() = Some(current_timestamp_millis().max(enabled_at));
        }

        if let Some(natives) = &self.natives {
            let released = natives.release_all(&self.id);
            debug!("Released {} native modules of {}", released, self.host.declared_name());
        }
        self.registry.deactivate_all(&self.id);

        let result = self
            .hooks
            .disable_inner(self)
            .and_then(|()| self.hooks.disable_finished(self));

        *self.state.write() = LifecycleState::Disabled;
        match &result {
            Ok(()) => info!("🛑 {} disabled", self.host.declared_name()),
            Err(e) => error!("❌ {} disabled with errors: {}", self.host.declared_name(), e),
        }
        result
    }

    /// Runs the reload hook. Concurrent reloads of the same module are
    /// serialized; different modules never wait on each other.
    pub fn reload(&self) -> Result<(), LifecycleError> {
        let _guard = self.reload_guard.lock();
        self.hooks.reload(self)
    }

    // ========================================================================
    // Handles
    // ========================================================================

    /// Activates `items` under this module.
    ///
    /// Delegates to [`HandleRegistry::activate_all`] and reports a failure on
    /// the module's console before returning it. Handles activated here are
    /// released by [`disable`](Self::disable), or by a failing
    /// [`enable`](Self::enable) when called from a hook.
    pub fn activate_handles<I>(&self, items: I) -> Result<ActivationReport, HandleError>
    where
        I: IntoIterator<Item = HandleItem>,
    {
        let result = self.registry.activate_all(self.id, items);
        if let Err(e) = &result {
            self.message()
                .send_status(MessageStatus::Failed, "&cHandle activation failed: {0}", &[e]);
        }
        result
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> PluginId {
        self.id
    }

    pub fn host(&self) -> &dyn HostModule {
        self.host.as_ref()
    }

    pub fn sibling(&self) -> Option<&dyn HostModule> {
        self.sibling.as_deref()
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn is_disabled(&self) -> bool {
        matches!(
            self.state(),
            LifecycleState::Uninitialized | LifecycleState::Disabled
        )
    }

    /// Milliseconds since the epoch of the last enable, `None` if never enabled.
    pub fn enabled_at(&self) -> Option<u64> {
        *self.enabled_at.read()
    }

    /// Milliseconds since the epoch of the last disable since the last enable.
    pub fn disabled_at(&self) -> Option<u64> {
        *self.disabled_at.read()
    }

    /// Whether the last enable created the data directory.
    pub fn is_first_enable(&self) -> bool {
        *self.first_enable.read()
    }

    pub fn prefix(&self) -> Prefix {
        self.message.read().prefix().clone()
    }

    /// Replaces the prefix and rebinds the messaging facade to it.
    pub fn set_prefix(&self, prefix: Prefix) {
        let mut message = self.message.write();
        *message = message.with_prefix(prefix);
    }

    pub fn message(&self) -> PluginMessage {
        self.message.read().clone()
    }

    pub fn data_directory(&self) -> &Path {
        self.host.data_directory()
    }

    /// Path of the module's configuration file.
    pub fn config_file(&self) -> PathBuf {
        self.host.configuration().file_path().to_path_buf()
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("id", &self.id)
            .field("module", &self.host.declared_name())
            .field("state", &self.state())
            .field("prefix", &self.prefix())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticModule;
    use crate::message::BufferedConsole;

    fn controller(dir: &Path) -> (LifecycleController, Arc<BufferedConsole>) {
        let console = Arc::new(BufferedConsole::new());
        let host = Arc::new(StaticModule::new("Alpha", "1.0.0", dir.join("alpha")));
        let controller = LifecycleController::builder(host, Arc::new(HandleRegistry::new()))
            .console(console.clone())
            .build();
        (controller, console)
    }

    #[test]
    fn test_initial_state() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _) = controller(dir.path());
        assert_eq!(controller.state(), LifecycleState::Uninitialized);
        assert!(controller.is_disabled());
        assert_eq!(controller.enabled_at(), None);
        assert_eq!(controller.disabled_at(), None);
        assert_eq!(controller.prefix(), Prefix::for_module("Alpha"));
    }

    #[test]
    fn test_enable_then_disable() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, console) = controller(dir.path());

        controller.enable().unwrap();
        assert_eq!(controller.state(), LifecycleState::Enabled);
        assert!(controller.is_first_enable());
        assert!(dir.path().join("alpha").is_dir());
        assert!(console.plain_lines()[0].ends_with("Enabling Alpha v1.0.0"));

        controller.disable().unwrap();
        assert_eq!(controller.state(), LifecycleState::Disabled);
        assert!(controller.disabled_at().unwrap() >= controller.enabled_at().unwrap());
    }

    #[test]
    fn test_invalid_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _) = controller(dir.path());

        assert!(matches!(controller.disable(), Err(LifecycleError::AlreadyDisabled)));
        controller.enable().unwrap();
        assert!(matches!(controller.enable(), Err(LifecycleError::AlreadyEnabled)));
        controller.disable().unwrap();
        assert!(matches!(controller.disable(), Err(LifecycleError::AlreadyDisabled)));
    }

    #[test]
    fn test_second_cycle_is_not_first_enable() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _) = controller(dir.path());

        controller.enable().unwrap();
        controller.disable().unwrap();
        controller.enable().unwrap();
        assert!(!controller.is_first_enable());
        assert_eq!(controller.disabled_at(), None);
    }

    #[test]
    fn test_config_file_location() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _) = controller(dir.path());
        assert_eq!(controller.config_file(), dir.path().join("alpha").join("config.json"));
    }
}
