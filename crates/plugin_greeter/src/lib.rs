use bundle_runtime::{
    exchange_bundle, ActivationSlot, Bundle, BundleError, BundleItem, CommandDescriptor,
    CommandError, CommandHandle, Handle, HandleError, HandleItem, HandleRegistry, HostModule,
    LifecycleController, LifecycleError, ModuleHooks, Parameter, PluginId, Prefix, SenderKinds,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

/// Prefix the core module settles on after adopting its child's bundle.
pub const CORE_PREFIX: &str = "&f[&bCore&f] ";

/// Prefix the greeter hands to its parent.
pub const GREETER_PREFIX: &str = "&d[&5Greeter&d] ";

// ============================================================================
// Sample Module 1: Greeter
// ============================================================================

/// A bundle loader that welcomes players and exposes its prefix to a parent.
pub struct GreeterModule {
    data_directory: PathBuf,
    prefix: Prefix,
}

impl GreeterModule {
    pub fn new(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            data_directory: data_directory.into(),
            prefix: Prefix::new(GREETER_PREFIX),
        }
    }
}

impl HostModule for GreeterModule {
    fn declared_name(&self) -> &str {
        "Greeter"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn data_directory(&self) -> &Path {
        &self.data_directory
    }

    fn as_bundle(&self) -> Option<&dyn Bundle> {
        Some(self)
    }
}

impl Bundle for GreeterModule {
    fn bundle(&self) -> Result<Vec<BundleItem>, BundleError> {
        Ok(vec![
            BundleItem::Prefix(self.prefix.clone()),
            // Older parents don't know this kind and skip it.
            BundleItem::Unknown {
                kind: "welcome_message".to_string(),
            },
        ])
    }
}

/// Activates the greeter's handles once it is enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreeterHooks;

impl ModuleHooks for GreeterHooks {
    fn enable_finished(&self, controller: &LifecycleController) -> Result<(), LifecycleError> {
        let greet = greet_command().map_err(|e| LifecycleError::Hook(e.to_string()))?;
        let report = controller.activate_handles([
            HandleItem::instance(CommandHandle::new(greet)),
            HandleItem::of::<WelcomeHandle>(),
        ])?;
        debug!("Greeter activated {} handles", report.activated);
        Ok(())
    }
}

/// The `greet` command declaration.
pub fn greet_command() -> Result<CommandDescriptor, CommandError> {
    CommandDescriptor::builder("greet")
        .alias("hi")
        .alias("hello")
        .permission("greeter.greet")
        .senders(SenderKinds::ALL)
        .parameter(Parameter::new("player", false, true, true))
        .build()
}

// ============================================================================
// Welcome Handle
// ============================================================================

/// Sent for each welcomed player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeEvent {
    pub player: String,
    pub welcome_message: String,
    pub welcome_count: u32,
    pub owner: Option<PluginId>,
}

/// A plain handle counting welcomes.
#[derive(Debug, Default)]
pub struct WelcomeHandle {
    slot: ActivationSlot,
    welcome_count: AtomicU32,
}

impl WelcomeHandle {
    pub fn welcome(&self, player: &str) -> WelcomeEvent {
        let count = self.welcome_count.fetch_add(1, Ordering::SeqCst) + 1;
        let event = WelcomeEvent {
            player: player.to_string(),
            welcome_message: format!("Welcome to the server, {player}! You are visitor #{count}"),
            welcome_count: count,
            owner: self.slot.owner(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            debug!("Welcome event: {}", json);
        }
        event
    }

    pub fn welcome_count(&self) -> u32 {
        self.welcome_count.load(Ordering::SeqCst)
    }
}

impl Handle for WelcomeHandle {
    fn activation(&self) -> &ActivationSlot {
        &self.slot
    }

    fn on_activate(&self, owner: PluginId) -> Result<(), HandleError> {
        info!("👋 Welcome handle active under {}", owner);
        Ok(())
    }
}

/// Registers the factories for the handle types this crate activates by type.
pub fn register_factories(registry: &HandleRegistry) {
    registry.register_factory::<WelcomeHandle>();
}

// ============================================================================
// Sample Module 2: Core
// ============================================================================

/// Base of the chain: adopts its child's bundle, then installs its own prefix.
pub struct CoreModule {
    data_directory: PathBuf,
}

impl CoreModule {
    pub fn new(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            data_directory: data_directory.into(),
        }
    }
}

impl HostModule for CoreModule {
    fn declared_name(&self) -> &str {
        "Core"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn data_directory(&self) -> &Path {
        &self.data_directory
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CoreHooks;

impl ModuleHooks for CoreHooks {
    fn enable_inner(
        &self,
        controller: &LifecycleController,
        sibling: Option<&dyn HostModule>,
    ) -> Result<(), LifecycleError> {
        exchange_bundle(controller, sibling);
        controller.set_prefix(Prefix::new(CORE_PREFIX));
        Ok(())
    }

    fn enable_finished(&self, controller: &LifecycleController) -> Result<(), LifecycleError> {
        let core = core_command().map_err(|e| LifecycleError::Hook(e.to_string()))?;
        controller.activate_handles([HandleItem::instance(CommandHandle::new(core))])?;
        Ok(())
    }

    fn reload(&self, controller: &LifecycleController) -> Result<(), LifecycleError> {
        controller.message().send_to_console("&aReloaded {0}", &[&controller.host().declared_name()]);
        Ok(())
    }
}

/// The `core` command declaration, usable by players only.
pub fn core_command() -> Result<CommandDescriptor, CommandError> {
    CommandDescriptor::builder("core")
        .alias("c")
        .alias("ccore")
        .permission("Core")
        .senders(SenderKinds::PLAYER_ONLY)
        .parameter(Parameter::new("param", true, true, true))
        .child("reload")
        .build()
}
