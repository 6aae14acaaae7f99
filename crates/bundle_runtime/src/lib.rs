//! # Bundle Runtime
//!
//! A composition runtime that lets independently loaded modules share one
//! host process. Modules coordinate their lifecycle through a
//! [`LifecycleController`], hand payloads to each other through the bundle
//! exchange, and activate capability objects ([`Handle`]s) in a shared
//! [`HandleRegistry`]. A handle may carry a command descriptor or run a
//! [`RepeatingTask`] while its owner is enabled.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bundle_runtime::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(HandleRegistry::new());
//! let module = Arc::new(StaticModule::new("Example", "1.0.0", "data/example"));
//!
//! let controller = LifecycleController::builder(module, registry).build();
//! controller.enable()?;
//!
//! let ping = CommandDescriptor::builder("ping")
//!     .senders(SenderKinds::ALL)
//!     .build()?;
//! controller.activate_handles([HandleItem::instance(CommandHandle::new(ping))])?;
//!
//! controller.disable()?;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod command;
pub mod config;
pub mod error;
pub mod handle;
pub mod host;
pub mod lifecycle;
pub mod message;
pub mod multimap;
pub mod native;
pub mod prefix;
pub mod registry;
pub mod task;

pub use bundle::{exchange_bundle, Bundle, BundleItem, ExchangeOutcome};
pub use command::{
    CommandDescriptor, CommandDescriptorBuilder, CommandHandle, CommandTree, HelpPage, Parameter,
    SenderKind, SenderKinds, COMMAND_PAGE_SIZE,
};
pub use config::{ConfigFormat, PluginConfiguration, PLUGIN_CONFIG_FILENAME};
pub use error::{BundleError, CommandError, HandleError, LifecycleError, NativeError};
pub use handle::{activate, deactivate, ActivationSlot, Handle, HandleItem, TypeRef};
pub use host::{HostModule, PluginId, StaticModule};
pub use lifecycle::{DefaultHooks, LifecycleBuilder, LifecycleController, LifecycleState, ModuleHooks};
pub use message::{
    fill_placeholders, BufferedConsole, ConsoleLine, ConsoleSink, MessageLevel, MessageStatus,
    PluginMessage, TracingConsole,
};
pub use multimap::MultiMap;
pub use native::{
    LibraryLoader, ModuleLoader, NativeModule, NativeModules, NativeRequirements,
    DEFAULT_PROCESSOR_MODULE,
};
pub use prefix::{color_hash, strip_color_markers, Prefix, COLOR_MARKER};
pub use registry::{ActivationReport, HandleFactory, HandleRegistry};
pub use task::{RepeatingTask, TaskAction, TaskSchedule, TICK};

/// Current time in milliseconds since the Unix epoch.
pub fn current_timestamp_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
