//! Error types for the bundle runtime.
//!
//! Each concern gets its own enum so callers can match on exactly the
//! failures an operation can produce. Registry and lifecycle errors are
//! returned synchronously at the call boundary; bundle errors never escape
//! the exchange protocol.

use crate::host::PluginId;
use crate::lifecycle::LifecycleState;

/// Errors raised while activating or resolving handles.
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    /// A type reference has no registered factory, so it cannot be
    /// instantiated as a handle.
    #[error("{name} isn't a handle type: no factory is registered for it")]
    InvalidHandleType { name: &'static str },
    /// The handle already belongs to another plugin.
    #[error("handle {handle} is already active under plugin {owner}, refusing to move it to {requested}")]
    AlreadyActivated {
        handle: &'static str,
        owner: PluginId,
        requested: PluginId,
    },
    /// The handle's own activation logic failed.
    #[error("handle activation failed: {0}")]
    Activation(String),
}

/// Errors raised by lifecycle transitions.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Enable was called while the module is enabling or enabled.
    #[error("module is already enabled")]
    AlreadyEnabled,
    /// Disable was called while the module is not enabled.
    #[error("module is already disabled")]
    AlreadyDisabled,
    /// A transition was requested while another one is still running.
    #[error("module is in the middle of a transition ({0:?})")]
    TransitionInProgress(LifecycleState),
    /// The mandatory native module could not be loaded.
    #[error("critical native module '{module}' is missing: {reason}")]
    CriticalDependencyMissing { module: String, reason: String },
    /// An extension hook reported a failure.
    #[error("lifecycle hook failed: {0}")]
    Hook(String),
    /// Filesystem failure during one-time initialization.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Handle(#[from] HandleError),
}

/// Raised when a sibling's payload cannot be read.
///
/// The exchange protocol swallows this after logging it.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("bundle payload is unreadable: {0}")]
    Unreadable(String),
}

/// Errors from the native module boundary.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    /// No library file exists where the module was expected.
    #[error("native module not found at {0}")]
    NotFound(String),
    /// The library exists but could not be loaded.
    #[error("failed to load native module: {0}")]
    Load(String),
}

/// Command descriptor validation failures. These fail fast at startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command name cannot be empty")]
    EmptyName,
    #[error("command '{0}' does not declare which sender kinds may use it")]
    MissingSenderKinds(String),
    #[error("command '{0}' is already registered in this scope")]
    DuplicateName(String),
}
