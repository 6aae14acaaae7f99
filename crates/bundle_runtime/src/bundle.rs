//! Bundle payloads and the exchange protocol.
//!
//! A child module that acts as a bundle loader exposes an ordered list of
//! [`BundleItem`]s. When its parent enables with the child as sibling, the
//! parent walks that list and adopts the kinds it recognizes. Unknown kinds
//! are skipped so producers can add new ones without breaking consumers.

use crate::error::BundleError;
use crate::host::HostModule;
use crate::lifecycle::LifecycleController;
use crate::message::MessageStatus;
use crate::prefix::Prefix;
use tracing::{debug, warn};

/// One entry of a bundle payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleItem {
    /// Replaces the receiving module's prefix.
    Prefix(Prefix),
    /// A kind this runtime does not understand.
    Unknown { kind: String },
}

impl BundleItem {
    pub fn kind(&self) -> &str {
        match self {
            BundleItem::Prefix(_) => "prefix",
            BundleItem::Unknown { kind } => kind,
        }
    }
}

/// A module that exposes a payload to its parent.
pub trait Bundle: Send + Sync {
    fn bundle(&self) -> Result<Vec<BundleItem>, BundleError>;
}

/// What an exchange did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// No sibling, or the sibling is not a bundle loader.
    Skipped,
    /// The payload was read and applied.
    Applied { prefix_changed: bool, ignored: usize },
    /// The payload could not be read; nothing was changed.
    Failed,
}

/// Runs the exchange between `controller` and its `sibling`.
///
/// Items are applied in payload order. A [`BundleItem::Prefix`] replaces the
/// controller's prefix and reports the change on its console; unknown kinds
/// are skipped.
///
/// Never fails: an unreadable payload is reported on the console and leaves
/// the controller untouched.
///
/// # Arguments
///
/// * `controller` - The chain base receiving the payload
/// * `sibling` - The child module; `None` or a module without a bundle
///   makes the exchange a no-op
///
/// # Returns
///
/// What happened, for logging and tests.
///
/// # Example
///
/// ```rust,no_run
/// use bundle_runtime::*;
/// use std::sync::Arc;
///
/// let module = Arc::new(StaticModule::new("Core", "1.0.0", "data/core"));
/// let controller = LifecycleController::builder(module, Arc::new(HandleRegistry::new())).build();
/// assert_eq!(exchange_bundle(&controller, None), ExchangeOutcome::Skipped);
/// ```
pub fn exchange_bundle(controller: &LifecycleController, sibling: Option<&dyn HostModule>) -> ExchangeOutcome {
    let Some(sibling) = sibling else {
        return ExchangeOutcome::Skipped;
    };
    let Some(loader) = sibling.as_bundle() else {
        debug!("{} is not a bundle loader, skipping exchange", sibling.declared_name());
        return ExchangeOutcome::Skipped;
    };

    let message = controller.message();
    message.send_to_console("&eCalling {0} v{1}", &[&sibling.declared_name(), &sibling.version()]);
    message.send_to_console("&eDetected bundle loader", &[]);

    let items = match loader.bundle() {
        Ok(items) => items,
        Err(e) => {
            warn!("⚠️ Bundle from {} ignored: {}", sibling.declared_name(), e);
            message.send_status(MessageStatus::Failed, "&cIgnoring bundle from {0}: {1}", &[&sibling.declared_name(), &e]);
            return ExchangeOutcome::Failed;
        }
    };

    let mut prefix_changed = false;
    let mut ignored = 0;
    for item in items {
        match item {
            BundleItem::Prefix(prefix) => {
                let previous = controller.prefix();
                controller.set_prefix(prefix.clone());
                controller.message().send_status(
                    MessageStatus::Changed,
                    "Prefix change detected : {0} &f-> {1}",
                    &[&previous, &prefix],
                );
                prefix_changed = true;
            }
            BundleItem::Unknown { kind } => {
                debug!("Skipping unknown bundle item '{}' from {}", kind, sibling.declared_name());
                ignored += 1;
            }
        }
    }

    ExchangeOutcome::Applied { prefix_changed, ignored }
}
