//! Process-wide handle registry.
//!
//! The registry records which handle types have been activated under which
//! plugin. It is an explicit object created once by the host and shared with
//! every lifecycle controller as an `Arc<HandleRegistry>`.
//!
//! Type references are turned into instances through a factory table filled
//! at startup. A type without a factory is not a handle as far as the
//! registry is concerned.

use crate::error::HandleError;
use crate::handle::{activate, deactivate, Handle, HandleItem, TypeRef};
use crate::host::PluginId;
use crate::multimap::MultiMap;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Zero-argument constructor for a handle type.
pub type HandleFactory = Arc<dyn Fn() -> Arc<dyn Handle> + Send + Sync>;

/// Summary of one [`HandleRegistry::activate_all`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Handles that became active in this call. Re-activating an instance
    /// already active under the same plugin records a registration but is
    /// not counted here.
    pub activated: usize,
    /// How many of the activated handles contribute a command.
    pub commands: usize,
    /// Type references skipped because a live instance already exists.
    pub reused: usize,
}

/// Tracks activated handles per plugin.
pub struct HandleRegistry {
    registrations: MultiMap<PluginId, TypeRef>,
    live: MultiMap<PluginId, Arc<dyn Handle>>,
    factories: DashMap<TypeRef, HandleFactory>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            registrations: MultiMap::new(),
            live: MultiMap::new(),
            factories: DashMap::new(),
        }
    }

    /// Registers `T::default` as the constructor for `T`.
    pub fn register_factory<T>(&self) -> TypeRef
    where
        T: Handle + Default,
    {
        let type_ref = TypeRef::of::<T>();
        self.register_factory_with(type_ref, || Arc::new(T::default()) as Arc<dyn Handle>);
        type_ref
    }

    /// Registers a custom constructor for `type_ref`, replacing any previous one.
    ///
    /// The factory must build handles of exactly that type. A factory that
    /// returns another type is refused when it runs, with
    /// [`HandleError::InvalidHandleType`].
    pub fn register_factory_with<F>(&self, type_ref: TypeRef, factory: F)
    where
        F: Fn() -> Arc<dyn Handle> + Send + Sync + 'static,
    {
        debug!("🏭 Registered handle factory for {}", type_ref);
        self.factories.insert(type_ref, Arc::new(factory));
    }

    pub fn has_factory(&self, type_ref: &TypeRef) -> bool {
        self.factories.contains_key(type_ref)
    }

    fn instantiate(&self, type_ref: TypeRef) -> Result<Arc<dyn Handle>, HandleError> {
        // Clone the factory out so the shard lock is not held while it runs.
        let factory = self
            .factories
            .get(&type_ref)
            .map(|entry| entry.value().clone())
            .ok_or(HandleError::InvalidHandleType {
                name: type_ref.name(),
            })?;

        let handle = factory();
        let built = handle.type_ref();
        if built != type_ref {
            warn!("❌ Factory for {} built a {} instead", type_ref, built);
            return Err(HandleError::InvalidHandleType {
                name: type_ref.name(),
            });
        }
        Ok(handle)
    }

    fn is_live(&self, plugin: &PluginId, handle: &Arc<dyn Handle>) -> bool {
        let target = Arc::as_ptr(handle) as *const ();
        self.live
            .get(plugin)
            .iter()
            .any(|existing| Arc::as_ptr(existing) as *const () == target)
    }

    fn has_live_of_type(&self, plugin: &PluginId, type_ref: &TypeRef) -> bool {
        self.live
            .get(plugin)
            .iter()
            .any(|existing| existing.type_ref() == *type_ref)
    }

    /// Activates every item under `plugin`, in order.
    ///
    /// Instances are activated directly and recorded at the front of the
    /// plugin's registrations, so activating the same instance again adds a
    /// second entry. Type references are built through the factory table and
    /// recorded once per type; when a live instance of that type already
    /// exists under `plugin` it is reused instead.
    ///
    /// Processing stops at the first failure. Items before it stay
    /// registered. One `info!` event with the `plugin`, `commands` and
    /// `activated` fields summarizes a successful call.
    ///
    /// # Arguments
    ///
    /// * `plugin` - Owner the handles are activated under
    /// * `items` - Instances and type references, processed front to back
    ///
    /// # Returns
    ///
    /// An [`ActivationReport`] counting what this call activated.
    ///
    /// # Errors
    ///
    /// * [`HandleError::InvalidHandleType`] for a type reference without a
    ///   matching factory
    /// * [`HandleError::AlreadyActivated`] for a handle owned by another plugin
    /// * [`HandleError::Activation`] when a handle's own activation fails
    ///
    /// # Example
    ///
    /// ```rust
    /// use bundle_runtime::*;
    ///
    /// let registry = HandleRegistry::new();
    /// let ping = CommandDescriptor::builder("ping")
    ///     .senders(SenderKinds::ALL)
    ///     .build()
    ///     .unwrap();
    ///
    /// let plugin = PluginId::new();
    /// let report = registry
    ///     .activate_all(plugin, [HandleItem::instance(CommandHandle::new(ping))])
    ///     .unwrap();
    /// assert_eq!(report.commands, 1);
    /// assert_eq!(registry.handled_types_of(&plugin).len(), 1);
    /// ```
    pub fn activate_all<I>(&self, plugin: PluginId, items: I) -> Result<ActivationReport, HandleError>
    where
        I: IntoIterator<Item = HandleItem>,
    {
        let mut report = ActivationReport::default();

        for item in items {
            if let Err(e) = self.activate_one(plugin, item, &mut report) {
                warn!(
                    plugin = %plugin,
                    activated = report.activated,
                    "❌ Handle activation stopped: {}",
                    e
                );
                return Err(e);
            }
        }

        info!(
            plugin = %plugin,
            commands = report.commands,
            activated = report.activated,
            "✅ Registered {} handles ({} commands)",
            report.activated,
            report.commands
        );
        Ok(report)
    }

    fn activate_one(
        &self,
        plugin: PluginId,
        item: HandleItem,
        report: &mut ActivationReport,
    ) -> Result<(), HandleError> {
        let (handle, requested) = match item {
            HandleItem::Instance(handle) => (handle, None),
            HandleItem::Type(type_ref) => {
                if self.registrations.contains_value(&plugin, &type_ref)
                    && self.has_live_of_type(&plugin, &type_ref)
                {
                    debug!("♻️ {} is already active under {}", type_ref, plugin);
                    report.reused += 1;
                    return Ok(());
                }
                (self.instantiate(type_ref)?, Some(type_ref))
            }
        };

        let fresh = activate(handle.as_ref(), plugin)?;

        match requested {
            Some(type_ref) => {
                self.registrations.put_first_unique(plugin, type_ref);
            }
            None => self.registrations.put_first(plugin, handle.type_ref()),
        }

        let commands = usize::from(handle.command().is_some());
        if !self.is_live(&plugin, &handle) {
            self.live.put(plugin, handle);
        }
        if !fresh {
            debug!("Handle was already active under {}", plugin);
            return Ok(());
        }

        report.commands += commands;
        report.activated += 1;
        Ok(())
    }

    /// Every type ever registered for `plugin`, most recent first.
    pub fn handled_types_of(&self, plugin: &PluginId) -> Vec<TypeRef> {
        self.registrations.get(plugin)
    }

    /// Handles currently active under `plugin`, in activation order.
    pub fn live_handles_of(&self, plugin: &PluginId) -> Vec<Arc<dyn Handle>> {
        self.live.get(plugin)
    }

    /// Live handles that run a repeating task, across every plugin.
    pub fn scheduled_handles(&self) -> Vec<(PluginId, Arc<dyn Handle>)> {
        self.live
            .snapshot()
            .into_iter()
            .flat_map(|(plugin, handles)| {
                handles
                    .into_iter()
                    .filter(|handle| handle.schedule().is_some())
                    .map(move |handle| (plugin, handle))
            })
            .collect()
    }

    /// Whether `handle` is a live scheduled task of some plugin.
    pub fn is_scheduled(&self, handle: &dyn Handle) -> bool {
        let target = handle as *const dyn Handle as *const ();
        self.scheduled_handles()
            .iter()
            .any(|(_, live)| Arc::as_ptr(live) as *const () == target)
    }

    /// A copy of all registrations, keyed by plugin.
    pub fn all_registrations(&self) -> HashMap<PluginId, Vec<TypeRef>> {
        self.registrations.snapshot()
    }

    /// Releases every live handle of `plugin`.
    ///
    /// Registration history is kept. Returns how many handles were released.
    pub fn deactivate_all(&self, plugin: &PluginId) -> usize {
        let handles = self.live.remove(plugin);
        let mut released = 0;
        for handle in handles.iter().rev() {
            if deactivate(handle.as_ref()).is_some() {
                released += 1;
            }
        }
        if released > 0 {
            debug!("🔌 Released {} handles of {}", released, plugin);
        }
        released
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("plugins", &self.registrations.len())
            .field("factories", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandDescriptor, CommandHandle, SenderKinds};
    use crate::handle::ActivationSlot;

    #[derive(Default)]
    struct Plain {
        slot: ActivationSlot,
    }

    impl Handle for Plain {
        fn activation(&self) -> &ActivationSlot {
            &self.slot
        }
    }

    struct NotAHandle;

    #[test]
    fn test_unknown_plugin_has_no_types() {
        let registry = HandleRegistry::new();
        assert!(registry.handled_types_of(&PluginId::new()).is_empty());
        assert!(registry.all_registrations().is_empty());
    }

    #[test]
    fn test_type_reference_without_factory() {
        let registry = HandleRegistry::new();
        let err = registry
            .activate_all(PluginId::new(), [HandleItem::of::<NotAHandle>()])
            .unwrap_err();
        assert!(matches!(err, HandleError::InvalidHandleType { .. }));
        assert!(err.to_string().contains("NotAHandle"));
    }

    #[test]
    fn test_type_reference_recorded_once() {
        let registry = HandleRegistry::new();
        registry.register_factory::<Plain>();
        let plugin = PluginId::new();

        let first = registry.activate_all(plugin, [HandleItem::of::<Plain>()]).unwrap();
        let second = registry.activate_all(plugin, [HandleItem::of::<Plain>()]).unwrap();

        assert_eq!(first.activated, 1);
        assert_eq!(second.activated, 0);
        assert_eq!(second.reused, 1);
        assert_eq!(registry.handled_types_of(&plugin), vec![TypeRef::of::<Plain>()]);
        assert_eq!(registry.live_handles_of(&plugin).len(), 1);
    }

    #[test]
    fn test_instance_reactivation_adds_entry() {
        let registry = HandleRegistry::new();
        let plugin = PluginId::new();
        let handle: Arc<Plain> = Arc::new(Plain::default());

        registry.activate_all(plugin, [HandleItem::from(handle.clone())]).unwrap();
        registry.activate_all(plugin, [HandleItem::from(handle.clone())]).unwrap();

        assert_eq!(registry.handled_types_of(&plugin).len(), 2);
        assert_eq!(registry.live_handles_of(&plugin).len(), 1);
        assert_eq!(handle.activation().owner(), Some(plugin));
    }

    #[test]
    fn test_commands_are_counted() {
        let registry = HandleRegistry::new();
        let descriptor = CommandDescriptor::builder("ping")
            .senders(SenderKinds::ALL)
            .build()
            .unwrap();

        let report = registry
            .activate_all(
                PluginId::new(),
                [
                    HandleItem::instance(CommandHandle::new(descriptor)),
                    HandleItem::instance(Plain::default()),
                ],
            )
            .unwrap();
        assert_eq!(report.activated, 2);
        assert_eq!(report.commands, 1);
    }

    #[test]
    fn test_deactivate_all_keeps_history() {
        let registry = HandleRegistry::new();
        let plugin = PluginId::new();
        let handle = Arc::new(Plain::default());
        registry.activate_all(plugin, [HandleItem::from(handle.clone())]).unwrap();

        assert_eq!(registry.deactivate_all(&plugin), 1);
        assert!(!handle.activation().is_active());
        assert!(registry.live_handles_of(&plugin).is_empty());
        assert_eq!(registry.handled_types_of(&plugin).len(), 1);
        assert_eq!(registry.deactivate_all(&plugin), 0);
    }

    #[test]
    fn test_plain_handles_are_not_scheduled() {
        let registry = HandleRegistry::new();
        let plugin = PluginId::new();
        let handle = Arc::new(Plain::default());
        registry.activate_all(plugin, [HandleItem::from(handle.clone())]).unwrap();

        assert!(registry.scheduled_handles().is_empty());
        assert!(!registry.is_scheduled(handle.as_ref()));
    }

    #[test]
    fn test_plugins_are_partitioned() {
        let registry = HandleRegistry::new();
        registry.register_factory::<Plain>();
        let a = PluginId::new();
        let b = PluginId::new();

        registry.activate_all(a, [HandleItem::of::<Plain>()]).unwrap();
        assert!(registry.handled_types_of(&b).is_empty());
        registry.activate_all(b, [HandleItem::of::<Plain>()]).unwrap();
        assert_eq!(registry.all_registrations().len(), 2);
    }
}
