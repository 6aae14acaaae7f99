//! Integration tests for the handle registry and command hierarchy

use bundle_runtime::*;
use std::sync::Arc;

struct CommandA {
    slot: ActivationSlot,
    descriptor: CommandDescriptor,
}

impl Default for CommandA {
    fn default() -> Self {
        Self {
            slot: ActivationSlot::new(),
            descriptor: CommandDescriptor::builder("alpha")
                .alias("a")
                .senders(SenderKinds::ALL)
                .build()
                .expect("valid descriptor"),
        }
    }
}

impl Handle for CommandA {
    fn activation(&self) -> &ActivationSlot {
        &self.slot
    }

    fn command(&self) -> Option<&CommandDescriptor> {
        Some(&self.descriptor)
    }
}

/// Never given a factory, so the registry cannot treat it as a handle.
struct CommandB;

#[derive(Default)]
struct Listener {
    slot: ActivationSlot,
}

impl Handle for Listener {
    fn activation(&self) -> &ActivationSlot {
        &self.slot
    }
}

#[test]
fn test_partial_registration_up_to_failing_item() {
    let registry = HandleRegistry::new();
    registry.register_factory::<CommandA>();
    let plugin = PluginId::new();

    let err = registry
        .activate_all(plugin, [HandleItem::of::<CommandA>(), HandleItem::of::<CommandB>()])
        .unwrap_err();

    assert!(matches!(err, HandleError::InvalidHandleType { name } if name.ends_with("CommandB")));
    assert_eq!(registry.handled_types_of(&plugin), vec![TypeRef::of::<CommandA>()]);
    assert_eq!(registry.live_handles_of(&plugin).len(), 1);
}

#[test]
fn test_items_after_failure_are_not_processed() {
    let registry = HandleRegistry::new();
    registry.register_factory::<Listener>();
    let plugin = PluginId::new();

    let result = registry.activate_all(
        plugin,
        [HandleItem::of::<CommandB>(), HandleItem::of::<Listener>()],
    );
    assert!(result.is_err());
    assert!(registry.handled_types_of(&plugin).is_empty());
}

#[test]
fn test_reactivating_an_instance_keeps_first_entry() {
    let registry = HandleRegistry::new();
    let plugin = PluginId::new();
    let listener = Arc::new(Listener::default());
    let command = Arc::new(CommandA::default());

    registry.activate_all(plugin, [HandleItem::from(listener.clone())]).unwrap();
    let before = registry.handled_types_of(&plugin);

    registry
        .activate_all(plugin, [HandleItem::from(command), HandleItem::from(listener.clone())])
        .unwrap();
    let after = registry.handled_types_of(&plugin);

    // Newest first; the original registration is still at the tail.
    assert_eq!(after.len(), 3);
    assert_eq!(after.last(), before.last());
    assert_eq!(after[0], TypeRef::of::<Listener>());
    assert_eq!(after[1], TypeRef::of::<CommandA>());
}

#[test]
fn test_handle_cannot_move_between_plugins() {
    let registry = HandleRegistry::new();
    let first = PluginId::new();
    let second = PluginId::new();
    let shared = Arc::new(Listener::default());

    registry.activate_all(first, [HandleItem::from(shared.clone())]).unwrap();
    let err = registry
        .activate_all(second, [HandleItem::from(shared.clone())])
        .unwrap_err();

    assert!(matches!(err, HandleError::AlreadyActivated { owner, .. } if owner == first));
    assert!(registry.handled_types_of(&second).is_empty());
}

#[test]
fn test_custom_factory() {
    let registry = HandleRegistry::new();
    let type_ref = TypeRef::of::<CommandHandle>();
    registry.register_factory_with(type_ref, || {
        let descriptor = CommandDescriptor::builder("generated")
            .senders(SenderKinds::CONSOLE_ONLY)
            .build()
            .expect("valid descriptor");
        Arc::new(CommandHandle::new(descriptor))
    });
    assert!(registry.has_factory(&type_ref));

    let plugin = PluginId::new();
    let report = registry.activate_all(plugin, [HandleItem::Type(type_ref)]).unwrap();
    assert_eq!(report.commands, 1);

    let live = registry.live_handles_of(&plugin);
    assert_eq!(live[0].command().map(|c| c.name()), Some("generated"));
}

#[test]
fn test_command_tree_from_handles() {
    let registry = HandleRegistry::new();
    registry.register_factory::<CommandA>();
    let plugin = PluginId::new();
    registry.activate_all(plugin, [HandleItem::of::<CommandA>()]).unwrap();

    let tree = CommandTree::new();
    for handle in registry.live_handles_of(&plugin) {
        if let Some(descriptor) = handle.command() {
            tree.register(None, descriptor.clone()).unwrap();
        }
    }

    assert_eq!(tree.resolve("a").map(|c| c.name().to_string()), Some("alpha".to_string()));
    assert_eq!(tree.help_page(None, 1).entries, vec!["alpha"]);
}

#[test]
fn test_reactivation_is_not_counted_twice() {
    let registry = HandleRegistry::new();
    let plugin = PluginId::new();
    let command = Arc::new(CommandA::default());

    let first = registry.activate_all(plugin, [HandleItem::from(command.clone())]).unwrap();
    let second = registry.activate_all(plugin, [HandleItem::from(command.clone())]).unwrap();

    assert_eq!((first.activated, first.commands), (1, 1));
    assert_eq!((second.activated, second.commands), (0, 0));
    // The registration itself is still recorded twice.
    assert_eq!(registry.handled_types_of(&plugin).len(), 2);
    assert_eq!(registry.live_handles_of(&plugin).len(), 1);
}

#[test]
fn test_factory_building_the_wrong_type_is_refused() {
    let registry = HandleRegistry::new();
    registry.register_factory_with(TypeRef::of::<CommandA>(), || Arc::new(Listener::default()));
    let plugin = PluginId::new();

    for _ in 0..3 {
        let err = registry
            .activate_all(plugin, [HandleItem::of::<CommandA>()])
            .unwrap_err();
        assert!(matches!(err, HandleError::InvalidHandleType { name } if name.ends_with("CommandA")));
    }

    assert!(registry.live_handles_of(&plugin).is_empty());
    assert!(registry.handled_types_of(&plugin).is_empty());
}
