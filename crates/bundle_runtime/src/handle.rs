//! Handle activation contract.
//!
//! A handle is a capability object that becomes active under exactly one
//! plugin. Handles are either supplied as ready instances or named through a
//! [`TypeRef`] that the registry resolves through its factory table.

use crate::command::CommandDescriptor;
use crate::error::HandleError;
use crate::host::PluginId;
use crate::task::TaskSchedule;
use parking_lot::Mutex;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A reference to a concrete Rust type.
///
/// Equality and hashing use the [`TypeId`] only; the name is kept for
/// diagnostics.
#[derive(Clone, Copy)]
pub struct TypeRef {
    id: TypeId,
    name: &'static str,
}

impl TypeRef {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        let start = base.rfind("::").map(|i| i + 2).unwrap_or(0);
        &self.name[start..]
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Records which plugin currently owns a handle.
#[derive(Debug, Default)]
pub struct ActivationSlot {
    owner: Mutex<Option<PluginId>>,
}

impl ActivationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self) -> Option<PluginId> {
        *self.owner.lock()
    }

    pub fn is_active(&self) -> bool {
        self.owner.lock().is_some()
    }
}

/// A capability object activated under a plugin.
pub trait Handle: Any + Send + Sync {
    /// The slot holding this handle's owner.
    fn activation(&self) -> &ActivationSlot;

    /// Called once when the handle becomes active under `owner`.
    fn on_activate(&self, owner: PluginId) -> Result<(), HandleError> {
        let _ = owner;
        Ok(())
    }

    /// Called when the owning plugin releases the handle.
    fn on_deactivate(&self) {}

    /// The command this handle contributes, if it is command-capable.
    fn command(&self) -> Option<&CommandDescriptor> {
        None
    }

    /// The schedule this handle repeats on while active, if it runs a task.
    fn schedule(&self) -> Option<&TaskSchedule> {
        None
    }

    /// The concrete type of this handle.
    fn type_ref(&self) -> TypeRef {
        TypeRef::of::<Self>()
    }
}

/// Activates `handle` under `owner`.
///
/// Returns `Ok(true)` when the handle was newly activated and `Ok(false)` when
/// it was already active under the same owner. Moving a handle to another
/// owner is refused.
pub fn activate(handle: &dyn Handle, owner: PluginId) -> Result<bool, HandleError> {
    {
        let mut slot = handle.activation().owner.lock();
        match *slot {
            Some(current) if current == owner => return Ok(false),
            Some(current) => {
                return Err(HandleError::AlreadyActivated {
                    handle: handle.type_ref().name(),
                    owner: current,
                    requested: owner,
                })
            }
            None => *slot = Some(owner),
        }
    }

    // The slot is claimed above, so the callback runs unlocked and may
    // inspect its own activation state.
    if let Err(e) = handle.on_activate(owner) {
        *handle.activation().owner.lock() = None;
        return Err(e);
    }
    Ok(true)
}

/// Releases `handle` from its owner, returning the previous owner.
pub fn deactivate(handle: &dyn Handle) -> Option<PluginId> {
    let previous = handle.activation().owner.lock().take();
    if previous.is_some() {
        handle.on_deactivate();
    }
    previous
}

/// One entry passed to [`HandleRegistry::activate_all`](crate::HandleRegistry::activate_all).
#[derive(Clone)]
pub enum HandleItem {
    /// A ready instance.
    Instance(Arc<dyn Handle>),
    /// A type resolved through the registry's factory table.
    Type(TypeRef),
}

impl HandleItem {
    pub fn instance<T: Handle>(handle: T) -> Self {
        HandleItem::Instance(Arc::new(handle))
    }

    pub fn of<T: 'static>() -> Self {
        HandleItem::Type(TypeRef::of::<T>())
    }
}

impl<T: Handle> From<Arc<T>> for HandleItem {
    fn from(handle: Arc<T>) -> Self {
        HandleItem::Instance(handle)
    }
}

impl From<TypeRef> for HandleItem {
    fn from(type_ref: TypeRef) -> Self {
        HandleItem::Type(type_ref)
    }
}

impl fmt::Debug for HandleItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleItem::Instance(handle) => write!(f, "Instance({})", handle.type_ref()),
            HandleItem::Type(type_ref) => write!(f, "Type({type_ref})"),
        }
    }
}
