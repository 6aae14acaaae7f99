//! Command descriptors and the command hierarchy.
//!
//! Descriptors are declarative: the host's dispatcher consumes them. They are
//! validated when built so a malformed command fails at startup instead of at
//! dispatch time.

use crate::error::CommandError;
use crate::handle::{ActivationSlot, Handle};
use crate::host::PluginId;
use crate::multimap::MultiMap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Number of entries shown on one help page.
pub const COMMAND_PAGE_SIZE: usize = 7;

/// Parent key used for top-level commands in a [`CommandTree`].
const ROOT: &str = "";

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SenderKind {
    Console,
    Player,
}

/// Allow-flags per sender kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKinds {
    pub console: bool,
    pub player: bool,
}

impl SenderKinds {
    pub const ALL: SenderKinds = SenderKinds {
        console: true,
        player: true,
    };
    pub const CONSOLE_ONLY: SenderKinds = SenderKinds {
        console: true,
        player: false,
    };
    pub const PLAYER_ONLY: SenderKinds = SenderKinds {
        console: false,
        player: true,
    };

    pub fn permits(self, kind: SenderKind) -> bool {
        match kind {
            SenderKind::Console => self.console,
            SenderKind::Player => self.player,
        }
    }
}

/// The argument a command accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub required: bool,
    pub console: bool,
    pub player: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, required: bool, console: bool, player: bool) -> Self {
        Self {
            name: name.into(),
            required,
            console,
            player,
        }
    }
}

/// An immutable command declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    name: String,
    aliases: Vec<String>,
    permission: Option<String>,
    senders: SenderKinds,
    parameter: Option<Parameter>,
    children: Vec<String>,
    externals: Vec<String>,
}

impl CommandDescriptor {
    pub fn builder(name: impl Into<String>) -> CommandDescriptorBuilder {
        CommandDescriptorBuilder {
            name: name.into(),
            aliases: Vec::new(),
            permission: None,
            senders: None,
            parameter: None,
            children: Vec::new(),
            externals: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn permission(&self) -> Option<&str> {
        self.permission.as_deref()
    }

    pub fn senders(&self) -> SenderKinds {
        self.senders
    }

    pub fn parameter(&self) -> Option<&Parameter> {
        self.parameter.as_ref()
    }

    /// Names of sub-commands declared by this command.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// Names of commands owned by other modules that this one forwards to.
    pub fn externals(&self) -> &[String] {
        &self.externals
    }

    /// Whether `label` names this command or one of its aliases.
    pub fn matches(&self, label: &str) -> bool {
        self.name.eq_ignore_ascii_case(label)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(label))
    }
}

/// Builder for [`CommandDescriptor`].
#[derive(Debug, Clone)]
pub struct CommandDescriptorBuilder {
    name: String,
    aliases: Vec<String>,
    permission: Option<String>,
    senders: Option<SenderKinds>,
    parameter: Option<Parameter>,
    children: Vec<String>,
    externals: Vec<String>,
}

impl CommandDescriptorBuilder {
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub fn senders(mut self, senders: SenderKinds) -> Self {
        self.senders = Some(senders);
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameter = Some(parameter);
        self
    }

    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.children.push(name.into());
        self
    }

    pub fn external(mut self, name: impl Into<String>) -> Self {
        self.externals.push(name.into());
        self
    }

    pub fn build(self) -> Result<CommandDescriptor, CommandError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(CommandError::EmptyName);
        }
        let senders = self
            .senders
            .ok_or_else(|| CommandError::MissingSenderKinds(name.clone()))?;

        Ok(CommandDescriptor {
            name,
            aliases: self.aliases,
            permission: self.permission,
            senders,
            parameter: self.parameter,
            children: self.children,
            externals: self.externals,
        })
    }
}

/// A handle that contributes a command.
#[derive(Debug)]
pub struct CommandHandle {
    descriptor: CommandDescriptor,
    slot: ActivationSlot,
}

impl CommandHandle {
    pub fn new(descriptor: CommandDescriptor) -> Self {
        Self {
            descriptor,
            slot: ActivationSlot::new(),
        }
    }

    pub fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    /// The plugin this command is bound to at runtime.
    pub fn owner(&self) -> Option<PluginId> {
        self.slot.owner()
    }
}

impl Handle for CommandHandle {
    fn activation(&self) -> &ActivationSlot {
        &self.slot
    }

    fn command(&self) -> Option<&CommandDescriptor> {
        Some(&self.descriptor)
    }
}

/// One page of a command listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpPage {
    /// 1-based page number actually shown.
    pub page: usize,
    pub total_pages: usize,
    pub entries: Vec<String>,
}

/// Parent to child relations between registered commands.
#[derive(Debug, Default)]
pub struct CommandTree {
    edges: MultiMap<String, String>,
    commands: DashMap<String, CommandDescriptor>,
}

impl CommandTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `descriptor` under `parent`, or at the top level.
    ///
    /// Names are unique within the tree, ignoring case.
    pub fn register(&self, parent: Option<&str>, descriptor: CommandDescriptor) -> Result<(), CommandError> {
        let key = descriptor.name().to_ascii_lowercase();
        let parent_key = parent.map(str::to_ascii_lowercase).unwrap_or_else(|| ROOT.to_string());

        match self.commands.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(CommandError::DuplicateName(descriptor.name().to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                for child in descriptor.children() {
                    self.edges.put_last_unique(key.clone(), child.to_ascii_lowercase());
                }
                slot.insert(descriptor);
            }
        }
        self.edges.put_last_unique(parent_key, key);
        Ok(())
    }

    /// Finds a command by name or alias.
    pub fn resolve(&self, label: &str) -> Option<CommandDescriptor> {
        if let Some(found) = self.commands.get(&label.to_ascii_lowercase()) {
            return Some(found.value().clone());
        }
        self.commands
            .iter()
            .find(|entry| entry.value().matches(label))
            .map(|entry| entry.value().clone())
    }

    /// Registered children of `parent` (top level when `None`), in
    /// registration order. Declared but unregistered children are skipped.
    pub fn children_of(&self, parent: Option<&str>) -> Vec<CommandDescriptor> {
        let parent_key = parent.map(str::to_ascii_lowercase).unwrap_or_else(|| ROOT.to_string());
        self.edges
            .get(&parent_key)
            .iter()
            .filter_map(|name| self.commands.get(name).map(|entry| entry.value().clone()))
            .collect()
    }

    /// Lists the children of `parent` [`COMMAND_PAGE_SIZE`] at a time.
    ///
    /// Page numbers start at 1; out-of-range pages are clamped.
    pub fn help_page(&self, parent: Option<&str>, page: usize) -> HelpPage {
        let names: Vec<String> = self
            .children_of(parent)
            .into_iter()
            .map(|descriptor| descriptor.name().to_string())
            .collect();
        let total_pages = names.len().div_ceil(COMMAND_PAGE_SIZE).max(1);
        let page = page.clamp(1, total_pages);
        let entries = names
            .into_iter()
            .skip((page - 1) * COMMAND_PAGE_SIZE)
            .take(COMMAND_PAGE_SIZE)
            .collect();

        HelpPage {
            page,
            total_pages,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
