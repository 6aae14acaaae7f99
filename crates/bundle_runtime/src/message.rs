//! Console messaging facade.
//!
//! Modules talk to the console through a [`PluginMessage`] bound to their
//! prefix. Templates use positional placeholders (`{0}`, `{1}`, ...) that are
//! substituted before dispatch; color markers pass through untouched and are
//! left to the [`ConsoleSink`] to render.

use crate::current_timestamp_millis;
use crate::prefix::{strip_color_markers, Prefix};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// Message Classification
// ============================================================================

/// Status tag shown in front of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    None,
    Changed,
    Failed,
}

impl MessageStatus {
    /// Color marker and label, or `None` for untagged lines.
    pub fn tag(self) -> Option<(&'static str, &'static str)> {
        match self {
            MessageStatus::None => None,
            MessageStatus::Changed => Some(("&b", "CHANGED")),
            MessageStatus::Failed => Some(("&c", "FAILED")),
        }
    }
}

/// Severity levels with their conventional colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Error,
    Danger,
    Warning,
    Common,
    Message,
    Unknown,
}

impl MessageLevel {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn color(self) -> &'static str {
        match self {
            MessageLevel::Error => "&4",
            MessageLevel::Danger => "&c",
            MessageLevel::Warning => "&e",
            MessageLevel::Common => "&f",
            MessageLevel::Message => "&a",
            MessageLevel::Unknown => "&8",
        }
    }
}

// ============================================================================
// Console Sinks
// ============================================================================

/// One rendered console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    /// Milliseconds since the Unix epoch when the line was emitted.
    pub timestamp_ms: u64,
    pub status: MessageStatus,
    /// Full text including prefix and color markers.
    pub text: String,
}

impl ConsoleLine {
    /// The text with color markers removed.
    pub fn plain(&self) -> String {
        strip_color_markers(&self.text)
    }
}

/// Destination for console lines, provided by the host.
pub trait ConsoleSink: Send + Sync {
    fn emit(&self, line: ConsoleLine);
}

/// Writes console lines to the `tracing` subscriber with markers stripped.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl ConsoleSink for TracingConsole {
    fn emit(&self, line: ConsoleLine) {
        match line.status {
            MessageStatus::Failed => warn!(target: "console", "{}", line.plain()),
            _ => info!(target: "console", "{}", line.plain()),
        }
    }
}

/// Keeps every emitted line in memory.
#[derive(Debug, Default)]
pub struct BufferedConsole {
    lines: Mutex<Vec<ConsoleLine>>,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lines.lock().clone()
    }

    /// Plain text of every line, in emission order.
    pub fn plain_lines(&self) -> Vec<String> {
        self.lines.lock().iter().map(ConsoleLine::plain).collect()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl ConsoleSink for BufferedConsole {
    fn emit(&self, line: ConsoleLine) {
        self.lines.lock().push(line);
    }
}

// ============================================================================
// Plugin Message Facade
// ============================================================================

/// A module's console voice: its prefix, an optional suffix and a sink.
#[derive(Clone)]
pub struct PluginMessage {
    prefix: Prefix,
    suffix: Option<String>,
    sink: Arc<dyn ConsoleSink>,
}

impl PluginMessage {
    pub fn new(prefix: Prefix, sink: Arc<dyn ConsoleSink>) -> Self {
        Self {
            prefix,
            suffix: None,
            sink,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// The same facade bound to a different prefix.
    pub fn with_prefix(&self, prefix: Prefix) -> Self {
        Self {
            prefix,
            suffix: self.suffix.clone(),
            sink: self.sink.clone(),
        }
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    /// Sends an untagged line to the console.
    pub fn send_to_console(&self, template: &str, args: &[&dyn Display]) {
        self.send_status(MessageStatus::None, template, args);
    }

    /// Sends a line carrying a status tag.
    pub fn send_status(&self, status: MessageStatus, template: &str, args: &[&dyn Display]) {
        let line = ConsoleLine {
            timestamp_ms: current_timestamp_millis(),
            status,
            text: self.compose(status, template, args),
        };
        self.sink.emit(line);
    }

    /// Sends a line colored for `level`.
    pub fn send_level(&self, level: MessageLevel, template: &str, args: &[&dyn Display]) {
        let colored = format!("{}{}", level.color(), template);
        let status = if level <= MessageLevel::Danger {
            MessageStatus::Failed
        } else {
            MessageStatus::None
        };
        self.send_status(status, &colored, args);
    }

    fn compose(&self, status: MessageStatus, template: &str, args: &[&dyn Display]) -> String {
        let mut text = String::new();
        if let Some((color, label)) = status.tag() {
            text.push_str(&format!("{color}[{label}] "));
        }
        text.push_str(self.prefix.as_str());
        text.push_str(&fill_placeholders(template, args));
        if let Some(suffix) = &self.suffix {
            text.push_str(suffix);
        }
        text
    }
}

impl std::fmt::Debug for PluginMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginMessage")
            .field("prefix", &self.prefix)
            .field("suffix", &self.suffix)
            .finish_non_exhaustive()
    }
}

/// Substitutes `{n}` placeholders with `args[n]`.
///
/// Indices past the end reuse the last argument. With no arguments the
/// template is returned unchanged. Braces that do not enclose a number are
/// copied through.
pub fn fill_placeholders(template: &str, args: &[&dyn Display]) -> String {
    if args.is_empty() {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let index = after
            .find('}')
            .and_then(|close| after[..close].parse::<usize>().ok().map(|i| (i, close)));
        match index {
            Some((i, close)) => {
                let arg = args[i.min(args.len() - 1)];
                out.push_str(&arg.to_string());
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_placeholders() {
        assert_eq!(fill_placeholders("v{0}", &[&"1.0"]), "v1.0");
        assert_eq!(fill_placeholders("{1} then {0}", &[&"a", &2]), "2 then a");
        assert_eq!(fill_placeholders("{0} {1} {2}", &[&"x", &"y"]), "x y y");
        assert_eq!(fill_placeholders("keep {0}", &[]), "keep {0}");
        assert_eq!(fill_placeholders("{name} {0}", &[&7]), "{name} 7");
        assert_eq!(fill_placeholders("open { brace", &[&7]), "open { brace");
    }

    #[test]
    fn test_status_and_prefix_composition() {
        let console = Arc::new(BufferedConsole::new());
        let message = PluginMessage::new(Prefix::new("&a[Mod] "), console.clone());

        message.send_to_console("&eLoaded {0} handles", &[&3]);
        message.send_status(MessageStatus::Changed, "{0} -> {1}", &[&"a", &"b"]);
        message.send_status(MessageStatus::Failed, "broken", &[]);

        let lines = console.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "&a[Mod] &eLoaded 3 handles");
        assert_eq!(lines[1].text, "&b[CHANGED] &a[Mod] a -> b");
        assert_eq!(lines[2].status, MessageStatus::Failed);
        assert_eq!(console.plain_lines()[2], "[FAILED] [Mod] broken");
    }

    #[test]
    fn test_suffix_and_rebinding() {
        let console = Arc::new(BufferedConsole::new());
        let message = PluginMessage::new(Prefix::new("[A] "), console.clone()).with_suffix(" !");
        let rebound = message.with_prefix(Prefix::new("[B] "));

        message.send_to_console("one", &[]);
        rebound.send_to_console("two", &[]);

        assert_eq!(console.plain_lines(), vec!["[A] one !", "[B] two !"]);
    }

    #[test]
    fn test_levels() {
        let console = Arc::new(BufferedConsole::new());
        let message = PluginMessage::new(Prefix::new(""), console.clone());
        message.send_level(MessageLevel::Error, "bad", &[]);
        message.send_level(MessageLevel::Message, "fine", &[]);

        let lines = console.lines();
        assert_eq!(lines[0].status, MessageStatus::Failed);
        assert!(lines[0].text.contains("&4bad"));
        assert_eq!(lines[1].status, MessageStatus::None);
        assert_eq!(MessageLevel::Unknown.code(), 5);
    }
}
