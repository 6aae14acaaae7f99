//! Module prefixes and color markers.
//!
//! A prefix is the short tag in front of every console line a module emits,
//! e.g. `&b[Greeter] `. Color markers (`&` followed by a code character) are
//! kept verbatim; rendering them is the host's job.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::ops::Add;

/// Character introducing a color marker.
pub const COLOR_MARKER: char = '&';

/// A module's message prefix, color markers included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prefix(String);

impl Prefix {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The default prefix for a module: a stable color derived from its
    /// declared name followed by `[name] `.
    pub fn for_module(declared_name: &str) -> Self {
        Self(format!("{}[{}] ", color_hash(declared_name), declared_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the prefix carries any color markers.
    pub fn has_color(&self) -> bool {
        strip_color_markers(&self.0) != self.0
    }

    /// The prefix with color markers removed.
    pub fn plain(&self) -> String {
        strip_color_markers(&self.0)
    }

    /// Prepends this prefix to `message`.
    pub fn render(&self, message: &str) -> String {
        format!("{}{}", self.0, message)
    }

    /// `text@sha1(text)`, handy for telling near-identical prefixes apart in logs.
    pub fn fingerprint(&self) -> String {
        format!("{}@{:x}", self.0, Sha1::digest(self.0.as_bytes()))
    }
}

impl Add<&str> for Prefix {
    type Output = Prefix;

    fn add(self, rhs: &str) -> Prefix {
        Prefix(self.0 + rhs)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Prefix {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Derives a color marker (`&0` to `&9`) from `input`.
///
/// Five hex digits of the SHA-1 of `input` (positions 0, 2, 4, 5, 6) are read
/// as a number, divided by 16, and the leading decimal digit of the result
/// picks the color. The same name always yields the same color.
pub fn color_hash(input: &str) -> String {
    let digest = format!("{:x}", Sha1::digest(input.as_bytes()));
    let picked: String = [0usize, 2, 4, 5, 6]
        .iter()
        .filter_map(|&i| digest.chars().nth(i))
        .collect();
    let value = u32::from_str_radix(&picked, 16).unwrap_or(0) / 16;
    let code = value.to_string().chars().next().unwrap_or('0');
    format!("{COLOR_MARKER}{code}")
}

fn is_color_code(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}

/// Removes `&x` color markers from `text`.
pub fn strip_color_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == COLOR_MARKER {
            if let Some(&next) = chars.peek() {
                if is_color_code(next) {
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hash_is_deterministic() {
        let first = color_hash("Greeter");
        for _ in 0..10 {
            assert_eq!(color_hash("Greeter"), first);
        }
    }

    #[test]
    fn test_color_hash_shape() {
        for name in ["a", "Core", "Greeter", "some-long-module-name", ""] {
            let code = color_hash(name);
            assert_eq!(code.len(), 2);
            assert!(code.starts_with('&'));
            assert!(code.chars().nth(1).unwrap().is_ascii_digit());
        }
    }

    #[test]
    fn test_for_module() {
        let prefix = Prefix::for_module("Greeter");
        assert_eq!(prefix.as_str(), format!("{}[Greeter] ", color_hash("Greeter")));
        assert!(prefix.has_color());
        assert_eq!(prefix.plain(), "[Greeter] ");
    }

    #[test]
    fn test_strip_color_markers() {
        assert_eq!(strip_color_markers("&f[&bCore&f] hi"), "[Core] hi");
        assert_eq!(strip_color_markers("fish & chips"), "fish & chips");
        assert_eq!(strip_color_markers("trailing&"), "trailing&");
        assert_eq!(strip_color_markers("&Prefix"), "&Prefix");
    }

    #[test]
    fn test_prefix_ops() {
        let prefix = Prefix::new("&a[X]") + " ";
        assert_eq!(prefix.as_str(), "&a[X] ");
        assert_eq!(prefix.render("hello"), "&a[X] hello");
        assert!(prefix.fingerprint().starts_with("&a[X] @"));
        assert!(!Prefix::new("[plain] ").has_color());
    }
}
