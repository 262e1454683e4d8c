//! User-facing configuration location addresses.

mod reference;
mod resolver;

pub use reference::Reference;
pub use resolver::{LocationResolver, ResolverContext};

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::properties::{split_escaped, unescape};

/// Prefix marking a location whose absence is not an error.
pub const OPTIONAL_PREFIX: &str = "optional:";

/// A user-supplied address of a configuration source.
///
/// Parsing strips a single leading `optional:` prefix into the `optional`
/// flag. Equality and hashing consider the remaining value only, so
/// `optional:file:./a.yaml` and `file:./a.yaml` name the same location.
#[derive(Debug, Clone)]
pub struct Location {
    value: String,
    optional: bool,
}

impl Location {
    /// Parses a single location string.
    pub fn of(value: &str) -> Location {
        let trimmed = value.trim();
        let (optional, rest) = match trimmed.strip_prefix(OPTIONAL_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        Location {
            value: unescape(rest, &[',']),
            optional,
        }
    }

    /// Splits a location list on `;` and unescaped `,` and parses each piece.
    pub fn parse_all(value: &str) -> Vec<Location> {
        split_escaped(value, &[';', ','])
            .iter()
            .map(|piece| Location::of(piece))
            .collect()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Directory locations end with `/` (or the OS separator).
    pub fn is_directory(&self) -> bool {
        self.value.ends_with('/') || self.value.ends_with(std::path::MAIN_SEPARATOR)
    }

    /// Absolute locations start with `/` or carry a URL-style prefix.
    pub fn is_absolute(&self) -> bool {
        self.value.starts_with('/') || has_url_prefix(&self.value)
    }

    pub fn is_pattern(&self) -> bool {
        self.value.contains('*')
    }

    /// The value with the given prefix removed, if present.
    pub fn non_prefixed<'a>(&'a self, prefix: &str) -> &'a str {
        self.value.strip_prefix(prefix).unwrap_or(&self.value)
    }
}

/// True for values matching `^[A-Za-z][A-Za-z0-9*]*:`.
pub(crate) fn has_url_prefix(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    for ch in chars {
        if ch == ':' {
            return true;
        }
        if !ch.is_ascii_alphanumeric() && ch != '*' {
            return false;
        }
    }
    false
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "{OPTIONAL_PREFIX}{}", self.value)
        } else {
            f.write_str(&self.value)
        }
    }
}
