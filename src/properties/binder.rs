//! String-property binding over ordered property sources.

use std::sync::Arc;

use indexmap::IndexSet;

use crate::environment::{Environment, DEFAULT_PROPERTIES_NAME};
use crate::error::Error;
use crate::properties::{split_escaped, PropertySet};

const MAX_PLACEHOLDER_DEPTH: usize = 16;

/// One property set as the binder sees it.
#[derive(Debug, Clone)]
pub(crate) struct BinderSource {
    pub(crate) set: Arc<PropertySet>,
    /// Whether the owning contributor passes its activation predicate.
    pub(crate) active: bool,
    /// The contributor currently being bound never fails the inactive
    /// check against itself.
    pub(crate) exempt: bool,
}

impl BinderSource {
    fn is_default(&self) -> bool {
        self.set.name() == DEFAULT_PROPERTIES_NAME
    }
}

/// Options for binders built over a contributor tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinderOptions {
    pub(crate) fail_on_inactive: bool,
    pub(crate) skip_profile_ignoring: bool,
}

impl BinderOptions {
    pub fn new() -> BinderOptions {
        BinderOptions::default()
    }

    /// Fail any bind that touches a key declared by an inactive source.
    #[must_use]
    pub fn fail_on_inactive(mut self) -> BinderOptions {
        self.fail_on_inactive = true;
        self
    }

    /// Leave out sources whose config data opted out of profile deduction.
    #[must_use]
    pub fn skip_profile_ignoring(mut self) -> BinderOptions {
        self.skip_profile_ignoring = true;
        self
    }
}

/// Resolves string properties against an ordered list of property sources.
///
/// Precedence follows source order with later sources overriding earlier
/// ones; the well-known `defaultProperties` source always resolves last.
/// `${key}` and `${key:default}` placeholders are resolved against the full
/// source universe, and `$$` escapes a literal `$`.
#[derive(Clone)]
pub struct Binder {
    /// Sources consulted for lookups, in precedence order.
    sources: Vec<BinderSource>,
    /// Every source with properties, used for placeholder resolution and
    /// the inactive-access check.
    universe: Vec<BinderSource>,
    /// Placeholders touching an inactive source fail instead of skipping it.
    strict_placeholders: bool,
    /// Successful lookups fail when any inactive source declares the key.
    check_inactive_keys: bool,
}

impl Binder {
    pub(crate) fn from_parts(
        sources: Vec<BinderSource>,
        universe: Vec<BinderSource>,
        strict_placeholders: bool,
        check_inactive_keys: bool,
    ) -> Binder {
        Binder {
            sources,
            universe,
            strict_placeholders,
            check_inactive_keys,
        }
    }

    /// A binder over a plain environment, before any contributor exists.
    pub fn of_environment(environment: &Environment) -> Binder {
        let sources: Vec<BinderSource> = environment
            .sources()
            .iter()
            .map(|set| BinderSource {
                set: Arc::new(set.clone()),
                active: true,
                exempt: false,
            })
            .collect();
        Binder {
            universe: sources.clone(),
            sources,
            strict_placeholders: false,
            check_inactive_keys: false,
        }
    }

    /// Looks up a single property, resolving placeholders in its value.
    pub fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut result: Option<&str> = None;
        let mut fallback: Option<&str> = None;
        for source in &self.sources {
            if let Some(value) = source.set.get(key) {
                if source.is_default() {
                    fallback = Some(value);
                } else {
                    result = Some(value);
                }
            }
        }
        let Some(value) = result.or(fallback) else {
            return Ok(None);
        };
        self.check_inactive(&[key])?;
        Ok(Some(self.resolve_placeholders(value)?))
    }

    /// Looks up a list property: either a comma-separated scalar or
    /// `key[0]`, `key[1]`, ... indexed entries, whichever the winning
    /// source declares.
    pub fn get_list(&self, key: &str) -> Result<Vec<String>, Error> {
        let indexed = format!("{key}[0]");
        let mut winner: Option<&BinderSource> = None;
        let mut fallback: Option<&BinderSource> = None;
        for source in &self.sources {
            if source.set.contains(key) || source.set.contains(&indexed) {
                if source.is_default() {
                    fallback = Some(source);
                } else {
                    winner = Some(source);
                }
            }
        }
        let Some(source) = winner.or(fallback) else {
            return Ok(Vec::new());
        };
        self.check_inactive(&[key, &indexed])?;
        let mut items = Vec::new();
        if let Some(value) = source.set.get(key) {
            for piece in split_escaped(value, &[',']) {
                items.push(self.resolve_placeholders(piece.trim())?);
            }
        } else {
            let mut index = 0;
            while let Some(value) = source.set.get(&format!("{key}[{index}]")) {
                items.push(self.resolve_placeholders(value.trim())?);
                index += 1;
            }
        }
        Ok(items)
    }

    /// Containment across every known source, active or not. Used for
    /// detection-style checks that must not trip the inactive rule.
    pub fn contains(&self, key: &str) -> bool {
        self.universe.iter().any(|source| source.set.contains(key))
    }

    /// All lookup-visible keys starting with `prefix`, in source order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: IndexSet<String> = IndexSet::new();
        for source in &self.sources {
            for key in source.set.keys() {
                if key.starts_with(prefix) {
                    keys.insert(key.to_string());
                }
            }
        }
        keys.into_iter().collect()
    }

    /// Resolves `${...}` references in a value against the source universe.
    pub fn resolve_placeholders(&self, value: &str) -> Result<String, Error> {
        self.resolve_nested(value, 0)
    }

    fn resolve_nested(&self, value: &str, depth: usize) -> Result<String, Error> {
        if depth > MAX_PLACEHOLDER_DEPTH {
            return Err(Error::CircularPlaceholder(value.to_string()));
        }
        let mut out = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch != '$' {
                out.push(ch);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some('{') => {
                    chars.next();
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(Error::UnclosedPlaceholder(value.to_string()));
                    }
                    let (key, default) = match inner.find(':') {
                        Some(i) => (&inner[..i], Some(&inner[i + 1..])),
                        None => (inner.as_str(), None),
                    };
                    let replacement = match self.placeholder_value(key)? {
                        Some(found) => self.resolve_nested(&found, depth + 1)?,
                        None => match default {
                            Some(default) => self.resolve_nested(default, depth + 1)?,
                            None => return Err(Error::PlaceholderNotFound(key.to_string())),
                        },
                    };
                    out.push_str(&replacement);
                }
                _ => out.push('$'),
            }
        }
        Ok(out)
    }

    /// A placeholder resolves from active (or exempt) sources only; finding
    /// the key in an inactive source is an error when the binder is strict,
    /// and silently skipped otherwise.
    fn placeholder_value(&self, key: &str) -> Result<Option<String>, Error> {
        let mut result: Option<&str> = None;
        let mut fallback: Option<&str> = None;
        for source in &self.universe {
            if let Some(value) = source.set.get(key) {
                if !source.active && !source.exempt {
                    if self.strict_placeholders {
                        return Err(Error::InactiveAccess {
                            key: key.to_string(),
                            source_name: source.set.name().to_string(),
                        });
                    }
                    continue;
                }
                if source.is_default() {
                    fallback = Some(value);
                } else {
                    result = Some(value);
                }
            }
        }
        Ok(result.or(fallback).map(str::to_string))
    }

    fn check_inactive(&self, keys: &[&str]) -> Result<(), Error> {
        if !self.check_inactive_keys {
            return Ok(());
        }
        for source in &self.universe {
            if source.active || source.exempt {
                continue;
            }
            for key in keys {
                if source.set.contains(key) {
                    return Err(Error::InactiveAccess {
                        key: key.to_string(),
                        source_name: source.set.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, entries: &[(&str, &str)], active: bool) -> BinderSource {
        BinderSource {
            set: Arc::new(PropertySet::from_entries(
                name,
                entries.iter().map(|(k, v)| (*k, *v)),
            )),
            active,
            exempt: false,
        }
    }

    fn binder(sources: Vec<BinderSource>, strict: bool) -> Binder {
        Binder::from_parts(sources.clone(), sources, strict, strict)
    }

    #[test]
    fn test_later_source_wins() {
        let b = binder(
            vec![
                source("first", &[("foo", "1")], true),
                source("second", &[("foo", "2")], true),
            ],
            false,
        );
        assert_eq!(b.get("foo").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_default_properties_always_lose() {
        let b = binder(
            vec![
                source("app", &[("foo", "app")], true),
                source(DEFAULT_PROPERTIES_NAME, &[("foo", "default"), ("only", "d")], true),
            ],
            false,
        );
        assert_eq!(b.get("foo").unwrap(), Some("app".to_string()));
        assert_eq!(b.get("only").unwrap(), Some("d".to_string()));
    }

    #[test]
    fn test_get_list_comma_separated_and_indexed() {
        let b = binder(
            vec![source(
                "app",
                &[("scalar", "a, b ,c"), ("indexed[0]", "x"), ("indexed[1]", "y")],
                true,
            )],
            false,
        );
        assert_eq!(b.get_list("scalar").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(b.get_list("indexed").unwrap(), vec!["x", "y"]);
        assert!(b.get_list("missing").unwrap().is_empty());
    }

    #[test]
    fn test_get_list_reads_winning_source_only() {
        let b = binder(
            vec![
                source("first", &[("list", "a,b")], true),
                source("second", &[("list[0]", "z")], true),
            ],
            false,
        );
        assert_eq!(b.get_list("list").unwrap(), vec!["z"]);
    }

    #[test]
    fn test_placeholder_resolution() {
        let b = binder(
            vec![source(
                "app",
                &[("host", "localhost"), ("port", "8080"), ("url", "http://${host}:${port}/")],
                true,
            )],
            false,
        );
        assert_eq!(
            b.get("url").unwrap(),
            Some("http://localhost:8080/".to_string())
        );
    }

    #[test]
    fn test_placeholder_default_and_escape() {
        let b = binder(
            vec![source("app", &[("a", "${missing:fallback}"), ("b", "$${literal}")], true)],
            false,
        );
        assert_eq!(b.get("a").unwrap(), Some("fallback".to_string()));
        assert_eq!(b.get("b").unwrap(), Some("${literal}".to_string()));
    }

    #[test]
    fn test_placeholder_missing_without_default_fails() {
        let b = binder(vec![source("app", &[("a", "${missing}")], true)], false);
        assert!(matches!(b.get("a"), Err(Error::PlaceholderNotFound(_))));
    }

    #[test]
    fn test_placeholder_cycle_detected() {
        let b = binder(
            vec![source("app", &[("a", "${b}"), ("b", "${a}")], true)],
            false,
        );
        assert!(matches!(b.get("a"), Err(Error::CircularPlaceholder(_))));
    }

    #[test]
    fn test_unclosed_placeholder() {
        let b = binder(vec![source("app", &[("a", "${open")], true)], false);
        assert!(matches!(b.get("a"), Err(Error::UnclosedPlaceholder(_))));
    }

    #[test]
    fn test_strict_binder_fails_on_inactive_declaration() {
        let b = binder(
            vec![
                source("active", &[("key", "1")], true),
                source("gated", &[("key", "2")], false),
            ],
            true,
        );
        assert!(matches!(b.get("key"), Err(Error::InactiveAccess { .. })));
    }

    #[test]
    fn test_lenient_binder_skips_inactive_placeholder_sources() {
        let sources = vec![
            source("active", &[("url", "${host}")], true),
            source("gated", &[("host", "gated-host")], false),
        ];
        // lenient: the gated value is invisible, so resolution fails over
        // to nothing and errors as missing
        let lenient = Binder::from_parts(vec![sources[0].clone()], sources.clone(), false, false);
        assert!(matches!(lenient.get("url"), Err(Error::PlaceholderNotFound(_))));

        // strict: touching the gated key is the error itself
        let strict = Binder::from_parts(vec![sources[0].clone()], sources, true, false);
        assert!(matches!(strict.get("url"), Err(Error::InactiveAccess { .. })));
    }

    #[test]
    fn test_exempt_source_is_readable_while_inactive() {
        let mut gated = source("self", &[("key", "v")], false);
        gated.exempt = true;
        let b = binder(vec![gated], true);
        assert_eq!(b.get("key").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_keys_with_prefix_in_order() {
        let b = binder(
            vec![
                source("a", &[("spring.profiles.group.one", "x"), ("other", "y")], true),
                source("b", &[("spring.profiles.group.two[0]", "z")], true),
            ],
            false,
        );
        assert_eq!(
            b.keys_with_prefix("spring.profiles.group."),
            vec![
                "spring.profiles.group.one".to_string(),
                "spring.profiles.group.two[0]".to_string()
            ]
        );
    }
}
