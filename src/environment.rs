//! The process environment: ordered property sources plus profile state.

use tracing::trace;

use crate::activation::Profiles;
use crate::location::Location;
use crate::properties::PropertySet;
use crate::resource::ConfigResource;

/// Name of the well-known fallback source. It keeps the lowest resolution
/// precedence no matter where it sits in the source list, and the applier
/// moves it to the end of the list.
pub const DEFAULT_PROPERTIES_NAME: &str = "defaultProperties";

/// An ordered list of named property sources together with the active and
/// default profiles.
///
/// Hosts seed it with whatever existed before processing (command-line
/// arguments, system properties, the system environment); the engine
/// appends one source per imported config resource. Resolution is
/// last-wins: a source added later overrides earlier ones, except for the
/// `defaultProperties` source which always resolves last.
#[derive(Debug, Clone)]
pub struct Environment {
    sources: Vec<PropertySet>,
    active_profiles: Vec<String>,
    default_profiles: Vec<String>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Environment {
        Environment {
            sources: Vec::new(),
            active_profiles: Vec::new(),
            default_profiles: vec!["default".to_string()],
        }
    }

    /// Appends a property source the host owns (seed state).
    pub fn add_source(&mut self, set: PropertySet) {
        self.sources.push(set);
    }

    pub fn sources(&self) -> &[PropertySet] {
        &self.sources
    }

    /// Resolves a property across all sources, last match wins, with
    /// `defaultProperties` as the final fallback.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        let mut result = None;
        let mut fallback = None;
        for set in &self.sources {
            if let Some(value) = set.get(key) {
                if set.name() == DEFAULT_PROPERTIES_NAME {
                    fallback = Some(value);
                } else {
                    result = Some(value);
                }
            }
        }
        result.or(fallback)
    }

    pub(crate) fn add_last(&mut self, set: PropertySet) {
        self.sources.push(set);
    }

    pub(crate) fn move_default_to_end(&mut self) {
        if let Some(index) = self
            .sources
            .iter()
            .position(|s| s.name() == DEFAULT_PROPERTIES_NAME)
        {
            let set = self.sources.remove(index);
            self.sources.push(set);
        }
    }

    pub fn active_profiles(&self) -> &[String] {
        &self.active_profiles
    }

    pub fn set_active_profiles(&mut self, profiles: Vec<String>) {
        self.active_profiles = profiles;
    }

    pub fn default_profiles(&self) -> &[String] {
        &self.default_profiles
    }

    pub fn set_default_profiles(&mut self, profiles: Vec<String>) {
        self.default_profiles = profiles;
    }
}

/// Builds a property source from the process environment, named
/// `systemEnvironment`. Keys are kept verbatim so connector keys used for
/// cloud-platform detection stay recognisable. Entries are sorted by key to
/// keep iteration deterministic.
pub fn system_environment_source() -> PropertySet {
    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    vars.sort();
    trace!(count = vars.len(), "creating system environment property source");
    PropertySet::from_entries("systemEnvironment", vars)
}

/// Callback surface for hosts observing environment updates.
pub trait UpdateListener {
    fn on_property_source_added(
        &self,
        _source: &PropertySet,
        _location: Option<&Location>,
        _resource: Option<&ConfigResource>,
    ) {
    }

    fn on_set_profiles(&self, _profiles: &Profiles) {}
}

/// Listener used when the host installs none.
#[derive(Debug, Default)]
pub(crate) struct NoopListener;

impl UpdateListener for NoopListener {}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str, entries: &[(&str, &str)]) -> PropertySet {
        PropertySet::from_entries(name, entries.iter().map(|(k, v)| (*k, *v)))
    }

    #[test]
    fn test_lookup_last_wins() {
        let mut env = Environment::new();
        env.add_source(set("first", &[("foo", "1")]));
        env.add_source(set("second", &[("foo", "2")]));
        assert_eq!(env.lookup("foo"), Some("2"));
    }

    #[test]
    fn test_default_properties_resolve_last() {
        let mut env = Environment::new();
        env.add_source(set(DEFAULT_PROPERTIES_NAME, &[("foo", "default"), ("bar", "d")]));
        env.add_source(set("app", &[("foo", "app")]));
        env.add_last(set("imported", &[("foo", "imported")]));
        assert_eq!(env.lookup("foo"), Some("imported"));
        assert_eq!(env.lookup("bar"), Some("d"));

        // moving the source keeps the fallback rule intact
        env.move_default_to_end();
        assert_eq!(env.sources().last().map(PropertySet::name), Some(DEFAULT_PROPERTIES_NAME));
        assert_eq!(env.lookup("foo"), Some("imported"));
    }

    #[test]
    fn test_default_profiles_start_as_default() {
        let env = Environment::new();
        assert_eq!(env.default_profiles(), &["default".to_string()]);
        assert!(env.active_profiles().is_empty());
    }

    #[test]
    fn test_system_environment_source_is_sorted() {
        let source = system_environment_source();
        assert_eq!(source.name(), "systemEnvironment");
        let keys: Vec<&str> = source.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
