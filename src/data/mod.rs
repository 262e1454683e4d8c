//! Loader output: property sets plus per-set options.

mod importer;
mod loader;

pub use importer::{Imported, Importer, NotFoundAction};
pub use loader::{DataLoader, Loader, PropertiesLoader, TomlLoader, YamlLoader};

use crate::properties::PropertySet;

/// Per-property-set options attached by a loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// The set came from a profile-specific resource.
    pub profile_specific: bool,
    /// `spring.config.import` keys in the set are not followed.
    pub ignore_imports: bool,
    /// The set takes no part in profile deduction.
    pub ignore_profiles: bool,
}

impl Options {
    pub const NONE: Options = Options {
        profile_specific: false,
        ignore_imports: false,
        ignore_profiles: false,
    };

    pub const PROFILE_SPECIFIC: Options = Options {
        profile_specific: true,
        ignore_imports: false,
        ignore_profiles: false,
    };
}

/// How options apply across the property sets of one [`ConfigData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertySourceOptions {
    /// Every set gets the same options.
    Always(Options),
}

impl PropertySourceOptions {
    pub const ALWAYS_NONE: PropertySourceOptions = PropertySourceOptions::Always(Options::NONE);

    pub fn for_set(&self, _index: usize) -> Options {
        match self {
            PropertySourceOptions::Always(options) => *options,
        }
    }
}

/// The decoded content of one resource: zero or more property sets in
/// document order.
#[derive(Debug, Clone)]
pub struct ConfigData {
    property_sets: Vec<PropertySet>,
    options: PropertySourceOptions,
}

impl ConfigData {
    pub fn new(property_sets: Vec<PropertySet>, options: PropertySourceOptions) -> Self {
        Self {
            property_sets,
            options,
        }
    }

    /// The constant result for empty-directory markers.
    pub fn empty() -> Self {
        Self {
            property_sets: Vec::new(),
            options: PropertySourceOptions::ALWAYS_NONE,
        }
    }

    pub fn property_sets(&self) -> &[PropertySet] {
        &self.property_sets
    }

    pub fn options_for(&self, index: usize) -> Options {
        self.options.for_set(index)
    }

    pub fn is_empty(&self) -> bool {
        self.property_sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_data() {
        let data = ConfigData::empty();
        assert!(data.is_empty());
        assert_eq!(data.options_for(0), Options::NONE);
    }

    #[test]
    fn test_always_options_apply_to_every_set() {
        let sets = vec![PropertySet::new("a"), PropertySet::new("b")];
        let data = ConfigData::new(sets, PropertySourceOptions::Always(Options::PROFILE_SPECIFIC));
        assert!(data.options_for(0).profile_specific);
        assert!(data.options_for(1).profile_specific);
    }
}
