//! Concrete candidate files derived from locations.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::data::Loader;
use crate::location::Location;

/// One candidate file for a location: the location itself, the directory it
/// was expanded from (when it was), the root path, an optional profile, an
/// optional extension, and the loader that will decode it.
///
/// With an extension-hint location (`conf[.yaml]`) the extension field stays
/// unset: the hint only selects the loader, the resource keeps its bare
/// name.
#[derive(Clone)]
pub struct Reference {
    location: Location,
    directory: Option<String>,
    root: String,
    profile: Option<String>,
    extension: Option<String>,
    loader: Arc<dyn Loader>,
}

impl Reference {
    /// A candidate produced by directory expansion.
    pub(crate) fn directory_candidate(
        location: &Location,
        directory: &str,
        name: &str,
        profile: Option<&str>,
        extension: &str,
        loader: Arc<dyn Loader>,
    ) -> Reference {
        Reference {
            location: location.clone(),
            directory: Some(directory.to_string()),
            root: format!("{directory}{name}"),
            profile: profile.map(str::to_string),
            extension: Some(extension.to_string()),
            loader,
        }
    }

    /// A candidate naming a file directly.
    pub(crate) fn file(
        location: &Location,
        root: &str,
        profile: Option<&str>,
        extension: Option<&str>,
        loader: Arc<dyn Loader>,
    ) -> Reference {
        Reference {
            location: location.clone(),
            directory: None,
            root: root.to_string(),
            profile: profile.map(str::to_string),
            extension: extension.map(str::to_string),
            loader,
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn directory(&self) -> Option<&str> {
        self.directory.as_deref()
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub(crate) fn loader(&self) -> &Arc<dyn Loader> {
        &self.loader
    }

    /// The concrete resource address this reference names.
    pub fn resource_location(&self) -> String {
        let mut out = self.root.clone();
        if let Some(profile) = &self.profile {
            out.push('-');
            out.push_str(profile);
        }
        if let Some(extension) = &self.extension {
            out.push('.');
            out.push_str(extension);
        }
        out
    }

    /// Whether a missing resource for this reference is silently skipped.
    ///
    /// Optional locations, profile-specific candidates, and directory-search
    /// candidates are all skippable; only an explicitly named mandatory file
    /// is not.
    pub fn is_skippable(&self) -> bool {
        self.location.is_optional() || self.profile.is_some() || self.directory.is_some()
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
            && self.directory == other.directory
            && self.root == other.root
            && self.profile == other.profile
            && self.extension == other.extension
    }
}

impl Eq for Reference {}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
        self.directory.hash(state);
        self.root.hash(state);
        self.profile.hash(state);
        self.extension.hash(state);
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource_location())
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("location", &self.location)
            .field("directory", &self.directory)
            .field("root", &self.root)
            .field("profile", &self.profile)
            .field("extension", &self.extension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::YamlLoader;

    fn yaml() -> Arc<dyn Loader> {
        Arc::new(YamlLoader)
    }

    #[test]
    fn test_directory_candidate_resource_location() {
        let location = Location::of("classpath:/config/");
        let reference = Reference::directory_candidate(
            &location,
            "classpath:/config/",
            "application",
            None,
            "yaml",
            yaml(),
        );
        assert_eq!(reference.resource_location(), "classpath:/config/application.yaml");
        assert!(reference.is_skippable());
    }

    #[test]
    fn test_profile_suffix_comes_before_extension() {
        let location = Location::of("classpath:/");
        let reference = Reference::directory_candidate(
            &location,
            "classpath:/",
            "application",
            Some("dev"),
            "yaml",
            yaml(),
        );
        assert_eq!(reference.resource_location(), "classpath:/application-dev.yaml");
    }

    #[test]
    fn test_extension_hint_keeps_bare_name() {
        let location = Location::of("file:/etc/app/conf[.yaml]");
        let reference = Reference::file(&location, "file:/etc/app/conf", Some("dev"), None, yaml());
        assert_eq!(reference.resource_location(), "file:/etc/app/conf-dev");
    }

    #[test]
    fn test_mandatory_plain_file_is_not_skippable() {
        let location = Location::of("file:./app.yaml");
        let reference = Reference::file(&location, "file:./app", None, Some("yaml"), yaml());
        assert!(!reference.is_skippable());

        let optional = Location::of("optional:file:./app.yaml");
        let reference = Reference::file(&optional, "file:./app", None, Some("yaml"), yaml());
        assert!(reference.is_skippable());
    }

    #[test]
    fn test_equality_ignores_loader_instance() {
        let location = Location::of("file:./app.yaml");
        let a = Reference::file(&location, "file:./app", None, Some("yaml"), yaml());
        let b = Reference::file(&location, "file:./app", None, Some("yaml"), Arc::new(YamlLoader));
        assert_eq!(a, b);
    }
}
