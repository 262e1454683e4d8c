//! Turns locations into concrete resources.

use std::cell::OnceCell;
use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::trace;

use crate::activation::Profiles;
use crate::data::Loader;
use crate::error::{Error, NotFoundError};
use crate::location::{has_url_prefix, Location, Reference};
use crate::properties::Binder;
use crate::resource::{ConfigResource, ResourceKind, ResourceLoader};

/// Prefix accepted (and ignored) in front of plain resource locations.
const RESOURCE_PREFIX: &str = "resource:";

/// Context a location is resolved in: the contributor's own resource (for
/// relative locations) and a binder over the whole tree, materialised only
/// when a resolution actually needs it.
pub struct ResolverContext<'a> {
    parent: Option<&'a ConfigResource>,
    binder_factory: &'a dyn Fn() -> Binder,
    binder: OnceCell<Binder>,
}

impl<'a> ResolverContext<'a> {
    pub fn new(
        parent: Option<&'a ConfigResource>,
        binder_factory: &'a dyn Fn() -> Binder,
    ) -> ResolverContext<'a> {
        ResolverContext {
            parent,
            binder_factory,
            binder: OnceCell::new(),
        }
    }

    pub fn parent(&self) -> Option<&ConfigResource> {
        self.parent
    }

    pub fn binder(&self) -> &Binder {
        self.binder.get_or_init(|| (self.binder_factory)())
    }
}

/// Resolves locations to resources by expanding directories into candidate
/// references and consulting the [`ResourceLoader`].
pub struct LocationResolver {
    config_names: Vec<String>,
    loaders: Vec<Arc<dyn Loader>>,
    resource_loader: Arc<dyn ResourceLoader>,
}

impl LocationResolver {
    pub fn new(
        config_names: Vec<String>,
        loaders: Vec<Arc<dyn Loader>>,
        resource_loader: Arc<dyn ResourceLoader>,
    ) -> Result<LocationResolver, Error> {
        for name in &config_names {
            if name.contains('*') {
                return Err(Error::InvalidConfigName(name.clone()));
            }
        }
        Ok(LocationResolver {
            config_names,
            loaders,
            resource_loader,
        })
    }

    /// Resolves a location without profile-specific candidates.
    pub fn resolve(
        &self,
        ctx: &ResolverContext<'_>,
        location: &Location,
    ) -> Result<Vec<ConfigResource>, Error> {
        let references = self.references(ctx, location, None)?;
        self.resolve_references(&references)
    }

    /// Resolves the profile-specific candidates of a location, one set of
    /// references per accepted profile.
    pub fn resolve_profile_specific(
        &self,
        ctx: &ResolverContext<'_>,
        location: &Location,
        profiles: &Profiles,
    ) -> Result<Vec<ConfigResource>, Error> {
        let mut references = Vec::new();
        for profile in profiles.accepted() {
            references.extend(self.references(ctx, location, Some(profile))?);
        }
        self.resolve_references(&references)
    }

    fn references(
        &self,
        ctx: &ResolverContext<'_>,
        location: &Location,
        profile: Option<&str>,
    ) -> Result<Vec<Reference>, Error> {
        let resource_location = self.resource_location(ctx, location);
        if is_directory(&resource_location) {
            Ok(self.references_for_directory(location, &resource_location, profile))
        } else {
            self.references_for_file(location, &resource_location, profile)
        }
    }

    /// The address to actually look up: absolute locations pass through,
    /// relative ones are anchored at the parent resource's directory.
    fn resource_location(&self, ctx: &ResolverContext<'_>, location: &Location) -> String {
        let value = location.non_prefixed(RESOURCE_PREFIX);
        if value.starts_with('/') || has_url_prefix(value) {
            return value.to_string();
        }
        if let Some(parent) = ctx.parent() {
            let parent_location = parent.reference().resource_location();
            if let Some(index) = parent_location.rfind('/') {
                return format!("{}{}", &parent_location[..=index], value);
            }
        }
        value.to_string()
    }

    /// One candidate per config-name x loader-extension, inserted
    /// loader-preference-reversed via `push_front` so the first configured
    /// loader ends up with the highest precedence after resolution.
    fn references_for_directory(
        &self,
        location: &Location,
        directory: &str,
        profile: Option<&str>,
    ) -> Vec<Reference> {
        let mut references = Vec::new();
        for name in &self.config_names {
            let mut candidates: VecDeque<Reference> = VecDeque::new();
            for loader in &self.loaders {
                for extension in loader.extensions() {
                    let reference = Reference::directory_candidate(
                        location,
                        directory,
                        name,
                        profile,
                        extension,
                        Arc::clone(loader),
                    );
                    if !candidates.contains(&reference) {
                        candidates.push_front(reference);
                    }
                }
            }
            references.extend(candidates);
        }
        references
    }

    fn references_for_file(
        &self,
        location: &Location,
        file: &str,
        profile: Option<&str>,
    ) -> Result<Vec<Reference>, Error> {
        let (file, hinted) = match parse_extension_hint(file) {
            Some((base, extension)) => (format!("{base}.{extension}"), true),
            None => (file.to_string(), false),
        };
        for loader in &self.loaders {
            for extension in loader.extensions() {
                if ends_with_extension(&file, extension) {
                    let root = &file[..file.len() - extension.len() - 1];
                    let reference = Reference::file(
                        location,
                        root,
                        profile,
                        if hinted { None } else { Some(extension) },
                        Arc::clone(loader),
                    );
                    return Ok(vec![reference]);
                }
            }
        }
        Err(Error::InvalidLocation {
            location: location.to_string(),
            reason: "file extension is not known to any property source loader; \
                     a directory location must end in '/'"
                .to_string(),
        })
    }

    fn resolve_references(
        &self,
        references: &[Reference],
    ) -> Result<Vec<ConfigResource>, Error> {
        let mut resolved = Vec::new();
        for reference in references {
            resolved.extend(self.resolve_reference(reference)?);
        }
        if resolved.is_empty() {
            resolved.extend(self.resolve_empty_directories(references)?);
        }
        Ok(resolved)
    }

    fn resolve_reference(&self, reference: &Reference) -> Result<Vec<ConfigResource>, Error> {
        let target = reference.resource_location();
        if self.resource_loader.is_pattern(&target) {
            let mut resolved = Vec::new();
            for raw in self.resource_loader.get_resources(&target, ResourceKind::File)? {
                if !raw.exists() && reference.is_skippable() {
                    trace!(reference = %reference, "skipping missing resource");
                } else {
                    resolved.push(ConfigResource::new(reference.clone(), raw));
                }
            }
            Ok(resolved)
        } else {
            let raw = self.resource_loader.get_resource(&target)?;
            if !raw.exists() && reference.is_skippable() {
                trace!(reference = %reference, "skipping missing resource");
                return Ok(Vec::new());
            }
            Ok(vec![ConfigResource::new(reference.clone(), raw)])
        }
    }

    /// Marker resources for directories that exist but hold no recognised
    /// files. Classpath directories and absent directories produce nothing;
    /// a mandatory pattern directory with no subdirectories is an error.
    fn resolve_empty_directories(
        &self,
        references: &[Reference],
    ) -> Result<Vec<ConfigResource>, Error> {
        let mut empty: IndexSet<ConfigResource> = IndexSet::new();
        for reference in references {
            let Some(directory) = reference.directory() else {
                continue;
            };
            if self.resource_loader.is_pattern(directory) {
                let subdirectories = self
                    .resource_loader
                    .get_resources(directory, ResourceKind::Directory)?;
                let location = reference.location();
                if !location.is_optional() && subdirectories.is_empty() {
                    return Err(NotFoundError::Location {
                        location: location.to_string(),
                        reason: "contains no subdirectories".to_string(),
                    }
                    .into());
                }
                for raw in subdirectories {
                    if raw.exists() {
                        empty.insert(ConfigResource::empty_directory(reference.clone(), raw));
                    }
                }
            } else {
                let raw = self.resource_loader.get_resource(directory)?;
                if raw.is_classpath() || !raw.exists() {
                    continue;
                }
                empty.insert(ConfigResource::empty_directory(reference.clone(), raw));
            }
        }
        Ok(empty.into_iter().collect())
    }
}

fn is_directory(resource_location: &str) -> bool {
    resource_location.ends_with('/') || resource_location.ends_with(std::path::MAIN_SEPARATOR)
}

fn ends_with_extension(file: &str, extension: &str) -> bool {
    let suffix = format!(".{extension}");
    file.len() > suffix.len()
        && file
            .get(file.len() - suffix.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(&suffix))
}

/// Parses `name[.ext]` into `(name, ext)`.
fn parse_extension_hint(file: &str) -> Option<(&str, &str)> {
    let stripped = file.strip_suffix(']')?;
    let index = stripped.rfind("[.")?;
    let extension = &stripped[index + 2..];
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((&file[..index], extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PropertiesLoader, TomlLoader, YamlLoader};
    use crate::resource::FsResourceLoader;
    use std::fs;
    use tempfile::TempDir;

    fn default_loaders() -> Vec<Arc<dyn Loader>> {
        vec![
            Arc::new(PropertiesLoader),
            Arc::new(YamlLoader),
            Arc::new(TomlLoader),
        ]
    }

    fn resolver(resource_loader: FsResourceLoader) -> LocationResolver {
        LocationResolver::new(
            vec!["application".to_string()],
            default_loaders(),
            Arc::new(resource_loader),
        )
        .unwrap()
    }

    fn no_binder() -> Binder {
        panic!("resolution should not need a binder");
    }

    fn ctx<'a>() -> ResolverContext<'a> {
        ResolverContext::new(None, &no_binder)
    }

    #[test]
    fn test_config_name_with_wildcard_is_rejected() {
        let result = LocationResolver::new(
            vec!["app*".to_string()],
            default_loaders(),
            Arc::new(FsResourceLoader::new(".")),
        );
        assert!(matches!(result, Err(Error::InvalidConfigName(_))));
    }

    #[test]
    fn test_directory_resolution_finds_existing_candidates() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("application.yaml"), "foo: 1\n").unwrap();

        let resolver = resolver(FsResourceLoader::new(".").with_classpath_root(root.path()));
        let resolved = resolver.resolve(&ctx(), &Location::of("classpath:/")).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].to_string(), "class path resource [application.yaml]");
    }

    #[test]
    fn test_first_loader_resolves_last_for_highest_precedence() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("application.properties"), "foo=props\n").unwrap();
        fs::write(root.path().join("application.yaml"), "foo: yaml\n").unwrap();

        let resolver = resolver(FsResourceLoader::new(".").with_classpath_root(root.path()));
        let resolved = resolver.resolve(&ctx(), &Location::of("classpath:/")).unwrap();
        let names: Vec<String> = resolved.iter().map(ConfigResource::to_string).collect();
        assert_eq!(
            names,
            vec![
                "class path resource [application.yaml]",
                "class path resource [application.properties]",
            ]
        );
    }

    #[test]
    fn test_missing_optional_directory_resolves_to_nothing() {
        let resolver = resolver(FsResourceLoader::new("/does/not/exist"));
        let resolved = resolver
            .resolve(&ctx(), &Location::of("optional:file:./missing/"))
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_existing_empty_directory_yields_marker() {
        let base = TempDir::new().unwrap();
        fs::create_dir(base.path().join("config")).unwrap();

        let resolver = resolver(FsResourceLoader::new(base.path()));
        let resolved = resolver
            .resolve(&ctx(), &Location::of("file:./config/"))
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].is_empty_directory());
    }

    #[test]
    fn test_mandatory_pattern_directory_without_subdirectories_fails() {
        let base = TempDir::new().unwrap();
        fs::create_dir(base.path().join("config")).unwrap();

        let resolver = resolver(FsResourceLoader::new(base.path()));
        let result = resolver.resolve(&ctx(), &Location::of("file:./config/*/"));
        assert!(matches!(
            result,
            Err(Error::NotFound(NotFoundError::Location { .. }))
        ));
    }

    #[test]
    fn test_file_location_unknown_extension_fails() {
        let resolver = resolver(FsResourceLoader::new("."));
        let result = resolver.resolve(&ctx(), &Location::of("file:./application.conf"));
        assert!(matches!(result, Err(Error::InvalidLocation { .. })));
    }

    #[test]
    fn test_extension_hint_selects_loader_and_keeps_bare_name() {
        let base = TempDir::new().unwrap();
        fs::write(base.path().join("conf"), "foo: 1\n").unwrap();

        let resolver = resolver(FsResourceLoader::new(base.path()));
        let resolved = resolver
            .resolve(&ctx(), &Location::of("file:./conf[.yaml]"))
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].reference().resource_location(), "file:./conf");
        assert_eq!(resolved[0].reference().extension(), None);
    }

    #[test]
    fn test_relative_location_resolves_against_parent_directory() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("config")).unwrap();
        fs::write(root.path().join("config/application.yaml"), "foo: 1\n").unwrap();
        fs::write(root.path().join("config/extra.yaml"), "bar: 2\n").unwrap();

        let resolver = resolver(FsResourceLoader::new(".").with_classpath_root(root.path()));
        let parents = resolver
            .resolve(&ctx(), &Location::of("classpath:/config/"))
            .unwrap();
        let parent = &parents[0];

        let context = ResolverContext::new(Some(parent), &no_binder);
        let resolved = resolver
            .resolve(&context, &Location::of("extra.yaml"))
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].to_string(), "class path resource [config/extra.yaml]");
    }

    #[test]
    fn test_pattern_location_resolves_files_in_sorted_subdirectories() {
        let base = TempDir::new().unwrap();
        fs::create_dir_all(base.path().join("config/b")).unwrap();
        fs::create_dir_all(base.path().join("config/a")).unwrap();
        fs::write(base.path().join("config/b/application.yaml"), "foo: b\n").unwrap();
        fs::write(base.path().join("config/a/application.yaml"), "foo: a\n").unwrap();

        let resolver = resolver(FsResourceLoader::new(base.path()));
        let resolved = resolver
            .resolve(&ctx(), &Location::of("file:./config/*/"))
            .unwrap();
        let names: Vec<String> = resolved.iter().map(ConfigResource::to_string).collect();
        assert_eq!(
            names,
            vec![
                "file [./config/a/application.yaml]",
                "file [./config/b/application.yaml]",
            ]
        );
    }
}
