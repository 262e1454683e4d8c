//! Resolves and loads locations, deduplicating resources across a run.

use indexmap::IndexSet;
use tracing::trace;

use crate::activation::ActivationContext;
use crate::data::{ConfigData, DataLoader};
use crate::error::{Error, NotFoundError};
use crate::location::{Location, LocationResolver, ResolverContext};
use crate::resource::ConfigResource;

/// What to do when a mandatory location cannot be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotFoundAction {
    #[default]
    Fail,
    Ignore,
}

impl NotFoundAction {
    pub fn parse(value: &str) -> Result<NotFoundAction, Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(NotFoundAction::Fail),
            "ignore" => Ok(NotFoundAction::Ignore),
            other => Err(Error::InvalidProperty {
                key: "spring.config.on-not-found".to_string(),
                reason: format!("expected 'fail' or 'ignore', got '{other}'"),
            }),
        }
    }

    pub(crate) fn handle(self, error: NotFoundError) -> Result<(), Error> {
        match self {
            NotFoundAction::Fail => Err(error.into()),
            NotFoundAction::Ignore => {
                trace!(error = %error, "ignoring missing config data");
                Ok(())
            }
        }
    }
}

/// One successfully imported resource.
#[derive(Debug, Clone)]
pub struct Imported {
    pub location: Location,
    pub resource: ConfigResource,
    pub profile_specific: bool,
    pub data: ConfigData,
}

/// Imports config data by resolving and loading locations.
///
/// Resources are tracked across the whole run so one file reached through
/// several references or phases loads exactly once. Locations are recorded
/// as loaded or optional-but-absent for the final mandatory-location check.
pub struct Importer {
    resolver: LocationResolver,
    data_loader: DataLoader,
    not_found_action: NotFoundAction,
    loaded: IndexSet<ConfigResource>,
    loaded_locations: IndexSet<Location>,
    optional_locations: IndexSet<Location>,
}

impl Importer {
    pub fn new(resolver: LocationResolver, not_found_action: NotFoundAction) -> Importer {
        Importer {
            resolver,
            data_loader: DataLoader::new(),
            not_found_action,
            loaded: IndexSet::new(),
            loaded_locations: IndexSet::new(),
            optional_locations: IndexSet::new(),
        }
    }

    pub fn not_found_action(&self) -> NotFoundAction {
        self.not_found_action
    }

    pub fn loaded_locations(&self) -> &IndexSet<Location> {
        &self.loaded_locations
    }

    pub fn optional_locations(&self) -> &IndexSet<Location> {
        &self.optional_locations
    }

    /// Resolves and loads the given locations, skipping resources imported
    /// earlier in the run. Results keep declaration order.
    pub fn resolve_and_load(
        &mut self,
        activation: Option<&ActivationContext>,
        ctx: &ResolverContext<'_>,
        locations: &[Location],
    ) -> Result<Vec<Imported>, Error> {
        let mut resolved = Vec::new();
        for location in locations {
            match self.resolve_location(activation, ctx, location) {
                Ok(resources) => resolved.extend(resources),
                Err(Error::NotFound(error)) => {
                    self.not_found_action_for(location, None).handle(error)?;
                }
                Err(error) => return Err(error),
            }
        }
        self.load(resolved)
    }

    fn resolve_location(
        &self,
        activation: Option<&ActivationContext>,
        ctx: &ResolverContext<'_>,
        location: &Location,
    ) -> Result<Vec<ConfigResource>, Error> {
        let mut resolved = self.resolver.resolve(ctx, location)?;
        if let Some(profiles) = activation.and_then(ActivationContext::profiles) {
            resolved.extend(self.resolver.resolve_profile_specific(ctx, location, profiles)?);
        }
        Ok(resolved)
    }

    /// Loads candidates in reverse declaration order, so when one resource
    /// was resolved from several locations the last declaration claims the
    /// load. The returned list is back in declaration order.
    fn load(&mut self, candidates: Vec<ConfigResource>) -> Result<Vec<Imported>, Error> {
        let mut result = Vec::new();
        for candidate in candidates.iter().rev() {
            let location = candidate.location().clone();
            if candidate.is_optional() {
                self.optional_locations.insert(location.clone());
            }
            if self.loaded.contains(candidate) {
                trace!(resource = %candidate, "skipping already imported resource");
                self.loaded_locations.insert(location);
                continue;
            }
            match self.data_loader.load(candidate) {
                Ok(data) => {
                    self.loaded.insert(candidate.clone());
                    self.loaded_locations.insert(location.clone());
                    result.push(Imported {
                        location,
                        profile_specific: candidate.is_profile_specific(),
                        resource: candidate.clone(),
                        data,
                    });
                }
                Err(Error::NotFound(error)) => {
                    self.not_found_action_for(&location, Some(candidate))
                        .handle(error)?;
                }
                Err(error) => return Err(error),
            }
        }
        result.reverse();
        Ok(result)
    }

    fn not_found_action_for(
        &self,
        location: &Location,
        resource: Option<&ConfigResource>,
    ) -> NotFoundAction {
        if location.is_optional() || resource.is_some_and(ConfigResource::is_optional) {
            NotFoundAction::Ignore
        } else {
            self.not_found_action
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Loader, PropertiesLoader, TomlLoader, YamlLoader};
    use crate::properties::Binder;
    use crate::resource::FsResourceLoader;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn importer(base: &std::path::Path, action: NotFoundAction) -> Importer {
        let loaders: Vec<Arc<dyn Loader>> = vec![
            Arc::new(PropertiesLoader),
            Arc::new(YamlLoader),
            Arc::new(TomlLoader),
        ];
        let resolver = LocationResolver::new(
            vec!["application".to_string()],
            loaders,
            Arc::new(FsResourceLoader::new(base)),
        )
        .unwrap();
        Importer::new(resolver, action)
    }

    fn no_binder() -> Binder {
        panic!("import should not need a binder");
    }

    #[test]
    fn test_resource_loads_once_across_calls() {
        let base = TempDir::new().unwrap();
        fs::write(base.path().join("application.yaml"), "foo: 1\n").unwrap();

        let mut importer = importer(base.path(), NotFoundAction::Fail);
        let ctx = ResolverContext::new(None, &no_binder);

        let first = importer
            .resolve_and_load(None, &ctx, &[Location::of("file:./")])
            .unwrap();
        assert_eq!(first.len(), 1);

        // same file through a different location: deduplicated, but the
        // location still counts as loaded
        let second = importer
            .resolve_and_load(None, &ctx, &[Location::of("file:./application.yaml")])
            .unwrap();
        assert!(second.is_empty());
        assert!(importer
            .loaded_locations()
            .contains(&Location::of("file:./application.yaml")));
    }

    #[test]
    fn test_optional_locations_recorded() {
        let base = TempDir::new().unwrap();
        fs::write(base.path().join("application.yaml"), "foo: 1\n").unwrap();

        let mut importer = importer(base.path(), NotFoundAction::Fail);
        let ctx = ResolverContext::new(None, &no_binder);
        importer
            .resolve_and_load(None, &ctx, &[Location::of("optional:file:./")])
            .unwrap();
        assert!(importer
            .optional_locations()
            .contains(&Location::of("file:./")));
    }

    #[test]
    fn test_mandatory_missing_file_fails() {
        let base = TempDir::new().unwrap();
        let mut importer = importer(base.path(), NotFoundAction::Fail);
        let ctx = ResolverContext::new(None, &no_binder);

        let result = importer.resolve_and_load(None, &ctx, &[Location::of("file:./nope.yaml")]);
        assert!(matches!(
            result,
            Err(Error::NotFound(NotFoundError::Resource { .. }))
        ));
    }

    #[test]
    fn test_missing_file_ignored_when_configured() {
        let base = TempDir::new().unwrap();
        let mut importer = importer(base.path(), NotFoundAction::Ignore);
        let ctx = ResolverContext::new(None, &no_binder);

        let result = importer
            .resolve_and_load(None, &ctx, &[Location::of("file:./nope.yaml")])
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_optional_missing_file_ignored_even_with_fail_action() {
        let base = TempDir::new().unwrap();
        let mut importer = importer(base.path(), NotFoundAction::Fail);
        let ctx = ResolverContext::new(None, &no_binder);

        let result = importer
            .resolve_and_load(None, &ctx, &[Location::of("optional:file:./nope.yaml")])
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_results_keep_declaration_order() {
        let base = TempDir::new().unwrap();
        fs::write(base.path().join("a.yaml"), "foo: a\n").unwrap();
        fs::write(base.path().join("b.yaml"), "foo: b\n").unwrap();

        let mut importer = importer(base.path(), NotFoundAction::Fail);
        let ctx = ResolverContext::new(None, &no_binder);
        let imported = importer
            .resolve_and_load(
                None,
                &ctx,
                &[Location::of("file:./a.yaml"), Location::of("file:./b.yaml")],
            )
            .unwrap();
        let values: Vec<&str> = imported
            .iter()
            .map(|i| i.data.property_sets()[0].get("foo").unwrap())
            .collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_not_found_action_parse() {
        assert_eq!(NotFoundAction::parse("FAIL").unwrap(), NotFoundAction::Fail);
        assert_eq!(NotFoundAction::parse("ignore").unwrap(), NotFoundAction::Ignore);
        assert!(NotFoundAction::parse("explode").is_err());
    }
}
