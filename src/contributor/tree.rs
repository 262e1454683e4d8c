//! The contributor tree and its fixed-point import processor.

use std::sync::Arc;

use tracing::trace;

use crate::activation::{Activation, ActivationContext, CloudPlatform, ProfileExpression};
use crate::contributor::{Contributor, ContributorProperties, ImportPhase, Iter, Kind};
use crate::data::{Imported, Importer};
use crate::error::Error;
use crate::location::{Location, ResolverContext};
use crate::properties::{Binder, BinderOptions, BinderSource};

/// Imports declared by a property set itself.
pub const IMPORT_PROPERTY: &str = "spring.config.import";
/// Cloud-platform activation predicate.
pub const ON_CLOUD_PLATFORM_PROPERTY: &str = "spring.config.activate.on-cloud-platform";
/// Profile activation predicate.
pub const ON_PROFILE_PROPERTY: &str = "spring.config.activate.on-profile";

/// An immutable tree of contributors rooted at a synthetic `Root` node.
///
/// Every structural update (binding a contributor, splicing children)
/// produces a new tree sharing unmodified branches with the old one.
#[derive(Clone)]
pub struct ContributorTree {
    root: Arc<Contributor>,
}

impl ContributorTree {
    /// Builds the initial tree; the given contributors become the root's
    /// before-activation children.
    pub fn new(contributors: Vec<Arc<Contributor>>) -> ContributorTree {
        ContributorTree {
            root: Contributor::of_root(contributors),
        }
    }

    pub fn root(&self) -> &Arc<Contributor> {
        &self.root
    }

    pub fn iter(&self) -> Iter<'_> {
        self.root.iter()
    }

    /// Runs the import loop to its fixed point for the phase implied by the
    /// activation context and returns the resulting tree.
    ///
    /// Each iteration either upgrades one unbound import (binding its
    /// metadata) or resolves one contributor's declared imports and splices
    /// the results in as children; both steps consume finite state, so the
    /// loop terminates.
    pub fn with_processed_imports(
        &self,
        importer: &mut Importer,
        activation: Option<&ActivationContext>,
    ) -> Result<ContributorTree, Error> {
        let phase = ImportPhase::of(activation);
        match activation {
            Some(context) => trace!(phase = ?phase, context = %context, "processing imports"),
            None => trace!(phase = ?phase, "processing imports without activation context"),
        }
        let mut result = self.clone();
        let mut processed = 0usize;
        loop {
            let Some(contributor) = result.next_to_process(activation, phase) else {
                trace!(processed, "processed imports");
                return Ok(result);
            };
            if contributor.kind() == Kind::UnboundImport {
                let bound = result.bound_properties(&contributor, activation)?;
                result = ContributorTree {
                    root: result.root.with_replacement(&contributor, bound),
                };
                continue;
            }
            let imports = contributor.imports().to_vec();
            trace!(
                imports = ?imports.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "resolving declared imports"
            );
            let tree_for_binder = result.clone();
            let activation_for_binder = activation.cloned();
            let binder_factory =
                move || tree_for_binder.binder(activation_for_binder.as_ref(), BinderOptions::new());
            let ctx = ResolverContext::new(contributor.resource(), &binder_factory);
            let imported = importer.resolve_and_load(activation, &ctx, &imports)?;
            let replacement = contributor.with_children(phase, as_contributors(imported));
            result = ContributorTree {
                root: result.root.with_replacement(&contributor, replacement),
            };
            processed += 1;
        }
    }

    /// The next contributor the loop must handle: the most recently spliced
    /// unbound import first (so later documents bind before earlier ones
    /// reference them), otherwise the first active contributor with
    /// unprocessed imports for the phase.
    fn next_to_process(
        &self,
        activation: Option<&ActivationContext>,
        phase: ImportPhase,
    ) -> Option<Arc<Contributor>> {
        let mut last_unbound = None;
        let mut first_with_imports = None;
        for contributor in self.iter() {
            if contributor.kind() == Kind::UnboundImport {
                last_unbound = Some(Arc::clone(contributor));
            } else if first_with_imports.is_none()
                && contributor.is_active(activation)
                && contributor.has_unprocessed_imports(phase)
            {
                first_with_imports = Some(Arc::clone(contributor));
            }
        }
        last_unbound.or(first_with_imports)
    }

    /// Upgrades an unbound import by binding its `spring.config.*` metadata
    /// from its own property set, with placeholders resolved against the
    /// whole tree.
    fn bound_properties(
        &self,
        contributor: &Arc<Contributor>,
        activation: Option<&ActivationContext>,
    ) -> Result<Arc<Contributor>, Error> {
        let binder = self.binder_for_contributor(contributor, activation, true);
        let mut imports = Vec::new();
        for raw in binder.get_list(IMPORT_PROPERTY)? {
            imports.extend(Location::parse_all(&raw));
        }
        let on_cloud_platform = match binder.get(ON_CLOUD_PLATFORM_PROPERTY)? {
            Some(value) => match CloudPlatform::parse(&value) {
                Some(platform) => Some(platform),
                None => {
                    return Err(Error::InvalidProperty {
                        key: ON_CLOUD_PLATFORM_PROPERTY.to_string(),
                        reason: format!("unknown cloud platform '{value}'"),
                    })
                }
            },
            None => None,
        };
        let mut on_profile = Vec::new();
        for expression in binder.get_list(ON_PROFILE_PROPERTY)? {
            on_profile.push(ProfileExpression::parse(&expression)?);
        }
        if contributor.options().ignore_imports {
            imports.clear();
        }
        let activate = if on_cloud_platform.is_none() && on_profile.is_empty() {
            None
        } else {
            Some(Activation::new(on_cloud_platform, on_profile))
        };
        Ok(contributor.with_bound(ContributorProperties::new(imports, activate)))
    }

    /// A binder over every contributor with properties.
    pub fn binder(&self, activation: Option<&ActivationContext>, options: BinderOptions) -> Binder {
        let mut sources = Vec::new();
        let mut universe = Vec::new();
        for contributor in self.iter() {
            let Some(set) = contributor.property_set() else {
                continue;
            };
            let source = BinderSource {
                set: Arc::clone(set),
                active: contributor.is_active(activation),
                exempt: false,
            };
            let profile_blocked =
                options.skip_profile_ignoring && contributor.options().ignore_profiles;
            if (options.fail_on_inactive || source.active) && !profile_blocked {
                sources.push(source.clone());
            }
            universe.push(source);
        }
        Binder::from_parts(
            sources,
            universe,
            options.fail_on_inactive,
            options.fail_on_inactive,
        )
    }

    /// A binder reading from a single contributor's property set, with
    /// strict placeholder resolution against the whole tree. With
    /// `exempt_target` the contributor being bound does not count as an
    /// inactive source for its own keys.
    pub(crate) fn binder_for_contributor(
        &self,
        target: &Arc<Contributor>,
        activation: Option<&ActivationContext>,
        exempt_target: bool,
    ) -> Binder {
        let mut sources = Vec::new();
        let mut universe = Vec::new();
        for contributor in self.iter() {
            let Some(set) = contributor.property_set() else {
                continue;
            };
            let is_target = Arc::ptr_eq(contributor, target);
            let source = BinderSource {
                set: Arc::clone(set),
                active: contributor.is_active(activation),
                exempt: is_target && exempt_target,
            };
            if is_target {
                sources.push(source.clone());
            }
            universe.push(source);
        }
        Binder::from_parts(sources, universe, true, false)
    }
}

/// Converts an import result into child contributors: one empty-location
/// marker for data with no property sets, otherwise one unbound import per
/// set in document order (so the last set in a file gains the highest
/// precedence after the pre-order walk).
fn as_contributors(imported: Vec<Imported>) -> Vec<Arc<Contributor>> {
    let mut contributors = Vec::new();
    for import in imported {
        let Imported {
            location,
            resource,
            profile_specific,
            data,
        } = import;
        if data.is_empty() {
            contributors.push(Contributor::of_empty_location(location, profile_specific));
        } else {
            for (index, set) in data.property_sets().iter().enumerate() {
                contributors.push(Contributor::of_unbound_import(
                    location.clone(),
                    resource.clone(),
                    profile_specific,
                    set.clone(),
                    data.options_for(index),
                ));
            }
        }
    }
    contributors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Loader, NotFoundAction, PropertiesLoader, TomlLoader, YamlLoader};
    use crate::location::LocationResolver;
    use crate::resource::FsResourceLoader;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn importer(base: &Path) -> Importer {
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
        Importer::new(resolver, NotFoundAction::Fail)
    }

    fn initial_tree(location: &str) -> ContributorTree {
        ContributorTree::new(vec![Contributor::of_initial_import(Location::of(location))])
    }

    fn bound_sets(tree: &ContributorTree) -> Vec<String> {
        tree.iter()
            .filter(|c| c.kind() == Kind::BoundImport)
            .filter_map(|c| c.property_set().map(|s| s.name().to_string()))
            .collect()
    }

    #[test]
    fn test_fixed_point_reached_and_imports_bound() {
        let base = TempDir::new().unwrap();
        fs::write(base.path().join("application.yaml"), "foo: 1\n").unwrap();

        let mut importer = importer(base.path());
        let tree = initial_tree("file:./")
            .with_processed_imports(&mut importer, None)
            .unwrap();

        assert_eq!(bound_sets(&tree).len(), 1);
        // nothing left to process
        assert!(tree
            .next_to_process(None, ImportPhase::BeforeProfileActivation)
            .is_none());
    }

    #[test]
    fn test_recursive_import_spliced_as_child() {
        let base = TempDir::new().unwrap();
        fs::write(
            base.path().join("application.yaml"),
            "spring:\n  config:\n    import: file:./extra.yaml\n",
        )
        .unwrap();
        fs::write(base.path().join("extra.yaml"), "bar: x\n").unwrap();

        let mut importer = importer(base.path());
        let tree = initial_tree("file:./")
            .with_processed_imports(&mut importer, None)
            .unwrap();

        let names = bound_sets(&tree);
        assert_eq!(names.len(), 2);
        assert!(names[0].contains("application.yaml"));
        assert!(names[1].contains("extra.yaml"));

        // the import is a child of the importing contributor
        let application = tree
            .iter()
            .find(|c| {
                c.property_set()
                    .is_some_and(|s| s.name().contains("application.yaml"))
            })
            .cloned()
            .unwrap();
        let children = application
            .children(ImportPhase::BeforeProfileActivation)
            .unwrap();
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn test_empty_location_marker_for_empty_directory() {
        let base = TempDir::new().unwrap();
        fs::create_dir(base.path().join("config")).unwrap();

        let mut importer = importer(base.path());
        let tree = initial_tree("file:./config/")
            .with_processed_imports(&mut importer, None)
            .unwrap();

        assert!(tree.iter().any(|c| c.kind() == Kind::EmptyLocation));
    }

    #[test]
    fn test_multi_document_children_keep_document_order() {
        let base = TempDir::new().unwrap();
        fs::write(base.path().join("application.yaml"), "foo: 1\n---\nfoo: 2\n").unwrap();

        let mut importer = importer(base.path());
        let tree = initial_tree("file:./")
            .with_processed_imports(&mut importer, None)
            .unwrap();

        let names = bound_sets(&tree);
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("(document #0)"));
        assert!(names[1].ends_with("(document #1)"));
    }

    #[test]
    fn test_profile_gated_document_inactive_before_profiles() {
        let base = TempDir::new().unwrap();
        fs::write(
            base.path().join("application.yaml"),
            "foo: 1\n---\nspring:\n  config:\n    activate:\n      on-profile: prod\nfoo: 2\n",
        )
        .unwrap();

        let mut importer = importer(base.path());
        let tree = initial_tree("file:./")
            .with_processed_imports(&mut importer, None)
            .unwrap();

        let gated = tree
            .iter()
            .find(|c| {
                c.property_set()
                    .is_some_and(|s| s.name().ends_with("(document #1)"))
            })
            .cloned()
            .unwrap();
        assert_eq!(gated.kind(), Kind::BoundImport);
        assert!(!gated.is_active(None));
        assert!(!gated.is_active(Some(&ActivationContext::new(None))));
    }

    #[test]
    fn test_ignore_imports_option_clears_imports() {
        let base = TempDir::new().unwrap();
        fs::write(
            base.path().join("application.yaml"),
            "spring:\n  config:\n    import: file:./extra.yaml\n",
        )
        .unwrap();
        fs::write(base.path().join("extra.yaml"), "bar: x\n").unwrap();

        let mut importer = importer(base.path());
        let tree = initial_tree("file:./")
            .with_processed_imports(&mut importer, None)
            .unwrap();
        let unbound = tree
            .iter()
            .find(|c| c.kind() == Kind::BoundImport)
            .cloned()
            .unwrap();

        // rebuild the same set with the ignore-imports option and bind it
        let ignoring = Contributor::of_unbound_import(
            Location::of("file:./"),
            unbound.resource().cloned().unwrap(),
            false,
            (**unbound.property_set().unwrap()).clone(),
            crate::data::Options {
                ignore_imports: true,
                ..crate::data::Options::NONE
            },
        );
        let tree = ContributorTree::new(vec![Arc::clone(&ignoring)]);
        let bound = tree.bound_properties(&ignoring, None).unwrap();
        assert!(bound.imports().is_empty());
    }
}
