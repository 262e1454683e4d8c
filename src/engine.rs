//! The three-phase processing pipeline over the contributor tree.

use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{debug, trace, warn};

use crate::activation::{
    ActivationContext, CloudPlatform, Profiles, ACTIVE_PROFILES_PROPERTY,
    DEFAULT_PROFILES_PROPERTY, INCLUDE_PROFILES_PROPERTY,
};
use crate::bootstrap::{BootstrapContext, Scope};
use crate::contributor::{Contributor, ContributorTree, Kind, IMPORT_PROPERTY, ON_PROFILE_PROPERTY};
use crate::data::{
    Importer, Loader, NotFoundAction, PropertiesLoader, TomlLoader, YamlLoader,
};
use crate::environment::{Environment, NoopListener, UpdateListener, DEFAULT_PROPERTIES_NAME};
use crate::error::{Error, NotFoundError};
use crate::location::{Location, LocationResolver};
use crate::properties::{Binder, BinderOptions};
use crate::resource::{FsResourceLoader, ResourceLoader};

/// Overrides the default search path entirely.
pub const LOCATION_PROPERTY: &str = "spring.config.location";
/// Locations searched in addition to (and overriding) the search path.
pub const ADDITIONAL_LOCATION_PROPERTY: &str = "spring.config.additional-location";
/// Base names used when expanding directory locations.
pub const CONFIG_NAME_PROPERTY: &str = "spring.config.name";
/// `fail` (default) or `ignore` for mandatory locations that are absent.
pub const ON_NOT_FOUND_PROPERTY: &str = "spring.config.on-not-found";
/// Legacy opt-out flag; setting it aborts processing.
pub const USE_LEGACY_PROCESSING_PROPERTY: &str = "spring.config.use-legacy-processing";

/// Search locations used when `spring.config.location` is not set.
pub const DEFAULT_SEARCH_LOCATIONS: &str = "optional:classpath:/;optional:classpath:/config/;\
     optional:file:./;optional:file:./config/;optional:file:./config/*/";

const DEFAULT_CONFIG_NAME: &str = "application";

/// Keys that may not appear inside a profile-specific property source.
const PROFILE_SPECIFIC_INVALID_KEYS: [&str; 4] = [
    ACTIVE_PROFILES_PROPERTY,
    DEFAULT_PROFILES_PROPERTY,
    INCLUDE_PROFILES_PROPERTY,
    ON_PROFILE_PROPERTY,
];

const DEPRECATED_PROFILES_KEY: &str = "spring.profiles";

/// The bootstrap configuration engine.
///
/// Expands the environment's initial locations into property sources across
/// three activation phases (initial, cloud platform, profiles) and applies
/// the result back onto the environment.
///
/// ## Example
///
/// ```no_run
/// use kindling::{Engine, Environment};
///
/// let mut environment = Environment::new();
/// let engine = Engine::builder().build();
/// engine.process_and_apply(&mut environment)?;
/// # Ok::<(), kindling::Error>(())
/// ```
pub struct Engine {
    resource_loader: Arc<dyn ResourceLoader>,
    loaders: Vec<Arc<dyn Loader>>,
    additional_profiles: Vec<String>,
    listener: Box<dyn UpdateListener>,
    bootstrap: BootstrapContext,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The registry collaborators are published into while processing.
    pub fn bootstrap_context(&self) -> &BootstrapContext {
        &self.bootstrap
    }

    /// Processes all contributions and applies the imported property
    /// sources to the environment.
    pub fn process_and_apply(&self, environment: &mut Environment) -> Result<(), Error> {
        let initial_binder = Binder::of_environment(environment);
        if let Some(value) = initial_binder.get(USE_LEGACY_PROCESSING_PROPERTY)? {
            if value.trim().eq_ignore_ascii_case("true") {
                return Err(Error::UseLegacyProcessing(
                    USE_LEGACY_PROCESSING_PROPERTY.to_string(),
                ));
            }
        }
        let not_found_action = match initial_binder.get(ON_NOT_FOUND_PROPERTY)? {
            Some(value) => NotFoundAction::parse(&value)?,
            None => NotFoundAction::Fail,
        };
        let mut config_names = initial_binder.get_list(CONFIG_NAME_PROPERTY)?;
        if config_names.is_empty() {
            config_names.push(DEFAULT_CONFIG_NAME.to_string());
        }
        let resolver = LocationResolver::new(
            config_names,
            self.loaders.clone(),
            Arc::clone(&self.resource_loader),
        )?;
        let mut importer = Importer::new(resolver, not_found_action);

        let mut tree = ContributorTree::new(self.initial_contributors(environment, &initial_binder)?);
        self.register_binder(&tree, None, true);

        debug!("processing initial config data without activation context");
        tree = tree.with_processed_imports(&mut importer, None)?;
        self.register_binder(&tree, None, true);

        let strict = tree.binder(None, BinderOptions::new().fail_on_inactive());
        let cloud_platform = CloudPlatform::active(&strict)?;
        let mut activation = ActivationContext::new(cloud_platform);
        debug!(context = %activation, "processing config data with cloud platform");
        tree = tree.with_processed_imports(&mut importer, Some(&activation))?;
        self.register_binder(&tree, Some(&activation), true);

        let profiles = self.deduce_profiles(environment, &tree, &activation)?;
        activation = activation.with_profiles(profiles.clone());
        debug!(context = %activation, "processing config data with profiles");
        tree = tree.with_processed_imports(&mut importer, Some(&activation))?;
        self.register_binder(&tree, Some(&activation), false);

        self.apply(environment, &tree, &activation, &profiles, &importer)
    }

    /// Wraps the environment's existing sources and the initial import
    /// locations as the root's children. Order fixes precedence under the
    /// later-wins rule: existing sources, then the search path, additional
    /// locations, imports, with the `defaultProperties` source at the end.
    fn initial_contributors(
        &self,
        environment: &Environment,
        binder: &Binder,
    ) -> Result<Vec<Arc<Contributor>>, Error> {
        let mut contributors = Vec::new();
        let mut default_source = None;
        for set in environment.sources() {
            if set.name() == DEFAULT_PROPERTIES_NAME {
                default_source = Some(set.clone());
            } else {
                trace!(source = set.name(), "wrapping existing property source");
                contributors.push(Contributor::of_existing(set.clone()));
            }
        }

        let mut locations = Vec::new();
        let configured = binder.get_list(LOCATION_PROPERTY)?;
        if configured.is_empty() {
            locations.extend(Location::parse_all(DEFAULT_SEARCH_LOCATIONS));
        } else {
            for raw in configured {
                locations.extend(Location::parse_all(&raw));
            }
        }
        for raw in binder.get_list(ADDITIONAL_LOCATION_PROPERTY)? {
            locations.extend(Location::parse_all(&raw));
        }
        for raw in binder.get_list(IMPORT_PROPERTY)? {
            locations.extend(Location::parse_all(&raw));
        }
        for location in locations {
            trace!(location = %location, "adding initial config data import");
            contributors.push(Contributor::of_initial_import(location));
        }

        if let Some(set) = default_source {
            contributors.push(Contributor::of_existing(set));
        }
        Ok(contributors)
    }

    fn register_binder(
        &self,
        tree: &ContributorTree,
        activation: Option<&ActivationContext>,
        deny_inactive: bool,
    ) {
        let tree = tree.clone();
        let activation = activation.cloned();
        let options = if deny_inactive {
            BinderOptions::new().fail_on_inactive()
        } else {
            BinderOptions::new()
        };
        self.bootstrap
            .register(Scope::Prototype, move || tree.binder(activation.as_ref(), options));
    }

    /// Deduces the active and default profiles from every contributor that
    /// takes part in profile deduction, plus host-supplied and included
    /// profiles.
    fn deduce_profiles(
        &self,
        environment: &Environment,
        tree: &ContributorTree,
        activation: &ActivationContext,
    ) -> Result<Profiles, Error> {
        debug!("deducing profiles from current config data contributors");
        let binder = tree.binder(
            Some(activation),
            BinderOptions::new().fail_on_inactive().skip_profile_ignoring(),
        );
        let mut additional = self.additional_profiles.clone();
        for profile in self.included_profiles(tree, activation)? {
            if !additional.contains(&profile) {
                additional.push(profile);
            }
        }
        Profiles::deduce(environment, &binder, &additional)
    }

    /// `spring.profiles.include` from each contributor's own property set.
    /// A contributor that declares includes while failing its activation
    /// predicate is an error.
    fn included_profiles(
        &self,
        tree: &ContributorTree,
        activation: &ActivationContext,
    ) -> Result<Vec<String>, Error> {
        let mut included = Vec::new();
        for contributor in tree.iter() {
            let Some(set) = contributor.property_set() else {
                continue;
            };
            if contributor.options().ignore_profiles {
                continue;
            }
            let binder = tree.binder_for_contributor(contributor, Some(activation), false);
            let includes = binder.get_list(INCLUDE_PROFILES_PROPERTY)?;
            if includes.is_empty() {
                continue;
            }
            if !contributor.is_active(Some(activation)) {
                return Err(Error::InactiveAccess {
                    key: INCLUDE_PROFILES_PROPERTY.to_string(),
                    source_name: set.name().to_string(),
                });
            }
            for profile in includes {
                if !included.contains(&profile) {
                    included.push(profile);
                }
            }
        }
        Ok(included)
    }

    fn apply(
        &self,
        environment: &mut Environment,
        tree: &ContributorTree,
        activation: &ActivationContext,
        profiles: &Profiles,
        importer: &Importer,
    ) -> Result<(), Error> {
        check_invalid_properties(tree)?;
        check_mandatory_locations(tree, activation, importer)?;

        debug!("applying config data environment contributions");
        for contributor in tree.iter() {
            if contributor.kind() != Kind::BoundImport {
                continue;
            }
            let Some(set) = contributor.property_set() else {
                continue;
            };
            if !contributor.is_active(Some(activation)) {
                trace!(source = set.name(), "skipping inactive property source");
                continue;
            }
            trace!(source = set.name(), "adding imported property source");
            environment.add_last((**set).clone());
            self.listener
                .on_property_source_added(set, contributor.location(), contributor.resource());
        }
        environment.move_default_to_end();

        debug!(default_profiles = ?profiles.default_profiles(), active_profiles = ?profiles.active(), "setting profiles");
        environment.set_default_profiles(profiles.default_profiles().to_vec());
        environment.set_active_profiles(profiles.active().to_vec());
        self.listener.on_set_profiles(profiles);
        Ok(())
    }
}

/// Profile-specific property sources may not steer profile selection; the
/// legacy `spring.profiles` key only warns.
fn check_invalid_properties(tree: &ContributorTree) -> Result<(), Error> {
    for contributor in tree.iter() {
        let Some(set) = contributor.property_set() else {
            continue;
        };
        if set.contains_list(DEPRECATED_PROFILES_KEY) {
            warn!(
                source = set.name(),
                "the '{DEPRECATED_PROFILES_KEY}' key is deprecated, use '{ON_PROFILE_PROPERTY}'"
            );
        }
        let profile_specific =
            contributor.is_profile_specific() || contributor.options().profile_specific;
        if !profile_specific {
            continue;
        }
        for key in PROFILE_SPECIFIC_INVALID_KEYS {
            if set.contains_list(key) {
                return Err(Error::InvalidProperty {
                    key: key.to_string(),
                    reason: format!(
                        "must not be declared in the profile specific property source '{}'",
                        set.name()
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Every mandatory import of an active contributor must have been visited:
/// resolved into a contributor, loaded, or recorded optional-but-absent.
fn check_mandatory_locations(
    tree: &ContributorTree,
    activation: &ActivationContext,
    importer: &Importer,
) -> Result<(), Error> {
    let mut mandatory: IndexSet<Location> = IndexSet::new();
    for contributor in tree.iter() {
        if contributor.is_active(Some(activation)) {
            for location in contributor.imports() {
                if !location.is_optional() {
                    mandatory.insert(location.clone());
                }
            }
        }
    }
    for contributor in tree.iter() {
        if let Some(location) = contributor.location() {
            mandatory.shift_remove(location);
        }
    }
    for location in importer.loaded_locations() {
        mandatory.shift_remove(location);
    }
    for location in importer.optional_locations() {
        mandatory.shift_remove(location);
    }
    for location in &mandatory {
        importer
            .not_found_action()
            .handle(NotFoundError::location_missing(location.to_string()))?;
    }
    Ok(())
}

/// Builds an [`Engine`].
#[must_use = "builders do nothing until .build() is called"]
#[derive(Default)]
pub struct EngineBuilder {
    resource_loader: Option<Arc<dyn ResourceLoader>>,
    loaders: Vec<Arc<dyn Loader>>,
    additional_profiles: Vec<String>,
    listener: Option<Box<dyn UpdateListener>>,
}

impl EngineBuilder {
    /// Replaces the default filesystem resource loader.
    pub fn with_resource_loader(mut self, resource_loader: impl ResourceLoader + 'static) -> Self {
        self.resource_loader = Some(Arc::new(resource_loader));
        self
    }

    /// Adds a property-source loader. When none are added the engine uses
    /// the properties, YAML, and TOML loaders, in that precedence order.
    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }

    /// Activates a profile in addition to any deduced ones.
    pub fn with_additional_profile(mut self, profile: impl Into<String>) -> Self {
        self.additional_profiles.push(profile.into());
        self
    }

    /// Installs a listener observing environment updates.
    pub fn with_listener(mut self, listener: impl UpdateListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn build(self) -> Engine {
        let loaders = if self.loaders.is_empty() {
            vec![
                Arc::new(PropertiesLoader) as Arc<dyn Loader>,
                Arc::new(YamlLoader),
                Arc::new(TomlLoader),
            ]
        } else {
            self.loaders
        };
        Engine {
            resource_loader: self
                .resource_loader
                .unwrap_or_else(|| Arc::new(FsResourceLoader::new("."))),
            loaders,
            additional_profiles: self.additional_profiles,
            listener: self.listener.unwrap_or_else(|| Box::new(NoopListener)),
            bootstrap: BootstrapContext::new(),
        }
    }
}
