//! The immutable contributor tree.

mod tree;

pub use tree::ContributorTree;
pub use tree::{IMPORT_PROPERTY, ON_CLOUD_PLATFORM_PROPERTY, ON_PROFILE_PROPERTY};

use std::sync::Arc;

use crate::activation::{Activation, ActivationContext};
use crate::data::Options;
use crate::location::Location;
use crate::properties::PropertySet;
use crate::resource::ConfigResource;

/// What stage of expansion a contributor represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Synthetic root holding every other contributor.
    Root,
    /// Wraps a property source that predates processing; never expanded.
    Existing,
    /// A user-declared starting location, not yet resolved.
    InitialImport,
    /// A loaded property set whose own metadata has not been read yet.
    UnboundImport,
    /// A loaded property set with bound imports and activation predicates.
    BoundImport,
    /// Resolution visited the location but produced no data.
    EmptyLocation,
}

/// The phase a contributor's children were produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportPhase {
    BeforeProfileActivation,
    AfterProfileActivation,
}

impl ImportPhase {
    pub const ALL: [ImportPhase; 2] = [
        ImportPhase::BeforeProfileActivation,
        ImportPhase::AfterProfileActivation,
    ];

    /// The phase implied by an activation context: profile deduction flips
    /// processing into the after-activation phase.
    pub fn of(activation: Option<&ActivationContext>) -> ImportPhase {
        match activation {
            Some(context) if context.profiles().is_some() => ImportPhase::AfterProfileActivation,
            _ => ImportPhase::BeforeProfileActivation,
        }
    }

    fn index(self) -> usize {
        match self {
            ImportPhase::BeforeProfileActivation => 0,
            ImportPhase::AfterProfileActivation => 1,
        }
    }
}

/// Bound contributor metadata: the imports it declares and its activation
/// predicate.
#[derive(Debug, Clone, Default)]
pub struct ContributorProperties {
    pub(crate) imports: Vec<Location>,
    pub(crate) activate: Option<Activation>,
}

impl ContributorProperties {
    pub fn new(imports: Vec<Location>, activate: Option<Activation>) -> ContributorProperties {
        ContributorProperties { imports, activate }
    }

    fn is_active(&self, activation: Option<&ActivationContext>) -> bool {
        match &self.activate {
            Some(activate) => activate.is_active(activation),
            None => true,
        }
    }
}

/// One node of the contributor tree.
///
/// Contributors are immutable; every structural change produces a new node
/// and the tree path-copies ancestors. Child groups are kept per phase, and
/// `Some(vec![])` records "processed, nothing produced" as distinct from an
/// untouched `None` slot.
#[derive(Debug, Clone)]
pub struct Contributor {
    kind: Kind,
    location: Option<Location>,
    resource: Option<ConfigResource>,
    profile_specific: bool,
    property_set: Option<Arc<PropertySet>>,
    properties: Option<ContributorProperties>,
    options: Options,
    children: [Option<Vec<Arc<Contributor>>>; 2],
}

impl Contributor {
    pub fn of_root(children: Vec<Arc<Contributor>>) -> Arc<Contributor> {
        Arc::new(Contributor {
            kind: Kind::Root,
            location: None,
            resource: None,
            profile_specific: false,
            property_set: None,
            properties: None,
            options: Options::NONE,
            children: [Some(children), None],
        })
    }

    pub fn of_existing(set: PropertySet) -> Arc<Contributor> {
        Arc::new(Contributor {
            kind: Kind::Existing,
            location: None,
            resource: None,
            profile_specific: false,
            property_set: Some(Arc::new(set)),
            properties: None,
            options: Options::NONE,
            children: [None, None],
        })
    }

    /// An initial import carries its location as its single import, so the
    /// processor expands it like any other contributor with imports. The
    /// `location` field stays unset: it is reserved for contributors that
    /// were produced by resolving a location.
    pub fn of_initial_import(location: Location) -> Arc<Contributor> {
        Arc::new(Contributor {
            kind: Kind::InitialImport,
            location: None,
            resource: None,
            profile_specific: false,
            property_set: None,
            properties: Some(ContributorProperties::new(vec![location], None)),
            options: Options::NONE,
            children: [None, None],
        })
    }

    pub fn of_unbound_import(
        location: Location,
        resource: ConfigResource,
        profile_specific: bool,
        set: PropertySet,
        options: Options,
    ) -> Arc<Contributor> {
        Arc::new(Contributor {
            kind: Kind::UnboundImport,
            location: Some(location),
            resource: Some(resource),
            profile_specific,
            property_set: Some(Arc::new(set)),
            properties: None,
            options,
            children: [None, None],
        })
    }

    /// A resource-less unbound import, enough for exercising validation and
    /// binder plumbing in tests.
    #[cfg(test)]
    pub(crate) fn of_unbound_set(
        location: Location,
        profile_specific: bool,
        set: PropertySet,
        options: Options,
    ) -> Arc<Contributor> {
        Arc::new(Contributor {
            kind: Kind::UnboundImport,
            location: Some(location),
            resource: None,
            profile_specific,
            property_set: Some(Arc::new(set)),
            properties: None,
            options,
            children: [None, None],
        })
    }

    pub fn of_empty_location(location: Location, profile_specific: bool) -> Arc<Contributor> {
        Arc::new(Contributor {
            kind: Kind::EmptyLocation,
            location: Some(location),
            resource: None,
            profile_specific,
            property_set: None,
            properties: None,
            options: Options::NONE,
            children: [None, None],
        })
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn resource(&self) -> Option<&ConfigResource> {
        self.resource.as_ref()
    }

    pub fn is_profile_specific(&self) -> bool {
        self.profile_specific
    }

    pub fn property_set(&self) -> Option<&Arc<PropertySet>> {
        self.property_set.as_ref()
    }

    pub fn properties(&self) -> Option<&ContributorProperties> {
        self.properties.as_ref()
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn imports(&self) -> &[Location] {
        self.properties
            .as_ref()
            .map(|p| p.imports.as_slice())
            .unwrap_or(&[])
    }

    /// Unbound imports are never active; bound metadata decides otherwise.
    pub fn is_active(&self, activation: Option<&ActivationContext>) -> bool {
        if self.kind == Kind::UnboundImport {
            return false;
        }
        match &self.properties {
            Some(properties) => properties.is_active(activation),
            None => true,
        }
    }

    /// True while this contributor declares imports that have not been
    /// resolved for the given phase.
    pub fn has_unprocessed_imports(&self, phase: ImportPhase) -> bool {
        !self.imports().is_empty() && self.children[phase.index()].is_none()
    }

    pub fn children(&self, phase: ImportPhase) -> Option<&[Arc<Contributor>]> {
        self.children[phase.index()].as_deref()
    }

    /// A copy of this contributor with children recorded under `phase`.
    pub(crate) fn with_children(
        &self,
        phase: ImportPhase,
        children: Vec<Arc<Contributor>>,
    ) -> Arc<Contributor> {
        let mut copy = self.clone();
        copy.children[phase.index()] = Some(children);
        Arc::new(copy)
    }

    /// A copy of this contributor upgraded to a bound import.
    pub(crate) fn with_bound(&self, properties: ContributorProperties) -> Arc<Contributor> {
        let mut copy = self.clone();
        copy.kind = Kind::BoundImport;
        copy.properties = Some(properties);
        Arc::new(copy)
    }

    /// Depth-first pre-order iteration: the node itself, then its children
    /// phase by phase (before-activation first) in insertion order.
    pub fn iter(self: &Arc<Self>) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// Rebuilds the tree with `old` (located by pointer identity) replaced
    /// by `new`, path-copying every ancestor.
    pub(crate) fn with_replacement(
        self: &Arc<Self>,
        old: &Arc<Contributor>,
        new: Arc<Contributor>,
    ) -> Arc<Contributor> {
        replace(self, old, &new).unwrap_or_else(|| Arc::clone(self))
    }
}

fn replace(
    node: &Arc<Contributor>,
    old: &Arc<Contributor>,
    new: &Arc<Contributor>,
) -> Option<Arc<Contributor>> {
    if Arc::ptr_eq(node, old) {
        return Some(Arc::clone(new));
    }
    for phase_index in 0..node.children.len() {
        let Some(children) = &node.children[phase_index] else {
            continue;
        };
        for (child_index, child) in children.iter().enumerate() {
            if let Some(replaced) = replace(child, old, new) {
                let mut new_children = children.clone();
                new_children[child_index] = replaced;
                let mut copy = (**node).clone();
                copy.children[phase_index] = Some(new_children);
                return Some(Arc::new(copy));
            }
        }
    }
    None
}

/// Stack-driven pre-order iterator over a contributor subtree.
pub struct Iter<'a> {
    stack: Vec<&'a Arc<Contributor>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Arc<Contributor>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for phase in ImportPhase::ALL.iter().rev() {
            if let Some(children) = node.children(*phase) {
                for child in children.iter().rev() {
                    self.stack.push(child);
                }
            }
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::PropertySet;

    fn named(name: &str) -> Arc<Contributor> {
        Contributor::of_existing(PropertySet::new(name))
    }

    fn names(root: &Arc<Contributor>) -> Vec<String> {
        root.iter()
            .map(|c| {
                c.property_set()
                    .map(|s| s.name().to_string())
                    .unwrap_or_else(|| format!("{:?}", c.kind()))
            })
            .collect()
    }

    #[test]
    fn test_iteration_is_preorder_with_phase_order() {
        let grandchild = named("grandchild");
        let child_before = named("child-before")
            .with_children(ImportPhase::BeforeProfileActivation, vec![grandchild]);
        let child_after = named("child-after");
        let parent =
            child_before.with_children(ImportPhase::AfterProfileActivation, vec![child_after]);
        let root = Contributor::of_root(vec![parent, named("sibling")]);

        assert_eq!(
            names(&root),
            vec!["Root", "child-before", "grandchild", "child-after", "sibling"]
        );
    }

    #[test]
    fn test_with_replacement_path_copies() {
        let target = named("target");
        let sibling = named("sibling");
        let root = Contributor::of_root(vec![Arc::clone(&target), Arc::clone(&sibling)]);

        let replacement = named("replacement");
        let updated = root.with_replacement(&target, Arc::clone(&replacement));

        assert_eq!(names(&updated), vec!["Root", "replacement", "sibling"]);
        // old tree untouched
        assert_eq!(names(&root), vec!["Root", "target", "sibling"]);
        // unmodified branches are shared, not copied
        let kept = updated.children(ImportPhase::BeforeProfileActivation).unwrap();
        assert!(Arc::ptr_eq(&kept[1], &sibling));
    }

    #[test]
    fn test_unbound_import_is_never_active() {
        let location = Location::of("file:./app.yaml");
        let set = PropertySet::new("set");
        let contributor = Arc::new(Contributor {
            kind: Kind::UnboundImport,
            location: Some(location),
            resource: None,
            profile_specific: false,
            property_set: Some(Arc::new(set)),
            properties: None,
            options: Options::NONE,
            children: [None, None],
        });
        assert!(!contributor.is_active(None));
    }

    #[test]
    fn test_unprocessed_imports_tracked_per_phase() {
        let contributor = Contributor::of_initial_import(Location::of("classpath:/"));
        assert!(contributor.has_unprocessed_imports(ImportPhase::BeforeProfileActivation));
        assert!(contributor.has_unprocessed_imports(ImportPhase::AfterProfileActivation));

        let processed = contributor.with_children(ImportPhase::BeforeProfileActivation, Vec::new());
        assert!(!processed.has_unprocessed_imports(ImportPhase::BeforeProfileActivation));
        assert!(processed.has_unprocessed_imports(ImportPhase::AfterProfileActivation));
    }

    #[test]
    fn test_existing_contributor_is_always_active() {
        let contributor = named("existing");
        assert!(contributor.is_active(None));
    }
}
