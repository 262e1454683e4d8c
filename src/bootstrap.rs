//! A process-wide registry shared between bootstrap collaborators.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;

/// Lifetime of a registered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The supplier runs once; every `get` sees the same instance.
    Singleton,
    /// The supplier runs on every `get`.
    Prototype,
}

struct Registration {
    scope: Scope,
    supplier: Box<dyn Fn() -> Box<dyn Any>>,
    singleton: Option<Box<dyn Any>>,
}

/// Typed registry the engine writes collaborators into while processing.
///
/// The engine registers a fresh [`Binder`](crate::properties::Binder)
/// supplier under [`Scope::Prototype`] after each phase, so hosts observing
/// the bootstrap can always bind against the latest contributor tree.
#[derive(Default)]
pub struct BootstrapContext {
    registrations: RefCell<HashMap<TypeId, Registration>>,
}

impl BootstrapContext {
    pub fn new() -> BootstrapContext {
        BootstrapContext::default()
    }

    /// Registers (or replaces) the supplier for `T`.
    pub fn register<T: 'static>(&self, scope: Scope, supplier: impl Fn() -> T + 'static) {
        self.registrations.borrow_mut().insert(
            TypeId::of::<T>(),
            Registration {
                scope,
                supplier: Box::new(move || Box::new(supplier()) as Box<dyn Any>),
                singleton: None,
            },
        );
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.registrations.borrow().contains_key(&TypeId::of::<T>())
    }

    /// Produces an instance of `T`, if a supplier is registered.
    pub fn get<T: 'static + Clone>(&self) -> Option<T> {
        let mut registrations = self.registrations.borrow_mut();
        let registration = registrations.get_mut(&TypeId::of::<T>())?;
        match registration.scope {
            Scope::Prototype => (registration.supplier)().downcast::<T>().ok().map(|b| *b),
            Scope::Singleton => {
                if registration.singleton.is_none() {
                    registration.singleton = Some((registration.supplier)());
                }
                registration
                    .singleton
                    .as_ref()
                    .and_then(|instance| instance.downcast_ref::<T>())
                    .cloned()
            }
        }
    }
}
