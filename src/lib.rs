//! Bootstrap configuration engine.
//!
//! Expands a small set of initial configuration locations (directories,
//! files, classpath entries) into an ordered list of property sources on an
//! [`Environment`], recursively and in three activation phases: initial,
//! cloud platform, and profile-specific. Property sets may declare further
//! imports (`spring.config.import`) and activation predicates
//! (`spring.config.activate.*`); active profiles are deduced mid-flight
//! from the partially loaded data.
//!
//! # Example
//!
//! ```no_run
//! use kindling::{Engine, Environment, FsResourceLoader, PropertySet};
//!
//! let mut environment = Environment::new();
//! environment.add_source(PropertySet::from_entries(
//!     "commandLineArgs",
//!     [("spring.profiles.active", "dev")],
//! ));
//!
//! let engine = Engine::builder()
//!     .with_resource_loader(FsResourceLoader::new(".").with_classpath_root("./resources"))
//!     .build();
//! engine.process_and_apply(&mut environment)?;
//!
//! assert_eq!(environment.active_profiles(), &["dev".to_string()]);
//! # Ok::<(), kindling::Error>(())
//! ```
//!
//! Ordering is deterministic: the contributor tree is walked depth-first in
//! insertion order and later property sources override earlier ones, so a
//! profile-specific file wins over its base file and an imported file wins
//! over its importer.

pub mod activation;
pub mod bootstrap;
pub mod contributor;
pub mod data;
pub mod engine;
pub mod environment;
mod error;
pub mod location;
pub mod properties;
pub mod resource;

pub use activation::{ActivationContext, CloudPlatform, Profiles};
pub use bootstrap::{BootstrapContext, Scope};
pub use data::{ConfigData, Loader, NotFoundAction};
pub use engine::{Engine, EngineBuilder};
pub use environment::{Environment, UpdateListener};
pub use error::{Error, NotFoundError};
pub use location::Location;
pub use properties::{Binder, PropertySet};
pub use resource::{ConfigResource, FsResourceLoader, ResourceLoader};
