use kindling::{Binder, Engine, Environment, FsResourceLoader, PropertySet};

fn main() -> Result<(), kindling::Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // Seed the environment the way a host would: command-line arguments
    // first, then whatever else existed before processing.
    let mut environment = Environment::new();
    environment.add_source(PropertySet::from_entries(
        "commandLineArgs",
        [("spring.profiles.active", "dev")],
    ));

    let engine = Engine::builder()
        .with_resource_loader(
            FsResourceLoader::new(".").with_classpath_root("demos/resources"),
        )
        .build();
    engine.process_and_apply(&mut environment)?;

    let binder = Binder::of_environment(&environment);
    println!("active profiles: {:?}", environment.active_profiles());
    println!("app.name       = {:?}", binder.get("app.name")?);
    println!("app.debug      = {:?}", binder.get("app.debug")?);
    println!("database.url   = {:?}", binder.get("database.url")?);

    println!("\nproperty sources (lowest to highest precedence):");
    for source in environment.sources() {
        println!("  {}", source.name());
    }

    Ok(())
}
