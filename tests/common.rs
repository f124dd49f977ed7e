//! Shared fixtures for the module system integration tests

use modsys::instance::{ProviderObject, RegistryClassLoader, SharedLoaderFactory};
use modsys::repository::{MemoryRepository, Repository, SearchMode};
use modsys::{
    ModuleDefinition, ModuleDefinitionBuilder, ModuleSystem, Version, VersionConstraint,
    CLASSPATH_MODULE_NAME,
};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Install an env-filtered subscriber once per test binary; `RUST_LOG`
/// controls verbosity
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A bootstrap + application repository chain with a module system wired to
/// a shared registry class loader
pub struct ModuleSystemFixture {
    pub bootstrap: Arc<dyn Repository>,
    pub repository: Arc<dyn Repository>,
    pub loader: Arc<RegistryClassLoader>,
    pub system: ModuleSystem,
}

impl ModuleSystemFixture {
    pub fn new() -> Self {
        init_tracing();
        let bootstrap: Arc<dyn Repository> = Arc::new(MemoryRepository::bootstrap());
        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::with_parent(
            "application",
            Arc::clone(&bootstrap),
        ));
        let loader = Arc::new(RegistryClassLoader::new());
        let system = ModuleSystem::new(Arc::clone(&repository))
            .with_loader_factory(Arc::new(SharedLoaderFactory::new(Arc::clone(&loader))));
        Self {
            bootstrap,
            repository,
            loader,
            system,
        }
    }

    /// Install a built definition into the application repository
    pub fn install(&self, builder: ModuleDefinitionBuilder) -> Arc<ModuleDefinition> {
        self.repository.install(builder.build()).unwrap()
    }

    /// Register a provider class whose instances are the given string
    pub fn register_class(&self, class: &str, value: &str) {
        let object: ProviderObject = Arc::new(value.to_string());
        self.loader.register_object(class, object);
    }

    /// The `classpath` virtual module seeded into the bootstrap repository
    pub fn classpath(&self) -> Arc<ModuleDefinition> {
        self.bootstrap
            .find(
                CLASSPATH_MODULE_NAME,
                &VersionConstraint::any(),
                SearchMode::LocalOnly,
            )
            .unwrap()
            .unwrap()
    }
}

/// Shorthand for `Version::new`
pub fn v(major: u64, minor: u64, micro: u64) -> Version {
    Version::new(major, minor, micro)
}

/// Parse a constraint, panicking on malformed test input
pub fn constraint(s: &str) -> VersionConstraint {
    s.parse().unwrap()
}

/// Builder for a module named `name` at `version`
pub fn module(name: &str, version: &str) -> ModuleDefinitionBuilder {
    ModuleDefinition::builder(name, version.parse().unwrap())
}
