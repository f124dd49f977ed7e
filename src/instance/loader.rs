//! Class-loading collaborator seam
//!
//! The module system never loads byte code itself; it only asks a
//! [`ClassLoader`] for opaque provider objects by class name. Embedders
//! wire a real loader through a [`LoaderFactory`]; the registry-backed
//! implementation lets hosts (and tests) register plain constructors.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::ModuleDefinition;
use crate::error::ModuleError;

/// Opaque provider object produced by a class loader
pub type ProviderObject = Arc<dyn Any + Send + Sync>;

/// Constructor registered for a provider class
pub type ProviderCtor = Arc<dyn Fn() -> Result<ProviderObject, String> + Send + Sync>;

/// Obtains provider objects for class names; opaque to the module system
pub trait ClassLoader: Send + Sync {
    fn instantiate(&self, class_name: &str) -> Result<ProviderObject, ModuleError>;
}

/// Loader with no loadable classes, the default until a collaborator is
/// wired in
pub struct NullClassLoader;

impl ClassLoader for NullClassLoader {
    fn instantiate(&self, class_name: &str) -> Result<ProviderObject, ModuleError> {
        Err(ModuleError::Initialization(format!(
            "No class loader available for class {}",
            class_name
        )))
    }
}

/// Loader backed by registered constructors
#[derive(Default)]
pub struct RegistryClassLoader {
    ctors: RwLock<HashMap<String, ProviderCtor>>,
}

impl RegistryClassLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for a class name
    pub fn register<F>(&self, class_name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Result<ProviderObject, String> + Send + Sync + 'static,
    {
        self.ctors.write().insert(class_name.into(), Arc::new(ctor));
    }

    /// Register a constructor that always yields a clone of `object`
    pub fn register_object(&self, class_name: impl Into<String>, object: ProviderObject) {
        self.register(class_name, move || Ok(Arc::clone(&object)));
    }
}

impl ClassLoader for RegistryClassLoader {
    fn instantiate(&self, class_name: &str) -> Result<ProviderObject, ModuleError> {
        let ctor = self
            .ctors
            .read()
            .get(class_name)
            .cloned()
            .ok_or_else(|| {
                ModuleError::Initialization(format!("Class {} not found", class_name))
            })?;
        ctor().map_err(|reason| {
            ModuleError::Initialization(format!("Constructor for {} failed: {}", class_name, reason))
        })
    }
}

/// Produces the class loader for each freshly instantiated module
pub trait LoaderFactory: Send + Sync {
    fn create(&self, def: &Arc<ModuleDefinition>) -> Arc<dyn ClassLoader>;
}

/// Factory handing every module the null loader
pub struct NullLoaderFactory;

impl LoaderFactory for NullLoaderFactory {
    fn create(&self, _def: &Arc<ModuleDefinition>) -> Arc<dyn ClassLoader> {
        Arc::new(NullClassLoader)
    }
}

/// Factory sharing one registry loader across all modules; class names are
/// globally scoped, which is all the provider lookup needs
pub struct SharedLoaderFactory {
    loader: Arc<RegistryClassLoader>,
}

impl SharedLoaderFactory {
    pub fn new(loader: Arc<RegistryClassLoader>) -> Self {
        Self { loader }
    }
}

impl LoaderFactory for SharedLoaderFactory {
    fn create(&self, _def: &Arc<ModuleDefinition>) -> Arc<dyn ClassLoader> {
        Arc::clone(&self.loader) as Arc<dyn ClassLoader>
    }
}
