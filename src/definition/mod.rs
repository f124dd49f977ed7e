//! Module definitions
//!
//! A `ModuleDefinition` is the immutable descriptor of a named, versioned
//! module: its import dependencies, exported and member packages, attribute
//! map and typed annotations. Definitions are built programmatically via
//! [`ModuleDefinition::builder`] or parsed from a `module.toml` manifest
//! (see [`manifest`]); they are bound to their owning repository at install
//! time and never mutated afterwards.

pub mod manifest;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::repository::RepositoryId;
use crate::version::{Version, VersionConstraint};

pub use manifest::ModuleManifest;

/// Unique identity of an installed module definition
///
/// Assigned when the definition is created; two definitions carrying the
/// same name and version are still distinct entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(Uuid);

impl DefinitionId {
    pub(crate) fn new() -> Self {
        DefinitionId(Uuid::new_v4())
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One import edge of a module definition
///
/// `optional` edges may stay unsatisfied without failing resolution;
/// `reexport` edges make the target transitively visible to importers of
/// the importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDependency {
    importer: String,
    target: String,
    constraint: VersionConstraint,
    optional: bool,
    reexport: bool,
    attributes: BTreeMap<String, String>,
}

impl ImportDependency {
    pub fn new(
        importer: impl Into<String>,
        target: impl Into<String>,
        constraint: VersionConstraint,
    ) -> Self {
        Self {
            importer: importer.into(),
            target: target.into(),
            constraint,
            optional: false,
            reexport: false,
            attributes: BTreeMap::new(),
        }
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn reexport(mut self, reexport: bool) -> Self {
        self.reexport = reexport;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn importer(&self) -> &str {
        &self.importer
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn constraint(&self) -> &VersionConstraint {
        &self.constraint
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_reexport(&self) -> bool {
        self.reexport
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

/// A declared service provider: the provider class plus its capability
/// declaration (implemented interfaces and ancestor class chain, nearest
/// first), stated as data so no runtime type inspection is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEntry {
    pub service: String,
    pub class: String,
    pub implements: Vec<String>,
    pub superclasses: Vec<String>,
}

impl ProviderEntry {
    pub fn new(service: impl Into<String>, class: impl Into<String>) -> Self {
        let service = service.into();
        Self {
            implements: vec![service.clone()],
            service,
            class: class.into(),
            superclasses: Vec::new(),
        }
    }

    /// A provider is compatible when it directly implements the service
    /// interface or one of its ancestors equals the service type exactly.
    pub fn is_compatible(&self, service_type: &str) -> bool {
        self.implements.iter().any(|i| i == service_type)
            || self.superclasses.iter().any(|s| s == service_type)
    }
}

/// Typed module metadata, populated once at parse time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleAnnotation {
    /// Service types this module declares and exports
    ExportedServices(Vec<String>),
    /// Concrete providers this module contributes
    ServiceProviders(Vec<ProviderEntry>),
    /// Entry point marker; carried through, not interpreted here
    MainClass(String),
}

/// Immutable descriptor of a named, versioned module
#[derive(Debug, Clone)]
pub struct ModuleDefinition {
    id: DefinitionId,
    name: String,
    version: Version,
    platform: Option<String>,
    arch: Option<String>,
    releasable: bool,
    is_virtual: bool,
    import_dependencies: Vec<ImportDependency>,
    exported_packages: BTreeSet<String>,
    member_packages: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
    annotations: Vec<ModuleAnnotation>,
    repository: RepositoryId,
}

impl ModuleDefinition {
    /// Start building a definition with the two mandatory fields
    pub fn builder(name: impl Into<String>, version: Version) -> ModuleDefinitionBuilder {
        ModuleDefinitionBuilder::new(name.into(), version)
    }

    pub fn id(&self) -> DefinitionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn arch(&self) -> Option<&str> {
        self.arch.as_deref()
    }

    pub fn is_releasable(&self) -> bool {
        self.releasable
    }

    /// Virtual definitions are synthesized programmatically (bootstrap
    /// modules such as `classpath`) rather than backed by an archive.
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn import_dependencies(&self) -> &[ImportDependency] {
        &self.import_dependencies
    }

    pub fn exported_packages(&self) -> &BTreeSet<String> {
        &self.exported_packages
    }

    pub fn member_packages(&self) -> &BTreeSet<String> {
        &self.member_packages
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn annotations(&self) -> &[ModuleAnnotation] {
        &self.annotations
    }

    /// Repository this definition was installed into; the nil id until then
    pub fn repository(&self) -> RepositoryId {
        self.repository
    }

    pub(crate) fn attach(&mut self, repository: RepositoryId) {
        self.repository = repository;
    }

    /// Service types this module exports
    pub fn exported_services(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for annotation in &self.annotations {
            if let ModuleAnnotation::ExportedServices(services) = annotation {
                out.extend(services.iter().map(String::as_str));
            }
        }
        out
    }

    pub fn exports_service(&self, service_type: &str) -> bool {
        self.exported_services().contains(&service_type)
    }

    /// All provider entries this module declares
    pub fn service_providers(&self) -> Vec<&ProviderEntry> {
        let mut out = Vec::new();
        for annotation in &self.annotations {
            if let ModuleAnnotation::ServiceProviders(entries) = annotation {
                out.extend(entries.iter());
            }
        }
        out
    }

    /// Provider entries for one service type, in declaration order
    pub fn providers_for(&self, service_type: &str) -> Vec<&ProviderEntry> {
        self.service_providers()
            .into_iter()
            .filter(|p| p.service == service_type)
            .collect()
    }

    pub fn provides_service(&self, service_type: &str) -> bool {
        !self.providers_for(service_type).is_empty()
    }

    pub fn main_class(&self) -> Option<&str> {
        self.annotations.iter().find_map(|a| match a {
            ModuleAnnotation::MainClass(class) => Some(class.as_str()),
            _ => None,
        })
    }
}

impl PartialEq for ModuleDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModuleDefinition {}

impl fmt::Display for ModuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)?;
        match (&self.platform, &self.arch) {
            (Some(p), Some(a)) => write!(f, " ({}-{})", p, a),
            (Some(p), None) => write!(f, " ({})", p),
            (None, Some(a)) => write!(f, " ({})", a),
            (None, None) => Ok(()),
        }
    }
}

/// Builder for programmatic module definitions
pub struct ModuleDefinitionBuilder {
    name: String,
    version: Version,
    platform: Option<String>,
    arch: Option<String>,
    releasable: bool,
    is_virtual: bool,
    imports: Vec<ImportDependency>,
    exported_packages: BTreeSet<String>,
    member_packages: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
    exported_services: Vec<String>,
    providers: Vec<ProviderEntry>,
    main_class: Option<String>,
}

impl ModuleDefinitionBuilder {
    fn new(name: String, version: Version) -> Self {
        Self {
            name,
            version,
            platform: None,
            arch: None,
            releasable: true,
            is_virtual: false,
            imports: Vec::new(),
            exported_packages: BTreeSet::new(),
            member_packages: BTreeSet::new(),
            attributes: BTreeMap::new(),
            exported_services: Vec::new(),
            providers: Vec::new(),
            main_class: None,
        }
    }

    /// Bind the definition to one platform (eligible only there)
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Bind the definition to one architecture
    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }

    pub fn releasable(mut self, releasable: bool) -> Self {
        self.releasable = releasable;
        self
    }

    /// Mark this definition as a synthesized virtual module
    pub fn virtual_module(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Add an import edge; the importer name is filled in from the builder
    pub fn import(mut self, target: impl Into<String>, constraint: VersionConstraint) -> Self {
        self.imports
            .push(ImportDependency::new(self.name.clone(), target, constraint));
        self
    }

    /// Add a fully specified import edge (optional/reexport/attributes)
    pub fn import_dependency(mut self, dependency: ImportDependency) -> Self {
        self.imports.push(dependency);
        self
    }

    pub fn export_package(mut self, package: impl Into<String>) -> Self {
        self.exported_packages.insert(package.into());
        self
    }

    pub fn member_package(mut self, package: impl Into<String>) -> Self {
        self.member_packages.insert(package.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn export_service(mut self, service_type: impl Into<String>) -> Self {
        self.exported_services.push(service_type.into());
        self
    }

    pub fn provider(mut self, entry: ProviderEntry) -> Self {
        self.providers.push(entry);
        self
    }

    pub fn main_class(mut self, class: impl Into<String>) -> Self {
        self.main_class = Some(class.into());
        self
    }

    pub fn build(self) -> ModuleDefinition {
        let mut annotations = Vec::new();
        if !self.exported_services.is_empty() {
            annotations.push(ModuleAnnotation::ExportedServices(self.exported_services));
        }
        if !self.providers.is_empty() {
            annotations.push(ModuleAnnotation::ServiceProviders(self.providers));
        }
        if let Some(class) = self.main_class {
            annotations.push(ModuleAnnotation::MainClass(class));
        }

        ModuleDefinition {
            id: DefinitionId::new(),
            name: self.name,
            version: self.version,
            platform: self.platform,
            arch: self.arch,
            releasable: self.releasable,
            is_virtual: self.is_virtual,
            import_dependencies: self.imports,
            exported_packages: self.exported_packages,
            member_packages: self.member_packages,
            attributes: self.attributes,
            annotations,
            repository: RepositoryId::nil(),
        }
    }
}
