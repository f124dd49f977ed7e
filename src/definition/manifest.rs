//! Module manifest parsing and validation
//!
//! Parses `module.toml` manifests into [`ModuleDefinition`]s. The manifest
//! is the concrete stand-in for the archive metadata parser: raw strings in,
//! validated typed definition out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::definition::{ImportDependency, ModuleDefinition, ProviderEntry};
use crate::error::ModuleError;
use crate::version::{Version, VersionConstraint};

/// Manifest validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Manifest is valid
    Valid,
    /// Manifest is invalid with the collected reasons
    Invalid(Vec<String>),
}

/// Module manifest (`module.toml` structure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module name
    pub name: String,
    /// Module version, dotted form
    pub version: String,
    /// Platform this archive is bound to (absent = platform-neutral)
    #[serde(default)]
    pub platform: Option<String>,
    /// Architecture this archive is bound to (absent = neutral)
    #[serde(default)]
    pub arch: Option<String>,
    /// Whether the module instance may be released
    #[serde(default = "default_releasable")]
    pub releasable: bool,
    /// Entry point class, carried through as metadata
    #[serde(rename = "main-class", default)]
    pub main_class: Option<String>,
    /// Import dependencies
    #[serde(default)]
    pub imports: Vec<ManifestImport>,
    /// Exported packages and services
    #[serde(default)]
    pub exports: ManifestExports,
    /// Member (non-exported) packages
    #[serde(default)]
    pub members: ManifestMembers,
    /// Declared service providers
    #[serde(default)]
    pub providers: Vec<ManifestProvider>,
    /// Free-form attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

fn default_releasable() -> bool {
    true
}

/// One `[[imports]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestImport {
    /// Target module name
    pub name: String,
    /// Version constraint; absent means any version
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub reexport: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// The `[exports]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestExports {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

/// The `[members]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestMembers {
    #[serde(default)]
    pub packages: Vec<String>,
}

/// One `[[providers]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestProvider {
    /// Service type this provider implements
    pub service: String,
    /// Provider class name
    pub class: String,
    /// Interfaces the class directly implements; defaults to the service
    #[serde(default)]
    pub implements: Vec<String>,
    /// Ancestor class chain, nearest first
    #[serde(default)]
    pub superclasses: Vec<String>,
}

impl ModuleManifest {
    /// Load a manifest from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to read manifest file: {}", e))
        })?;
        Self::parse_str(&contents)
    }

    /// Parse a manifest from TOML text
    pub fn parse_str(contents: &str) -> Result<Self, ModuleError> {
        toml::from_str(contents).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to parse manifest TOML: {}", e))
        })
    }

    /// Validate the manifest, collecting every problem found
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("Module name cannot be empty".to_string());
        } else if !is_valid_name(&self.name) {
            errors.push(format!(
                "Invalid module name: {} (must start alphanumeric, contain only alphanumerics/-/_/., at most 64 chars)",
                self.name
            ));
        }

        if self.version.is_empty() {
            errors.push("Module version cannot be empty".to_string());
        } else if let Err(e) = self.version.parse::<Version>() {
            errors.push(format!("Invalid module version {}: {}", self.version, e));
        }

        for import in &self.imports {
            if !is_valid_name(&import.name) {
                errors.push(format!("Invalid import name: {}", import.name));
            }
            if let Some(constraint) = &import.version {
                if let Err(e) = constraint.parse::<VersionConstraint>() {
                    errors.push(format!(
                        "Invalid version constraint {} for import {}: {}",
                        constraint, import.name, e
                    ));
                }
            }
        }

        for provider in &self.providers {
            if provider.service.is_empty() {
                errors.push(format!(
                    "Provider {} does not name a service",
                    provider.class
                ));
            }
            if provider.class.is_empty() {
                errors.push(format!(
                    "Provider for {} does not name a class",
                    provider.service
                ));
            }
        }

        if errors.is_empty() {
            debug!("Manifest validation passed for module: {}", self.name);
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(errors)
        }
    }

    /// Convert to a module definition, validating first
    pub fn to_definition(&self) -> Result<ModuleDefinition, ModuleError> {
        if let ValidationResult::Invalid(errors) = self.validate() {
            return Err(ModuleError::InvalidManifest(errors.join("; ")));
        }

        let version: Version = self.version.parse()?;
        let mut builder = ModuleDefinition::builder(self.name.clone(), version);

        if let Some(platform) = &self.platform {
            builder = builder.platform(platform.clone());
        }
        if let Some(arch) = &self.arch {
            builder = builder.arch(arch.clone());
        }
        builder = builder.releasable(self.releasable);
        if let Some(class) = &self.main_class {
            builder = builder.main_class(class.clone());
        }

        for import in &self.imports {
            let constraint = match &import.version {
                Some(text) => text.parse()?,
                None => VersionConstraint::any(),
            };
            let mut dependency = ImportDependency::new(&self.name, &import.name, constraint)
                .optional(import.optional)
                .reexport(import.reexport);
            for (key, value) in &import.attributes {
                dependency = dependency.attribute(key.clone(), value.clone());
            }
            builder = builder.import_dependency(dependency);
        }

        for package in &self.exports.packages {
            builder = builder.export_package(package.clone());
        }
        for service in &self.exports.services {
            builder = builder.export_service(service.clone());
        }
        for package in &self.members.packages {
            builder = builder.member_package(package.clone());
        }

        for provider in &self.providers {
            let implements = if provider.implements.is_empty() {
                vec![provider.service.clone()]
            } else {
                provider.implements.clone()
            };
            builder = builder.provider(ProviderEntry {
                service: provider.service.clone(),
                class: provider.class.clone(),
                implements,
                superclasses: provider.superclasses.clone(),
            });
        }

        for (key, value) in &self.attributes {
            builder = builder.attribute(key.clone(), value.clone());
        }

        Ok(builder.build())
    }
}

/// Module name rules: non-empty, at most 64 chars, starts alphanumeric,
/// then alphanumerics, dashes, underscores or dots.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    if !name.chars().next().map_or(false, |c| c.is_alphanumeric()) {
        return false;
    }
    name.chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
}
