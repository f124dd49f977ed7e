//! Module instantiation: memoized identity, cycles, optional imports,
//! release validation, configuration, and lifecycle events

mod common;
use common::*;

use modsys::instance::{ModuleImport, ModuleSystemEvent, ModuleSystemListener};
use modsys::repository::{MemoryRepository, Repository};
use modsys::{ImportDependency, ModuleError, ModuleSystem, ModuleSystemConfig};
use std::sync::{Arc, Mutex};

#[test]
fn test_instantiation_is_idempotent() {
    let mut fx = ModuleSystemFixture::new();
    fx.install(module("base", "1.0"));
    let app = fx.install(module("app", "1.0").import("base", constraint("*")));

    let first = fx.system.get_instance(&app).unwrap();
    let second = fx.system.get_instance(&app).unwrap();
    assert_eq!(first, second);
    assert_eq!(fx.system.instance_count(), 2);
}

#[test]
fn test_cyclic_imports_share_instances() {
    let mut fx = ModuleSystemFixture::new();
    let a = fx.install(module("a", "1.0").import("b", constraint("*")));
    let b = fx.install(module("b", "1.0").import("a", constraint("*")));

    let a_id = fx.system.get_instance(&a).unwrap();
    let b_id = fx.system.get_instance(&b).unwrap();
    assert_ne!(a_id, b_id);

    assert_eq!(
        fx.system.module(a_id).unwrap().imports(),
        &[ModuleImport {
            module: b_id,
            reexport: false
        }]
    );
    assert_eq!(
        fx.system.module(b_id).unwrap().imports(),
        &[ModuleImport {
            module: a_id,
            reexport: false
        }]
    );
}

#[test]
fn test_unsatisfied_optional_imports_are_not_wired() {
    let mut fx = ModuleSystemFixture::new();
    fx.install(module("base", "1.0"));
    fx.install(module("util", "1.0"));
    let app = fx.install(
        module("app", "1.0")
            .import("base", constraint("*"))
            .import_dependency(
                ImportDependency::new("app", "extras", constraint("*")).optional(true),
            )
            .import("util", constraint("*")),
    );

    let app_id = fx.system.get_instance(&app).unwrap();
    let imports = fx.system.imported_modules(app_id);
    assert_eq!(imports.len(), 2);
    let names: Vec<_> = imports
        .iter()
        .map(|&id| fx.system.module(id).unwrap().definition().name().to_string())
        .collect();
    assert_eq!(names, vec!["base", "util"]);
}

#[test]
fn test_foreign_definitions_are_rejected() {
    let mut fx = ModuleSystemFixture::new();
    let other: Arc<dyn Repository> = Arc::new(MemoryRepository::new("elsewhere"));
    let foreign = other.install(module("alien", "1.0").build()).unwrap();

    assert!(matches!(
        fx.system.get_instance(&foreign),
        Err(ModuleError::ForeignRepository { .. })
    ));
    assert!(matches!(
        fx.system.release_module(&foreign),
        Err(ModuleError::ForeignRepository { .. })
    ));
}

#[test]
fn test_release_refuses_reserved_names() {
    let mut fx = ModuleSystemFixture::new();
    let platform_mod = fx.install(module("platform.core", "1.0"));
    fx.system.get_instance(&platform_mod).unwrap();

    assert!(matches!(
        fx.system.release_module(&platform_mod),
        Err(ModuleError::ReservedModuleName(_))
    ));
}

#[test]
fn test_release_refuses_bootstrap_modules() {
    let mut fx = ModuleSystemFixture::new();
    let classpath = fx.classpath();

    assert!(matches!(
        fx.system.release_module(&classpath),
        Err(ModuleError::BootstrapModule(_))
    ));
}

#[test]
fn test_release_refuses_non_releasable_modules() {
    let mut fx = ModuleSystemFixture::new();
    let pinned = fx.install(module("pinned", "1.0").releasable(false));
    fx.system.get_instance(&pinned).unwrap();

    assert!(matches!(
        fx.system.release_module(&pinned),
        Err(ModuleError::NotReleasable(_))
    ));
}

#[test]
fn test_release_forces_reinstantiation_without_touching_importers() {
    let mut fx = ModuleSystemFixture::new();
    let base = fx.install(module("base", "1.0"));
    let app = fx.install(module("app", "1.0").import("base", constraint("*")));

    let app_id = fx.system.get_instance(&app).unwrap();
    let base_id = fx.system.get_instance(&base).unwrap();

    fx.system.release_module(&base).unwrap();
    assert_eq!(fx.system.instance_of(&base), None);

    // The importer keeps its wired edge to the old instance
    assert_eq!(fx.system.imported_modules(app_id), vec![base_id]);
    assert!(fx.system.module(base_id).is_some());

    let fresh = fx.system.get_instance(&base).unwrap();
    assert_ne!(fresh, base_id);
}

#[test]
fn test_lifecycle_events_fire_in_dependency_order() {
    struct Recorder(Arc<Mutex<Vec<String>>>);
    impl ModuleSystemListener for Recorder {
        fn on_event(&self, event: &ModuleSystemEvent) {
            let entry = match event {
                ModuleSystemEvent::ModuleInitialized(def) => {
                    format!("initialized {}", def.name())
                }
                ModuleSystemEvent::ModuleReleased(def) => format!("released {}", def.name()),
            };
            self.0.lock().unwrap().push(entry);
        }
    }

    let mut fx = ModuleSystemFixture::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    fx.system.add_listener(Box::new(Recorder(Arc::clone(&events))));

    let base = fx.install(module("base", "1.0"));
    let app = fx.install(module("app", "1.0").import("base", constraint("*")));
    fx.system.get_instance(&app).unwrap();
    fx.system.release_module(&base).unwrap();

    assert_eq!(
        events.lock().unwrap().as_slice(),
        &[
            "initialized base".to_string(),
            "initialized app".to_string(),
            "released base".to_string(),
        ]
    );
}

#[test]
fn test_search_parents_can_be_disabled() {
    init_tracing();
    let parent: Arc<dyn Repository> = Arc::new(MemoryRepository::new("system"));
    let child: Arc<dyn Repository> = Arc::new(MemoryRepository::with_parent(
        "application",
        Arc::clone(&parent),
    ));
    parent.install(module("dep", "1.0").build()).unwrap();
    let app = child
        .install(module("app", "1.0").import("dep", constraint("*")).build())
        .unwrap();

    let mut insular = ModuleSystem::with_config(
        Arc::clone(&child),
        ModuleSystemConfig {
            search_parents: false,
            ..Default::default()
        },
    );
    assert!(matches!(
        insular.get_instance(&app),
        Err(ModuleError::DependencyNotFound { .. })
    ));

    let mut chained = ModuleSystem::new(Arc::clone(&child));
    assert!(chained.get_instance(&app).is_ok());
}

#[test]
fn test_platform_override_steers_resolution() {
    init_tracing();
    let fx = ModuleSystemFixture::new();
    let exotic = fx.install(module("native", "1.0").platform("zos").arch("s390x"));
    fx.install(module("native", "2.0").platform("linux").arch("x86_64"));
    let app = fx.install(module("app", "1.0").import("native", constraint("*")));

    let mut system = ModuleSystem::with_config(
        Arc::clone(&fx.repository),
        ModuleSystemConfig {
            platform: Some("zos".to_string()),
            arch: Some("s390x".to_string()),
            ..Default::default()
        },
    );
    let app_id = system.get_instance(&app).unwrap();
    let imports = system.imported_modules(app_id);
    assert_eq!(imports.len(), 1);
    assert_eq!(
        system.module(imports[0]).unwrap().definition().id(),
        exotic.id()
    );
}

#[test]
fn test_reexport_closure_follows_reexport_edges() {
    let mut fx = ModuleSystemFixture::new();
    fx.install(module("s", "1.0"));
    fx.install(module("y", "1.0").import("s", constraint("*")));
    fx.install(module("x", "1.0").import_dependency(
        ImportDependency::new("x", "y", constraint("*")).reexport(true),
    ));
    let p = fx.install(module("p", "1.0").import("x", constraint("*")));

    let p_id = fx.system.get_instance(&p).unwrap();
    let closure = fx.system.reexport_closure(p_id);

    let mut names: Vec<_> = closure
        .iter()
        .map(|&id| fx.system.module(id).unwrap().definition().name().to_string())
        .collect();
    names.sort();
    // x enters as a direct import; x reexports y; y's plain imports follow
    // because y was entered through a reexport edge
    assert_eq!(names, vec!["s", "x", "y"]);
}

#[test]
fn test_reexport_closure_stops_at_plain_edges() {
    let mut fx = ModuleSystemFixture::new();
    fx.install(module("s", "1.0"));
    fx.install(module("y", "1.0").import("s", constraint("*")));
    fx.install(module("x", "1.0").import("y", constraint("*")));
    let p = fx.install(module("p", "1.0").import("x", constraint("*")));

    let p_id = fx.system.get_instance(&p).unwrap();
    let closure = fx.system.reexport_closure(p_id);

    let mut names: Vec<_> = closure
        .iter()
        .map(|&id| fx.system.module(id).unwrap().definition().name().to_string())
        .collect();
    names.sort();
    // Only the direct import is visible; nothing beyond x is reexported
    assert_eq!(names, vec!["x"]);
}
