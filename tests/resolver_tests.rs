//! Import-graph resolution: version selection, optional imports, cycles,
//! platform binding, and parent-chain search

mod common;
use common::*;

use modsys::repository::{MemoryRepository, Repository, SearchMode};
use modsys::resolver::{resolve, PlatformContext, ResolveOptions, Resolver};
use modsys::ModuleError;
use std::sync::Arc;

#[test]
fn test_selects_highest_version_inside_range() {
    let fx = ModuleSystemFixture::new();
    fx.install(module("dep", "1.0"));
    let expected = fx.install(module("dep", "1.5"));
    fx.install(module("dep", "2.0"));
    let app = fx.install(module("app", "1.0").import("dep", constraint("[1.0, 2.0)")));

    let graph = resolve(&app, &fx.repository).unwrap();
    let selected = graph.selected(app.id(), 0).unwrap();
    assert_eq!(selected.id(), expected.id());
    assert_eq!(selected.version(), &v(1, 5, 0));
}

#[test]
fn test_required_import_without_candidate_fails() {
    let fx = ModuleSystemFixture::new();
    let app = fx.install(module("app", "1.0").import("ghost", constraint("2.0+")));

    match resolve(&app, &fx.repository) {
        Err(ModuleError::DependencyNotFound {
            importer,
            target,
            constraint,
        }) => {
            assert_eq!(importer, "app");
            assert_eq!(target, "ghost");
            assert_eq!(constraint, "2.0.0+");
        }
        other => panic!("expected DependencyNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_optional_import_without_candidate_is_absent() {
    let fx = ModuleSystemFixture::new();
    let app = fx.install(
        module("app", "1.0").import_dependency(
            modsys::ImportDependency::new("app", "ghost", constraint("2.0+")).optional(true),
        ),
    );

    let graph = resolve(&app, &fx.repository).unwrap();
    assert!(graph.resolution(app.id(), 0).unwrap().is_absent());
    assert_eq!(graph.module_count(), 1);
}

#[test]
fn test_cyclic_imports_resolve_once() {
    let fx = ModuleSystemFixture::new();
    let a = fx.install(module("a", "1.0").import("b", constraint("*")));
    let b = fx.install(module("b", "1.0").import("a", constraint("*")));

    let graph = resolve(&a, &fx.repository).unwrap();
    assert_eq!(graph.module_count(), 2);
    assert!(graph.contains(a.id()));
    assert!(graph.contains(b.id()));
    assert_eq!(graph.selected(a.id(), 0).unwrap().id(), b.id());
    assert_eq!(graph.selected(b.id(), 0).unwrap().id(), a.id());
}

#[test]
fn test_diamond_edges_negotiate_independently() {
    let fx = ModuleSystemFixture::new();
    let shared_old = fx.install(module("shared", "1.0"));
    let shared_new = fx.install(module("shared", "2.0"));
    let left = fx.install(module("left", "1.0").import("shared", constraint("[1.0, 1.1)")));
    let right = fx.install(module("right", "1.0").import("shared", constraint("2.0+")));
    let app = fx.install(
        module("app", "1.0")
            .import("left", constraint("*"))
            .import("right", constraint("*")),
    );

    // Each edge picks its own version; one name may resolve twice
    let graph = resolve(&app, &fx.repository).unwrap();
    assert_eq!(graph.selected(left.id(), 0).unwrap().id(), shared_old.id());
    assert_eq!(graph.selected(right.id(), 0).unwrap().id(), shared_new.id());
    assert_eq!(graph.module_count(), 5);
}

#[test]
fn test_platform_bound_candidates() {
    let fx = ModuleSystemFixture::new();
    fx.install(module("native", "1.0"));
    let bound = fx.install(module("native", "1.0").platform("linux").arch("x86_64"));
    fx.install(module("native", "2.0").platform("zos").arch("s390x"));
    let app = fx.install(module("app", "1.0").import("native", constraint("*")));

    let options = ResolveOptions {
        search_mode: SearchMode::LocalOnly,
        platform: PlatformContext::new("linux", "x86_64"),
    };
    let graph = Resolver::with_options(&fx.repository, options)
        .resolve(&app)
        .unwrap();

    // The foreign-platform 2.0 is ineligible; among the 1.0s the bound one
    // outranks the neutral one
    let selected = graph.selected(app.id(), 0).unwrap();
    assert_eq!(selected.id(), bound.id());
}

#[test]
fn test_parent_chain_search_modes() {
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

    let local_only = ResolveOptions {
        search_mode: SearchMode::LocalOnly,
        platform: PlatformContext::detect(),
    };
    assert!(matches!(
        Resolver::with_options(&child, local_only).resolve(&app),
        Err(ModuleError::DependencyNotFound { .. })
    ));

    let chained = ResolveOptions {
        search_mode: SearchMode::IncludeParents,
        platform: PlatformContext::detect(),
    };
    let graph = Resolver::with_options(&child, chained).resolve(&app).unwrap();
    assert_eq!(graph.selected(app.id(), 0).unwrap().name(), "dep");
}

#[test]
fn test_transitive_optional_imports() {
    let fx = ModuleSystemFixture::new();
    fx.install(module("base", "1.0"));
    let mid = fx.install(
        module("mid", "1.0")
            .import("base", constraint("*"))
            .import_dependency(
                modsys::ImportDependency::new("mid", "extras", constraint("*")).optional(true),
            ),
    );
    let app = fx.install(module("app", "1.0").import("mid", constraint("*")));

    let graph = resolve(&app, &fx.repository).unwrap();
    assert!(graph.selected(mid.id(), 0).is_some());
    assert!(graph.resolution(mid.id(), 1).unwrap().is_absent());
}
