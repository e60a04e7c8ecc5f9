//! Engine facade: loading, lookup, introspection, modules, prefixes

use reweave_engine::{
    Engine, EngineConfig, EngineError, LoaderId, ModuleDescriptor, ModuleExpansion, SearchList,
    UnitKind,
};
use reweave_image::UnitImage;
use reweave_sdk::{TransformContext, TransformResult, Transformer};
use std::fs;
use std::sync::Arc;

struct Noop;

impl Transformer for Noop {
    fn name(&self) -> &str {
        "noop"
    }

    fn transform(&self, _ctx: &TransformContext<'_>, _bytes: &[u8]) -> TransformResult {
        TransformResult::Unchanged
    }
}

// ============================================================================
// Loading and lookup
// ============================================================================

#[test]
fn test_duplicate_load_rejected() {
    let engine = Engine::default();
    let bytes = UnitImage::new("app.Main").encode();
    engine
        .load_unit("app.Main", LoaderId::BOOTSTRAP, bytes.clone())
        .unwrap();
    let err = engine
        .load_unit("app.Main", LoaderId::BOOTSTRAP, bytes)
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateDefinition(_)));
}

#[test]
fn test_load_rejects_malformed_bytes() {
    let engine = Engine::default();
    let err = engine
        .load_unit("app.Main", LoaderId::BOOTSTRAP, vec![1, 2, 3])
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedDefinition { .. }));
}

#[test]
fn test_find_unit_records_initiation() {
    let engine = Engine::default();
    let bytes = UnitImage::new("app.Main").encode();
    let unit = engine
        .load_unit("app.Main", LoaderId::BOOTSTRAP, bytes)
        .unwrap();

    let requester = LoaderId(9);
    let found = engine.find_unit("app.Main", requester).unwrap();
    assert_eq!(found, unit);

    assert_eq!(engine.initiated_units(requester), vec![unit.clone()]);
    // The defining loader initiated it at load time
    assert_eq!(engine.initiated_units(LoaderId::BOOTSTRAP), vec![unit]);
}

#[test]
fn test_find_unit_falls_back_to_search_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("app.FromDisk.rwu"),
        UnitImage::new("app.FromDisk").encode(),
    )
    .unwrap();

    let engine = Engine::default();
    assert!(matches!(
        engine.find_unit("app.FromDisk", LoaderId(4)),
        Err(EngineError::NotFound(_))
    ));

    engine
        .append_search_path(SearchList::System, dir.path())
        .unwrap();
    let unit = engine.find_unit("app.FromDisk", LoaderId(4)).unwrap();
    assert_eq!(unit.loader, LoaderId::SYSTEM);
    assert!(engine
        .initiated_units(LoaderId(4))
        .contains(&unit));
}

#[test]
fn test_all_loaded_units() {
    let engine = Engine::default();
    engine
        .load_unit("app.A", LoaderId::BOOTSTRAP, UnitImage::new("app.A").encode())
        .unwrap();
    engine
        .load_unit("app.B", LoaderId::BOOTSTRAP, UnitImage::new("app.B").encode())
        .unwrap();
    engine
        .register_builtin("int[]", LoaderId::BOOTSTRAP, UnitKind::Array)
        .unwrap();

    let mut names: Vec<String> = engine
        .all_loaded_units()
        .into_iter()
        .map(|u| u.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["app.A", "app.B", "int[]"]);
}

// ============================================================================
// Modifiability and sizing
// ============================================================================

#[test]
fn test_array_unit_never_modifiable() {
    let engine = Engine::default();
    let array = engine
        .register_builtin("int[]", LoaderId::BOOTSTRAP, UnitKind::Array)
        .unwrap();
    let primitive = engine
        .register_builtin("int", LoaderId::BOOTSTRAP, UnitKind::Primitive)
        .unwrap();

    assert!(!engine.is_modifiable(&array));
    assert!(!engine.is_modifiable(&primitive));

    // Redefining them aborts with Unmodifiable even with all capabilities on
    let err = engine
        .redefine(vec![reweave_engine::UnitDefinition::new(
            array,
            UnitImage::new("int[]").encode(),
        )])
        .unwrap_err();
    assert!(matches!(err, EngineError::Unmodifiable(_)));
}

#[test]
fn test_register_builtin_rejects_class_kind() {
    let engine = Engine::default();
    assert!(matches!(
        engine.register_builtin("app.Main", LoaderId::BOOTSTRAP, UnitKind::Class),
        Err(EngineError::InvalidArgument(_))
    ));
}

#[test]
fn test_object_size_follows_declared_fields() {
    let engine = Engine::default();
    let mut image = UnitImage::new("app.Point");
    image.fields.push("x".to_string());
    image.fields.push("y".to_string());
    let unit = engine
        .load_unit("app.Point", LoaderId::BOOTSTRAP, image.encode())
        .unwrap();

    // Header plus one slot per field
    assert_eq!(engine.object_size(&unit).unwrap(), 16 + 2 * 8);
}

// ============================================================================
// Modules
// ============================================================================

#[test]
fn test_module_expansion_through_facade() {
    let engine = Engine::default();
    let descriptor = ModuleDescriptor::new("app.core", ["app.api"]);
    engine.define_module(descriptor).unwrap();

    assert!(engine.is_modifiable_module("app.core"));
    assert!(!engine.is_modifiable_module("ghost"));

    let mut expansion = ModuleExpansion::empty();
    expansion.reads.insert("lib.other".to_string());
    engine.expand_module(Some("app.core"), &expansion).unwrap();
    engine.expand_module(None, &expansion).unwrap(); // unnamed: no-op

    let descriptor = engine.module_descriptor("app.core").unwrap();
    assert!(descriptor.reads.contains("lib.other"));
}

// ============================================================================
// Native prefixes
// ============================================================================

#[test]
fn test_native_prefix_capability_gate() {
    let engine = Engine::new(EngineConfig {
        can_set_native_prefix: false,
        ..EngineConfig::default()
    });
    assert!(!engine.supports_native_prefix());

    let id = engine.add_transformer(Arc::new(Noop), false).unwrap();
    let err = engine.set_native_prefix(id, Some("wrapped_")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnsupportedCapability("native-prefix")
    ));
}

#[test]
fn test_native_prefix_composition_and_resolution() {
    let engine = Engine::default();
    let first = engine.add_transformer(Arc::new(Noop), false).unwrap();
    let second = engine.add_transformer(Arc::new(Noop), false).unwrap();
    engine.set_native_prefix(first, Some("wrapped_")).unwrap();
    engine.set_native_prefix(second, Some("$$")).unwrap();

    assert_eq!(engine.compose_native_symbol("foo"), "$$wrapped_foo");

    // Only the first transformer wrapped this symbol; the second is skipped
    let found = engine.resolve_native_symbol("foo", |name| name == "wrapped_foo");
    assert_eq!(found.as_deref(), Some("wrapped_foo"));
}

#[test]
fn test_unregister_forgets_prefix() {
    let engine = Engine::default();
    let noop: Arc<dyn Transformer> = Arc::new(Noop);
    let id = engine.add_transformer(noop.clone(), false).unwrap();
    engine.set_native_prefix(id, Some("wrapped_")).unwrap();

    assert!(engine.remove_transformer(&noop));
    assert_eq!(engine.compose_native_symbol("foo"), "foo");
    assert!(!engine.remove_transformer(&noop));
}

// ============================================================================
// Capability stability
// ============================================================================

#[test]
fn test_capability_queries_are_stable() {
    let engine = Engine::new(EngineConfig {
        can_redefine: true,
        can_retransform: false,
        can_set_native_prefix: true,
    });
    for _ in 0..3 {
        assert!(engine.supports_redefine());
        assert!(!engine.supports_retransform());
        assert!(engine.supports_native_prefix());
    }
}
