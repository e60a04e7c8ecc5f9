//! Batch redefinition and retransformation semantics

use reweave_engine::{Engine, EngineConfig, EngineError, LoaderId, UnitDefinition, UnitId};
use reweave_image::{MethodDef, UnitImage};
use reweave_sdk::{TransformContext, TransformResult, Transformer};
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn image(name: &str) -> UnitImage {
    UnitImage::new(name)
}

fn image_with_super(name: &str, supertype: &str) -> Vec<u8> {
    let mut image = UnitImage::new(name);
    image.supertype = Some(supertype.to_string());
    image.encode()
}

fn method_names(bytes: &[u8]) -> Vec<String> {
    UnitImage::decode(bytes)
        .unwrap()
        .methods
        .iter()
        .map(|m| m.name.clone())
        .collect()
}

/// Decodes its input, appends one empty method, re-encodes.
/// Keeps chain outputs valid images so they survive load validation.
struct AddMethod(&'static str);

impl Transformer for AddMethod {
    fn name(&self) -> &str {
        self.0
    }

    fn transform(&self, _ctx: &TransformContext<'_>, bytes: &[u8]) -> TransformResult {
        let mut image = match UnitImage::decode(bytes) {
            Ok(image) => image,
            Err(e) => {
                return TransformResult::Failed(reweave_sdk::TransformError::UnreadableInput(
                    e.to_string(),
                ))
            }
        };
        image.methods.push(MethodDef {
            name: self.0.to_string(),
            param_count: 0,
            code: Vec::new(),
        });
        TransformResult::Transformed(image.encode())
    }
}

fn load(engine: &Engine, name: &str) -> UnitId {
    engine
        .load_unit(name, LoaderId::BOOTSTRAP, image(name).encode())
        .unwrap()
}

// ============================================================================
// Redefine
// ============================================================================

#[test]
fn test_redefine_replaces_active_only() {
    let engine = Engine::default();
    let unit = load(&engine, "app.Main");

    let mut replacement = image("app.Main");
    replacement.fields.push("state".to_string());
    engine
        .redefine(vec![UnitDefinition::new(unit.clone(), replacement.encode())])
        .unwrap();

    let active = engine.current_representation(&unit).unwrap();
    assert_eq!(UnitImage::decode(active.bytes()).unwrap().fields, vec!["state"]);
    // The initial baseline never changes
    let initial = engine.initial_representation(&unit).unwrap();
    assert!(UnitImage::decode(initial.bytes()).unwrap().fields.is_empty());
}

#[test]
fn test_empty_batch_is_a_committed_noop() {
    let engine = Engine::default();
    let report = engine.redefine(Vec::new()).unwrap();
    assert_eq!(report.state, reweave_engine::BatchState::Committed);
    assert!(report.units.is_empty());
    engine.retransform(Vec::new()).unwrap();
}

#[test]
fn test_identity_mismatch_aborts_whole_batch() {
    let engine = Engine::default();
    let a = load(&engine, "app.A");
    let b = load(&engine, "app.B");

    let before_b = engine.current_representation(&b).unwrap();

    let mut b_replacement = image("app.B");
    b_replacement.fields.push("newer".to_string());
    let err = engine
        .redefine(vec![
            // A's bytes declare a different name than A's identity
            UnitDefinition::new(a.clone(), image("app.Other").encode()),
            UnitDefinition::new(b.clone(), b_replacement.encode()),
        ])
        .unwrap_err();
    assert!(matches!(err, EngineError::IdentityMismatch { .. }));

    // No unit in the batch changed
    let after_b = engine.current_representation(&b).unwrap();
    assert!(before_b.same_bytes(&after_b));
    assert_eq!(after_b.version(), before_b.version());
    assert_eq!(engine.current_representation(&a).unwrap().version(), 0);
}

#[test]
fn test_malformed_bytes_abort_whole_batch() {
    let engine = Engine::default();
    let a = load(&engine, "app.A");
    let b = load(&engine, "app.B");

    let mut corrupt = image("app.A").encode();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;

    let err = engine
        .redefine(vec![
            UnitDefinition::new(a, corrupt),
            UnitDefinition::new(b.clone(), image("app.B").encode()),
        ])
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedDefinition { .. }));
    assert_eq!(engine.current_representation(&b).unwrap().version(), 0);
}

#[test]
fn test_circular_supertypes_rejected_across_batch() {
    let engine = Engine::default();
    let a = engine
        .load_unit("app.A", LoaderId::BOOTSTRAP, image_with_super("app.A", "app.B"))
        .unwrap();
    let b = load(&engine, "app.B");

    // Making B extend A would close the cycle A -> B -> A
    let err = engine
        .redefine(vec![UnitDefinition::new(
            b.clone(),
            image_with_super("app.B", "app.A"),
        )])
        .unwrap_err();
    assert!(matches!(err, EngineError::CircularDependency(_)));
    assert_eq!(engine.current_representation(&b).unwrap().version(), 0);

    // Rewriting both units in one batch so the cycle disappears is fine
    engine
        .redefine(vec![
            UnitDefinition::new(a, image("app.A").encode()),
            UnitDefinition::new(b, image_with_super("app.B", "app.A")),
        ])
        .unwrap();
}

#[test]
fn test_duplicate_unit_in_batch_rejected() {
    let engine = Engine::default();
    let unit = load(&engine, "app.Main");
    let err = engine
        .redefine(vec![
            UnitDefinition::new(unit.clone(), image("app.Main").encode()),
            UnitDefinition::new(unit, image("app.Main").encode()),
        ])
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[test]
fn test_unknown_unit_rejected() {
    let engine = Engine::default();
    let ghost = UnitId::bootstrap("app.Ghost");
    let err = engine
        .redefine(vec![UnitDefinition::new(ghost, image("app.Ghost").encode())])
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[test]
fn test_redefine_without_capability() {
    let engine = Engine::new(EngineConfig {
        can_redefine: false,
        ..EngineConfig::default()
    });
    assert!(!engine.supports_redefine());
    let err = engine.redefine(Vec::new()).unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedCapability("redefine")));
}

// ============================================================================
// Retransform
// ============================================================================

#[test]
fn test_load_applies_chain_in_order() {
    let engine = Engine::default();
    engine.add_transformer(Arc::new(AddMethod("t1")), false).unwrap();
    engine.add_transformer(Arc::new(AddMethod("t2")), true).unwrap();

    let unit = load(&engine, "app.Main");
    let active = engine.current_representation(&unit).unwrap();
    assert_eq!(method_names(active.bytes()), vec!["t1", "t2"]);
    // Initial baseline is the pre-transformation bytes
    let initial = engine.initial_representation(&unit).unwrap();
    assert!(method_names(initial.bytes()).is_empty());
}

#[test]
fn test_retransform_reuses_incapable_output_and_reruns_capable() {
    let engine = Engine::default();
    engine.add_transformer(Arc::new(AddMethod("t1")), false).unwrap();
    engine.add_transformer(Arc::new(AddMethod("t2")), true).unwrap();

    let unit = load(&engine, "app.Main");
    engine.retransform(vec![unit.clone()]).unwrap();

    // T1's recorded output replayed, T2 re-invoked on top: still [t1, t2],
    // not [t1, t2, t2] as recomputing from the active bytes would give
    let active = engine.current_representation(&unit).unwrap();
    assert_eq!(method_names(active.bytes()), vec!["t1", "t2"]);
}

#[test]
fn test_retransform_is_idempotent_from_initial_baseline() {
    let engine = Engine::default();
    engine.add_transformer(Arc::new(AddMethod("t1")), true).unwrap();

    let unit = load(&engine, "app.Main");
    engine.retransform(vec![unit.clone()]).unwrap();
    let first = engine.current_representation(&unit).unwrap();
    engine.retransform(vec![unit.clone()]).unwrap();
    let second = engine.current_representation(&unit).unwrap();

    assert!(first.same_bytes(&second));
    assert_eq!(first.digest(), second.digest());
}

#[test]
fn test_retransform_discards_prior_redefine() {
    let engine = Engine::default();
    engine.add_transformer(Arc::new(AddMethod("t1")), true).unwrap();
    let unit = load(&engine, "app.Main");

    let mut patched = image("app.Main");
    patched.methods.push(MethodDef {
        name: "patched".to_string(),
        param_count: 0,
        code: Vec::new(),
    });
    engine
        .redefine(vec![UnitDefinition::new(unit.clone(), patched.encode())])
        .unwrap();

    // Retransform starts from the initial baseline, not the redefined bytes
    engine.retransform(vec![unit.clone()]).unwrap();
    let active = engine.current_representation(&unit).unwrap();
    assert_eq!(method_names(active.bytes()), vec!["t1"]);
}

#[test]
fn test_retransform_without_capability() {
    let engine = Engine::new(EngineConfig {
        can_retransform: false,
        ..EngineConfig::default()
    });
    assert!(!engine.supports_retransform());
    let err = engine.retransform(Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnsupportedCapability("retransform")
    ));

    // Registering a retransform-capable transformer is equally unsupported
    let err = engine
        .add_transformer(Arc::new(AddMethod("t1")), true)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnsupportedCapability("retransform")
    ));
    // An incapable registration is fine
    engine.add_transformer(Arc::new(AddMethod("t1")), false).unwrap();
}

// ============================================================================
// Active frames across redefinition
// ============================================================================

#[test]
fn test_in_flight_invocation_keeps_old_bytes() {
    let engine = Engine::default();
    let unit = load(&engine, "app.Main");

    let invocation = engine.begin_invocation(&unit).unwrap();
    let old_digest = invocation.representation().digest();

    let mut replacement = image("app.Main");
    replacement.fields.push("v2".to_string());
    engine
        .redefine(vec![UnitDefinition::new(unit.clone(), replacement.encode())])
        .unwrap();

    // The pinned invocation still reads the old representation
    assert_eq!(invocation.representation().digest(), old_digest);
    assert_eq!(engine.live_frames_at(&unit, 0), 1);

    // A fresh invocation observes the new one
    let fresh = engine.begin_invocation(&unit).unwrap();
    assert_ne!(fresh.representation().digest(), old_digest);
    assert_eq!(fresh.representation().version(), 1);

    drop(invocation);
    assert_eq!(engine.live_frames_at(&unit, 0), 0);
    assert_eq!(engine.live_frames(&unit), 1);
}
