use std::sync::Arc;

use pointcut_classfile::opcodes::*;
use pointcut_classfile::{FrameValue, InsnId, MethodBuilder, MethodNode};
use pointcut_core::{CancellationToken, Cancelled};
use pointcut_flow::{locals_at, LocalVariable, LocalsContext, LocalsError, LocalsSettings};
use pointcut_test_utils::fixtures::{self, TARGET};
use pretty_assertions::assert_eq;

use super::call_site;

#[test]
fn declared_local_is_visible_at_the_following_call() {
    let method = fixtures::local();
    let ctx = LocalsContext::new(TARGET, &method, None, LocalsSettings::DEFAULT);
    let at = call_site(&method, "foo");

    let table = locals_at(&ctx, at, &CancellationToken::new()).unwrap();
    let x = table.get(1).expect("slot 1 is live");
    assert_eq!(x.name, "x");
    assert_eq!(x.desc, "I");
    assert_eq!(table.get(0).map(|this| this.name.as_str()), Some("this"));
}

#[test]
fn repeated_queries_agree() {
    let method = fixtures::mixed();
    let ctx = LocalsContext::new(TARGET, &method, None, LocalsSettings::DEFAULT);
    let cancel = CancellationToken::new();
    let at = call_site(&method, "log");

    let first = locals_at(&ctx, at, &cancel).unwrap();
    let second = locals_at(&ctx, at, &cancel).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.iter().map(|var| var.name.as_str()).collect::<Vec<_>>(),
        vec!["this", "s", "data", "n", "sb"]
    );
}

#[test]
fn store_becomes_visible_only_after_the_storing_instruction() {
    let method = fixtures::local();
    let ctx = LocalsContext::new(TARGET, &method, None, LocalsSettings::DEFAULT);
    let store = method
        .instructions
        .iter()
        .find_map(|(id, insn)| (insn.opcode() == Some(ISTORE)).then_some(id))
        .unwrap();

    let cancel = CancellationToken::new();
    let at_store = locals_at(&ctx, store, &cancel).unwrap();
    assert!(at_store.get(1).is_none());
    let after = locals_at(&ctx, method.instructions.next(store).unwrap(), &cancel).unwrap();
    assert_eq!(after.get(1).map(|var| var.name.as_str()), Some("x"));
}

#[test]
fn unavailable_without_any_table() {
    let mut b = MethodBuilder::new("t/T", ACC_STATIC, "m", "()V").unwrap();
    b.insn(ICONST_1).var(ISTORE, 0).insn(RETURN);
    let method = b.build();
    let ctx = LocalsContext::new("t/T", &method, None, LocalsSettings::DEFAULT);

    let err = locals_at(&ctx, InsnId::new(1), &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, LocalsError::Unavailable(_)), "{err:?}");
}

#[test]
fn cancellation_is_propagated() {
    let method = fixtures::local();
    let ctx = LocalsContext::new(TARGET, &method, None, LocalsSettings::DEFAULT);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = locals_at(&ctx, InsnId::new(2), &cancel).unwrap_err();
    assert_eq!(err, LocalsError::Cancelled(Cancelled));
}

/// `int x = 1; use(x);` followed by a `CHOP` frame, then `extra` frames and
/// optionally a reload of slot 0, then three `NOP`s and a return.
///
/// Only a synthesized table describes `x`, ending at the chop.
struct Chopped {
    method: MethodNode,
    generated: Arc<[LocalVariable]>,
    after_chop: InsnId,
}

fn chopped(extra_frames: usize, reload: bool) -> Chopped {
    let mut b = MethodBuilder::new("t/T", ACC_STATIC, "m", "()V").unwrap();
    b.insn(ICONST_1).var(ISTORE, 0);
    b.mark();
    b.frame_append(vec![FrameValue::Integer]);
    b.var(ILOAD, 0).insn(POP);
    b.mark();
    b.frame_chop(1);
    for _ in 0..extra_frames {
        b.frame_same();
    }
    if reload {
        b.var(ILOAD, 0).insn(POP);
    }
    b.insn(NOP).insn(NOP).insn(NOP).insn(RETURN);
    let method = b.build();

    let position = |pred: &dyn Fn(&pointcut_classfile::Insn) -> bool, nth: usize| {
        method
            .instructions
            .iter()
            .filter(|(_, insn)| pred(insn))
            .nth(nth)
            .map(|(id, _)| id)
            .unwrap()
    };
    let start = position(&|insn| matches!(insn, pointcut_classfile::Insn::Label(_)), 0);
    let end = position(&|insn| matches!(insn, pointcut_classfile::Insn::Label(_)), 1);
    let first_nop = position(&|insn| insn.opcode() == Some(NOP), 0);
    let generated: Arc<[LocalVariable]> = vec![LocalVariable {
        name: "var0".into(),
        desc: "I".into(),
        index: 0,
        start,
        end,
    }]
    .into();
    Chopped {
        method,
        generated,
        after_chop: first_nop,
    }
}

fn slot0_at(fixture: &Chopped, at: InsnId, settings: LocalsSettings) -> Option<String> {
    let ctx = LocalsContext::new(
        "t/T",
        &fixture.method,
        Some(fixture.generated.clone()),
        settings,
    );
    locals_at(&ctx, at, &CancellationToken::new())
        .unwrap()
        .get(0)
        .map(|var| var.name.clone())
}

#[test]
fn freshly_chopped_local_is_still_reported() {
    let fixture = chopped(0, false);
    let at = fixture.after_chop;
    assert_eq!(
        slot0_at(&fixture, at, LocalsSettings::DEFAULT).as_deref(),
        Some("var0")
    );
}

#[test]
fn chopped_local_decays_after_one_instruction() {
    let fixture = chopped(0, false);
    let later = fixture.method.instructions.next(fixture.after_chop).unwrap();
    assert_eq!(slot0_at(&fixture, later, LocalsSettings::DEFAULT), None);
}

#[test]
fn load_resurrects_a_chopped_local_only_when_enabled() {
    let fixture = chopped(0, true);
    // Two instructions past the reload: the zombie would have decayed.
    let at = fixture.method.instructions.next(fixture.after_chop).unwrap();

    assert_eq!(
        slot0_at(&fixture, at, LocalsSettings::DEFAULT).as_deref(),
        Some("var0")
    );
    assert_eq!(slot0_at(&fixture, at, LocalsSettings::COMPATIBLE), None);
}

#[test]
fn zombie_past_its_frame_threshold_stays_dead() {
    // The chop plus two `SAME` frames: two frames survived, limit is one.
    let fixture = chopped(2, true);
    let at = fixture.method.instructions.next(fixture.after_chop).unwrap();
    assert_eq!(slot0_at(&fixture, at, LocalsSettings::DEFAULT), None);

    let unbounded = LocalsSettings {
        chopped_frame_threshold: None,
        ..LocalsSettings::DEFAULT
    };
    assert_eq!(slot0_at(&fixture, at, unbounded).as_deref(), Some("var0"));
}
