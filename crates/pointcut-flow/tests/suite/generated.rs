use std::sync::Arc;

use pointcut_classfile::opcodes::*;
use pointcut_classfile::{InsnId, MethodBuilder, MethodNode};
use pointcut_core::CancellationToken;
use pointcut_flow::{
    analyze, generate_table, locals_at, AnalysisCache, LocalVariable, LocalsContext,
    LocalsSettings, NoHierarchy,
};
use pretty_assertions::assert_eq;

use super::call_site;

/// `static void m(int a) { int b = 5; foo(); }` without a local table.
fn undeclared() -> MethodNode {
    let mut b = MethodBuilder::new("t/T", ACC_STATIC, "m", "(I)V").unwrap();
    b.insn(ICONST_5).var(ISTORE, 1);
    b.method(INVOKESTATIC, "t/T", "foo", "()V");
    b.insn(RETURN);
    b.build()
}

#[test]
fn synthesized_table_names_slots_by_index() {
    let method = undeclared();
    let frames = analyze("t/T", &method, &NoHierarchy, &CancellationToken::new()).unwrap();
    let table = generate_table(&method, &frames);

    let store = InsnId::new(1);
    assert_eq!(
        table,
        vec![
            LocalVariable {
                name: "var0".into(),
                desc: "I".into(),
                index: 0,
                start: InsnId::new(0),
                end: InsnId::new(method.instructions.len()),
            },
            LocalVariable {
                name: "var1".into(),
                desc: "I".into(),
                index: 1,
                start: method.instructions.next(store).unwrap(),
                end: InsnId::new(method.instructions.len()),
            },
        ]
    );
}

#[test]
fn synthesized_local_is_reported_at_the_call() {
    let method = undeclared();
    let cache = AnalysisCache::new();
    let analysis = cache
        .analysis("t/T", &method, &NoHierarchy, 1, &CancellationToken::new())
        .unwrap();
    assert!(analysis.is_available());

    let ctx = LocalsContext::new(
        "t/T",
        &method,
        analysis.generated.clone(),
        LocalsSettings::DEFAULT,
    );
    let table = locals_at(&ctx, call_site(&method, "foo"), &CancellationToken::new()).unwrap();
    let var = table.get(1).expect("slot 1");
    assert_eq!((var.name.as_str(), var.desc.as_str()), ("var1", "I"));
}

/// `static void m(int a, int b)`: `y` is declared in slot 1 over a narrow
/// range only.
fn partially_declared() -> MethodNode {
    let mut b = MethodBuilder::new("t/T", ACC_STATIC, "m", "(II)V").unwrap();
    b.mark();
    b.insn(NOP);
    let y_start = b.mark();
    b.insn(NOP);
    let y_end = b.mark();
    b.insn(NOP).insn(NOP).insn(RETURN);
    b.mark();
    b.local_variable("y", "I", y_start, y_end, 1);
    b.build()
}

#[test]
fn declared_range_wins_where_it_applies() {
    let method = partially_declared();
    let ctx = LocalsContext::new("t/T", &method, None, LocalsSettings::DEFAULT);
    let inside = InsnId::new(3);
    assert_eq!(ctx.variable_at(inside, 1).map(|v| v.name), Some("y".into()));
}

#[test]
fn gaps_in_declared_table_are_filled_from_the_synthesized_one() {
    let method = partially_declared();
    let generated: Arc<[LocalVariable]> = vec![LocalVariable {
        name: "var1".into(),
        desc: "I".into(),
        index: 1,
        start: InsnId::new(0),
        end: InsnId::new(method.instructions.len()),
    }]
    .into();
    let ctx = LocalsContext::new("t/T", &method, Some(generated), LocalsSettings::DEFAULT);

    let outside = InsnId::new(6);
    assert_eq!(ctx.variable_at(outside, 1).map(|v| v.name), Some("var1".into()));
}

#[test]
fn nearest_declared_range_is_used_when_nothing_encloses() {
    let method = partially_declared();
    let ctx = LocalsContext::new("t/T", &method, None, LocalsSettings::DEFAULT);

    let outside = InsnId::new(6);
    assert_eq!(ctx.variable_at(outside, 1).map(|v| v.name), Some("y".into()));
    assert_eq!(ctx.variable_at(outside, 0), None);
}
