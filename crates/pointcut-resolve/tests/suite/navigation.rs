use pointcut_classfile::opcodes::GETFIELD;
use pointcut_core::CancellationToken;
use pointcut_hir::{Expr, SourceClass, Stmt};
use pointcut_resolve::{AtSpec, SourceElement, SourceMatch};
use pointcut_test_utils::fixtures::target_fixture;
use pretty_assertions::assert_eq;

use super::{Env, FOO};

fn navigate(env: &Env, at: &AtSpec, method: &str) -> Vec<SourceMatch> {
    env.resolver
        .navigate(at, env.target(method), &CancellationToken::new())
        .unwrap_or_else(|err| panic!("{} in {method}: {err}", at.value))
}

/// The expression a match points at, looked up in `method`'s body.
fn expr<'s>(source: &'s SourceClass, method: &str, found: &SourceMatch) -> &'s Expr {
    let SourceElement::Expr(id) = found.element else {
        panic!("not an expression: {found:?}");
    };
    let body = source
        .methods
        .iter()
        .find(|m| m.name == method)
        .and_then(|m| m.body.as_ref())
        .expect("method with a body");
    &body.exprs[id]
}

fn callee(expr: &Expr) -> &str {
    match expr {
        Expr::Call { name, .. } => name,
        other => panic!("not a call: {other:?}"),
    }
}

#[test]
fn each_call_maps_to_its_source_expression() {
    let env = Env::new();
    let source = target_fixture().source;
    let all = navigate(&env, &AtSpec::new("INVOKE").with_target(FOO), "calls");
    assert_eq!(all.len(), 5);
    for found in &all {
        assert_eq!(callee(expr(&source, "calls", found)), "foo");
    }

    let fourth = navigate(
        &env,
        &AtSpec::new("INVOKE").with_target(FOO).with_ordinal(3),
        "calls",
    );
    assert_eq!(fourth, vec![all[3].clone()]);
}

#[test]
fn tail_maps_to_the_return_statement() {
    let env = Env::new();
    let source = target_fixture().source;
    let found = navigate(&env, &AtSpec::new("TAIL"), "tail");
    assert_eq!(found.len(), 1);
    let SourceElement::Stmt(stmt) = found[0].element else {
        panic!("not a statement: {:?}", found[0]);
    };
    let body = source
        .find_method("tail", "()V")
        .and_then(|m| m.body.as_ref())
        .expect("tail body");
    assert!(matches!(body.stmts[stmt], Stmt::Return { expr: None, .. }));
}

#[test]
fn implicit_return_maps_to_the_body_end() {
    let env = Env::new();
    let found = navigate(&env, &AtSpec::new("RETURN"), "local");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].element, SourceElement::End);
}

#[test]
fn field_reads_map_to_their_expressions() {
    let env = Env::new();
    let source = target_fixture().source;
    let at = AtSpec::new("FIELD")
        .with_target("Lcom/example/Target;values:[I")
        .with_opcode(GETFIELD);
    let found = navigate(&env, &at, "mixed");
    assert_eq!(found.len(), 2);
    for found in &found {
        assert!(matches!(
            expr(&source, "mixed", found),
            Expr::FieldRead { name, .. } if name == "values"
        ));
    }
}

#[test]
fn constructor_head_maps_to_the_field_initializer() {
    let env = Env::new();
    let found = navigate(&env, &AtSpec::new("CTOR_HEAD"), "<init>");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].element, SourceElement::Field(0));
}

#[test]
fn expanded_zero_condition_maps_to_the_comparison() {
    let env = Env::new();
    let source = target_fixture().source;
    let at = AtSpec::new("CONSTANT")
        .with_arg("intValue", "0")
        .with_arg("expandZeroConditions", "LESS_THAN_ZERO");
    let found = navigate(&env, &at, "mixed");
    assert_eq!(found.len(), 1);
    assert!(matches!(expr(&source, "mixed", &found[0]), Expr::Binary { .. }));
}

#[test]
fn lambda_bodies_map_into_the_enclosing_method() {
    let env = Env::new();
    let source = target_fixture().source;
    let found = navigate(&env, &AtSpec::new("INVOKE").with_target(FOO), "lambda$run$0");
    assert_eq!(found.len(), 1);
    assert_eq!(callee(expr(&source, "run", &found[0])), "foo");
}

#[test]
fn jumps_have_no_navigation_targets() {
    let env = Env::new();
    assert!(navigate(&env, &AtSpec::new("JUMP"), "mixed").is_empty());
}
