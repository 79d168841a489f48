use pointcut_core::CancellationToken;
use pointcut_resolve::AtSpec;
use pointcut_test_utils::fixtures::target_fixture;
use pretty_assertions::assert_eq;

use super::Env;

fn labels(env: &Env, code: &str, method: &str) -> Vec<String> {
    env.resolver
        .completion_variants(&AtSpec::new(code), env.target(method), &CancellationToken::new())
        .unwrap_or_else(|err| panic!("{code} in {method}: {err}"))
        .into_iter()
        .map(|item| item.label)
        .collect()
}

fn source_labels(code: &str, method: &str) -> Vec<String> {
    let env = Env::new();
    let source = target_fixture().source;
    let target = source
        .methods
        .iter()
        .find(|m| m.name == method)
        .expect("fixture method");
    env.resolver
        .source_completion_variants(&AtSpec::new(code), &source, target)
        .expect("known code")
        .into_iter()
        .map(|item| item.label)
        .collect()
}

#[test]
fn invocation_variants() {
    let env = Env::new();
    assert_eq!(
        labels(&env, "INVOKE", "mixed"),
        ["Lcom/example/Target;log(Ljava/lang/String;)V"]
    );
    assert_eq!(
        labels(&env, "INVOKE", "calls"),
        ["Lcom/example/Target;foo()V"]
    );
}

#[test]
fn variants_carry_the_instruction_as_detail() {
    let env = Env::new();
    let items = env
        .resolver
        .completion_variants(
            &AtSpec::new("INVOKE"),
            env.target("mixed"),
            &CancellationToken::new(),
        )
        .expect("completion");
    assert_eq!(
        items[0].detail.as_deref(),
        Some("INVOKEVIRTUAL com/example/Target.log (Ljava/lang/String;)V")
    );
}

#[test]
fn field_variants_are_distinct() {
    let env = Env::new();
    assert_eq!(
        labels(&env, "FIELD", "mixed"),
        [
            "Lcom/example/Target;values:[I",
            "Lcom/example/Target;count:I"
        ]
    );
}

#[test]
fn allocation_and_constant_variants() {
    let env = Env::new();
    assert_eq!(
        labels(&env, "NEW", "mixed"),
        ["(Ljava/lang/String;)Ljava/lang/StringBuilder;"]
    );
    assert_eq!(
        labels(&env, "CONSTANT", "mixed"),
        ["stringValue=x", "intValue=-1", "intValue=7", "stringValue=done"]
    );
}

#[test]
fn typed_target_is_ignored() {
    let env = Env::new();
    let at = AtSpec::new("INVOKE").with_target("Lcom/example/Target;nothing()V");
    let items = env
        .resolver
        .completion_variants(&at, env.target("calls"), &CancellationToken::new())
        .expect("completion");
    assert_eq!(items.len(), 1);
}

#[test]
fn source_variants_agree_with_bytecode() {
    let env = Env::new();
    for code in ["INVOKE", "FIELD", "NEW", "CONSTANT"] {
        assert_eq!(source_labels(code, "mixed"), labels(&env, code, "mixed"), "{code}");
    }
    assert_eq!(
        source_labels("INVOKE", "eachList"),
        labels(&env, "INVOKE", "eachList")
    );
}

#[test]
fn positional_kinds_have_no_variants() {
    let env = Env::new();
    assert!(labels(&env, "HEAD", "mixed").is_empty());
    assert!(labels(&env, "RETURN", "mixed").is_empty());
}
