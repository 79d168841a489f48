//! The fixture methods again, compiled by a real `javac`. Run with `--ignored`.

use std::sync::Arc;

use pointcut_classfile::ClassNode;
use pointcut_core::CancellationToken;
use pointcut_resolve::{AtResolver, AtSpec, MatchResult, MemoryIndex, Mode, ResolveError, TargetMethod};
use pointcut_test_utils::javac::{compile_snippet, javac_available};
use pretty_assertions::assert_eq;

use super::call_site;

const SOURCE: &str = r#"
import java.util.List;

public class Test {
    int count;

    void foo() {}

    void tail() {
        foo();
    }

    void local() {
        int x = 1;
        foo();
    }

    void calls() {
        foo(); foo(); foo(); foo(); foo();
    }

    void eachList(List<String> list) {
        for (String s : list) {
            count++;
        }
    }

    void eachArray(String[] array) {
        for (String s : array) {
            count++;
        }
    }
}
"#;

struct Compiled {
    resolver: AtResolver,
    class: Arc<ClassNode>,
}

impl Compiled {
    fn new() -> Option<Self> {
        if !javac_available() {
            eprintln!("skipping: javac not found");
            return None;
        }
        let out = compile_snippet(SOURCE).expect("javac should run");
        assert!(out.success(), "javac failed:\n{}", out.stderr);
        let index = Arc::new(MemoryIndex::new());
        let class = index
            .add_class_bytes(out.class("Test").expect("Test.class"))
            .expect("javac output should parse");
        Some(Self {
            resolver: AtResolver::new(index),
            class,
        })
    }

    fn target(&self, name: &str) -> TargetMethod<'_> {
        TargetMethod::find(&self.class, name, None).expect("method exists")
    }

    fn resolve(&self, at: &AtSpec, name: &str) -> Result<Vec<MatchResult>, ResolveError> {
        self.resolver
            .resolve(at, self.target(name), Mode::All, &CancellationToken::new())
    }
}

#[test]
#[ignore = "requires javac"]
fn tail_return_of_a_void_method() {
    let Some(compiled) = Compiled::new() else { return };
    let results = compiled.resolve(&AtSpec::new("TAIL"), "tail").unwrap();
    assert_eq!(results.len(), 1);
    let method = compiled.target("tail").method;
    assert!(method.instructions[results[0].insn].is_return());
}

#[test]
#[ignore = "requires javac"]
fn declared_local_is_live_at_the_call() {
    let Some(compiled) = Compiled::new() else { return };
    let target = compiled.target("local");
    let at = call_site(target.method, "foo");
    let table = compiled
        .resolver
        .locals_at(target, at, &CancellationToken::new())
        .unwrap();
    let x = table.get(1).expect("slot 1 is live");
    assert_eq!((x.name.as_str(), x.desc.as_str()), ("x", "I"));
}

#[test]
#[ignore = "requires javac"]
fn ordinals_over_repeated_calls() {
    let Some(compiled) = Compiled::new() else { return };
    let at = AtSpec::new("INVOKE").with_target("LTest;foo()V");
    let all = compiled.resolve(&at, "calls").unwrap();
    assert_eq!(all.len(), 5);

    let third = compiled.resolve(&at.clone().with_ordinal(2), "calls").unwrap();
    assert_eq!(third, vec![all[2].clone()]);

    assert_eq!(
        compiled.resolve(&at.with_ordinal(10), "calls"),
        Err(ResolveError::NoMatch {
            blamed_filter: Some("ordinal".into())
        })
    );
}

#[test]
#[ignore = "requires javac"]
fn enhanced_for_calls() {
    let Some(compiled) = Compiled::new() else { return };
    let at = AtSpec::new("INVOKE").with_target("*");
    let method = compiled.target("eachList").method;
    let names: Vec<String> = compiled
        .resolve(&at, "eachList")
        .unwrap()
        .iter()
        .map(|result| match &method.instructions[result.insn] {
            pointcut_classfile::Insn::Method { name, .. } => name.clone(),
            other => panic!("not a call: {other}"),
        })
        .collect();
    assert_eq!(names, ["iterator", "hasNext", "next"]);

    assert!(matches!(
        compiled.resolve(&at, "eachArray"),
        Err(ResolveError::NoMatch { .. })
    ));
}
