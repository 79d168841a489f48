use pointcut_classfile::{ClassNode, Insn, MethodNode};
use pointcut_hir::{walk, Event, WalkRoot};
use pointcut_test_utils::fixtures::{target_fixture, TARGET, TARGET_SOURCE_FILE};
use pretty_assertions::assert_eq;
use std::ops::ControlFlow;

fn real_opcodes(method: &MethodNode) -> Vec<u8> {
    method
        .instructions
        .iter()
        .filter_map(|(_, insn)| insn.opcode())
        .collect()
}

#[test]
fn fixture_class_round_trips_through_the_parser() {
    let fixture = target_fixture();
    let class = ClassNode::parse(&fixture.bytes).expect("fixture parses");

    assert_eq!(class.name, TARGET);
    assert_eq!(class.source_file.as_deref(), Some(TARGET_SOURCE_FILE));
    assert_eq!(class.methods.len(), fixture.methods.len());
    for built in &fixture.methods {
        let parsed = class
            .find_method(&built.name, Some(&built.desc))
            .unwrap_or_else(|| panic!("missing {}", built.name));
        assert_eq!(real_opcodes(parsed), real_opcodes(built), "{}", built.name);
        assert_eq!(parsed.local_variables.len(), built.local_variables.len());
    }
}

#[test]
fn lambda_call_site_keeps_its_bootstrap_arguments() {
    let fixture = target_fixture();
    let class = ClassNode::parse(&fixture.bytes).expect("fixture parses");
    let run = class.find_method("run", Some("()V")).expect("run");

    let indy = run
        .instructions
        .iter()
        .find_map(|(_, insn)| match insn {
            Insn::InvokeDynamic {
                bootstrap,
                bootstrap_args,
                ..
            } => Some((bootstrap.clone(), bootstrap_args.clone())),
            _ => None,
        })
        .expect("invokedynamic");
    assert_eq!(indy.0.owner, "java/lang/invoke/LambdaMetafactory");
    assert_eq!(indy.1.len(), 3);
}

#[test]
fn source_side_of_the_list_loop_has_three_implicit_calls() {
    let fixture = target_fixture();
    let method = fixture
        .source
        .find_method("eachList", "(Ljava/util/List;)V")
        .expect("eachList");
    let body = method.body.as_ref().expect("body");

    let mut implicit = 0;
    let _ = walk(body, WalkRoot::Stmt(body.root), &mut |_: &pointcut_hir::Body, event: Event| {
        if matches!(event, Event::Iterator(_) | Event::HasNext(_) | Event::Next(_)) {
            implicit += 1;
        }
        ControlFlow::Continue(())
    });
    assert_eq!(implicit, 3);
}
