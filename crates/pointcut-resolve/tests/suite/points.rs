use std::sync::Arc;

use pointcut_classfile::opcodes::*;
use pointcut_classfile::{Constant, Insn, MethodBuilder, MethodNode};
use pointcut_core::CancellationToken;
use pointcut_resolve::{
    AtResolver, AtSpec, ClassIndex, ConstantValue, Decoration, Element, LocalDiscriminator,
    MemoryIndex, Mode, ResolveError, TargetMethod,
};
use pointcut_test_utils::ClassAssembler;
use pretty_assertions::assert_eq;

use super::{call_site, Env, FOO};

fn invoked(env: &Env, at: &AtSpec, method: &str) -> Vec<String> {
    env.all(at, method)
        .into_iter()
        .map(|result| match result.element {
            Element::Method { name, .. } => name,
            other => panic!("not an invocation: {other:?}"),
        })
        .collect()
}

#[test]
fn tail_is_the_bare_return() {
    let env = Env::new();
    let found = env.all(&AtSpec::new("TAIL"), "tail");
    assert_eq!(found.len(), 1);
    assert_eq!(env.insn("tail", found[0].insn), &Insn::Plain { opcode: RETURN });

    let returns = env.all(&AtSpec::new("RETURN"), "tail");
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].insn, found[0].insn);
}

#[test]
fn head_is_the_first_real_instruction() {
    let env = Env::new();
    let found = env.all(&AtSpec::new("HEAD"), "tail");
    assert_eq!(found.len(), 1);
    assert_eq!(
        env.insn("tail", found[0].insn),
        &Insn::Var {
            opcode: ALOAD,
            var: 0
        }
    );
}

#[test]
fn declared_local_is_live_at_the_call() {
    let env = Env::new();
    let target = env.target("local");
    let at = call_site(target.method, "foo");
    let table = env
        .resolver
        .locals_at(target, at, &CancellationToken::new())
        .expect("locals should be available");
    let x = table.get(1).expect("slot 1 should be live");
    assert_eq!(x.name, "x");
    assert_eq!(x.desc, "I");
}

#[test]
fn enhanced_for_over_a_list_calls_the_iterator() {
    let env = Env::new();
    let at = AtSpec::new("INVOKE").with_target("*");
    assert_eq!(invoked(&env, &at, "eachList"), ["iterator", "hasNext", "next"]);

    assert_eq!(
        env.resolve_in(&at, "eachArray", Mode::All),
        Err(ResolveError::NoMatch {
            blamed_filter: None
        })
    );
}

#[test]
fn constructor_calls_are_not_invocations() {
    let env = Env::new();
    let at = AtSpec::new("INVOKE").with_target("*");
    assert_eq!(invoked(&env, &at, "mixed"), ["log"]);
}

#[test]
fn invoke_without_target_is_an_error() {
    let env = Env::new();
    assert_eq!(
        env.resolve_in(&AtSpec::new("INVOKE"), "calls", Mode::All),
        Err(ResolveError::MissingTarget("INVOKE".into()))
    );
}

#[test]
fn invoke_string_matches_the_pushed_literal() {
    let env = Env::new();
    let at = AtSpec::new("INVOKE_STRING")
        .with_target("Lcom/example/Target;log(Ljava/lang/String;)V")
        .with_arg("ldc", "done");
    let found = env.all(&at, "mixed");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].insn, call_site(env.method("mixed"), "log"));

    let other = AtSpec::new("INVOKE_STRING")
        .with_target("*")
        .with_arg("ldc", "other");
    assert!(env.resolve_in(&other, "mixed", Mode::All).is_err());
}

#[test]
fn field_reads_with_array_length() {
    let env = Env::new();
    let reads = AtSpec::new("FIELD")
        .with_target("Lcom/example/Target;values:[I")
        .with_opcode(GETFIELD);
    assert_eq!(env.all(&reads, "mixed").len(), 2);

    let length = reads.with_arg("array", "length");
    let found = env.all(&length, "mixed");
    assert_eq!(found.len(), 1);
    let [Decoration::ArrayInsn(companion)] = found[0].decorations[..] else {
        panic!("expected an array companion: {:?}", found[0].decorations);
    };
    assert_eq!(
        env.insn("mixed", companion),
        &Insn::Plain {
            opcode: ARRAYLENGTH
        }
    );
}

/// Resolves `at` against `method` alone in class `a/B`, returning the
/// instruction each match's array companion points at.
fn array_companions(method: MethodNode, at: &AtSpec) -> Vec<Insn> {
    let bytes = ClassAssembler::new("a/B")
        .field(ACC_PRIVATE, "names", "[Ljava/lang/String;")
        .field(ACC_PRIVATE, "counts", "[I")
        .method(method)
        .assemble()
        .expect("class should assemble");
    let index = Arc::new(MemoryIndex::new());
    let class = index.add_class_bytes(&bytes).expect("class should parse");
    let index: Arc<dyn ClassIndex> = index;
    let resolver = AtResolver::new(index);
    let method = &class.methods[0];
    resolver
        .resolve(
            at,
            TargetMethod::new(&class, method),
            Mode::All,
            &CancellationToken::new(),
        )
        .expect("resolves")
        .into_iter()
        .map(|result| match result.decorations[..] {
            [Decoration::ArrayInsn(companion)] => method.instructions[companion].clone(),
            ref other => panic!("expected an array companion: {other:?}"),
        })
        .collect()
}

#[test]
fn field_array_get_skips_the_index_expression() {
    // return this.names[this.counts[0]];
    let mut b = MethodBuilder::new("a/B", 0, "pick", "()Ljava/lang/String;").unwrap();
    b.var(ALOAD, 0).field(GETFIELD, "a/B", "names", "[Ljava/lang/String;");
    b.var(ALOAD, 0).field(GETFIELD, "a/B", "counts", "[I");
    b.insn(ICONST_0).insn(IALOAD).insn(AALOAD).insn(ARETURN);

    let at = AtSpec::new("FIELD")
        .with_target("La/B;names:[Ljava/lang/String;")
        .with_arg("array", "get");
    assert_eq!(
        array_companions(b.build(), &at),
        vec![Insn::Plain { opcode: AALOAD }]
    );
}

#[test]
fn field_array_set_skips_the_index_expression() {
    // this.names[this.counts[0] = 1] = "x";
    let mut b = MethodBuilder::new("a/B", 0, "store", "()V").unwrap();
    b.var(ALOAD, 0).field(GETFIELD, "a/B", "names", "[Ljava/lang/String;");
    b.var(ALOAD, 0).field(GETFIELD, "a/B", "counts", "[I");
    b.insn(ICONST_0).insn(ICONST_1).insn(DUP_X2).insn(IASTORE);
    b.ldc(Constant::String("x".into())).insn(AASTORE).insn(RETURN);

    let at = AtSpec::new("FIELD")
        .with_target("La/B;names:[Ljava/lang/String;")
        .with_arg("array", "set");
    assert_eq!(
        array_companions(b.build(), &at),
        vec![Insn::Plain { opcode: AASTORE }]
    );

    let counts = AtSpec::new("FIELD")
        .with_target("La/B;counts:[I")
        .with_arg("array", "set");
    assert_eq!(
        array_companions(b.build(), &counts),
        vec![Insn::Plain { opcode: IASTORE }]
    );
}

#[test]
fn field_rejects_a_non_field_opcode() {
    let env = Env::new();
    let at = AtSpec::new("FIELD")
        .with_target("Lcom/example/Target;count:I")
        .with_opcode(INVOKEVIRTUAL);
    assert!(matches!(
        env.resolve_in(&at, "mixed", Mode::All),
        Err(ResolveError::InvalidArgument { .. })
    ));
}

#[test]
fn new_is_paired_with_its_constructor() {
    let env = Env::new();
    let at = AtSpec::new("NEW").with_target("(Ljava/lang/String;)Ljava/lang/StringBuilder;");
    let found = env.all(&at, "mixed");
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].element,
        Element::New {
            class: "java/lang/StringBuilder".into(),
            ctor_desc: Some("(Ljava/lang/String;)V".into()),
        }
    );
    let [Decoration::Constructor(init)] = found[0].decorations[..] else {
        panic!("expected a constructor: {:?}", found[0].decorations);
    };
    assert_eq!(init, call_site(env.method("mixed"), "<init>"));

    let wrong = AtSpec::new("NEW").with_target("()Ljava/lang/StringBuilder;");
    assert!(env.resolve_in(&wrong, "mixed", Mode::All).is_err());
}

#[test]
fn zero_conditions_expand_to_the_jump() {
    let env = Env::new();
    let zero = AtSpec::new("CONSTANT").with_arg("intValue", "0");
    assert!(env.resolve_in(&zero, "mixed", Mode::All).is_err());

    let expanded = zero.with_arg("expandZeroConditions", "LESS_THAN_ZERO");
    let found = env.all(&expanded, "mixed");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].element, Element::Constant(ConstantValue::Int(0)));
    assert!(matches!(
        env.insn("mixed", found[0].insn),
        Insn::Jump { opcode: IFGE, .. }
    ));
}

#[test]
fn constants_by_value() {
    let env = Env::new();
    let found = env.all(&AtSpec::new("CONSTANT").with_arg("intValue", "7"), "mixed");
    assert_eq!(found.len(), 1);
    let found = env.all(
        &AtSpec::new("CONSTANT").with_arg("stringValue", "done"),
        "mixed",
    );
    assert_eq!(
        found[0].element,
        Element::Constant(ConstantValue::String("done".into()))
    );
}

#[test]
fn loads_of_a_named_local() {
    let env = Env::new();
    let at = AtSpec::new("LOAD").with_local(LocalDiscriminator::named("n"));
    let found = env.all(&at, "mixed");
    assert_eq!(found.len(), 2);
    for result in &found {
        assert_eq!(
            env.insn("mixed", result.insn),
            &Insn::Var {
                opcode: ILOAD,
                var: 3
            }
        );
        let Element::Local { slot, var } = &result.element else {
            panic!("not a local: {:?}", result.element);
        };
        assert_eq!(*slot, 3);
        assert_eq!(var.as_ref().map(|var| var.name.as_str()), Some("n"));
    }
}

#[test]
fn stores_of_a_unique_type() {
    let env = Env::new();
    let at = AtSpec::new("STORE").with_local(LocalDiscriminator::typed("Ljava/lang/StringBuilder;"));
    let found = env.all(&at, "mixed");
    assert_eq!(found.len(), 1);
    assert_eq!(
        env.insn("mixed", found[0].insn),
        &Insn::Var {
            opcode: ASTORE,
            var: 4
        }
    );
}

#[test]
fn ctor_head_follows_the_field_initializers() {
    let env = Env::new();
    let init = env.method("<init>");
    let found = env.all(&AtSpec::new("CTOR_HEAD"), "<init>");
    assert_eq!(found.len(), 1);
    assert_eq!(env.insn("<init>", found[0].insn), &Insn::Plain { opcode: RETURN });

    let delegate = AtSpec::new("CTOR_HEAD").with_arg("enforce", "POST_DELEGATE");
    let found = env.all(&delegate, "<init>");
    let after_super = init
        .instructions
        .next_real(call_site(init, "<init>"))
        .expect("super() is followed by code");
    assert_eq!(found[0].insn, after_super);

    let head = env.all(&AtSpec::new("HEAD"), "tail");
    let outside = env.all(&AtSpec::new("CTOR_HEAD"), "tail");
    assert_eq!(outside[0].insn, head[0].insn);
}

#[test]
fn jumps_by_opcode() {
    let env = Env::new();
    let found = env.all(&AtSpec::new("JUMP").with_opcode(IFGE), "mixed");
    assert_eq!(found.len(), 1);
    assert!(env
        .resolve_in(&AtSpec::new("JUMP").with_opcode(GOTO), "mixed", Mode::All)
        .is_err());
    assert!(matches!(
        env.resolve_in(&AtSpec::new("JUMP").with_opcode(ILOAD), "mixed", Mode::All),
        Err(ResolveError::InvalidArgument { .. })
    ));
    assert_eq!(env.all(&AtSpec::new("JUMP"), "eachList").len(), 2);
}

#[test]
fn invoke_assign_follows_the_consuming_store() {
    let env = Env::new();
    let at = AtSpec::new("INVOKE_ASSIGN").with_target("Ljava/util/List;iterator()Ljava/util/Iterator;");
    let found = env.all(&at, "eachList");
    assert_eq!(found.len(), 1);
    let method = env.method("eachList");
    let call = call_site(method, "iterator");
    let store = method.instructions.next_real(call).expect("store after call");
    assert_eq!(found[0].insn, method.instructions.next_real(store).expect("code after store"));
    assert_eq!(found[0].decorations, [Decoration::Invoke(call)]);
}

#[test]
fn calls_in_a_lambda_body() {
    let env = Env::new();
    let at = AtSpec::new("INVOKE").with_target(FOO);
    assert_eq!(env.all(&at, "lambda$run$0").len(), 1);
    assert!(env.resolve_in(&at, "run", Mode::All).is_err());
}
