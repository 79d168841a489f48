//! A canned target class, available both as compiled bytes and as the
//! resolved source tree the host front end would produce for it.
//!
//! The Java it stands for:
//!
//! ```java
//! package com.example;
//!
//! public class Target {
//!     int count = 5;
//!     int[] values;
//!
//!     public Target() { super(); }
//!     void foo() {}
//!     void log(String message) {}
//!     void tail() { foo(); return; }
//!     void local() { int x = 1; foo(); }
//!     void calls() { foo(); foo(); foo(); foo(); foo(); }
//!     void eachList(java.util.List list) { for (Object o : list) {} }
//!     void eachArray(String[] array) { for (String s : array) {} }
//!     void run() { Runnable r = () -> foo(); }
//!     int mixed(String s) {
//!         int[] data = this.values;
//!         int n = this.values.length;
//!         StringBuilder sb = new StringBuilder("x");
//!         if (n < 0) { return -1; }
//!         this.count = 7;
//!         log("done");
//!         return n;
//!     }
//! }
//! ```

use pointcut_classfile::opcodes::*;
use pointcut_classfile::{Constant, FrameValue, Handle, LabelId, MethodBuilder, MethodNode};
use pointcut_core::Span;
use pointcut_hir::{
    BinaryOp, Body, BodyBuilder, CallKind, ExprId, ForEachKind, LambdaBody, OperandType,
    SourceClass, SourceField, SourceMethod,
};

use crate::assembler::ClassAssembler;

pub const TARGET: &str = "com/example/Target";
pub const TARGET_SOURCE_FILE: &str = "Target.java";

const METAFACTORY_DESC: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";

/// The compiled and source views of [`TARGET`].
#[derive(Debug, Clone)]
pub struct TargetFixture {
    pub methods: Vec<MethodNode>,
    pub bytes: Vec<u8>,
    pub source: SourceClass,
}

impl TargetFixture {
    pub fn method(&self, name: &str) -> &MethodNode {
        self.methods
            .iter()
            .find(|method| method.name == name)
            .unwrap_or_else(|| panic!("fixture has no method `{name}`"))
    }
}

pub fn target_fixture() -> TargetFixture {
    let methods = vec![
        constructor(),
        empty_method("foo", "()V"),
        empty_method("log", "(Ljava/lang/String;)V"),
        tail(),
        local(),
        calls(),
        each_list(),
        each_array(),
        run(),
        run_lambda(),
        mixed(),
    ];
    let mut assembler = ClassAssembler::new(TARGET)
        .source_file(TARGET_SOURCE_FILE)
        .field(0, "count", "I")
        .field(0, "values", "[I");
    for method in &methods {
        assembler = assembler.method(method.clone());
    }
    let bytes = assembler
        .assemble()
        .expect("fixture class should assemble");
    TargetFixture {
        methods,
        bytes,
        source: target_source(),
    }
}

fn builder(access: u16, name: &str, desc: &str) -> MethodBuilder {
    MethodBuilder::new(TARGET, access, name, desc).expect("fixture descriptor should parse")
}

fn this_local(b: &mut MethodBuilder, start: LabelId, end: LabelId) {
    b.local_variable("this", "Lcom/example/Target;", start, end, 0);
}

fn constructor() -> MethodNode {
    let mut b = builder(ACC_PUBLIC, "<init>", "()V");
    let start = b.mark();
    b.line(4, start);
    b.var(ALOAD, 0)
        .method(INVOKESPECIAL, "java/lang/Object", "<init>", "()V");
    b.var(ALOAD, 0)
        .push_int(5)
        .field(PUTFIELD, TARGET, "count", "I");
    b.insn(RETURN);
    let end = b.mark();
    this_local(&mut b, start, end);
    b.build()
}

fn empty_method(name: &str, desc: &str) -> MethodNode {
    let mut b = builder(0, name, desc);
    let start = b.mark();
    b.insn(RETURN);
    let end = b.mark();
    this_local(&mut b, start, end);
    b.build()
}

/// `void tail() { foo(); }`, ending in the implicit `return`.
pub fn tail() -> MethodNode {
    let mut b = builder(0, "tail", "()V");
    let start = b.mark();
    b.line(10, start);
    b.var(ALOAD, 0).method(INVOKEVIRTUAL, TARGET, "foo", "()V");
    let ret = b.mark();
    b.line(11, ret);
    b.insn(RETURN);
    let end = b.mark();
    this_local(&mut b, start, end);
    b.build()
}

/// `int x = 1; foo();` with `x` in the declared local table.
pub fn local() -> MethodNode {
    let mut b = builder(0, "local", "()V");
    let start = b.mark();
    b.insn(ICONST_1).var(ISTORE, 1);
    let x_start = b.mark();
    b.var(ALOAD, 0).method(INVOKEVIRTUAL, TARGET, "foo", "()V");
    b.insn(RETURN);
    let end = b.mark();
    this_local(&mut b, start, end);
    b.local_variable("x", "I", x_start, end, 1);
    b.build()
}

/// `foo()` called five times in a row.
pub fn calls() -> MethodNode {
    let mut b = builder(0, "calls", "()V");
    let start = b.mark();
    for _ in 0..5 {
        b.var(ALOAD, 0).method(INVOKEVIRTUAL, TARGET, "foo", "()V");
    }
    b.insn(RETURN);
    let end = b.mark();
    this_local(&mut b, start, end);
    b.build()
}

/// `for (Object o : list) {}`, compiled the way javac does.
pub fn each_list() -> MethodNode {
    let mut b = builder(0, "eachList", "(Ljava/util/List;)V");
    let start = b.mark();
    b.var(ALOAD, 1)
        .method(INVOKEINTERFACE, "java/util/List", "iterator", "()Ljava/util/Iterator;")
        .var(ASTORE, 2);
    let top = b.mark();
    b.frame_append(vec![FrameValue::Object("java/util/Iterator".into())]);
    let exit = b.new_label();
    b.var(ALOAD, 2)
        .method(INVOKEINTERFACE, "java/util/Iterator", "hasNext", "()Z")
        .jump(IFEQ, exit);
    b.var(ALOAD, 2)
        .method(INVOKEINTERFACE, "java/util/Iterator", "next", "()Ljava/lang/Object;")
        .var(ASTORE, 3);
    let body = b.mark();
    b.jump(GOTO, top);
    b.label(exit);
    b.frame_chop(1);
    b.insn(RETURN);
    let end = b.mark();
    this_local(&mut b, start, end);
    b.local_variable("list", "Ljava/util/List;", start, end, 1);
    b.local_variable("o", "Ljava/lang/Object;", body, exit, 3);
    b.build()
}

/// `for (String s : array) {}`, which compiles to index arithmetic and no calls.
pub fn each_array() -> MethodNode {
    let mut b = builder(0, "eachArray", "([Ljava/lang/String;)V");
    let start = b.mark();
    b.var(ALOAD, 1).var(ASTORE, 2);
    b.var(ALOAD, 2).insn(ARRAYLENGTH).var(ISTORE, 3);
    b.insn(ICONST_0).var(ISTORE, 4);
    let top = b.mark();
    b.frame_append(vec![
        FrameValue::Object("[Ljava/lang/String;".into()),
        FrameValue::Integer,
        FrameValue::Integer,
    ]);
    let exit = b.new_label();
    b.var(ILOAD, 4).var(ILOAD, 3).jump(IF_ICMPGE, exit);
    b.var(ALOAD, 2).var(ILOAD, 4).insn(AALOAD).var(ASTORE, 5);
    let body = b.mark();
    b.iinc(4, 1).jump(GOTO, top);
    b.label(exit);
    b.frame_chop(3);
    b.insn(RETURN);
    let end = b.mark();
    this_local(&mut b, start, end);
    b.local_variable("array", "[Ljava/lang/String;", start, end, 1);
    b.local_variable("s", "Ljava/lang/String;", body, exit, 5);
    b.build()
}

fn metafactory() -> Handle {
    Handle {
        kind: H_INVOKESTATIC,
        owner: "java/lang/invoke/LambdaMetafactory".into(),
        name: "metafactory".into(),
        desc: METAFACTORY_DESC.into(),
        interface: false,
    }
}

/// `Runnable r = () -> foo();`
pub fn run() -> MethodNode {
    let mut b = builder(0, "run", "()V");
    let start = b.mark();
    b.var(ALOAD, 0).invoke_dynamic(
        "run",
        "(Lcom/example/Target;)Ljava/lang/Runnable;",
        metafactory(),
        vec![
            Constant::MethodType("()V".into()),
            Constant::MethodHandle(Handle {
                kind: H_INVOKESPECIAL,
                owner: TARGET.into(),
                name: "lambda$run$0".into(),
                desc: "()V".into(),
                interface: false,
            }),
            Constant::MethodType("()V".into()),
        ],
    );
    b.var(ASTORE, 1);
    let r_start = b.mark();
    b.insn(RETURN);
    let end = b.mark();
    this_local(&mut b, start, end);
    b.local_variable("r", "Ljava/lang/Runnable;", r_start, end, 1);
    b.build()
}

pub fn run_lambda() -> MethodNode {
    let mut b = builder(ACC_PRIVATE | ACC_SYNTHETIC, "lambda$run$0", "()V");
    let start = b.mark();
    b.var(ALOAD, 0).method(INVOKEVIRTUAL, TARGET, "foo", "()V");
    b.insn(RETURN);
    let end = b.mark();
    this_local(&mut b, start, end);
    b.build()
}

/// Field reads and writes, an allocation, constants and a zero comparison.
pub fn mixed() -> MethodNode {
    let mut b = builder(0, "mixed", "(Ljava/lang/String;)I");
    let start = b.mark();
    b.var(ALOAD, 0)
        .field(GETFIELD, TARGET, "values", "[I")
        .var(ASTORE, 2);
    let data_start = b.mark();
    b.var(ALOAD, 0)
        .field(GETFIELD, TARGET, "values", "[I")
        .insn(ARRAYLENGTH)
        .var(ISTORE, 3);
    let n_start = b.mark();
    b.type_insn(NEW, "java/lang/StringBuilder")
        .insn(DUP)
        .ldc(Constant::String("x".into()))
        .method(
            INVOKESPECIAL,
            "java/lang/StringBuilder",
            "<init>",
            "(Ljava/lang/String;)V",
        )
        .var(ASTORE, 4);
    let sb_start = b.mark();
    let past_if = b.new_label();
    b.var(ILOAD, 3).jump(IFGE, past_if);
    b.insn(ICONST_M1).insn(IRETURN);
    b.label(past_if);
    b.frame_append(vec![
        FrameValue::Object("[I".into()),
        FrameValue::Integer,
        FrameValue::Object("java/lang/StringBuilder".into()),
    ]);
    b.var(ALOAD, 0).push_int(7).field(PUTFIELD, TARGET, "count", "I");
    b.var(ALOAD, 0)
        .ldc(Constant::String("done".into()))
        .method(INVOKEVIRTUAL, TARGET, "log", "(Ljava/lang/String;)V");
    b.var(ILOAD, 3).insn(IRETURN);
    let end = b.mark();
    this_local(&mut b, start, end);
    b.local_variable("s", "Ljava/lang/String;", start, end, 1);
    b.local_variable("data", "[I", data_start, end, 2);
    b.local_variable("n", "I", n_start, end, 3);
    b.local_variable("sb", "Ljava/lang/StringBuilder;", sb_start, end, 4);
    b.build()
}

fn source_method(name: &str, desc: &str, access: u16, body: Body) -> SourceMethod {
    SourceMethod {
        name: name.to_string(),
        desc: desc.to_string(),
        access,
        span: body.range(),
        body: Some(body),
    }
}

fn call_foo(b: &mut BodyBuilder) -> ExprId {
    let this = b.this();
    b.call(Some(this), TARGET, "foo", "()V", CallKind::Virtual, vec![])
}

/// The resolved source tree matching [`target_fixture`]'s bytecode.
pub fn target_source() -> SourceClass {
    let mut class = SourceClass::new(TARGET)
        .with_field(SourceField {
            name: "count".into(),
            desc: "I".into(),
            is_static: false,
            has_initializer: true,
            span: Span::new(0, 1),
        })
        .with_field(SourceField {
            name: "values".into(),
            desc: "[I".into(),
            is_static: false,
            has_initializer: false,
            span: Span::new(1, 2),
        });

    // public Target() { super(); }
    let mut b = BodyBuilder::instance();
    let this = b.this();
    let sup = b.call(
        Some(this),
        "java/lang/Object",
        "<init>",
        "()V",
        CallKind::Special,
        vec![],
    );
    let stmt = b.expr_stmt(sup);
    class = class.with_method(source_method("<init>", "()V", ACC_PUBLIC, b.finish(vec![stmt])));

    for (name, desc) in [("foo", "()V"), ("log", "(Ljava/lang/String;)V")] {
        let mut b = BodyBuilder::instance();
        if name == "log" {
            b.param("message", "Ljava/lang/String;");
        }
        class = class.with_method(source_method(name, desc, 0, b.finish(vec![])));
    }

    // void tail() { foo(); return; }
    let mut b = BodyBuilder::instance();
    let call = call_foo(&mut b);
    let s1 = b.expr_stmt(call);
    let s2 = b.ret(None);
    class = class.with_method(source_method("tail", "()V", 0, b.finish(vec![s1, s2])));

    // void local() { int x = 1; foo(); }
    let mut b = BodyBuilder::instance();
    let x = b.local("x", "I");
    let one = b.int(1);
    let s1 = b.let_stmt(x, Some(one));
    let call = call_foo(&mut b);
    let s2 = b.expr_stmt(call);
    class = class.with_method(source_method("local", "()V", 0, b.finish(vec![s1, s2])));

    // void calls() { foo(); x5 }
    let mut b = BodyBuilder::instance();
    let mut stmts = Vec::new();
    for _ in 0..5 {
        let call = call_foo(&mut b);
        stmts.push(b.expr_stmt(call));
    }
    class = class.with_method(source_method("calls", "()V", 0, b.finish(stmts)));

    // void eachList(List list) { for (Object o : list) {} }
    let mut b = BodyBuilder::instance();
    let list = b.param("list", "Ljava/util/List;");
    let o = b.foreach_local("o", "Ljava/lang/Object;");
    let iterable = b.read(list);
    let empty = b.block(vec![]);
    let each = b.for_each(
        o,
        iterable,
        ForEachKind::Iterable {
            owner: "java/util/List".into(),
            interface: true,
        },
        empty,
    );
    class = class.with_method(source_method(
        "eachList",
        "(Ljava/util/List;)V",
        0,
        b.finish(vec![each]),
    ));

    // void eachArray(String[] array) { for (String s : array) {} }
    let mut b = BodyBuilder::instance();
    let array = b.param("array", "[Ljava/lang/String;");
    let s = b.foreach_local("s", "Ljava/lang/String;");
    let iterable = b.read(array);
    let empty = b.block(vec![]);
    let each = b.for_each(s, iterable, ForEachKind::Array, empty);
    class = class.with_method(source_method(
        "eachArray",
        "([Ljava/lang/String;)V",
        0,
        b.finish(vec![each]),
    ));

    // void run() { Runnable r = () -> foo(); }
    let mut b = BodyBuilder::instance();
    let r = b.local("r", "Ljava/lang/Runnable;");
    let call = call_foo(&mut b);
    let lambda = b.lambda(vec![], LambdaBody::Expr(call));
    let stmt = b.let_stmt(r, Some(lambda));
    class = class.with_method(source_method("run", "()V", 0, b.finish(vec![stmt])));

    class.with_method(mixed_source())
}

fn mixed_source() -> SourceMethod {
    let mut b = BodyBuilder::instance();
    b.param("s", "Ljava/lang/String;");
    let data = b.local("data", "[I");
    let n = b.local("n", "I");
    let sb = b.local("sb", "Ljava/lang/StringBuilder;");

    let this = b.this();
    let values = b.get_field(this, TARGET, "values", "[I");
    let s1 = b.let_stmt(data, Some(values));

    let this = b.this();
    let values = b.get_field(this, TARGET, "values", "[I");
    let length = b.array_length(values);
    let s2 = b.let_stmt(n, Some(length));

    let x = b.string("x");
    let alloc = b.new_object("java/lang/StringBuilder", "(Ljava/lang/String;)V", vec![x]);
    let s3 = b.let_stmt(sb, Some(alloc));

    let read_n = b.read(n);
    let zero = b.int(0);
    let negative = b.binary(BinaryOp::Lt, read_n, zero, OperandType::Int);
    let minus_one = b.int(-1);
    let early = b.ret(Some(minus_one));
    let then_branch = b.block(vec![early]);
    let s4 = b.if_stmt(negative, then_branch, None);

    let this = b.this();
    let seven = b.int(7);
    let store = b.put_field(this, TARGET, "count", "I", seven);
    let s5 = b.expr_stmt(store);

    let this = b.this();
    let done = b.string("done");
    let log = b.call(
        Some(this),
        TARGET,
        "log",
        "(Ljava/lang/String;)V",
        CallKind::Virtual,
        vec![done],
    );
    let s6 = b.expr_stmt(log);

    let read_n = b.read(n);
    let s7 = b.ret(Some(read_n));

    source_method(
        "mixed",
        "(Ljava/lang/String;)I",
        0,
        b.finish(vec![s1, s2, s3, s4, s5, s6, s7]),
    )
}
