//! Source-side replay of the injection point visitors.
//!
//! For every kind that has a source form, a mirror visitor walks the resolved
//! body and produces candidates in the order the bytecode visitor would see
//! the instructions compiled from them, before any filter runs. A
//! [`MatchResult`](crate::MatchResult)'s `index` therefore selects the
//! [`SourceMatch`] it was compiled from.
//!
//! Some bytecode has no source counterpart: the field initializers javac
//! copies into constructors, the implicit `super()` call and the implicit
//! `return` at the end of a body. Those are reported against the field
//! declaration, the body, and the body's end respectively.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

use pointcut_classfile::opcodes::{GETFIELD, GETSTATIC, IFLE, IFLT, PUTFIELD, PUTSTATIC};
use pointcut_core::Span;
use pointcut_hir::{
    can_complete_normally, walk, BinaryOp, Body, Event, Expr, ExprId, ForEachKind, Literal,
    LocalId, LocalKind, OperandType, SourceClass, SourceMethod, Stmt, StmtId, UnaryOp, WalkRoot,
};

use crate::at::AtSpec;
use crate::collect::{ConstantValue, Element};
use crate::error::ResolveError;
use crate::lambda::LambdaSource;
use crate::locals::{LocalDiscriminator, Visible};
use crate::points::{literal_constant, ArrayAccess, ConstantQuery, Enforce, NewTarget};
use crate::registry::InjectionPoint;
use crate::selector::MemberSelector;

const STRING_CONSUMER: &str = "(Ljava/lang/String;)V";
const ITERATOR: &str = "java/util/Iterator";

/// What a source match points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceElement {
    /// The whole body; used for `HEAD` and the implicit `super()` call.
    Body,
    /// The implicit `return` at the end of a body that completes normally.
    End,
    Stmt(StmtId),
    Expr(ExprId),
    /// A field declaration of the enclosing class, by position, whose
    /// initializer the compiler copied into a constructor.
    Field(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMatch {
    /// Candidate position, aligned with [`MatchResult::index`](crate::MatchResult::index).
    pub index: usize,
    pub element: SourceElement,
    pub span: Span,
    /// Completion text for the element, as for bytecode matches.
    pub label: Option<String>,
}

/// One compiled unit in source form: a method body, or the body of a lambda
/// expression that compiled to its own method.
#[derive(Debug, Clone, Copy)]
pub struct MirrorTarget<'s> {
    pub class: &'s SourceClass,
    pub method: &'s SourceMethod,
    pub body: &'s Body,
    pub root: WalkRoot,
    /// The lambda expression when the unit is a lambda body.
    pub lambda: Option<ExprId>,
}

impl<'s> MirrorTarget<'s> {
    /// `None` for methods without a body.
    pub fn method(class: &'s SourceClass, method: &'s SourceMethod) -> Option<Self> {
        let body = method.body.as_ref()?;
        Some(MirrorTarget {
            class,
            method,
            body,
            root: WalkRoot::Stmt(body.root),
            lambda: None,
        })
    }

    pub fn lambda(class: &'s SourceClass, source: LambdaSource<'s>) -> Option<Self> {
        Some(MirrorTarget {
            class,
            method: source.method,
            body: source.body()?,
            root: source.root()?,
            lambda: Some(source.lambda),
        })
    }

    fn is_constructor(&self) -> bool {
        self.lambda.is_none() && self.method.is_constructor()
    }

    fn range(&self) -> Span {
        match self.root {
            WalkRoot::Stmt(stmt) => self.body.stmts[stmt].range(),
            WalkRoot::Expr(expr) => self.body.exprs[expr].range(),
        }
    }

    fn completes_normally(&self) -> bool {
        match self.root {
            WalkRoot::Stmt(stmt) => can_complete_normally(self.body, stmt),
            WalkRoot::Expr(_) => true,
        }
    }
}

/// Replays `point` over `target`.
///
/// Returns `None` for kinds without a source form (`JUMP` and custom points).
/// `selector` is `None` when every member should be accepted.
pub fn source_matches(
    point: &InjectionPoint,
    at: &AtSpec,
    selector: Option<&MemberSelector>,
    target: &MirrorTarget<'_>,
) -> Result<Option<Vec<SourceMatch>>, ResolveError> {
    let mut visitor: Box<dyn MirrorVisitor + '_> = match point {
        InjectionPoint::Head => Box::new(Head),
        InjectionPoint::Return => Box::new(Returns { tail: false }),
        InjectionPoint::Tail => Box::new(Returns { tail: true }),
        InjectionPoint::Invoke => Box::new(Invokes::new(selector, CallFlavor::Plain)),
        InjectionPoint::InvokeAssign => Box::new(Invokes::new(selector, CallFlavor::Assign)),
        InjectionPoint::InvokeString => Box::new(Invokes::new(
            selector,
            CallFlavor::String(at.arg("ldc").map(str::to_string)),
        )),
        InjectionPoint::Field => Box::new(Fields {
            selector,
            opcode: at.opcode(),
            array: ArrayAccess::parse(at.arg("array"))?,
        }),
        InjectionPoint::New => Box::new(News {
            target: NewTarget::parse(at.target.as_deref())?,
        }),
        InjectionPoint::Constant => Box::new(Constants {
            query: ConstantQuery::parse(at)?,
        }),
        InjectionPoint::Load => Box::new(Locals::new(at, Access::Load)),
        InjectionPoint::Store => Box::new(Locals::new(at, Access::Store)),
        InjectionPoint::CtorHead => Box::new(CtorHead {
            enforce: Enforce::parse(at.arg("enforce"))?,
            last_store: None,
        }),
        InjectionPoint::Jump | InjectionPoint::Custom(_) => return Ok(None),
    };
    let unit = Unit::new(target);
    Ok(Some(replay(visitor.as_mut(), &unit)))
}

/// A position in the replayed instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Event(Event),
    /// `ALOAD 0; INVOKESPECIAL <init>` of a constructor without an explicit
    /// delegate call.
    ImplicitSuper,
    /// An instance field initializer copied into a constructor.
    FieldInit(usize),
}

#[derive(Debug, Default)]
struct Sink {
    results: Vec<SourceMatch>,
}

impl Sink {
    fn add(&mut self, element: SourceElement, span: Span, label: Option<String>) {
        self.results.push(SourceMatch {
            index: self.results.len(),
            element,
            span,
            label,
        });
    }

    fn clear(&mut self) {
        self.results.clear();
    }
}

trait MirrorVisitor {
    fn visit_start(&mut self, _unit: &Unit<'_>, _sink: &mut Sink) {}

    fn visit(&mut self, unit: &Unit<'_>, step: Step, sink: &mut Sink);

    fn visit_end(&mut self, _unit: &Unit<'_>, _sink: &mut Sink) {}
}

fn replay(visitor: &mut dyn MirrorVisitor, unit: &Unit<'_>) -> Vec<SourceMatch> {
    let mut sink = Sink::default();
    visitor.visit_start(unit, &mut sink);

    if unit.target.is_constructor() && unit.delegate.is_none() {
        visitor.visit(unit, Step::ImplicitSuper, &mut sink);
        for &field in &unit.field_inits {
            visitor.visit(unit, Step::FieldInit(field), &mut sink);
        }
    }

    let delegate = unit.delegate.map(Event::Expr);
    let _ = walk(unit.body, unit.target.root, &mut |_: &Body, event: Event| {
        visitor.visit(unit, Step::Event(event), &mut sink);
        if Some(event) == delegate {
            for &field in &unit.field_inits {
                visitor.visit(unit, Step::FieldInit(field), &mut sink);
            }
        }
        ControlFlow::Continue(())
    });

    visitor.visit_end(unit, &mut sink);
    sink.results
}

/// A [`MirrorTarget`] with the structural facts the visitors share.
struct Unit<'s> {
    target: &'s MirrorTarget<'s>,
    body: &'s Body,
    parents: Vec<Option<ExprId>>,
    structure: Structure,
    /// The explicit `super(...)` or `this(...)` call of a constructor.
    delegate: Option<ExprId>,
    /// Initialized instance fields copied into this constructor, by position.
    field_inits: Vec<usize>,
}

impl<'s> Unit<'s> {
    fn new(target: &'s MirrorTarget<'s>) -> Self {
        let body = target.body;
        let delegate = if target.is_constructor() {
            first_delegate(body, target.root)
        } else {
            None
        };
        let delegates_to_this = delegate.is_some_and(|call| {
            matches!(&body.exprs[call], Expr::Call { owner, .. } if *owner == target.class.name)
        });
        let field_inits = if target.is_constructor() && !delegates_to_this {
            target
                .class
                .fields
                .iter()
                .enumerate()
                .filter(|(_, field)| field.has_initializer && !field.is_static)
                .map(|(position, _)| position)
                .collect()
        } else {
            Vec::new()
        };
        Unit {
            target,
            body,
            parents: body.expr_parents(),
            structure: Structure::new(body, target.root),
            delegate,
            field_inits,
        }
    }

    fn parent(&self, expr: ExprId) -> Option<&'s Expr> {
        self.parents
            .get(expr.idx())
            .copied()
            .flatten()
            .map(|parent| &self.body.exprs[parent])
    }

    fn expr(&self, expr: ExprId) -> &'s Expr {
        &self.body.exprs[expr]
    }

    fn class_name(&self) -> &'s str {
        &self.target.class.name
    }
}

fn first_delegate(body: &Body, root: WalkRoot) -> Option<ExprId> {
    let mut found = None;
    let _ = walk(body, root, &mut |body: &Body, event: Event| match event {
        Event::Expr(id) if matches!(&body.exprs[id], Expr::Call { name, .. } if name == "<init>") => {
            found = Some(id);
            ControlFlow::Break(())
        }
        _ => ControlFlow::Continue(()),
    });
    found
}

/// Statement nesting of the walked unit, for local variable scoping.
#[derive(Debug, Default)]
struct Structure {
    /// The statement directly evaluating each expression.
    owner: HashMap<ExprId, StmtId>,
    parent: HashMap<StmtId, StmtId>,
    /// The statement a local stays visible in.
    scope: HashMap<LocalId, StmtId>,
    /// Conditions of `if` and `while` statements.
    conditions: HashSet<ExprId>,
}

impl Structure {
    fn new(body: &Body, root: WalkRoot) -> Self {
        let mut structure = Structure::default();
        if let WalkRoot::Stmt(stmt) = root {
            structure.stmt(body, stmt, None);
        }
        structure
    }

    fn stmt(&mut self, body: &Body, id: StmtId, parent: Option<StmtId>) {
        if let Some(parent) = parent {
            self.parent.insert(id, parent);
        }
        match &body.stmts[id] {
            Stmt::Block { statements, .. } => {
                for stmt in statements {
                    self.stmt(body, *stmt, Some(id));
                }
            }
            Stmt::Let {
                local, initializer, ..
            } => {
                self.scope.insert(*local, parent.unwrap_or(id));
                if let Some(init) = initializer {
                    self.expr(body, *init, id);
                }
            }
            Stmt::Expr { expr, .. } | Stmt::Throw { expr, .. } => self.expr(body, *expr, id),
            Stmt::Return { expr, .. } => {
                if let Some(expr) = expr {
                    self.expr(body, *expr, id);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.conditions.insert(*condition);
                self.expr(body, *condition, id);
                self.stmt(body, *then_branch, Some(id));
                if let Some(else_branch) = else_branch {
                    self.stmt(body, *else_branch, Some(id));
                }
            }
            Stmt::While {
                condition,
                body: loop_body,
                ..
            } => {
                self.conditions.insert(*condition);
                self.expr(body, *condition, id);
                self.stmt(body, *loop_body, Some(id));
            }
            Stmt::ForEach {
                local,
                iterable,
                body: loop_body,
                ..
            } => {
                self.scope.insert(*local, id);
                self.expr(body, *iterable, id);
                self.stmt(body, *loop_body, Some(id));
            }
            Stmt::LocalClass { .. } | Stmt::Empty { .. } => {}
        }
    }

    fn expr(&mut self, body: &Body, id: ExprId, stmt: StmtId) {
        self.owner.insert(id, stmt);
        for child in body.exprs[id].children() {
            self.expr(body, child, stmt);
        }
    }

    fn encloses(&self, scope: StmtId, mut at: StmtId) -> bool {
        loop {
            if at == scope {
                return true;
            }
            match self.parent.get(&at) {
                Some(parent) => at = *parent,
                None => return false,
            }
        }
    }
}

struct Head;

impl MirrorVisitor for Head {
    fn visit_start(&mut self, unit: &Unit<'_>, sink: &mut Sink) {
        sink.add(SourceElement::Body, unit.target.range(), None);
    }

    fn visit(&mut self, _unit: &Unit<'_>, _step: Step, _sink: &mut Sink) {}
}

struct Returns {
    /// Keep only the last return.
    tail: bool,
}

impl MirrorVisitor for Returns {
    fn visit(&mut self, unit: &Unit<'_>, step: Step, sink: &mut Sink) {
        if let Step::Event(Event::Return(stmt)) = step {
            if self.tail {
                sink.clear();
            }
            sink.add(SourceElement::Stmt(stmt), unit.body.stmts[stmt].range(), None);
        }
    }

    fn visit_end(&mut self, unit: &Unit<'_>, sink: &mut Sink) {
        if unit.target.completes_normally() {
            if self.tail {
                sink.clear();
            }
            sink.add(SourceElement::End, unit.target.range().end_point(), None);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CallFlavor {
    Plain,
    /// Non-void calls only.
    Assign,
    /// `(String)V` calls with a string literal argument, optionally equal to
    /// the given text.
    String(Option<String>),
}

struct Invokes<'a> {
    selector: Option<&'a MemberSelector>,
    flavor: CallFlavor,
}

impl<'a> Invokes<'a> {
    fn new(selector: Option<&'a MemberSelector>, flavor: CallFlavor) -> Self {
        Invokes { selector, flavor }
    }

    fn offer(
        &self,
        sink: &mut Sink,
        element: SourceElement,
        span: Span,
        (owner, name, desc): (&str, &str, &str),
        string_arg: Option<&str>,
    ) {
        if name == "<init>"
            || !self
                .selector
                .map_or(true, |selector| selector.matches(owner, name, desc))
        {
            return;
        }
        let accepted = match &self.flavor {
            CallFlavor::Plain => true,
            CallFlavor::Assign => !desc.ends_with(")V"),
            CallFlavor::String(ldc) => {
                desc == STRING_CONSUMER
                    && string_arg.is_some_and(|arg| ldc.as_deref().map_or(true, |ldc| ldc == arg))
            }
        };
        if accepted {
            let label = Element::Method {
                owner: owner.to_string(),
                name: name.to_string(),
                desc: desc.to_string(),
            }
            .completion_label();
            sink.add(element, span, label);
        }
    }
}

impl MirrorVisitor for Invokes<'_> {
    fn visit(&mut self, unit: &Unit<'_>, step: Step, sink: &mut Sink) {
        let Step::Event(event) = step else { return };
        match event {
            Event::Expr(id) => {
                let Expr::Call {
                    owner,
                    name,
                    desc,
                    args,
                    range,
                    ..
                } = unit.expr(id)
                else {
                    return;
                };
                let string_arg = match args.as_slice() {
                    [arg] => match unit.expr(*arg) {
                        Expr::Literal {
                            value: Literal::String(text),
                            ..
                        } => Some(text.as_str()),
                        _ => None,
                    },
                    _ => None,
                };
                self.offer(
                    sink,
                    SourceElement::Expr(id),
                    *range,
                    (owner.as_str(), name.as_str(), desc.as_str()),
                    string_arg,
                );
            }
            Event::Iterator(stmt) | Event::HasNext(stmt) | Event::Next(stmt) => {
                let Stmt::ForEach {
                    kind: ForEachKind::Iterable { owner, .. },
                    range,
                    ..
                } = &unit.body.stmts[stmt]
                else {
                    return;
                };
                let member = match event {
                    Event::Iterator(_) => (owner.as_str(), "iterator", "()Ljava/util/Iterator;"),
                    Event::HasNext(_) => (ITERATOR, "hasNext", "()Z"),
                    _ => (ITERATOR, "next", "()Ljava/lang/Object;"),
                };
                self.offer(sink, SourceElement::Stmt(stmt), *range, member, None);
            }
            _ => {}
        }
    }
}

struct Fields<'a> {
    selector: Option<&'a MemberSelector>,
    opcode: Option<u8>,
    array: Option<ArrayAccess>,
}

impl Fields<'_> {
    fn accepts(&self, opcode: u8, owner: &str, name: &str, desc: &str) -> bool {
        self.selector
            .map_or(true, |selector| selector.matches(owner, name, desc))
            && self.opcode.map_or(true, |wanted| wanted == opcode)
    }
}

impl MirrorVisitor for Fields<'_> {
    fn visit(&mut self, unit: &Unit<'_>, step: Step, sink: &mut Sink) {
        match step {
            Step::Event(Event::Expr(id)) => {
                let (opcode, owner, name, desc, range) = match unit.expr(id) {
                    Expr::FieldRead {
                        owner,
                        name,
                        desc,
                        is_static,
                        range,
                        ..
                    } => (
                        if *is_static { GETSTATIC } else { GETFIELD },
                        owner,
                        name,
                        desc,
                        range,
                    ),
                    Expr::FieldWrite {
                        owner,
                        name,
                        desc,
                        is_static,
                        range,
                        ..
                    } => (
                        if *is_static { PUTSTATIC } else { PUTFIELD },
                        owner,
                        name,
                        desc,
                        range,
                    ),
                    _ => return,
                };
                if !self.accepts(opcode, owner, name, desc) {
                    return;
                }
                if let Some(access) = self.array {
                    let is_read = opcode == GETFIELD || opcode == GETSTATIC;
                    if !is_read || !desc.starts_with('[') || !array_companion(unit, id, access) {
                        return;
                    }
                }
                let label = Element::Field {
                    owner: owner.clone(),
                    name: name.clone(),
                    desc: desc.clone(),
                }
                .completion_label();
                sink.add(SourceElement::Expr(id), *range, label);
            }
            Step::FieldInit(position) => {
                let field = &unit.target.class.fields[position];
                if self.array.is_some()
                    || !self.accepts(PUTFIELD, unit.class_name(), &field.name, &field.desc)
                {
                    return;
                }
                let label = Element::Field {
                    owner: unit.class_name().to_string(),
                    name: field.name.clone(),
                    desc: field.desc.clone(),
                }
                .completion_label();
                sink.add(SourceElement::Field(position), field.span, label);
            }
            _ => {}
        }
    }
}

/// Whether the array read by `field` is immediately measured, indexed or
/// stored into.
fn array_companion(unit: &Unit<'_>, field: ExprId, access: ArrayAccess) -> bool {
    match (access, unit.parent(field)) {
        (ArrayAccess::Length, Some(Expr::ArrayLength { array, .. }))
        | (ArrayAccess::Get, Some(Expr::ArrayRead { array, .. }))
        | (ArrayAccess::Set, Some(Expr::ArrayWrite { array, .. })) => *array == field,
        _ => false,
    }
}

struct News {
    target: NewTarget,
}

impl MirrorVisitor for News {
    fn visit(&mut self, unit: &Unit<'_>, step: Step, sink: &mut Sink) {
        let Step::Event(Event::Allocate(id)) = step else { return };
        let Expr::New {
            class,
            ctor_desc,
            anonymous,
            range,
            ..
        } = unit.expr(id)
        else {
            return;
        };
        // Anonymous classes are allocated under their own binary name, with a
        // constructor that also takes the captured values.
        let (class, ctor_desc) = match anonymous {
            Some(anonymous) => (anonymous.as_str(), None),
            None => (class.as_str(), Some(ctor_desc.as_str())),
        };
        if self.target.matches(class, ctor_desc) {
            let label = Element::New {
                class: class.to_string(),
                ctor_desc: ctor_desc.map(str::to_string),
            }
            .completion_label();
            sink.add(SourceElement::Expr(id), *range, label);
        }
    }
}

struct Constants {
    query: ConstantQuery,
}

impl MirrorVisitor for Constants {
    fn visit(&mut self, unit: &Unit<'_>, step: Step, sink: &mut Sink) {
        let Step::Event(Event::Expr(id)) = step else { return };
        match unit.expr(id) {
            Expr::Literal { value, range } => {
                let Some(constant) = literal_constant(value) else { return };
                if is_folded_into_jump(unit, id, value) || !self.query.accepts(&constant) {
                    return;
                }
                let label = Element::Constant(constant).completion_label();
                sink.add(SourceElement::Expr(id), *range, label);
            }
            Expr::Binary {
                op,
                rhs,
                operand: OperandType::Int,
                range,
                ..
            } if is_zero(unit.expr(*rhs)) => {
                let jump = match op {
                    BinaryOp::Lt | BinaryOp::Ge => IFLT,
                    BinaryOp::Le | BinaryOp::Gt => IFLE,
                    _ => return,
                };
                if self.query.expands(jump) {
                    let label = Element::Constant(ConstantValue::Int(0)).completion_label();
                    sink.add(SourceElement::Expr(id), *range, label);
                }
            }
            _ => {}
        }
    }
}

fn is_zero(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Literal {
            value: Literal::Int(0) | Literal::Char(0),
            ..
        }
    )
}

/// Literals javac never loads: zero on the right of an `int` comparison
/// (`IFxx` instead of `IF_ICMPxx`), `null` in a reference comparison
/// (`IFNULL`), and booleans used directly as conditions.
fn is_folded_into_jump(unit: &Unit<'_>, id: ExprId, value: &Literal) -> bool {
    let parent = unit.parent(id);
    match value {
        Literal::Int(0) | Literal::Char(0) => matches!(
            parent,
            Some(Expr::Binary { op, rhs, operand: OperandType::Int, .. })
                if op.is_comparison() && *rhs == id
        ),
        Literal::Null => matches!(
            parent,
            Some(Expr::Binary { op: BinaryOp::Eq | BinaryOp::Ne, .. })
        ),
        Literal::Bool(_) => {
            unit.structure.conditions.contains(&id)
                || match parent {
                    Some(Expr::Binary {
                        op: BinaryOp::And | BinaryOp::Or,
                        ..
                    })
                    | Some(Expr::Unary {
                        op: UnaryOp::Not, ..
                    }) => true,
                    Some(Expr::Conditional { condition, .. }) => *condition == id,
                    _ => false,
                }
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Load,
    Store,
}

/// The local a step touches.
enum Subject {
    This,
    Local(LocalId),
}

struct Locals {
    access: Access,
    discriminator: LocalDiscriminator,
    /// Locals stored so far, in store order.
    declared: Vec<LocalId>,
}

impl Locals {
    fn new(at: &AtSpec, access: Access) -> Self {
        Locals {
            access,
            discriminator: at.local.clone().unwrap_or_default(),
            declared: Vec::new(),
        }
    }

    fn declare(&mut self, local: LocalId) {
        if !self.declared.contains(&local) {
            self.declared.push(local);
        }
    }

    /// Locals visible at `at`: `this`, the parameters, then every stored
    /// local whose scope encloses `at`.
    fn visible<'u>(&self, unit: &Unit<'u>, this_desc: &'u str, at: Option<StmtId>) -> Vec<Visible<'u>> {
        let body = unit.body;
        let mut visible = Vec::new();
        let is_instance = unit.target.lambda.is_none() && !unit.target.method.is_static();
        if is_instance {
            visible.push(Visible {
                name: "this",
                desc: this_desc,
                slot: Some(0),
                is_arg: false,
            });
        }
        for param in unit_params(unit) {
            let local = body.local(param);
            visible.push(Visible {
                name: &local.name,
                desc: &local.desc,
                slot: local.slot,
                is_arg: true,
            });
        }
        for &id in &self.declared {
            let local = body.local(id);
            if matches!(local.kind, LocalKind::Param | LocalKind::LambdaParam) {
                continue;
            }
            let in_scope = match (unit.structure.scope.get(&id), at) {
                (Some(scope), Some(at)) => unit.structure.encloses(*scope, at),
                _ => false,
            };
            if in_scope {
                visible.push(Visible {
                    name: &local.name,
                    desc: &local.desc,
                    slot: local.slot,
                    is_arg: false,
                });
            }
        }
        visible
    }
}

fn unit_params(unit: &Unit<'_>) -> Vec<LocalId> {
    match unit.target.lambda.map(|lambda| unit.expr(lambda)) {
        Some(Expr::Lambda { params, .. }) => params.clone(),
        _ => unit.body.params.clone(),
    }
}

impl MirrorVisitor for Locals {
    fn visit(&mut self, unit: &Unit<'_>, step: Step, sink: &mut Sink) {
        let body = unit.body;
        let root_stmt = match unit.target.root {
            WalkRoot::Stmt(stmt) => Some(stmt),
            WalkRoot::Expr(_) => None,
        };

        let (subject, element, span, at) = match (self.access, step) {
            (Access::Load, Step::ImplicitSuper) => {
                (Subject::This, SourceElement::Body, unit.target.range(), root_stmt)
            }
            (Access::Load, Step::FieldInit(position)) => (
                Subject::This,
                SourceElement::Field(position),
                unit.target.class.fields[position].span,
                root_stmt,
            ),
            (_, Step::Event(Event::Store(stmt))) => {
                let local = match &body.stmts[stmt] {
                    Stmt::Let { local, .. } | Stmt::ForEach { local, .. } => *local,
                    _ => return,
                };
                self.declare(local);
                if self.access != Access::Store {
                    return;
                }
                (
                    Subject::Local(local),
                    SourceElement::Stmt(stmt),
                    body.stmts[stmt].range(),
                    Some(stmt),
                )
            }
            (_, Step::Event(Event::Expr(id))) => {
                let at = unit.structure.owner.get(&id).copied();
                match (self.access, unit.expr(id)) {
                    (Access::Load, Expr::This { range }) => {
                        (Subject::This, SourceElement::Expr(id), *range, at)
                    }
                    (Access::Load, Expr::LocalRead { local, range }) => {
                        (Subject::Local(*local), SourceElement::Expr(id), *range, at)
                    }
                    (access, Expr::LocalWrite { local, range, .. }) => {
                        self.declare(*local);
                        if access != Access::Store {
                            return;
                        }
                        (Subject::Local(*local), SourceElement::Expr(id), *range, at)
                    }
                    _ => return,
                }
            }
            _ => return,
        };

        let this_desc = format!("L{};", unit.class_name());
        let visible = self.visible(unit, &this_desc, at);
        let subject = match subject {
            Subject::This => visible.iter().find(|var| var.name == "this" && var.slot == Some(0)),
            Subject::Local(local) => {
                let local = body.local(local);
                visible
                    .iter()
                    .find(|var| var.name == local.name && var.desc == local.desc)
            }
        };
        let Some(subject) = subject.copied() else { return };
        if self.discriminator.accepts(&subject, &visible) {
            sink.add(element, span, Some(subject.name.to_string()));
        }
    }
}

struct CtorHead {
    enforce: Enforce,
    last_store: Option<(SourceElement, Span)>,
}

impl MirrorVisitor for CtorHead {
    fn visit(&mut self, unit: &Unit<'_>, step: Step, _sink: &mut Sink) {
        if !unit.target.is_constructor() {
            return;
        }
        match step {
            Step::Event(Event::Expr(id)) => {
                if let Expr::FieldWrite {
                    owner,
                    is_static: false,
                    range,
                    ..
                } = unit.expr(id)
                {
                    if owner == unit.class_name() {
                        self.last_store = Some((SourceElement::Expr(id), *range));
                    }
                }
            }
            Step::FieldInit(position) => {
                let span = unit.target.class.fields[position].span;
                self.last_store = Some((SourceElement::Field(position), span));
            }
            _ => {}
        }
    }

    fn visit_end(&mut self, unit: &Unit<'_>, sink: &mut Sink) {
        let body = (SourceElement::Body, unit.target.range());
        if !unit.target.is_constructor() {
            sink.add(body.0, body.1, None);
            return;
        }
        let delegate = unit
            .delegate
            .map(|call| (SourceElement::Expr(call), unit.expr(call).range()));
        let delegates_to_this = matches!(
            unit.delegate.map(|call| unit.expr(call)),
            Some(Expr::Call { owner, .. }) if owner == unit.class_name()
        );
        let (element, span) = match self.enforce {
            Enforce::PostDelegate => delegate.unwrap_or(body),
            Enforce::Default | Enforce::PostInit if delegates_to_this => delegate.unwrap_or(body),
            Enforce::Default | Enforce::PostInit => self.last_store.or(delegate).unwrap_or(body),
        };
        sink.add(element, span, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointcut_hir::{BodyBuilder, CallKind};
    use pointcut_test_utils::fixtures::{target_fixture, TARGET};
    use pretty_assertions::assert_eq;

    fn matches_in(
        source: &SourceClass,
        method: &str,
        point: InjectionPoint,
        at: &AtSpec,
        selector: Option<&MemberSelector>,
    ) -> Vec<SourceMatch> {
        let method = source
            .methods
            .iter()
            .find(|m| m.name == method)
            .expect("fixture method");
        let target = MirrorTarget::method(source, method).expect("body");
        source_matches(&point, at, selector, &target)
            .expect("valid at")
            .expect("kind has a source form")
    }

    #[test]
    fn invocations_include_implicit_iteration_calls() {
        let fixture = target_fixture();
        let at = AtSpec::new("INVOKE");
        let found = matches_in(&fixture.source, "eachList", InjectionPoint::Invoke, &at, None);
        let labels: Vec<_> = found.iter().filter_map(|m| m.label.clone()).collect();
        assert_eq!(
            labels,
            vec![
                "Ljava/util/List;iterator()Ljava/util/Iterator;".to_string(),
                "Ljava/util/Iterator;hasNext()Z".to_string(),
                "Ljava/util/Iterator;next()Ljava/lang/Object;".to_string(),
            ]
        );

        let found = matches_in(&fixture.source, "eachArray", InjectionPoint::Invoke, &at, None);
        assert!(found.is_empty());
    }

    #[test]
    fn constructor_calls_are_not_invocations() {
        let fixture = target_fixture();
        let found = matches_in(
            &fixture.source,
            "<init>",
            InjectionPoint::Invoke,
            &AtSpec::new("INVOKE"),
            None,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn tail_keeps_only_the_last_return() {
        let fixture = target_fixture();
        let at = AtSpec::new("TAIL");
        let found = matches_in(&fixture.source, "mixed", InjectionPoint::Tail, &at, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index, 0);
        assert!(matches!(found[0].element, SourceElement::Stmt(_)));

        let found = matches_in(&fixture.source, "local", InjectionPoint::Tail, &at, None);
        assert_eq!(found[0].element, SourceElement::End);
    }

    #[test]
    fn returns_include_the_implicit_one() {
        let fixture = target_fixture();
        let at = AtSpec::new("RETURN");
        let found = matches_in(&fixture.source, "mixed", InjectionPoint::Return, &at, None);
        assert_eq!(found.len(), 2);
        let found = matches_in(&fixture.source, "local", InjectionPoint::Return, &at, None);
        assert_eq!(
            found.iter().map(|m| m.element).collect::<Vec<_>>(),
            vec![SourceElement::End]
        );
    }

    #[test]
    fn zero_comparisons_load_no_constant() {
        let fixture = target_fixture();
        let at = AtSpec::new("CONSTANT");
        let found = matches_in(&fixture.source, "mixed", InjectionPoint::Constant, &at, None);
        let labels: Vec<_> = found.iter().filter_map(|m| m.label.clone()).collect();
        assert_eq!(
            labels,
            vec![
                "stringValue=x".to_string(),
                "intValue=-1".to_string(),
                "intValue=7".to_string(),
                "stringValue=done".to_string(),
            ]
        );

        let at = AtSpec::new("CONSTANT")
            .with_arg("intValue", "0")
            .with_arg("expandZeroConditions", "LESS_THAN_ZERO");
        let found = matches_in(&fixture.source, "mixed", InjectionPoint::Constant, &at, None);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn null_comparisons_and_boolean_conditions_are_folded() {
        let mut b = BodyBuilder::instance();
        let p = b.param("p", "Ljava/lang/Object;");
        let read = b.read(p);
        let null = b.null();
        let cmp = b.binary(BinaryOp::Eq, read, null, OperandType::Reference);
        let empty = b.block(vec![]);
        let s1 = b.if_stmt(cmp, empty, None);
        let cond = b.bool(true);
        let empty = b.block(vec![]);
        let s2 = b.if_stmt(cond, empty, None);
        let value = b.bool(true);
        let flag = b.local("flag", "Z");
        let s3 = b.let_stmt(flag, Some(value));
        let body = b.finish(vec![s1, s2, s3]);

        let method = SourceMethod {
            name: "m".into(),
            desc: "(Ljava/lang/Object;)V".into(),
            access: 0,
            body: Some(body),
            span: Span::default(),
        };
        let class = SourceClass::new("a/B").with_method(method);
        let found = matches_in(
            &class,
            "m",
            InjectionPoint::Constant,
            &AtSpec::new("CONSTANT"),
            None,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].element, SourceElement::Expr(value));
    }

    #[test]
    fn array_length_field_reads() {
        let fixture = target_fixture();
        let at = AtSpec::new("FIELD").with_arg("array", "length");
        let found = matches_in(&fixture.source, "mixed", InjectionPoint::Field, &at, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label.as_deref(), Some("Lcom/example/Target;values:[I"));
    }

    #[test]
    fn constructor_field_initializers_follow_the_super_call() {
        let fixture = target_fixture();
        let found = matches_in(
            &fixture.source,
            "<init>",
            InjectionPoint::Field,
            &AtSpec::new("FIELD"),
            None,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].element, SourceElement::Field(0));

        let found = matches_in(
            &fixture.source,
            "<init>",
            InjectionPoint::CtorHead,
            &AtSpec::new("CTOR_HEAD"),
            None,
        );
        assert_eq!(found[0].element, SourceElement::Field(0));

        let at = AtSpec::new("CTOR_HEAD").with_arg("enforce", "POST_DELEGATE");
        let found = matches_in(&fixture.source, "<init>", InjectionPoint::CtorHead, &at, None);
        assert!(matches!(found[0].element, SourceElement::Expr(_)));
    }

    #[test]
    fn this_delegation_skips_initializers() {
        let mut b = BodyBuilder::instance();
        let this = b.this();
        let call = b.call(Some(this), TARGET, "<init>", "(I)V", CallKind::Special, vec![]);
        let stmt = b.expr_stmt(call);
        let body = b.finish(vec![stmt]);
        let fixture = target_fixture();
        let class = fixture.source.clone().with_method(SourceMethod {
            name: "<init>".into(),
            desc: "()V".into(),
            access: 0,
            body: Some(body),
            span: Span::default(),
        });
        let method = class.methods.last().expect("added");
        let target = MirrorTarget::method(&class, method).expect("body");
        let found = source_matches(
            &InjectionPoint::CtorHead,
            &AtSpec::new("CTOR_HEAD"),
            None,
            &target,
        )
        .unwrap()
        .unwrap();
        assert_eq!(found[0].element, SourceElement::Expr(call));
    }

    #[test]
    fn loads_are_matched_by_name_within_scope() {
        let fixture = target_fixture();
        let at = AtSpec::new("LOAD").with_local(LocalDiscriminator::named("n"));
        let found = matches_in(&fixture.source, "mixed", InjectionPoint::Load, &at, None);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|m| m.label.as_deref() == Some("n")));

        let at = AtSpec::new("STORE").with_local(LocalDiscriminator::typed("I"));
        let found = matches_in(&fixture.source, "mixed", InjectionPoint::Store, &at, None);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn jumps_have_no_source_form() {
        let fixture = target_fixture();
        let method = fixture.source.find_method("mixed", "(Ljava/lang/String;)I").unwrap();
        let target = MirrorTarget::method(&fixture.source, method).unwrap();
        let found = source_matches(&InjectionPoint::Jump, &AtSpec::new("JUMP"), None, &target).unwrap();
        assert_eq!(found, None);
    }
}
