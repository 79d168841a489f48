//! Evaluation-order traversal of a [`Body`].
//!
//! The walk reports one [`Event`] per point where the compiler emits an
//! instruction a matcher may care about, in the order javac emits them. It
//! stays inside one compiled unit: lambda bodies, anonymous class bodies and
//! local classes compile to other methods and are never entered.

use std::ops::ControlFlow;

use crate::body::{Body, Expr, ForEachKind, LambdaBody, Literal, Stmt};
use crate::ids::{ExprId, StmtId};

/// Where a walk starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkRoot {
    Stmt(StmtId),
    /// An expression-bodied lambda.
    Expr(ExprId),
}

impl WalkRoot {
    /// The root of a lambda expression's body.
    pub fn of_lambda(body: &Body, lambda: ExprId) -> Option<WalkRoot> {
        match &body.exprs[lambda] {
            Expr::Lambda {
                body: LambdaBody::Block(stmt),
                ..
            } => Some(WalkRoot::Stmt(*stmt)),
            Expr::Lambda {
                body: LambdaBody::Expr(expr),
                ..
            } => Some(WalkRoot::Expr(*expr)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The allocation of a `new` expression, before its arguments.
    Allocate(ExprId),
    /// An expression, after its operands were evaluated.
    Expr(ExprId),
    /// The initializing store of a `let` or the loop variable store of an
    /// enhanced `for`.
    Store(StmtId),
    Return(StmtId),
    Throw(StmtId),
    /// `iterator()` call of an enhanced `for` over an iterable.
    Iterator(StmtId),
    /// `hasNext()` call of an enhanced `for` over an iterable.
    HasNext(StmtId),
    /// `next()` call of an enhanced `for` over an iterable.
    Next(StmtId),
}

pub trait Visitor {
    fn visit(&mut self, body: &Body, event: Event) -> ControlFlow<()>;
}

impl<F> Visitor for F
where
    F: FnMut(&Body, Event) -> ControlFlow<()>,
{
    fn visit(&mut self, body: &Body, event: Event) -> ControlFlow<()> {
        self(body, event)
    }
}

/// Walks `root` in evaluation order. Stops early when the visitor breaks.
pub fn walk(body: &Body, root: WalkRoot, visitor: &mut dyn Visitor) -> ControlFlow<()> {
    let mut walker = Walker { body, visitor };
    match root {
        WalkRoot::Stmt(stmt) => walker.stmt(stmt),
        WalkRoot::Expr(expr) => walker.expr(expr),
    }
}

/// Lambdas directly owned by `root`, in the order their call sites are
/// emitted. Lambdas nested in those lambdas are not included.
#[must_use]
pub fn lambdas_in(body: &Body, root: WalkRoot) -> Vec<ExprId> {
    let mut found = Vec::new();
    let _ = walk(body, root, &mut |body: &Body, event: Event| {
        if let Event::Expr(id) = event {
            if matches!(body.exprs[id], Expr::Lambda { .. }) {
                found.push(id);
            }
        }
        ControlFlow::Continue(())
    });
    found
}

/// Whether control can fall off the end of `stmt`.
///
/// There are no `break` statements in the tree, so a `while (true)` loop never
/// completes normally.
#[must_use]
pub fn can_complete_normally(body: &Body, stmt: StmtId) -> bool {
    match &body.stmts[stmt] {
        Stmt::Block { statements, .. } => statements
            .iter()
            .all(|stmt| can_complete_normally(body, *stmt)),
        Stmt::Return { .. } | Stmt::Throw { .. } => false,
        Stmt::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => can_complete_normally(body, *then_branch) || can_complete_normally(body, *else_branch),
        Stmt::While { condition, .. } => !matches!(
            body.exprs[*condition],
            Expr::Literal {
                value: Literal::Bool(true),
                ..
            }
        ),
        _ => true,
    }
}

struct Walker<'a> {
    body: &'a Body,
    visitor: &'a mut dyn Visitor,
}

impl Walker<'_> {
    fn emit(&mut self, event: Event) -> ControlFlow<()> {
        self.visitor.visit(self.body, event)
    }

    fn stmt(&mut self, id: StmtId) -> ControlFlow<()> {
        let body = self.body;
        match &body.stmts[id] {
            Stmt::Block { statements, .. } => {
                for stmt in statements {
                    self.stmt(*stmt)?;
                }
            }
            Stmt::Let {
                initializer: Some(init),
                ..
            } => {
                self.expr(*init)?;
                self.emit(Event::Store(id))?;
            }
            Stmt::Let { .. } | Stmt::LocalClass { .. } | Stmt::Empty { .. } => {}
            Stmt::Expr { expr, .. } => self.expr(*expr)?,
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.expr(*condition)?;
                self.stmt(*then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.stmt(*else_branch)?;
                }
            }
            Stmt::While {
                condition,
                body: loop_body,
                ..
            } => {
                self.expr(*condition)?;
                self.stmt(*loop_body)?;
            }
            Stmt::ForEach {
                iterable,
                kind,
                body: loop_body,
                ..
            } => {
                self.expr(*iterable)?;
                if let ForEachKind::Iterable { .. } = kind {
                    self.emit(Event::Iterator(id))?;
                    self.emit(Event::HasNext(id))?;
                    self.emit(Event::Next(id))?;
                }
                self.emit(Event::Store(id))?;
                self.stmt(*loop_body)?;
            }
            Stmt::Return { expr, .. } => {
                if let Some(expr) = expr {
                    self.expr(*expr)?;
                }
                self.emit(Event::Return(id))?;
            }
            Stmt::Throw { expr, .. } => {
                self.expr(*expr)?;
                self.emit(Event::Throw(id))?;
            }
        }
        ControlFlow::Continue(())
    }

    fn expr(&mut self, id: ExprId) -> ControlFlow<()> {
        let body = self.body;
        let expr = &body.exprs[id];
        if let Expr::New { .. } = expr {
            self.emit(Event::Allocate(id))?;
        }
        for child in expr.children() {
            self.expr(child)?;
        }
        self.emit(Event::Expr(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BodyBuilder;
    use crate::body::CallKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn foreach_over_iterable_emits_implicit_calls_in_order() {
        let mut b = BodyBuilder::new();
        let list = b.param("list", "Ljava/util/List;");
        let s = b.local("s", "Ljava/lang/Object;");
        let read = b.read(list);
        let arg = b.read(s);
        let call = b.call(None, "Foo", "use", "(Ljava/lang/Object;)V", CallKind::Static, vec![arg]);
        let call_stmt = b.expr_stmt(call);
        let loop_body = b.block(vec![call_stmt]);
        let each = b.for_each(s, read, ForEachKind::Iterable {
            owner: "java/util/List".into(),
            interface: true,
        }, loop_body);
        let body = b.finish(vec![each]);

        let mut events = Vec::new();
        let _ = walk(&body, WalkRoot::Stmt(body.root), &mut |_: &Body, event: Event| {
            events.push(event);
            ControlFlow::Continue(())
        });
        assert_eq!(
            events,
            vec![
                Event::Expr(read),
                Event::Iterator(each),
                Event::HasNext(each),
                Event::Next(each),
                Event::Store(each),
                Event::Expr(arg),
                Event::Expr(call),
            ]
        );
    }

    #[test]
    fn new_allocates_before_arguments() {
        let mut b = BodyBuilder::new();
        let one = b.int(1);
        let new = b.new_object("Foo", "(I)V", vec![one]);
        let stmt = b.expr_stmt(new);
        let body = b.finish(vec![stmt]);

        let mut events = Vec::new();
        let _ = walk(&body, WalkRoot::Stmt(body.root), &mut |_: &Body, event: Event| {
            events.push(event);
            ControlFlow::Continue(())
        });
        assert_eq!(
            events,
            vec![Event::Allocate(new), Event::Expr(one), Event::Expr(new)]
        );
    }

    #[test]
    fn lambda_bodies_are_not_entered() {
        let mut b = BodyBuilder::new();
        let inner_call = b.call(None, "Foo", "bar", "()V", CallKind::Static, vec![]);
        let inner = b.lambda(vec![], LambdaBody::Expr(inner_call));
        let outer = b.lambda(vec![], LambdaBody::Expr(inner));
        let stmt = b.expr_stmt(outer);
        let body = b.finish(vec![stmt]);

        assert_eq!(lambdas_in(&body, WalkRoot::Stmt(body.root)), vec![outer]);
        let outer_root = WalkRoot::of_lambda(&body, outer).expect("lambda root");
        assert_eq!(lambdas_in(&body, outer_root), vec![inner]);
    }

    #[test]
    fn walk_stops_when_the_visitor_breaks() {
        let mut b = BodyBuilder::new();
        let first = b.int(1);
        let second = b.int(2);
        let s1 = b.expr_stmt(first);
        let s2 = b.expr_stmt(second);
        let body = b.finish(vec![s1, s2]);

        let mut seen = 0;
        let flow = walk(&body, WalkRoot::Stmt(body.root), &mut |_: &Body, _: Event| {
            seen += 1;
            ControlFlow::Break(())
        });
        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(seen, 1);
    }

    #[test]
    fn completion_analysis() {
        let mut b = BodyBuilder::new();
        let ret = b.ret(None);
        let body = b.finish(vec![ret]);
        assert!(!can_complete_normally(&body, body.root));

        let mut b = BodyBuilder::new();
        let cond = b.bool(true);
        let empty = b.block(vec![]);
        let ret = b.ret(None);
        let branch = b.if_stmt(cond, empty, Some(ret));
        let body = b.finish(vec![branch]);
        assert!(can_complete_normally(&body, body.root));

        let mut b = BodyBuilder::new();
        let cond = b.bool(true);
        let empty = b.block(vec![]);
        let forever = b.while_stmt(cond, empty);
        let body = b.finish(vec![forever]);
        assert!(!can_complete_normally(&body, body.root));
    }
}
