use pointcut_core::Span;

use crate::body::{
    BinaryOp, Body, CallKind, Expr, ForEachKind, LambdaBody, Literal, Local, LocalKind,
    OperandType, Stmt, UnaryOp,
};
use crate::ids::{Arena, ExprId, LocalId, StmtId};

/// Incremental constructor for [`Body`] trees.
///
/// Front ends and tests allocate children before parents. Nodes get
/// increasing one-character spans unless [`BodyBuilder::at`] sets the next
/// one explicitly.
#[derive(Debug, Default)]
pub struct BodyBuilder {
    stmts: Arena<Stmt>,
    exprs: Arena<Expr>,
    locals: Arena<Local>,
    params: Vec<LocalId>,
    next_slot: u16,
    cursor: usize,
    pending_span: Option<Span>,
}

impl BodyBuilder {
    /// A builder for a static method body; slots start at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder for an instance method body; slot 0 holds `this`.
    pub fn instance() -> Self {
        BodyBuilder {
            next_slot: 1,
            ..Self::default()
        }
    }

    /// Uses `span` for the next allocated node.
    pub fn at(&mut self, span: Span) -> &mut Self {
        self.pending_span = Some(span);
        self
    }

    fn span(&mut self) -> Span {
        if let Some(span) = self.pending_span.take() {
            return span;
        }
        let span = Span::new(self.cursor, self.cursor + 1);
        self.cursor += 1;
        span
    }

    fn alloc_expr(&mut self, make: impl FnOnce(Span) -> Expr) -> ExprId {
        let range = self.span();
        ExprId::from_raw(self.exprs.alloc(make(range)))
    }

    fn alloc_stmt(&mut self, make: impl FnOnce(Span) -> Stmt) -> StmtId {
        let range = self.span();
        StmtId::from_raw(self.stmts.alloc(make(range)))
    }

    fn alloc_local(&mut self, name: &str, desc: &str, kind: LocalKind) -> LocalId {
        let slot = self.next_slot;
        let width = if desc == "J" || desc == "D" { 2 } else { 1 };
        self.next_slot = self.next_slot.saturating_add(width);
        let range = self.span();
        LocalId::from_raw(self.locals.alloc(Local {
            name: name.to_string(),
            desc: desc.to_string(),
            kind,
            slot: Some(slot),
            range,
        }))
    }

    pub fn param(&mut self, name: &str, desc: &str) -> LocalId {
        let id = self.alloc_local(name, desc, LocalKind::Param);
        self.params.push(id);
        id
    }

    pub fn local(&mut self, name: &str, desc: &str) -> LocalId {
        self.alloc_local(name, desc, LocalKind::Local)
    }

    pub fn foreach_local(&mut self, name: &str, desc: &str) -> LocalId {
        self.alloc_local(name, desc, LocalKind::ForEach)
    }

    /// Lambda parameters live in the synthetic method, so they take no slot
    /// in the enclosing body.
    pub fn lambda_param(&mut self, name: &str, desc: &str) -> LocalId {
        let range = self.span();
        LocalId::from_raw(self.locals.alloc(Local {
            name: name.to_string(),
            desc: desc.to_string(),
            kind: LocalKind::LambdaParam,
            slot: None,
            range,
        }))
    }

    pub fn literal(&mut self, value: Literal) -> ExprId {
        self.alloc_expr(|range| Expr::Literal { value, range })
    }

    pub fn int(&mut self, value: i32) -> ExprId {
        self.literal(Literal::Int(value))
    }

    pub fn long(&mut self, value: i64) -> ExprId {
        self.literal(Literal::Long(value))
    }

    pub fn double(&mut self, value: f64) -> ExprId {
        self.literal(Literal::Double(value))
    }

    pub fn bool(&mut self, value: bool) -> ExprId {
        self.literal(Literal::Bool(value))
    }

    pub fn string(&mut self, value: &str) -> ExprId {
        self.literal(Literal::String(value.to_string()))
    }

    pub fn null(&mut self) -> ExprId {
        self.literal(Literal::Null)
    }

    pub fn this(&mut self) -> ExprId {
        self.alloc_expr(|range| Expr::This { range })
    }

    pub fn read(&mut self, local: LocalId) -> ExprId {
        self.alloc_expr(|range| Expr::LocalRead { local, range })
    }

    pub fn write(&mut self, local: LocalId, value: ExprId) -> ExprId {
        self.alloc_expr(|range| Expr::LocalWrite {
            local,
            value,
            range,
        })
    }

    pub fn get_field(&mut self, receiver: ExprId, owner: &str, name: &str, desc: &str) -> ExprId {
        self.field_read(Some(receiver), owner, name, desc, false)
    }

    pub fn get_static(&mut self, owner: &str, name: &str, desc: &str) -> ExprId {
        self.field_read(None, owner, name, desc, true)
    }

    fn field_read(
        &mut self,
        receiver: Option<ExprId>,
        owner: &str,
        name: &str,
        desc: &str,
        is_static: bool,
    ) -> ExprId {
        self.alloc_expr(|range| Expr::FieldRead {
            receiver,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            is_static,
            range,
        })
    }

    pub fn put_field(
        &mut self,
        receiver: ExprId,
        owner: &str,
        name: &str,
        desc: &str,
        value: ExprId,
    ) -> ExprId {
        self.field_write(Some(receiver), owner, name, desc, false, value)
    }

    pub fn put_static(&mut self, owner: &str, name: &str, desc: &str, value: ExprId) -> ExprId {
        self.field_write(None, owner, name, desc, true, value)
    }

    fn field_write(
        &mut self,
        receiver: Option<ExprId>,
        owner: &str,
        name: &str,
        desc: &str,
        is_static: bool,
        value: ExprId,
    ) -> ExprId {
        self.alloc_expr(|range| Expr::FieldWrite {
            receiver,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            is_static,
            value,
            range,
        })
    }

    pub fn array_length(&mut self, array: ExprId) -> ExprId {
        self.alloc_expr(|range| Expr::ArrayLength { array, range })
    }

    pub fn array_read(&mut self, array: ExprId, index: ExprId) -> ExprId {
        self.alloc_expr(|range| Expr::ArrayRead {
            array,
            index,
            range,
        })
    }

    pub fn array_write(&mut self, array: ExprId, index: ExprId, value: ExprId) -> ExprId {
        self.alloc_expr(|range| Expr::ArrayWrite {
            array,
            index,
            value,
            range,
        })
    }

    pub fn call(
        &mut self,
        receiver: Option<ExprId>,
        owner: &str,
        name: &str,
        desc: &str,
        kind: CallKind,
        args: Vec<ExprId>,
    ) -> ExprId {
        self.alloc_expr(|range| Expr::Call {
            receiver,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            kind,
            args,
            range,
        })
    }

    pub fn new_object(&mut self, class: &str, ctor_desc: &str, args: Vec<ExprId>) -> ExprId {
        self.alloc_expr(|range| Expr::New {
            class: class.to_string(),
            ctor_desc: ctor_desc.to_string(),
            args,
            anonymous: None,
            range,
        })
    }

    pub fn new_anonymous(
        &mut self,
        class: &str,
        ctor_desc: &str,
        args: Vec<ExprId>,
        anonymous: &str,
    ) -> ExprId {
        self.alloc_expr(|range| Expr::New {
            class: class.to_string(),
            ctor_desc: ctor_desc.to_string(),
            args,
            anonymous: Some(anonymous.to_string()),
            range,
        })
    }

    pub fn new_array(&mut self, elem_desc: &str, dims: Vec<ExprId>) -> ExprId {
        self.alloc_expr(|range| Expr::NewArray {
            elem_desc: elem_desc.to_string(),
            dims,
            range,
        })
    }

    pub fn binary(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        operand: OperandType,
    ) -> ExprId {
        self.alloc_expr(|range| Expr::Binary {
            op,
            lhs,
            rhs,
            operand,
            range,
        })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        self.alloc_expr(|range| Expr::Unary { op, operand, range })
    }

    pub fn conditional(&mut self, condition: ExprId, then_expr: ExprId, else_expr: ExprId) -> ExprId {
        self.alloc_expr(|range| Expr::Conditional {
            condition,
            then_expr,
            else_expr,
            range,
        })
    }

    pub fn cast(&mut self, expr: ExprId, desc: &str) -> ExprId {
        self.alloc_expr(|range| Expr::Cast {
            expr,
            desc: desc.to_string(),
            range,
        })
    }

    pub fn instance_of(&mut self, expr: ExprId, class: &str) -> ExprId {
        self.alloc_expr(|range| Expr::InstanceOf {
            expr,
            class: class.to_string(),
            range,
        })
    }

    pub fn lambda(&mut self, params: Vec<LocalId>, body: LambdaBody) -> ExprId {
        self.alloc_expr(|range| Expr::Lambda {
            params,
            body,
            range,
        })
    }

    pub fn method_ref(
        &mut self,
        receiver: Option<ExprId>,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> ExprId {
        self.alloc_expr(|range| Expr::MethodRef {
            receiver,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            range,
        })
    }

    pub fn missing(&mut self) -> ExprId {
        self.alloc_expr(|range| Expr::Missing { range })
    }

    pub fn let_stmt(&mut self, local: LocalId, initializer: Option<ExprId>) -> StmtId {
        self.alloc_stmt(|range| Stmt::Let {
            local,
            initializer,
            range,
        })
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.alloc_stmt(|range| Stmt::Expr { expr, range })
    }

    pub fn block(&mut self, statements: Vec<StmtId>) -> StmtId {
        self.alloc_stmt(|range| Stmt::Block { statements, range })
    }

    pub fn if_stmt(
        &mut self,
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    ) -> StmtId {
        self.alloc_stmt(|range| Stmt::If {
            condition,
            then_branch,
            else_branch,
            range,
        })
    }

    pub fn while_stmt(&mut self, condition: ExprId, body: StmtId) -> StmtId {
        self.alloc_stmt(|range| Stmt::While {
            condition,
            body,
            range,
        })
    }

    pub fn for_each(
        &mut self,
        local: LocalId,
        iterable: ExprId,
        kind: ForEachKind,
        body: StmtId,
    ) -> StmtId {
        self.alloc_stmt(|range| Stmt::ForEach {
            local,
            iterable,
            kind,
            body,
            range,
        })
    }

    pub fn ret(&mut self, expr: Option<ExprId>) -> StmtId {
        self.alloc_stmt(|range| Stmt::Return { expr, range })
    }

    pub fn throw(&mut self, expr: ExprId) -> StmtId {
        self.alloc_stmt(|range| Stmt::Throw { expr, range })
    }

    pub fn local_class(&mut self, name: &str) -> StmtId {
        self.alloc_stmt(|range| Stmt::LocalClass {
            name: name.to_string(),
            range,
        })
    }

    pub fn empty(&mut self) -> StmtId {
        self.alloc_stmt(|range| Stmt::Empty { range })
    }

    /// Wraps `statements` in the root block.
    pub fn finish(mut self, statements: Vec<StmtId>) -> Body {
        let root = self.block(statements);
        Body {
            root,
            params: self.params,
            stmts: self.stmts,
            exprs: self.exprs,
            locals: self.locals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_declaration_order_and_width() {
        let mut b = BodyBuilder::instance();
        let a = b.param("a", "J");
        let c = b.param("c", "I");
        let x = b.local("x", "Ljava/lang/String;");
        let body = b.finish(vec![]);

        assert_eq!(body.local(a).slot, Some(1));
        assert_eq!(body.local(c).slot, Some(3));
        assert_eq!(body.local(x).slot, Some(4));
        assert_eq!(body.params, vec![a, c]);
    }

    #[test]
    fn explicit_span_applies_to_the_next_node_only() {
        let mut b = BodyBuilder::new();
        let first = b.at(Span::new(40, 45)).int(1);
        let second = b.int(2);
        let body = b.finish(vec![]);

        assert_eq!(body.exprs[first].range(), Span::new(40, 45));
        assert_ne!(body.exprs[second].range(), Span::new(40, 45));
    }
}
