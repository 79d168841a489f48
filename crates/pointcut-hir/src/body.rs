use pointcut_core::Span;

use crate::ids::{Arena, ExprId, LocalId, StmtId};

/// A resolved method body.
///
/// Member references are already resolved to internal names and descriptors;
/// the tree is what the compiler saw after attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub root: StmtId,
    pub params: Vec<LocalId>,
    pub stmts: Arena<Stmt>,
    pub exprs: Arena<Expr>,
    pub locals: Arena<Local>,
}

impl Body {
    #[must_use]
    pub fn empty(range: Span) -> Self {
        let mut stmts = Arena::default();
        let root = StmtId::from_raw(stmts.alloc(Stmt::Block {
            statements: Vec::new(),
            range,
        }));
        Body {
            root,
            params: Vec::new(),
            stmts,
            exprs: Arena::default(),
            locals: Arena::default(),
        }
    }

    #[must_use]
    pub fn range(&self) -> Span {
        self.stmts[self.root].range()
    }

    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id]
    }

    /// The innermost expression containing each expression, if any.
    ///
    /// Lambda parameters and bodies are included; statement boundaries stop
    /// the chain.
    #[must_use]
    pub fn expr_parents(&self) -> Vec<Option<ExprId>> {
        let mut parents = vec![None; self.exprs.len()];
        for (raw, expr) in self.exprs.iter() {
            let parent = ExprId::from_raw(raw);
            for child in expr.children() {
                parents[child.idx()] = Some(parent);
            }
        }
        parents
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
    Param,
    Local,
    /// The iteration variable of an enhanced `for`.
    ForEach,
    /// A parameter of a lambda expression.
    LambdaParam,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: String,
    /// Field descriptor of the declared type.
    pub desc: String,
    pub kind: LocalKind,
    /// The slot the compiler assigned, when the host knows it.
    pub slot: Option<u16>,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block {
        statements: Vec<StmtId>,
        range: Span,
    },
    Let {
        local: LocalId,
        initializer: Option<ExprId>,
        range: Span,
    },
    Expr {
        expr: ExprId,
        range: Span,
    },
    If {
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
        range: Span,
    },
    While {
        condition: ExprId,
        body: StmtId,
        range: Span,
    },
    ForEach {
        local: LocalId,
        iterable: ExprId,
        kind: ForEachKind,
        body: StmtId,
        range: Span,
    },
    Return {
        expr: Option<ExprId>,
        range: Span,
    },
    Throw {
        expr: ExprId,
        range: Span,
    },
    /// A class declared inside the body. Its members are a separate unit.
    LocalClass {
        name: String,
        range: Span,
    },
    Empty {
        range: Span,
    },
}

impl Stmt {
    #[must_use]
    pub fn range(&self) -> Span {
        match self {
            Stmt::Block { range, .. }
            | Stmt::Let { range, .. }
            | Stmt::Expr { range, .. }
            | Stmt::If { range, .. }
            | Stmt::While { range, .. }
            | Stmt::ForEach { range, .. }
            | Stmt::Return { range, .. }
            | Stmt::Throw { range, .. }
            | Stmt::LocalClass { range, .. }
            | Stmt::Empty { range } => *range,
        }
    }
}

/// How an enhanced `for` iterates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ForEachKind {
    /// Indexed loop over an array; no calls are emitted.
    Array,
    /// `iterator()` on `owner`, then `hasNext()`/`next()` on `java/util/Iterator`.
    Iterable { owner: String, interface: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Virtual,
    Static,
    Special,
    Interface,
}

impl CallKind {
    #[must_use]
    pub fn is_static(self) -> bool {
        matches!(self, CallKind::Static)
    }
}

/// A typed compile-time constant as written in source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Class literal; holds a field descriptor (`Ljava/lang/String;`, `I`, `[I`).
    Class(String),
}

/// Operand type of a binary operation after numeric promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    #[must_use]
    pub fn is_ordering(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LambdaBody {
    Expr(ExprId),
    Block(StmtId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
        range: Span,
    },
    This {
        range: Span,
    },
    LocalRead {
        local: LocalId,
        range: Span,
    },
    LocalWrite {
        local: LocalId,
        value: ExprId,
        range: Span,
    },
    FieldRead {
        receiver: Option<ExprId>,
        owner: String,
        name: String,
        desc: String,
        is_static: bool,
        range: Span,
    },
    FieldWrite {
        receiver: Option<ExprId>,
        owner: String,
        name: String,
        desc: String,
        is_static: bool,
        value: ExprId,
        range: Span,
    },
    ArrayLength {
        array: ExprId,
        range: Span,
    },
    ArrayRead {
        array: ExprId,
        index: ExprId,
        range: Span,
    },
    ArrayWrite {
        array: ExprId,
        index: ExprId,
        value: ExprId,
        range: Span,
    },
    Call {
        receiver: Option<ExprId>,
        owner: String,
        name: String,
        desc: String,
        kind: CallKind,
        args: Vec<ExprId>,
        range: Span,
    },
    New {
        class: String,
        ctor_desc: String,
        args: Vec<ExprId>,
        /// Binary name of the anonymous class, if the expression declares one.
        anonymous: Option<String>,
        range: Span,
    },
    NewArray {
        elem_desc: String,
        dims: Vec<ExprId>,
        range: Span,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        operand: OperandType,
        range: Span,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
        range: Span,
    },
    Conditional {
        condition: ExprId,
        then_expr: ExprId,
        else_expr: ExprId,
        range: Span,
    },
    Cast {
        expr: ExprId,
        desc: String,
        range: Span,
    },
    InstanceOf {
        expr: ExprId,
        class: String,
        range: Span,
    },
    Lambda {
        params: Vec<LocalId>,
        body: LambdaBody,
        range: Span,
    },
    MethodRef {
        receiver: Option<ExprId>,
        owner: String,
        name: String,
        desc: String,
        range: Span,
    },
    Missing {
        range: Span,
    },
}

impl Expr {
    #[must_use]
    pub fn range(&self) -> Span {
        match self {
            Expr::Literal { range, .. }
            | Expr::This { range }
            | Expr::LocalRead { range, .. }
            | Expr::LocalWrite { range, .. }
            | Expr::FieldRead { range, .. }
            | Expr::FieldWrite { range, .. }
            | Expr::ArrayLength { range, .. }
            | Expr::ArrayRead { range, .. }
            | Expr::ArrayWrite { range, .. }
            | Expr::Call { range, .. }
            | Expr::New { range, .. }
            | Expr::NewArray { range, .. }
            | Expr::Binary { range, .. }
            | Expr::Unary { range, .. }
            | Expr::Conditional { range, .. }
            | Expr::Cast { range, .. }
            | Expr::InstanceOf { range, .. }
            | Expr::Lambda { range, .. }
            | Expr::MethodRef { range, .. }
            | Expr::Missing { range } => *range,
        }
    }

    /// Direct sub-expressions in evaluation order. Lambda bodies are not
    /// included.
    #[must_use]
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            Expr::Literal { .. }
            | Expr::This { .. }
            | Expr::LocalRead { .. }
            | Expr::Lambda { .. }
            | Expr::Missing { .. } => Vec::new(),
            Expr::LocalWrite { value, .. } => vec![*value],
            Expr::FieldRead { receiver, .. } | Expr::MethodRef { receiver, .. } => {
                receiver.iter().copied().collect()
            }
            Expr::FieldWrite {
                receiver, value, ..
            } => receiver.iter().copied().chain([*value]).collect(),
            Expr::ArrayLength { array, .. } => vec![*array],
            Expr::ArrayRead { array, index, .. } => vec![*array, *index],
            Expr::ArrayWrite {
                array,
                index,
                value,
                ..
            } => vec![*array, *index, *value],
            Expr::Call { receiver, args, .. } => {
                receiver.iter().chain(args.iter()).copied().collect()
            }
            Expr::New { args, .. } => args.clone(),
            Expr::NewArray { dims, .. } => dims.clone(),
            Expr::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Expr::Unary { operand, .. } => vec![*operand],
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
                ..
            } => vec![*condition, *then_expr, *else_expr],
            Expr::Cast { expr, .. } | Expr::InstanceOf { expr, .. } => vec![*expr],
        }
    }

    /// Whether the method returns void, for call expressions.
    #[must_use]
    pub fn is_void_call(&self) -> bool {
        matches!(self, Expr::Call { desc, .. } if desc.ends_with(")V"))
    }
}
