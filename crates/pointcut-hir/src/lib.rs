//! Resolved source trees of method bodies.
//!
//! The host's Java front end lowers each method it has attributed into a
//! [`Body`]: an arena of statements, expressions and locals whose member
//! references already carry owners and descriptors. The resolver walks these
//! trees to map bytecode matches back to source.

mod body;
mod builder;
mod class;
mod ids;
mod walk;

pub use crate::body::{
    BinaryOp, Body, CallKind, Expr, ForEachKind, LambdaBody, Literal, Local, LocalKind,
    OperandType, Stmt, UnaryOp,
};
pub use crate::builder::BodyBuilder;
pub use crate::class::{SourceClass, SourceField, SourceMethod};
pub use crate::ids::{Arena, ExprId, LocalId, StmtId};
pub use crate::walk::{can_complete_normally, lambdas_in, walk, Event, Visitor, WalkRoot};
