//! Utilities shared by pointcut tests.
//!
//! * [`ClassAssembler`] turns [`MethodNode`](pointcut_classfile::MethodNode)s
//!   back into class-file bytes, so tests can exercise the full
//!   parse → analyze → resolve path without a Java toolchain.
//! * [`fixtures`] holds a canned target class in both compiled and source
//!   form.
//! * [`javac`](crate::javac) (feature `javac`) compiles real snippets for
//!   differential tests; those tests are `#[ignore]`d by default.

mod assembler;
pub mod fixtures;

pub use assembler::{AssembleError, ClassAssembler};

#[cfg(feature = "javac")]
pub mod javac;
