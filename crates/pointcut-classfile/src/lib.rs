#![forbid(unsafe_code)]

mod builder;
mod classfile;
mod code;
mod constant_pool;
mod descriptor;
mod error;
mod frame;
mod insn;
pub mod opcodes;
mod reader;

pub use crate::builder::MethodBuilder;
pub use crate::classfile::{ClassNode, FieldNode, LocalVariableNode, MethodNode, TryCatchBlock};
pub use crate::descriptor::{class_operand_descriptor, parse_field_descriptor, parse_method_descriptor};
pub use crate::descriptor::{BaseType, FieldType, MethodDescriptor, ReturnType};
pub use crate::error::{Error, Result};
pub use crate::frame::{expand, initial_locals, FrameKind, FrameNode, FrameValue};
pub use crate::insn::{Constant, Handle, Insn, InsnId, InsnList, LabelId};
