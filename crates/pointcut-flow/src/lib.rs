//! Type inference and local-variable reconstruction over compiled methods.
//!
//! [`analyze`] computes a [`Frame`] for every node of a method;
//! [`generate_table`] derives a local table from those frames when the
//! compiler's `LocalVariableTable` is missing; [`locals_at`] reports which
//! named locals are live at a given instruction, simulating stack-map frames
//! along the way.

mod analyzer;
mod cache;
mod hierarchy;
mod locals;
mod settings;
mod value;

pub use crate::analyzer::{analyze, AnalyzeError, Frame, Frames};
pub use crate::cache::{AnalysisCache, MethodAnalysis};
pub use crate::hierarchy::{common_super_class, NoHierarchy, TypeHierarchy};
pub use crate::locals::{
    declared_table, generate_table, locals_at, LocalTable, LocalVariable, LocalsContext,
    LocalsError, Slot, Zombie, ZombieCause,
};
pub use crate::settings::LocalsSettings;
pub use crate::value::TypeValue;
