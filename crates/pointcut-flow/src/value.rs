use std::fmt;

use pointcut_classfile::{class_operand_descriptor, InsnId};

pub(crate) const OBJECT: &str = "java/lang/Object";

/// Abstract value of a local slot or stack entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeValue {
    /// Unset or conflicting; the top of the lattice.
    Uninitialized,
    Int,
    Float,
    Long,
    Double,
    /// A reference, as a field descriptor (`Ljava/lang/String;`, `[I`).
    Reference(String),
    Null,
    UninitializedThis,
    /// Result of the `NEW` at the given position, before its constructor ran.
    UninitializedNew(InsnId),
    ReturnAddress,
}

impl TypeValue {
    pub fn size(&self) -> usize {
        match self {
            TypeValue::Long | TypeValue::Double => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            TypeValue::Reference(_)
                | TypeValue::Null
                | TypeValue::UninitializedThis
                | TypeValue::UninitializedNew(_)
        )
    }

    /// Value of a field or method-return descriptor. Sub-int primitives widen
    /// to `Int`.
    pub fn from_descriptor(desc: &str) -> TypeValue {
        match desc.as_bytes().first() {
            Some(b'Z' | b'B' | b'C' | b'S' | b'I') => TypeValue::Int,
            Some(b'F') => TypeValue::Float,
            Some(b'J') => TypeValue::Long,
            Some(b'D') => TypeValue::Double,
            Some(b'L' | b'[') => TypeValue::Reference(desc.to_string()),
            _ => TypeValue::Uninitialized,
        }
    }

    pub fn object(internal_name: &str) -> TypeValue {
        TypeValue::Reference(class_operand_descriptor(internal_name))
    }

    /// Descriptor usable for a local-variable table entry, if the value has one.
    pub fn descriptor(&self) -> Option<String> {
        match self {
            TypeValue::Int => Some("I".to_string()),
            TypeValue::Float => Some("F".to_string()),
            TypeValue::Long => Some("J".to_string()),
            TypeValue::Double => Some("D".to_string()),
            TypeValue::Reference(desc) => Some(desc.clone()),
            TypeValue::Null => Some(format!("L{OBJECT};")),
            _ => None,
        }
    }
}

impl fmt::Display for TypeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeValue::Uninitialized => f.write_str("."),
            TypeValue::Int => f.write_str("I"),
            TypeValue::Float => f.write_str("F"),
            TypeValue::Long => f.write_str("J"),
            TypeValue::Double => f.write_str("D"),
            TypeValue::Reference(desc) => f.write_str(desc),
            TypeValue::Null => f.write_str("null"),
            TypeValue::UninitializedThis => f.write_str("uninit(this)"),
            TypeValue::UninitializedNew(at) => write!(f, "uninit({at})"),
            TypeValue::ReturnAddress => f.write_str("R"),
        }
    }
}
