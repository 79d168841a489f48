use std::fmt;

use crate::descriptor::{parse_method_descriptor, FieldType};
use crate::error::Result;
use crate::insn::LabelId;
use crate::opcodes::ACC_STATIC;

/// A verification type as it appears in a `StackMapTable` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameValue {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    /// Internal name (or array descriptor) of a reference type.
    Object(String),
    /// Result of the `NEW` instruction following the label.
    Uninitialized(LabelId),
}

impl FrameValue {
    pub fn slot_size(&self) -> usize {
        match self {
            FrameValue::Long | FrameValue::Double => 2,
            _ => 1,
        }
    }

    pub fn from_field_type(ty: &FieldType) -> Self {
        use crate::descriptor::BaseType::*;
        match ty {
            FieldType::Base(Long) => FrameValue::Long,
            FieldType::Base(Double) => FrameValue::Double,
            FieldType::Base(Float) => FrameValue::Float,
            FieldType::Base(_) => FrameValue::Integer,
            FieldType::Object(name) => FrameValue::Object(name.clone()),
            FieldType::Array(_) => FrameValue::Object(ty.descriptor()),
        }
    }
}

impl fmt::Display for FrameValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameValue::Top => f.write_str("T"),
            FrameValue::Integer => f.write_str("I"),
            FrameValue::Float => f.write_str("F"),
            FrameValue::Long => f.write_str("J"),
            FrameValue::Double => f.write_str("D"),
            FrameValue::Null => f.write_str("null"),
            FrameValue::UninitializedThis => f.write_str("uninitialized_this"),
            FrameValue::Object(name) => f.write_str(name),
            FrameValue::Uninitialized(label) => write!(f, "uninitialized {label}"),
        }
    }
}

/// The directive a stack-map frame was encoded with.
///
/// `Append` and `Chop` carry the number of verification entries added or
/// removed (a `long` counts once).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Same,
    Same1,
    Append(usize),
    Chop(usize),
    Full,
    /// An expanded frame with no compression information.
    New,
}

/// A stack-map frame in the instruction list.
///
/// `locals` is always the complete local state after the directive has been
/// applied, one entry per slot: category-2 values are followed by a `Top`
/// entry for their second slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameNode {
    pub kind: FrameKind,
    pub locals: Vec<FrameValue>,
    pub stack: Vec<FrameValue>,
}

impl FrameNode {
    /// Number of local slots described by the frame.
    pub fn local_slots(&self) -> usize {
        self.locals.len()
    }

    /// Builds the node from the compressed (one entry per value) local list.
    pub fn from_compressed(
        kind: FrameKind,
        locals: &[FrameValue],
        stack: Vec<FrameValue>,
    ) -> Self {
        Self {
            kind,
            locals: expand(locals),
            stack,
        }
    }
}

/// Expands a compressed verification-type list into one entry per slot.
pub fn expand(values: &[FrameValue]) -> Vec<FrameValue> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.push(value.clone());
        if value.slot_size() == 2 {
            out.push(FrameValue::Top);
        }
    }
    out
}

/// Implicit frame at method entry in compressed form: `this` (uninitialized in
/// constructors) followed by the parameters.
pub fn initial_locals(owner: &str, access: u16, name: &str, desc: &str) -> Result<Vec<FrameValue>> {
    let method = parse_method_descriptor(desc)?;
    let mut locals = Vec::with_capacity(method.params.len() + 1);
    if access & ACC_STATIC == 0 {
        if name == "<init>" {
            locals.push(FrameValue::UninitializedThis);
        } else {
            locals.push(FrameValue::Object(owner.to_string()));
        }
    }
    locals.extend(method.params.iter().map(FrameValue::from_field_type));
    Ok(locals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_frame_expands_wide_parameters() {
        let locals = initial_locals("a/B", 0, "m", "(JI[Ljava/lang/String;)V").unwrap();
        assert_eq!(
            expand(&locals),
            vec![
                FrameValue::Object("a/B".into()),
                FrameValue::Long,
                FrameValue::Top,
                FrameValue::Integer,
                FrameValue::Object("[Ljava/lang/String;".into()),
            ]
        );
        let ctor = initial_locals("a/B", 0, "<init>", "()V").unwrap();
        assert_eq!(ctor, vec![FrameValue::UninitializedThis]);
        let stat = initial_locals("a/B", ACC_STATIC, "m", "()V").unwrap();
        assert!(stat.is_empty());
    }
}
