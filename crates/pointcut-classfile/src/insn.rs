use std::fmt;

use crate::frame::FrameNode;
use crate::opcodes::{self, mnemonic};

/// Position of a node in an [`InsnList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(u32);

impl InsnId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(u32);

impl LabelId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A method handle constant or bootstrap method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub kind: u8,
    pub owner: String,
    pub name: String,
    pub desc: String,
    pub interface: bool,
}

/// A loadable constant, as pushed by `LDC` or passed to a bootstrap method.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    /// Internal name or array descriptor.
    Class(String),
    MethodType(String),
    MethodHandle(Handle),
    Dynamic {
        name: String,
        desc: String,
        bootstrap: Handle,
        args: Vec<Constant>,
    },
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Float(v) => write!(f, "{v}F"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Double(v) => write!(f, "{v}D"),
            Constant::String(s) => write!(f, "{s:?}"),
            Constant::Class(name) => write!(f, "{name}.class"),
            Constant::MethodType(desc) => f.write_str(desc),
            Constant::MethodHandle(h) => write!(f, "{}.{}{}", h.owner, h.name, h.desc),
            Constant::Dynamic { name, desc, .. } => write!(f, "{name} : {desc}"),
        }
    }
}

/// A node of a method's instruction list.
///
/// `Label`, `LineNumber` and `Frame` are pseudo nodes without an opcode; every
/// other variant is a real instruction with a normalised opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Label(LabelId),
    LineNumber { line: u32, start: LabelId },
    Frame(FrameNode),
    /// Zero-operand instruction.
    Plain { opcode: u8 },
    /// `BIPUSH`, `SIPUSH` and `NEWARRAY`.
    Int { opcode: u8, operand: i32 },
    /// Local-variable loads and stores, plus `RET`.
    Var { opcode: u8, var: u16 },
    /// `NEW`, `ANEWARRAY`, `CHECKCAST` and `INSTANCEOF`; `desc` is the class
    /// operand (internal name or array descriptor).
    Type { opcode: u8, desc: String },
    Field {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
    },
    Method {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
        interface: bool,
    },
    InvokeDynamic {
        name: String,
        desc: String,
        bootstrap: Handle,
        bootstrap_args: Vec<Constant>,
    },
    Jump { opcode: u8, label: LabelId },
    Ldc(Constant),
    Iinc { var: u16, incr: i16 },
    TableSwitch {
        min: i32,
        max: i32,
        default: LabelId,
        labels: Vec<LabelId>,
    },
    LookupSwitch {
        default: LabelId,
        keys: Vec<i32>,
        labels: Vec<LabelId>,
    },
    MultiANewArray { desc: String, dims: u8 },
}

impl Insn {
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame(_) => None,
            Insn::Plain { opcode }
            | Insn::Int { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Type { opcode, .. }
            | Insn::Field { opcode, .. }
            | Insn::Method { opcode, .. }
            | Insn::Jump { opcode, .. } => Some(*opcode),
            Insn::InvokeDynamic { .. } => Some(opcodes::INVOKEDYNAMIC),
            Insn::Ldc(_) => Some(opcodes::LDC),
            Insn::Iinc { .. } => Some(opcodes::IINC),
            Insn::TableSwitch { .. } => Some(opcodes::TABLESWITCH),
            Insn::LookupSwitch { .. } => Some(opcodes::LOOKUPSWITCH),
            Insn::MultiANewArray { .. } => Some(opcodes::MULTIANEWARRAY),
        }
    }

    /// Whether this is a real instruction rather than a label, line number or frame.
    pub fn is_real(&self) -> bool {
        self.opcode().is_some()
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, Insn::Frame(_))
    }

    pub fn is_return(&self) -> bool {
        self.opcode().is_some_and(opcodes::is_return)
    }

    /// Labels this instruction may transfer control to, excluding fall-through.
    pub fn branch_targets(&self) -> Vec<LabelId> {
        match self {
            Insn::Jump { label, .. } => vec![*label],
            Insn::TableSwitch {
                default, labels, ..
            }
            | Insn::LookupSwitch {
                default, labels, ..
            } => std::iter::once(*default).chain(labels.iter().copied()).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether control never continues to the next node.
    pub fn is_unconditional_transfer(&self) -> bool {
        match self.opcode() {
            Some(op) => {
                opcodes::is_return(op)
                    || op == opcodes::GOTO
                    || op == opcodes::ATHROW
                    || op == opcodes::RET
                    || op == opcodes::TABLESWITCH
                    || op == opcodes::LOOKUPSWITCH
            }
            None => false,
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Label(label) => write!(f, "{label}:"),
            Insn::LineNumber { line, start } => write!(f, "LINENUMBER {line} {start}"),
            Insn::Frame(frame) => {
                write!(f, "FRAME {:?} [", frame.kind)?;
                for (i, local) in frame.locals.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{local}")?;
                }
                f.write_str("] [")?;
                for (i, value) in frame.stack.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            Insn::Plain { opcode } => f.write_str(mnemonic(*opcode)),
            Insn::Int { opcode, operand } => write!(f, "{} {operand}", mnemonic(*opcode)),
            Insn::Var { opcode, var } => write!(f, "{} {var}", mnemonic(*opcode)),
            Insn::Type { opcode, desc } => write!(f, "{} {desc}", mnemonic(*opcode)),
            Insn::Field {
                opcode,
                owner,
                name,
                desc,
            } => write!(f, "{} {owner}.{name} : {desc}", mnemonic(*opcode)),
            Insn::Method {
                opcode,
                owner,
                name,
                desc,
                interface,
            } => {
                write!(f, "{} {owner}.{name} {desc}", mnemonic(*opcode))?;
                if *interface && *opcode != opcodes::INVOKEINTERFACE {
                    f.write_str(" (itf)")?;
                }
                Ok(())
            }
            Insn::InvokeDynamic {
                name,
                desc,
                bootstrap,
                ..
            } => write!(
                f,
                "INVOKEDYNAMIC {name}{desc} [{}.{}]",
                bootstrap.owner, bootstrap.name
            ),
            Insn::Jump { opcode, label } => write!(f, "{} {label}", mnemonic(*opcode)),
            Insn::Ldc(constant) => write!(f, "LDC {constant}"),
            Insn::Iinc { var, incr } => write!(f, "IINC {var} {incr}"),
            Insn::TableSwitch { min, max, .. } => write!(f, "TABLESWITCH {min}..{max}"),
            Insn::LookupSwitch { keys, .. } => write!(f, "LOOKUPSWITCH {keys:?}"),
            Insn::MultiANewArray { desc, dims } => write!(f, "MULTIANEWARRAY {desc} {dims}"),
        }
    }
}

/// An ordered, immutable instruction list.
///
/// Node identity is the position in the list; `prev`/`next` are the adjacent
/// positions. Every label referenced by the method is present exactly once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsnList {
    insns: Vec<Insn>,
    /// Position of each label, indexed by `LabelId`.
    labels: Vec<Option<InsnId>>,
}

impl InsnList {
    pub fn new(insns: Vec<Insn>) -> Self {
        let mut labels: Vec<Option<InsnId>> = Vec::new();
        for (idx, insn) in insns.iter().enumerate() {
            if let Insn::Label(label) = insn {
                if labels.len() <= label.index() {
                    labels.resize(label.index() + 1, None);
                }
                labels[label.index()] = Some(InsnId::new(idx));
            }
        }
        Self { insns, labels }
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn get(&self, id: InsnId) -> Option<&Insn> {
        self.insns.get(id.index())
    }

    pub fn first(&self) -> Option<InsnId> {
        (!self.insns.is_empty()).then(|| InsnId::new(0))
    }

    pub fn last(&self) -> Option<InsnId> {
        self.insns.len().checked_sub(1).map(InsnId::new)
    }

    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        let next = id.index() + 1;
        (next < self.insns.len()).then(|| InsnId::new(next))
    }

    pub fn prev(&self, id: InsnId) -> Option<InsnId> {
        id.index().checked_sub(1).map(InsnId::new)
    }

    /// Moves `id` by `by` nodes, or `None` when that walks off either end.
    pub fn offset(&self, id: InsnId, by: i32) -> Option<InsnId> {
        let target = id.index() as i64 + by as i64;
        (0..self.insns.len() as i64)
            .contains(&target)
            .then(|| InsnId::new(target as usize))
    }

    pub fn label_position(&self, label: LabelId) -> Option<InsnId> {
        self.labels.get(label.index()).copied().flatten()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (InsnId, &Insn)> + '_ {
        self.insns
            .iter()
            .enumerate()
            .map(|(idx, insn)| (InsnId::new(idx), insn))
    }

    /// First node carrying an opcode.
    pub fn first_real(&self) -> Option<InsnId> {
        self.iter().find(|(_, insn)| insn.is_real()).map(|(id, _)| id)
    }

    /// The next real instruction strictly after `id`.
    pub fn next_real(&self, id: InsnId) -> Option<InsnId> {
        self.iter()
            .skip(id.index() + 1)
            .find(|(_, insn)| insn.is_real())
            .map(|(id, _)| id)
    }

    /// The closest real instruction strictly before `id`.
    pub fn prev_real(&self, id: InsnId) -> Option<InsnId> {
        self.insns[..id.index().min(self.insns.len())]
            .iter()
            .rposition(Insn::is_real)
            .map(InsnId::new)
    }

    pub fn as_slice(&self) -> &[Insn] {
        &self.insns
    }
}

impl std::ops::Index<InsnId> for InsnList {
    type Output = Insn;

    fn index(&self, id: InsnId) -> &Insn {
        &self.insns[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    fn list() -> InsnList {
        InsnList::new(vec![
            Insn::Label(LabelId::new(0)),
            Insn::LineNumber {
                line: 3,
                start: LabelId::new(0),
            },
            Insn::Plain { opcode: ICONST_1 },
            Insn::Var {
                opcode: ISTORE,
                var: 1,
            },
            Insn::Label(LabelId::new(1)),
            Insn::Plain { opcode: RETURN },
        ])
    }

    #[test]
    fn navigation_is_positional() {
        let insns = list();
        assert_eq!(insns.first_real(), Some(InsnId::new(2)));
        assert_eq!(insns.next_real(InsnId::new(3)), Some(InsnId::new(5)));
        assert_eq!(insns.prev_real(InsnId::new(5)), Some(InsnId::new(3)));
        assert_eq!(insns.prev_real(InsnId::new(2)), None);
        assert_eq!(insns.label_position(LabelId::new(1)), Some(InsnId::new(4)));
        assert_eq!(insns.offset(InsnId::new(5), 1), None);
        assert_eq!(insns.offset(InsnId::new(0), -1), None);
        assert_eq!(insns.offset(InsnId::new(2), 3), Some(InsnId::new(5)));
    }

    #[test]
    fn display_uses_mnemonics() {
        let insn = Insn::Method {
            opcode: INVOKEVIRTUAL,
            owner: "a/B".into(),
            name: "foo".into(),
            desc: "()V".into(),
            interface: false,
        };
        assert_eq!(insn.to_string(), "INVOKEVIRTUAL a/B.foo ()V");
        assert_eq!(Insn::Ldc(Constant::String("x".into())).to_string(), "LDC \"x\"");
    }
}
