//! Per-instruction type inference over a method's instruction list.

use std::collections::VecDeque;

use pointcut_classfile::opcodes::*;
use pointcut_classfile::{
    class_operand_descriptor, parse_method_descriptor, Constant, Insn, InsnId, LabelId,
    MethodNode, ReturnType,
};
use pointcut_core::{CancellationToken, Cancelled};
use thiserror::Error;

use crate::hierarchy::{merge_reference_descriptors, TypeHierarchy};
use crate::value::TypeValue;

/// How many worklist steps run between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzeError {
    #[error("operand stack underflow at {0}")]
    StackUnderflow(InsnId),
    #[error("incompatible stack heights merging into {0}")]
    StackMismatch(InsnId),
    #[error("subroutines (jsr/ret) are not supported, found at {0}")]
    UnsupportedSubroutine(InsnId),
    #[error("local variable {var} out of range at {at}")]
    InvalidLocal { at: InsnId, var: u16 },
    #[error("label {0} is not part of the method")]
    MissingLabel(LabelId),
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Abstract machine state before an instruction executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub locals: Vec<TypeValue>,
    pub stack: Vec<TypeValue>,
}

impl Frame {
    pub fn local(&self, slot: usize) -> Option<&TypeValue> {
        self.locals.get(slot)
    }
}

/// Frames for every node of a method; `None` marks unreachable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frames {
    frames: Vec<Option<Frame>>,
}

impl Frames {
    pub fn get(&self, at: InsnId) -> Option<&Frame> {
        self.frames.get(at.index()).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InsnId, Option<&Frame>)> + '_ {
        self.frames
            .iter()
            .enumerate()
            .map(|(idx, frame)| (InsnId::new(idx), frame.as_ref()))
    }
}

/// Runs the fixed-point analysis of `method`, declared in class `owner`.
pub fn analyze(
    owner: &str,
    method: &MethodNode,
    hierarchy: &dyn TypeHierarchy,
    cancel: &CancellationToken,
) -> Result<Frames, AnalyzeError> {
    let insns = &method.instructions;
    let mut frames: Vec<Option<Frame>> = vec![None; insns.len()];
    if insns.is_empty() {
        return Ok(Frames { frames });
    }

    let entry = entry_frame(owner, method)?;

    // Exception handlers as (start, end, handler, caught type) positions.
    let mut handlers = Vec::with_capacity(method.try_catch_blocks.len());
    for block in &method.try_catch_blocks {
        let position = |label| {
            insns
                .label_position(label)
                .ok_or(AnalyzeError::MissingLabel(label))
        };
        let catch = block
            .catch_type
            .as_deref()
            .map(TypeValue::object)
            .unwrap_or_else(|| TypeValue::object("java/lang/Throwable"));
        handlers.push((
            position(block.start)?.index(),
            position(block.end)?.index(),
            position(block.handler)?,
            catch,
        ));
    }

    let mut machine = Machine {
        owner,
        hierarchy,
        frames: &mut frames,
        queued: vec![false; insns.len()],
        worklist: VecDeque::new(),
    };
    machine.merge_into(InsnId::new(0), entry)?;

    let mut steps = 0usize;
    while let Some(at) = machine.worklist.pop_front() {
        machine.queued[at.index()] = false;
        steps += 1;
        if steps % CANCEL_CHECK_INTERVAL == 0 {
            Cancelled::check(cancel)?;
        }

        let Some(before) = machine.frames[at.index()].clone() else {
            continue;
        };
        let insn = &insns[at];

        for (start, end, handler, catch) in &handlers {
            if (*start..*end).contains(&at.index()) {
                let handler_frame = Frame {
                    locals: before.locals.clone(),
                    stack: vec![catch.clone()],
                };
                machine.merge_into(*handler, handler_frame)?;
            }
        }

        let after = machine.execute(at, insn, before)?;

        for label in insn.branch_targets() {
            let target = insns
                .label_position(label)
                .ok_or(AnalyzeError::MissingLabel(label))?;
            machine.merge_into(target, after.clone())?;
        }
        if !insn.is_unconditional_transfer() {
            if let Some(next) = insns.next(at) {
                machine.merge_into(next, after)?;
            }
        }
    }

    Ok(Frames { frames })
}

fn entry_frame(owner: &str, method: &MethodNode) -> Result<Frame, AnalyzeError> {
    let desc = parse_method_descriptor(&method.desc)
        .map_err(|_| AnalyzeError::InvalidDescriptor(method.desc.clone()))?;
    let mut locals = Vec::new();
    if !method.is_static() {
        locals.push(if method.is_constructor() {
            TypeValue::UninitializedThis
        } else {
            TypeValue::object(owner)
        });
    }
    for param in &desc.params {
        let value = TypeValue::from_descriptor(&param.descriptor());
        let wide = value.size() == 2;
        locals.push(value);
        if wide {
            locals.push(TypeValue::Uninitialized);
        }
    }
    let max_locals = (method.max_locals as usize).max(locals.len());
    locals.resize(max_locals, TypeValue::Uninitialized);
    Ok(Frame {
        locals,
        stack: Vec::new(),
    })
}

struct Machine<'a> {
    owner: &'a str,
    hierarchy: &'a dyn TypeHierarchy,
    frames: &'a mut Vec<Option<Frame>>,
    queued: Vec<bool>,
    worklist: VecDeque<InsnId>,
}

impl Machine<'_> {
    fn merge_into(&mut self, at: InsnId, incoming: Frame) -> Result<(), AnalyzeError> {
        let slot = &mut self.frames[at.index()];
        let changed = match slot {
            None => {
                *slot = Some(incoming);
                true
            }
            Some(existing) => {
                if existing.stack.len() != incoming.stack.len() {
                    return Err(AnalyzeError::StackMismatch(at));
                }
                let mut changed = false;
                for (current, new) in existing
                    .locals
                    .iter_mut()
                    .chain(existing.stack.iter_mut())
                    .zip(incoming.locals.iter().chain(incoming.stack.iter()))
                {
                    let merged = merge(self.hierarchy, current, new);
                    if merged != *current {
                        *current = merged;
                        changed = true;
                    }
                }
                changed
            }
        };
        if changed && !self.queued[at.index()] {
            self.queued[at.index()] = true;
            self.worklist.push_back(at);
        }
        Ok(())
    }

    fn execute(&self, at: InsnId, insn: &Insn, mut frame: Frame) -> Result<Frame, AnalyzeError> {
        let mut st = Stack {
            at,
            values: &mut frame.stack,
        };
        match insn {
            Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame(_) => {}
            Insn::Plain { opcode } => self.plain(*opcode, &mut st)?,
            Insn::Int { opcode, operand } => {
                if *opcode == NEWARRAY {
                    st.pop()?;
                    st.push(TypeValue::Reference(primitive_array(*operand).to_string()));
                } else {
                    st.push(TypeValue::Int);
                }
            }
            Insn::Var { opcode, var } => {
                let slot = *var as usize;
                match *opcode {
                    ILOAD..=ALOAD => {
                        let value = frame
                            .locals
                            .get(slot)
                            .cloned()
                            .ok_or(AnalyzeError::InvalidLocal { at, var: *var })?;
                        st.push(value);
                    }
                    ISTORE..=ASTORE => {
                        let value = st.pop()?;
                        store(&mut frame.locals, at, *var, value)?;
                    }
                    _ => return Err(AnalyzeError::UnsupportedSubroutine(at)),
                }
            }
            Insn::Type { opcode, desc } => match *opcode {
                NEW => st.push(TypeValue::UninitializedNew(at)),
                ANEWARRAY => {
                    st.pop()?;
                    st.push(TypeValue::Reference(format!(
                        "[{}",
                        class_operand_descriptor(desc)
                    )));
                }
                CHECKCAST => {
                    st.pop()?;
                    st.push(TypeValue::Reference(class_operand_descriptor(desc)));
                }
                _ => {
                    st.pop()?;
                    st.push(TypeValue::Int);
                }
            },
            Insn::Field { opcode, desc, .. } => match *opcode {
                GETSTATIC => st.push(TypeValue::from_descriptor(desc)),
                PUTSTATIC => {
                    st.pop()?;
                }
                GETFIELD => {
                    st.pop()?;
                    st.push(TypeValue::from_descriptor(desc));
                }
                _ => {
                    st.pop()?;
                    st.pop()?;
                }
            },
            Insn::Method {
                opcode,
                owner,
                name,
                desc,
                ..
            } => {
                let method = parse_method_descriptor(desc)
                    .map_err(|_| AnalyzeError::InvalidDescriptor(desc.clone()))?;
                for _ in &method.params {
                    st.pop()?;
                }
                if *opcode != INVOKESTATIC {
                    let receiver = st.pop()?;
                    if *opcode == INVOKESPECIAL && name == "<init>" {
                        let initialized = match receiver {
                            TypeValue::UninitializedThis => TypeValue::object(self.owner),
                            _ => TypeValue::object(owner),
                        };
                        replace_all(&mut frame, &receiver, &initialized);
                    }
                }
                if let ReturnType::Type(ret) = &method.return_type {
                    frame
                        .stack
                        .push(TypeValue::from_descriptor(&ret.descriptor()));
                }
            }
            Insn::InvokeDynamic { desc, .. } => {
                let method = parse_method_descriptor(desc)
                    .map_err(|_| AnalyzeError::InvalidDescriptor(desc.clone()))?;
                for _ in &method.params {
                    st.pop()?;
                }
                if let ReturnType::Type(ret) = &method.return_type {
                    st.push(TypeValue::from_descriptor(&ret.descriptor()));
                }
            }
            Insn::Jump { opcode, .. } => match *opcode {
                IFEQ..=IFLE | IFNULL | IFNONNULL => {
                    st.pop()?;
                }
                IF_ICMPEQ..=IF_ACMPNE => {
                    st.pop()?;
                    st.pop()?;
                }
                GOTO => {}
                _ => return Err(AnalyzeError::UnsupportedSubroutine(at)),
            },
            Insn::Ldc(constant) => st.push(match constant {
                Constant::Int(_) => TypeValue::Int,
                Constant::Float(_) => TypeValue::Float,
                Constant::Long(_) => TypeValue::Long,
                Constant::Double(_) => TypeValue::Double,
                Constant::String(_) => TypeValue::object("java/lang/String"),
                Constant::Class(_) => TypeValue::object("java/lang/Class"),
                Constant::MethodType(_) => TypeValue::object("java/lang/invoke/MethodType"),
                Constant::MethodHandle(_) => TypeValue::object("java/lang/invoke/MethodHandle"),
                Constant::Dynamic { desc, .. } => TypeValue::from_descriptor(desc),
            }),
            Insn::Iinc { var, .. } => {
                if *var as usize >= frame.locals.len() {
                    return Err(AnalyzeError::InvalidLocal { at, var: *var });
                }
            }
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => {
                st.pop()?;
            }
            Insn::MultiANewArray { desc, dims } => {
                for _ in 0..*dims {
                    st.pop()?;
                }
                st.push(TypeValue::Reference(desc.clone()));
            }
        }
        Ok(frame)
    }

    fn plain(&self, opcode: u8, st: &mut Stack<'_>) -> Result<(), AnalyzeError> {
        use TypeValue::*;
        match opcode {
            NOP => {}
            ACONST_NULL => st.push(Null),
            ICONST_M1..=ICONST_5 => st.push(Int),
            LCONST_0 | LCONST_1 => st.push(Long),
            FCONST_0..=FCONST_2 => st.push(Float),
            DCONST_0 | DCONST_1 => st.push(Double),
            IALOAD | BALOAD | CALOAD | SALOAD => st.binary(Int)?,
            LALOAD => st.binary(Long)?,
            FALOAD => st.binary(Float)?,
            DALOAD => st.binary(Double)?,
            AALOAD => {
                st.pop()?;
                let array = st.pop()?;
                st.push(match array {
                    Reference(desc) => match desc.strip_prefix('[') {
                        Some(element) => TypeValue::from_descriptor(element),
                        None => TypeValue::object("java/lang/Object"),
                    },
                    Null => Null,
                    _ => TypeValue::object("java/lang/Object"),
                });
            }
            IASTORE..=SASTORE => {
                st.pop()?;
                st.pop()?;
                st.pop()?;
            }
            POP => {
                st.pop()?;
            }
            POP2 => {
                if st.pop()?.size() == 1 {
                    st.pop()?;
                }
            }
            DUP => {
                let v1 = st.pop()?;
                st.push(v1.clone());
                st.push(v1);
            }
            DUP_X1 => {
                let v1 = st.pop()?;
                let v2 = st.pop()?;
                st.push_all([v1.clone(), v2, v1]);
            }
            DUP_X2 => {
                let v1 = st.pop()?;
                let v2 = st.pop()?;
                if v2.size() == 2 {
                    st.push_all([v1.clone(), v2, v1]);
                } else {
                    let v3 = st.pop()?;
                    st.push_all([v1.clone(), v3, v2, v1]);
                }
            }
            DUP2 => {
                let v1 = st.pop()?;
                if v1.size() == 2 {
                    st.push_all([v1.clone(), v1]);
                } else {
                    let v2 = st.pop()?;
                    st.push_all([v2.clone(), v1.clone(), v2, v1]);
                }
            }
            DUP2_X1 => {
                let v1 = st.pop()?;
                if v1.size() == 2 {
                    let v2 = st.pop()?;
                    st.push_all([v1.clone(), v2, v1]);
                } else {
                    let v2 = st.pop()?;
                    let v3 = st.pop()?;
                    st.push_all([v2.clone(), v1.clone(), v3, v2, v1]);
                }
            }
            DUP2_X2 => {
                let v1 = st.pop()?;
                if v1.size() == 2 {
                    let v2 = st.pop()?;
                    if v2.size() == 2 {
                        st.push_all([v1.clone(), v2, v1]);
                    } else {
                        let v3 = st.pop()?;
                        st.push_all([v1.clone(), v3, v2, v1]);
                    }
                } else {
                    let v2 = st.pop()?;
                    let v3 = st.pop()?;
                    if v3.size() == 2 {
                        st.push_all([v2.clone(), v1.clone(), v3, v2, v1]);
                    } else {
                        let v4 = st.pop()?;
                        st.push_all([v2.clone(), v1.clone(), v4, v3, v2, v1]);
                    }
                }
            }
            SWAP => {
                let v1 = st.pop()?;
                let v2 = st.pop()?;
                st.push_all([v1, v2]);
            }
            IADD..=DREM => {
                let result = [Int, Long, Float, Double][((opcode - IADD) % 4) as usize].clone();
                st.binary(result)?;
            }
            INEG..=DNEG => {
                let result = [Int, Long, Float, Double][((opcode - INEG) % 4) as usize].clone();
                st.unary(result)?;
            }
            ISHL | ISHR | IUSHR | IAND | IOR | IXOR => st.binary(Int)?,
            LSHL | LSHR | LUSHR | LAND | LOR | LXOR => st.binary(Long)?,
            I2L | F2L | D2L => st.unary(Long)?,
            I2F | L2F | D2F => st.unary(Float)?,
            I2D | L2D | F2D => st.unary(Double)?,
            L2I | F2I | D2I | I2B | I2C | I2S => st.unary(Int)?,
            LCMP..=DCMPG => st.binary(Int)?,
            IRETURN..=ARETURN | ATHROW | MONITORENTER | MONITOREXIT => {
                st.pop()?;
            }
            RETURN => {}
            ARRAYLENGTH => st.unary(Int)?,
            _ => {}
        }
        Ok(())
    }
}

struct Stack<'a> {
    at: InsnId,
    values: &'a mut Vec<TypeValue>,
}

impl Stack<'_> {
    fn pop(&mut self) -> Result<TypeValue, AnalyzeError> {
        self.values.pop().ok_or(AnalyzeError::StackUnderflow(self.at))
    }

    fn push(&mut self, value: TypeValue) {
        self.values.push(value);
    }

    fn push_all<const N: usize>(&mut self, values: [TypeValue; N]) {
        self.values.extend(values);
    }

    fn unary(&mut self, result: TypeValue) -> Result<(), AnalyzeError> {
        self.pop()?;
        self.push(result);
        Ok(())
    }

    fn binary(&mut self, result: TypeValue) -> Result<(), AnalyzeError> {
        self.pop()?;
        self.pop()?;
        self.push(result);
        Ok(())
    }
}

fn store(locals: &mut [TypeValue], at: InsnId, var: u16, value: TypeValue) -> Result<(), AnalyzeError> {
    let slot = var as usize;
    let size = value.size();
    if slot + size > locals.len() {
        return Err(AnalyzeError::InvalidLocal { at, var });
    }
    // Overwriting the second half of a long/double invalidates it.
    if slot > 0 && locals[slot - 1].size() == 2 {
        locals[slot - 1] = TypeValue::Uninitialized;
    }
    locals[slot] = value;
    if size == 2 {
        locals[slot + 1] = TypeValue::Uninitialized;
    }
    Ok(())
}

fn replace_all(frame: &mut Frame, from: &TypeValue, to: &TypeValue) {
    for value in frame.locals.iter_mut().chain(frame.stack.iter_mut()) {
        if value == from {
            *value = to.clone();
        }
    }
}

fn merge(hierarchy: &dyn TypeHierarchy, a: &TypeValue, b: &TypeValue) -> TypeValue {
    match (a, b) {
        _ if a == b => a.clone(),
        (TypeValue::Null, TypeValue::Reference(_)) => b.clone(),
        (TypeValue::Reference(_), TypeValue::Null) => a.clone(),
        (TypeValue::Reference(x), TypeValue::Reference(y)) => {
            TypeValue::Reference(merge_reference_descriptors(hierarchy, x, y))
        }
        _ => TypeValue::Uninitialized,
    }
}

fn primitive_array(atype: i32) -> &'static str {
    match atype {
        T_BOOLEAN => "[Z",
        T_CHAR => "[C",
        T_FLOAT => "[F",
        T_DOUBLE => "[D",
        T_BYTE => "[B",
        T_SHORT => "[S",
        T_LONG => "[J",
        _ => "[I",
    }
}
