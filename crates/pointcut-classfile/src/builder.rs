//! Programmatic construction of [`MethodNode`]s.

use crate::classfile::{LocalVariableNode, MethodNode, TryCatchBlock};
use crate::descriptor::parse_method_descriptor;
use crate::error::Result;
use crate::frame::{initial_locals, FrameKind, FrameNode, FrameValue};
use crate::insn::{Constant, Handle, Insn, InsnList, LabelId};
use crate::opcodes::*;

/// Builds a method body node by node, tracking the compressed local frame so
/// that `APPEND`/`CHOP` frames expand exactly as a decoded `StackMapTable`
/// would.
#[derive(Debug, Clone)]
pub struct MethodBuilder {
    access: u16,
    name: String,
    desc: String,
    insns: Vec<Insn>,
    next_label: usize,
    frame_locals: Vec<FrameValue>,
    try_catch_blocks: Vec<TryCatchBlock>,
    local_variables: Vec<LocalVariableNode>,
    max_stack: u16,
    max_locals: usize,
}

impl MethodBuilder {
    pub fn new(owner: &str, access: u16, name: &str, desc: &str) -> Result<Self> {
        let frame_locals = initial_locals(owner, access, name, desc)?;
        let params = parse_method_descriptor(desc)?.argument_slots();
        let max_locals = params + usize::from(access & ACC_STATIC == 0);
        Ok(Self {
            access,
            name: name.to_string(),
            desc: desc.to_string(),
            insns: Vec::new(),
            next_label: 0,
            frame_locals,
            try_catch_blocks: Vec::new(),
            local_variables: Vec::new(),
            max_stack: 16,
            max_locals,
        })
    }

    pub fn new_label(&mut self) -> LabelId {
        let label = LabelId::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// Places a previously created label at the current position.
    pub fn label(&mut self, label: LabelId) -> &mut Self {
        self.insns.push(Insn::Label(label));
        self
    }

    /// Creates a label and places it at the current position.
    pub fn mark(&mut self) -> LabelId {
        let label = self.new_label();
        self.label(label);
        label
    }

    pub fn line(&mut self, line: u32, start: LabelId) -> &mut Self {
        self.insns.push(Insn::LineNumber { line, start });
        self
    }

    pub fn insn(&mut self, opcode: u8) -> &mut Self {
        self.insns.push(Insn::Plain { opcode });
        self
    }

    pub fn int(&mut self, opcode: u8, operand: i32) -> &mut Self {
        self.insns.push(Insn::Int { opcode, operand });
        self
    }

    /// Pushes an `int` constant with the smallest encoding javac would use.
    pub fn push_int(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => self.insn(ICONST_0.wrapping_add(value as u8)),
            -128..=127 => self.int(BIPUSH, value),
            -32768..=32767 => self.int(SIPUSH, value),
            _ => self.ldc(Constant::Int(value)),
        }
    }

    pub fn var(&mut self, opcode: u8, var: u16) -> &mut Self {
        let size = if matches!(opcode, LLOAD | DLOAD | LSTORE | DSTORE) {
            2
        } else {
            1
        };
        self.max_locals = self.max_locals.max(var as usize + size);
        self.insns.push(Insn::Var { opcode, var });
        self
    }

    pub fn type_insn(&mut self, opcode: u8, desc: &str) -> &mut Self {
        self.insns.push(Insn::Type {
            opcode,
            desc: desc.to_string(),
        });
        self
    }

    pub fn field(&mut self, opcode: u8, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.insns.push(Insn::Field {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
        });
        self
    }

    pub fn method(&mut self, opcode: u8, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.insns.push(Insn::Method {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            interface: opcode == INVOKEINTERFACE,
        });
        self
    }

    pub fn invoke_dynamic(
        &mut self,
        name: &str,
        desc: &str,
        bootstrap: Handle,
        bootstrap_args: Vec<Constant>,
    ) -> &mut Self {
        self.insns.push(Insn::InvokeDynamic {
            name: name.to_string(),
            desc: desc.to_string(),
            bootstrap,
            bootstrap_args,
        });
        self
    }

    pub fn jump(&mut self, opcode: u8, label: LabelId) -> &mut Self {
        self.insns.push(Insn::Jump { opcode, label });
        self
    }

    pub fn ldc(&mut self, constant: Constant) -> &mut Self {
        self.insns.push(Insn::Ldc(constant));
        self
    }

    pub fn iinc(&mut self, var: u16, incr: i16) -> &mut Self {
        self.max_locals = self.max_locals.max(var as usize + 1);
        self.insns.push(Insn::Iinc { var, incr });
        self
    }

    pub fn table_switch(
        &mut self,
        min: i32,
        max: i32,
        default: LabelId,
        labels: Vec<LabelId>,
    ) -> &mut Self {
        self.insns.push(Insn::TableSwitch {
            min,
            max,
            default,
            labels,
        });
        self
    }

    pub fn lookup_switch(
        &mut self,
        default: LabelId,
        keys: Vec<i32>,
        labels: Vec<LabelId>,
    ) -> &mut Self {
        self.insns.push(Insn::LookupSwitch {
            default,
            keys,
            labels,
        });
        self
    }

    pub fn multi_new_array(&mut self, desc: &str, dims: u8) -> &mut Self {
        self.insns.push(Insn::MultiANewArray {
            desc: desc.to_string(),
            dims,
        });
        self
    }

    pub fn frame_same(&mut self) -> &mut Self {
        self.push_frame(FrameKind::Same, Vec::new())
    }

    pub fn frame_same1(&mut self, stack: FrameValue) -> &mut Self {
        self.push_frame(FrameKind::Same1, vec![stack])
    }

    pub fn frame_append(&mut self, locals: Vec<FrameValue>) -> &mut Self {
        let kind = FrameKind::Append(locals.len());
        self.frame_locals.extend(locals);
        self.push_frame(kind, Vec::new())
    }

    /// Removes the last `count` values (not slots) from the current frame.
    pub fn frame_chop(&mut self, count: usize) -> &mut Self {
        let keep = self.frame_locals.len().saturating_sub(count);
        self.frame_locals.truncate(keep);
        self.push_frame(FrameKind::Chop(count), Vec::new())
    }

    pub fn frame_full(&mut self, locals: Vec<FrameValue>, stack: Vec<FrameValue>) -> &mut Self {
        self.frame_locals = locals;
        self.push_frame(FrameKind::Full, stack)
    }

    fn push_frame(&mut self, kind: FrameKind, stack: Vec<FrameValue>) -> &mut Self {
        let frame = FrameNode::from_compressed(kind, &self.frame_locals, stack);
        self.max_locals = self.max_locals.max(frame.local_slots());
        self.insns.push(Insn::Frame(frame));
        self
    }

    pub fn local_variable(
        &mut self,
        name: &str,
        desc: &str,
        start: LabelId,
        end: LabelId,
        index: u16,
    ) -> &mut Self {
        let size = if desc == "J" || desc == "D" { 2 } else { 1 };
        self.max_locals = self.max_locals.max(index as usize + size);
        self.local_variables.push(LocalVariableNode {
            name: name.to_string(),
            desc: desc.to_string(),
            start,
            end,
            index,
        });
        self
    }

    pub fn try_catch(
        &mut self,
        start: LabelId,
        end: LabelId,
        handler: LabelId,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_string),
        });
        self
    }

    pub fn max_stack(&mut self, max_stack: u16) -> &mut Self {
        self.max_stack = max_stack;
        self
    }

    pub fn build(&self) -> MethodNode {
        MethodNode {
            access: self.access,
            name: self.name.clone(),
            desc: self.desc.clone(),
            max_stack: self.max_stack,
            max_locals: self.max_locals as u16,
            instructions: InsnList::new(self.insns.clone()),
            try_catch_blocks: self.try_catch_blocks.clone(),
            local_variables: self.local_variables.clone(),
        }
    }
}
