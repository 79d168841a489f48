//! Writes class files from in-memory method nodes.
//!
//! The output is what `javac` would produce for the same instruction list:
//! a `Code` attribute with `StackMapTable`, `LineNumberTable` and
//! `LocalVariableTable`, plus `BootstrapMethods` when the class uses
//! `invokedynamic` or dynamic constants. Frames are encoded with the
//! directive they carry, so decoding the bytes yields the same kinds.

use std::collections::HashMap;

use pointcut_classfile::opcodes::*;
use pointcut_classfile::{
    parse_method_descriptor, Constant, FieldNode, FrameKind, FrameValue, Handle, Insn, LabelId,
    MethodNode,
};

const LDC_W: u8 = 19;
const LDC2_W: u8 = 20;
const WIDE: u8 = 196;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    #[error("label {0} is never placed")]
    UnplacedLabel(LabelId),
    #[error("branch at offset {offset} cannot reach offset {target}")]
    BranchOutOfRange { offset: u32, target: u32 },
    #[error("constant pool overflow")]
    ConstantPoolOverflow,
    #[error("invalid descriptor `{0}`")]
    InvalidDescriptor(String),
    #[error("method `{0}` exceeds 65535 bytes of code")]
    CodeTooLarge(String),
}

pub type Result<T> = std::result::Result<T, AssembleError>;

/// Builder for a single class file.
#[derive(Debug, Clone)]
pub struct ClassAssembler {
    name: String,
    super_name: Option<String>,
    access: u16,
    interfaces: Vec<String>,
    source_file: Option<String>,
    fields: Vec<FieldNode>,
    methods: Vec<MethodNode>,
    major_version: u16,
}

impl ClassAssembler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            access: ACC_PUBLIC | ACC_SUPER,
            interfaces: Vec::new(),
            source_file: None,
            fields: Vec::new(),
            methods: Vec::new(),
            major_version: 52,
        }
    }

    #[must_use]
    pub fn super_name(mut self, super_name: Option<&str>) -> Self {
        self.super_name = super_name.map(str::to_string);
        self
    }

    #[must_use]
    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    #[must_use]
    pub fn source_file(mut self, name: &str) -> Self {
        self.source_file = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn field(mut self, access: u16, name: &str, desc: &str) -> Self {
        self.fields.push(FieldNode {
            access,
            name: name.to_string(),
            desc: desc.to_string(),
        });
        self
    }

    #[must_use]
    pub fn method(mut self, method: MethodNode) -> Self {
        self.methods.push(method);
        self
    }

    pub fn assemble(&self) -> Result<Vec<u8>> {
        let mut pool = Pool::default();
        let this_class = pool.class(&self.name)?;
        let super_class = match &self.super_name {
            Some(name) => pool.class(name)?,
            None => 0,
        };
        let interfaces = self
            .interfaces
            .iter()
            .map(|name| pool.class(name))
            .collect::<Result<Vec<_>>>()?;

        let mut fields = Vec::new();
        for field in &self.fields {
            put_u2(&mut fields, field.access);
            put_u2(&mut fields, pool.utf8(&field.name)?);
            put_u2(&mut fields, pool.utf8(&field.desc)?);
            put_u2(&mut fields, 0);
        }

        let mut methods = Vec::new();
        for method in &self.methods {
            put_u2(&mut methods, method.access);
            put_u2(&mut methods, pool.utf8(&method.name)?);
            put_u2(&mut methods, pool.utf8(&method.desc)?);
            if method.has_code() {
                let code = CodeWriter::new(&self.name, method, &mut pool).write()?;
                put_u2(&mut methods, 1);
                put_u2(&mut methods, pool.utf8("Code")?);
                put_u4(&mut methods, code.len() as u32);
                methods.extend(code);
            } else {
                put_u2(&mut methods, 0);
            }
        }

        let mut attributes = Vec::new();
        let mut attribute_count = 0u16;
        if let Some(source) = &self.source_file {
            put_u2(&mut attributes, pool.utf8("SourceFile")?);
            put_u4(&mut attributes, 2);
            put_u2(&mut attributes, pool.utf8(source)?);
            attribute_count += 1;
        }
        if !pool.bootstrap_methods.is_empty() {
            let name = pool.utf8("BootstrapMethods")?;
            let mut body = Vec::new();
            put_u2(&mut body, pool.bootstrap_methods.len() as u16);
            for (handle, args) in &pool.bootstrap_methods {
                put_u2(&mut body, *handle);
                put_u2(&mut body, args.len() as u16);
                for arg in args {
                    put_u2(&mut body, *arg);
                }
            }
            put_u2(&mut attributes, name);
            put_u4(&mut attributes, body.len() as u32);
            attributes.extend(body);
            attribute_count += 1;
        }

        let mut out = Vec::new();
        put_u4(&mut out, 0xCAFE_BABE);
        put_u2(&mut out, 0);
        put_u2(&mut out, self.major_version);
        put_u2(&mut out, pool.count);
        out.extend(&pool.bytes);
        put_u2(&mut out, self.access);
        put_u2(&mut out, this_class);
        put_u2(&mut out, super_class);
        put_u2(&mut out, interfaces.len() as u16);
        for interface in interfaces {
            put_u2(&mut out, interface);
        }
        put_u2(&mut out, self.fields.len() as u16);
        out.extend(fields);
        put_u2(&mut out, self.methods.len() as u16);
        out.extend(methods);
        put_u2(&mut out, attribute_count);
        out.extend(attributes);
        Ok(out)
    }
}

fn put_u1(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Int(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(String),
    String(String),
    Member { tag: u8, owner: String, name: String, desc: String },
    NameAndType(String, String),
    Handle { kind: u8, member: u16 },
    MethodType(String),
    Dynamic { tag: u8, bootstrap: u16, name: String, desc: String },
}

#[derive(Debug)]
struct Pool {
    bytes: Vec<u8>,
    count: u16,
    index: HashMap<PoolKey, u16>,
    bootstrap_methods: Vec<(u16, Vec<u16>)>,
}

impl Default for Pool {
    fn default() -> Self {
        Pool {
            bytes: Vec::new(),
            count: 1,
            index: HashMap::new(),
            bootstrap_methods: Vec::new(),
        }
    }
}

impl Pool {
    fn intern(&mut self, key: PoolKey, wide: bool, entry: Vec<u8>) -> Result<u16> {
        if let Some(index) = self.index.get(&key) {
            return Ok(*index);
        }
        let index = self.count;
        let width = if wide { 2 } else { 1 };
        self.count = self
            .count
            .checked_add(width)
            .ok_or(AssembleError::ConstantPoolOverflow)?;
        self.bytes.extend(entry);
        self.index.insert(key, index);
        Ok(index)
    }

    fn utf8(&mut self, value: &str) -> Result<u16> {
        let encoded = encode_modified_utf8(value);
        let mut entry = vec![1];
        put_u2(&mut entry, encoded.len() as u16);
        entry.extend(encoded);
        self.intern(PoolKey::Utf8(value.to_string()), false, entry)
    }

    fn class(&mut self, name: &str) -> Result<u16> {
        let utf8 = self.utf8(name)?;
        let mut entry = vec![7];
        put_u2(&mut entry, utf8);
        self.intern(PoolKey::Class(name.to_string()), false, entry)
    }

    fn string(&mut self, value: &str) -> Result<u16> {
        let utf8 = self.utf8(value)?;
        let mut entry = vec![8];
        put_u2(&mut entry, utf8);
        self.intern(PoolKey::String(value.to_string()), false, entry)
    }

    fn name_and_type(&mut self, name: &str, desc: &str) -> Result<u16> {
        let name_idx = self.utf8(name)?;
        let desc_idx = self.utf8(desc)?;
        let mut entry = vec![12];
        put_u2(&mut entry, name_idx);
        put_u2(&mut entry, desc_idx);
        self.intern(
            PoolKey::NameAndType(name.to_string(), desc.to_string()),
            false,
            entry,
        )
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, desc: &str) -> Result<u16> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, desc)?;
        let mut entry = vec![tag];
        put_u2(&mut entry, class);
        put_u2(&mut entry, nat);
        self.intern(
            PoolKey::Member {
                tag,
                owner: owner.to_string(),
                name: name.to_string(),
                desc: desc.to_string(),
            },
            false,
            entry,
        )
    }

    fn method_ref(&mut self, owner: &str, name: &str, desc: &str, interface: bool) -> Result<u16> {
        let tag = if interface { 11 } else { 10 };
        self.member(tag, owner, name, desc)
    }

    fn handle(&mut self, handle: &Handle) -> Result<u16> {
        let member = match handle.kind {
            H_GETFIELD..=H_PUTSTATIC => self.member(9, &handle.owner, &handle.name, &handle.desc)?,
            H_INVOKEINTERFACE => self.member(11, &handle.owner, &handle.name, &handle.desc)?,
            _ => self.method_ref(&handle.owner, &handle.name, &handle.desc, handle.interface)?,
        };
        let mut entry = vec![15, handle.kind];
        put_u2(&mut entry, member);
        self.intern(
            PoolKey::Handle {
                kind: handle.kind,
                member,
            },
            false,
            entry,
        )
    }

    fn bootstrap(&mut self, handle: &Handle, args: &[Constant]) -> Result<u16> {
        let handle = self.handle(handle)?;
        let args = args
            .iter()
            .map(|arg| self.constant(arg))
            .collect::<Result<Vec<_>>>()?;
        let entry = (handle, args);
        if let Some(pos) = self.bootstrap_methods.iter().position(|e| *e == entry) {
            return Ok(pos as u16);
        }
        self.bootstrap_methods.push(entry);
        Ok((self.bootstrap_methods.len() - 1) as u16)
    }

    fn dynamic(
        &mut self,
        tag: u8,
        name: &str,
        desc: &str,
        bootstrap: &Handle,
        args: &[Constant],
    ) -> Result<u16> {
        let bootstrap = self.bootstrap(bootstrap, args)?;
        let nat = self.name_and_type(name, desc)?;
        let mut entry = vec![tag];
        put_u2(&mut entry, bootstrap);
        put_u2(&mut entry, nat);
        self.intern(
            PoolKey::Dynamic {
                tag,
                bootstrap,
                name: name.to_string(),
                desc: desc.to_string(),
            },
            false,
            entry,
        )
    }

    fn constant(&mut self, constant: &Constant) -> Result<u16> {
        match constant {
            Constant::Int(v) => {
                let mut entry = vec![3];
                put_u4(&mut entry, *v as u32);
                self.intern(PoolKey::Int(*v), false, entry)
            }
            Constant::Float(v) => {
                let mut entry = vec![4];
                put_u4(&mut entry, v.to_bits());
                self.intern(PoolKey::Float(v.to_bits()), false, entry)
            }
            Constant::Long(v) => {
                let mut entry = vec![5];
                entry.extend_from_slice(&v.to_be_bytes());
                self.intern(PoolKey::Long(*v), true, entry)
            }
            Constant::Double(v) => {
                let mut entry = vec![6];
                entry.extend_from_slice(&v.to_bits().to_be_bytes());
                self.intern(PoolKey::Double(v.to_bits()), true, entry)
            }
            Constant::String(s) => self.string(s),
            Constant::Class(name) => self.class(name),
            Constant::MethodType(desc) => {
                let utf8 = self.utf8(desc)?;
                let mut entry = vec![16];
                put_u2(&mut entry, utf8);
                self.intern(PoolKey::MethodType(desc.clone()), false, entry)
            }
            Constant::MethodHandle(handle) => self.handle(handle),
            Constant::Dynamic {
                name,
                desc,
                bootstrap,
                args,
            } => self.dynamic(17, name, desc, bootstrap, args),
        }
    }
}

/// Java's modified UTF-8: `U+0000` takes two bytes and supplementary
/// characters are written as surrogate pairs.
fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

struct CodeWriter<'a> {
    owner: &'a str,
    method: &'a MethodNode,
    pool: &'a mut Pool,
}

impl<'a> CodeWriter<'a> {
    fn new(owner: &'a str, method: &'a MethodNode, pool: &'a mut Pool) -> Self {
        Self {
            owner,
            method,
            pool,
        }
    }

    fn write(mut self) -> Result<Vec<u8>> {
        let method = self.method;
        let insns = method.instructions.as_slice();

        // Pool indices first: `LDC` widths depend on them.
        let mut operands: Vec<u16> = Vec::with_capacity(insns.len());
        for insn in insns {
            operands.push(self.operand(insn)?);
        }

        let mut offsets = Vec::with_capacity(insns.len() + 1);
        let mut labels: HashMap<LabelId, u32> = HashMap::new();
        let mut pc = 0u32;
        for (insn, operand) in insns.iter().zip(&operands) {
            offsets.push(pc);
            if let Insn::Label(label) = insn {
                labels.insert(*label, pc);
            }
            pc += insn_size(insn, *operand, pc);
        }
        let code_end = pc;
        if code_end > 0xFFFF {
            return Err(AssembleError::CodeTooLarge(self.method.name.clone()));
        }
        let label_offset = |label: LabelId| -> Result<u32> {
            labels
                .get(&label)
                .copied()
                .ok_or(AssembleError::UnplacedLabel(label))
        };

        let mut code = Vec::with_capacity(code_end as usize);
        for ((insn, operand), offset) in insns.iter().zip(&operands).zip(&offsets) {
            self.emit(&mut code, insn, *operand, *offset, &label_offset)?;
        }

        let mut attributes = Vec::new();
        let mut attribute_count = 0u16;

        let frames = self.stack_map(&offsets, &label_offset)?;
        if let Some(frames) = frames {
            put_u2(&mut attributes, self.pool.utf8("StackMapTable")?);
            put_u4(&mut attributes, frames.len() as u32);
            attributes.extend(frames);
            attribute_count += 1;
        }

        let mut lines = Vec::new();
        let mut line_count = 0u16;
        for insn in insns {
            if let Insn::LineNumber { line, start } = insn {
                put_u2(&mut lines, label_offset(*start)? as u16);
                put_u2(&mut lines, *line as u16);
                line_count += 1;
            }
        }
        if line_count > 0 {
            put_u2(&mut attributes, self.pool.utf8("LineNumberTable")?);
            put_u4(&mut attributes, 2 + lines.len() as u32);
            put_u2(&mut attributes, line_count);
            attributes.extend(lines);
            attribute_count += 1;
        }

        if !self.method.local_variables.is_empty() {
            let mut table = Vec::new();
            put_u2(&mut table, self.method.local_variables.len() as u16);
            for local in &self.method.local_variables {
                let start = label_offset(local.start)?;
                let end = label_offset(local.end)?;
                put_u2(&mut table, start as u16);
                put_u2(&mut table, end.saturating_sub(start) as u16);
                put_u2(&mut table, self.pool.utf8(&local.name)?);
                put_u2(&mut table, self.pool.utf8(&local.desc)?);
                put_u2(&mut table, local.index);
            }
            put_u2(&mut attributes, self.pool.utf8("LocalVariableTable")?);
            put_u4(&mut attributes, table.len() as u32);
            attributes.extend(table);
            attribute_count += 1;
        }

        let mut out = Vec::new();
        put_u2(&mut out, self.method.max_stack);
        put_u2(&mut out, self.method.max_locals);
        put_u4(&mut out, code.len() as u32);
        out.extend(code);
        put_u2(&mut out, self.method.try_catch_blocks.len() as u16);
        for block in &self.method.try_catch_blocks {
            put_u2(&mut out, label_offset(block.start)? as u16);
            put_u2(&mut out, label_offset(block.end)? as u16);
            put_u2(&mut out, label_offset(block.handler)? as u16);
            let catch_type = match &block.catch_type {
                Some(name) => self.pool.class(name)?,
                None => 0,
            };
            put_u2(&mut out, catch_type);
        }
        put_u2(&mut out, attribute_count);
        out.extend(attributes);
        Ok(out)
    }

    fn operand(&mut self, insn: &Insn) -> Result<u16> {
        Ok(match insn {
            Insn::Type { desc, .. } | Insn::MultiANewArray { desc, .. } => self.pool.class(desc)?,
            Insn::Field {
                owner, name, desc, ..
            } => self.pool.member(9, owner, name, desc)?,
            Insn::Method {
                owner,
                name,
                desc,
                interface,
                ..
            } => self.pool.method_ref(owner, name, desc, *interface)?,
            Insn::InvokeDynamic {
                name,
                desc,
                bootstrap,
                bootstrap_args,
            } => self.pool.dynamic(18, name, desc, bootstrap, bootstrap_args)?,
            Insn::Ldc(constant) => self.pool.constant(constant)?,
            _ => 0,
        })
    }

    fn emit(
        &self,
        code: &mut Vec<u8>,
        insn: &Insn,
        operand: u16,
        offset: u32,
        label_offset: &dyn Fn(LabelId) -> Result<u32>,
    ) -> Result<()> {
        let relative = |label: LabelId| -> Result<i32> {
            Ok(label_offset(label)? as i32 - offset as i32)
        };
        match insn {
            Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame(_) => {}
            Insn::Plain { opcode } => put_u1(code, *opcode),
            Insn::Int { opcode, operand } => {
                put_u1(code, *opcode);
                match *opcode {
                    SIPUSH => put_u2(code, *operand as i16 as u16),
                    _ => put_u1(code, *operand as u8),
                }
            }
            Insn::Var { opcode, var } => {
                if *var > 0xFF {
                    put_u1(code, WIDE);
                    put_u1(code, *opcode);
                    put_u2(code, *var);
                } else {
                    put_u1(code, *opcode);
                    put_u1(code, *var as u8);
                }
            }
            Insn::Iinc { var, incr } => {
                if *var > 0xFF || i8::try_from(*incr).is_err() {
                    put_u1(code, WIDE);
                    put_u1(code, IINC);
                    put_u2(code, *var);
                    put_u2(code, *incr as u16);
                } else {
                    put_u1(code, IINC);
                    put_u1(code, *var as u8);
                    put_u1(code, *incr as i8 as u8);
                }
            }
            Insn::Type { opcode, .. } | Insn::Field { opcode, .. } => {
                put_u1(code, *opcode);
                put_u2(code, operand);
            }
            Insn::Method { opcode, desc, .. } => {
                put_u1(code, *opcode);
                put_u2(code, operand);
                if *opcode == INVOKEINTERFACE {
                    let slots = parse_method_descriptor(desc)
                        .map_err(|_| AssembleError::InvalidDescriptor(desc.clone()))?
                        .argument_slots();
                    put_u1(code, (slots + 1) as u8);
                    put_u1(code, 0);
                }
            }
            Insn::InvokeDynamic { .. } => {
                put_u1(code, INVOKEDYNAMIC);
                put_u2(code, operand);
                put_u2(code, 0);
            }
            Insn::Jump { opcode, label } => {
                let delta = relative(*label)?;
                let delta = i16::try_from(delta).map_err(|_| AssembleError::BranchOutOfRange {
                    offset,
                    target: (offset as i32 + delta) as u32,
                })?;
                put_u1(code, *opcode);
                put_u2(code, delta as u16);
            }
            Insn::Ldc(constant) => match constant {
                Constant::Long(_) | Constant::Double(_) => {
                    put_u1(code, LDC2_W);
                    put_u2(code, operand);
                }
                _ if operand > 0xFF => {
                    put_u1(code, LDC_W);
                    put_u2(code, operand);
                }
                _ => {
                    put_u1(code, LDC);
                    put_u1(code, operand as u8);
                }
            },
            Insn::TableSwitch {
                min,
                max,
                default,
                labels,
            } => {
                put_u1(code, TABLESWITCH);
                pad(code, offset);
                put_u4(code, relative(*default)? as u32);
                put_u4(code, *min as u32);
                put_u4(code, *max as u32);
                for label in labels {
                    put_u4(code, relative(*label)? as u32);
                }
            }
            Insn::LookupSwitch {
                default,
                keys,
                labels,
            } => {
                put_u1(code, LOOKUPSWITCH);
                pad(code, offset);
                put_u4(code, relative(*default)? as u32);
                put_u4(code, keys.len() as u32);
                for (key, label) in keys.iter().zip(labels) {
                    put_u4(code, *key as u32);
                    put_u4(code, relative(*label)? as u32);
                }
            }
            Insn::MultiANewArray { dims, .. } => {
                put_u1(code, MULTIANEWARRAY);
                put_u2(code, operand);
                put_u1(code, *dims);
            }
        }
        Ok(())
    }

    /// Encodes every `Frame` node at the offset of the instruction that
    /// follows it.
    fn stack_map(
        &mut self,
        offsets: &[u32],
        label_offset: &dyn Fn(LabelId) -> Result<u32>,
    ) -> Result<Option<Vec<u8>>> {
        let method = self.method;
        let insns = method.instructions.as_slice();
        let mut body = Vec::new();
        let mut count = 0u16;
        let mut previous: Option<u32> = None;
        for (insn, offset) in insns.iter().zip(offsets) {
            let Insn::Frame(frame) = insn else {
                continue;
            };
            let delta = match previous {
                None => *offset,
                Some(prev) => offset.saturating_sub(prev + 1),
            };
            previous = Some(*offset);
            count += 1;

            let locals = compress(&frame.locals);
            match frame.kind {
                FrameKind::Same if delta < 64 => put_u1(&mut body, delta as u8),
                FrameKind::Same => {
                    put_u1(&mut body, 251);
                    put_u2(&mut body, delta as u16);
                }
                FrameKind::Same1 => {
                    if delta < 64 {
                        put_u1(&mut body, 64 + delta as u8);
                    } else {
                        put_u1(&mut body, 247);
                        put_u2(&mut body, delta as u16);
                    }
                    let value = frame.stack.first().cloned().unwrap_or(FrameValue::Top);
                    self.verification(&mut body, &value, label_offset)?;
                }
                FrameKind::Append(n) => {
                    put_u1(&mut body, 251 + n as u8);
                    put_u2(&mut body, delta as u16);
                    for value in &locals[locals.len().saturating_sub(n)..] {
                        self.verification(&mut body, value, label_offset)?;
                    }
                }
                FrameKind::Chop(n) => {
                    put_u1(&mut body, 251 - n as u8);
                    put_u2(&mut body, delta as u16);
                }
                FrameKind::Full | FrameKind::New => {
                    put_u1(&mut body, 255);
                    put_u2(&mut body, delta as u16);
                    put_u2(&mut body, locals.len() as u16);
                    for value in &locals {
                        self.verification(&mut body, value, label_offset)?;
                    }
                    put_u2(&mut body, frame.stack.len() as u16);
                    for value in &frame.stack {
                        self.verification(&mut body, value, label_offset)?;
                    }
                }
            }
        }
        if count == 0 {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(body.len() + 2);
        put_u2(&mut out, count);
        out.extend(body);
        tracing::trace!(
            target: "pointcut.test_utils",
            owner = self.owner,
            method = %self.method.name,
            frames = count,
            "encoded stack map"
        );
        Ok(Some(out))
    }

    fn verification(
        &mut self,
        out: &mut Vec<u8>,
        value: &FrameValue,
        label_offset: &dyn Fn(LabelId) -> Result<u32>,
    ) -> Result<()> {
        match value {
            FrameValue::Top => put_u1(out, 0),
            FrameValue::Integer => put_u1(out, 1),
            FrameValue::Float => put_u1(out, 2),
            FrameValue::Double => put_u1(out, 3),
            FrameValue::Long => put_u1(out, 4),
            FrameValue::Null => put_u1(out, 5),
            FrameValue::UninitializedThis => put_u1(out, 6),
            FrameValue::Object(name) => {
                put_u1(out, 7);
                put_u2(out, self.pool.class(name)?);
            }
            FrameValue::Uninitialized(label) => {
                put_u1(out, 8);
                put_u2(out, label_offset(*label)? as u16);
            }
        }
        Ok(())
    }
}

/// One entry per value: drops the `Top` that follows each `long`/`double`.
fn compress(expanded: &[FrameValue]) -> Vec<FrameValue> {
    let mut out = Vec::with_capacity(expanded.len());
    let mut i = 0;
    while i < expanded.len() {
        let value = &expanded[i];
        out.push(value.clone());
        i += value.slot_size();
    }
    out
}

fn pad(code: &mut Vec<u8>, offset: u32) {
    let padding = (4 - (offset + 1) % 4) % 4;
    for _ in 0..padding {
        code.push(0);
    }
}

fn insn_size(insn: &Insn, operand: u16, offset: u32) -> u32 {
    match insn {
        Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame(_) => 0,
        Insn::Plain { .. } => 1,
        Insn::Int { opcode, .. } => {
            if *opcode == SIPUSH {
                3
            } else {
                2
            }
        }
        Insn::Var { var, .. } => {
            if *var > 0xFF {
                4
            } else {
                2
            }
        }
        Insn::Iinc { var, incr } => {
            if *var > 0xFF || i8::try_from(*incr).is_err() {
                6
            } else {
                3
            }
        }
        Insn::Type { .. } | Insn::Field { .. } | Insn::Jump { .. } => 3,
        Insn::Method { opcode, .. } => {
            if *opcode == INVOKEINTERFACE {
                5
            } else {
                3
            }
        }
        Insn::InvokeDynamic { .. } => 5,
        Insn::Ldc(Constant::Long(_) | Constant::Double(_)) => 3,
        Insn::Ldc(_) => {
            if operand > 0xFF {
                3
            } else {
                2
            }
        }
        Insn::TableSwitch { labels, .. } => {
            1 + (4 - (offset + 1) % 4) % 4 + 12 + 4 * labels.len() as u32
        }
        Insn::LookupSwitch { keys, .. } => 1 + (4 - (offset + 1) % 4) % 4 + 8 + 8 * keys.len() as u32,
        Insn::MultiANewArray { .. } => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointcut_classfile::{ClassNode, MethodBuilder};
    use pretty_assertions::assert_eq;

    #[test]
    fn modified_utf8_encodes_nul_with_two_bytes() {
        assert_eq!(encode_modified_utf8("a\0"), vec![b'a', 0xC0, 0x80]);
    }

    #[test]
    fn assembled_switch_and_frames_decode_back() {
        let mut b = MethodBuilder::new("a/B", ACC_STATIC, "m", "(I)I").unwrap();
        let one = b.new_label();
        let other = b.new_label();
        b.var(ILOAD, 0);
        b.table_switch(0, 0, other, vec![one]);
        b.label(one);
        b.frame_same();
        b.push_int(1).insn(IRETURN);
        b.label(other);
        b.frame_same();
        b.push_int(2).insn(IRETURN);
        let method = b.build();

        let bytes = ClassAssembler::new("a/B").method(method.clone()).assemble().unwrap();
        let class = ClassNode::parse(&bytes).unwrap();
        let decoded = class.find_method("m", Some("(I)I")).unwrap();

        let opcodes = |m: &MethodNode| -> Vec<u8> {
            m.instructions.iter().filter_map(|(_, insn)| insn.opcode()).collect()
        };
        assert_eq!(opcodes(decoded), opcodes(&method));
        let kinds = |m: &MethodNode| -> Vec<FrameKind> {
            m.instructions
                .iter()
                .filter_map(|(_, insn)| match insn {
                    Insn::Frame(frame) => Some(frame.kind),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(kinds(decoded), vec![FrameKind::Same, FrameKind::Same]);
    }
}
