//! Decoding of the `Code` attribute into an [`InsnList`].

use std::collections::{BTreeMap, BTreeSet};

use crate::classfile::{LocalVariableNode, TryCatchBlock};
use crate::constant_pool::ConstantPool;
use crate::error::{Error, Result};
use crate::frame::{initial_locals, FrameKind, FrameNode, FrameValue};
use crate::insn::{Insn, InsnList, LabelId};
use crate::opcodes::*;
use crate::reader::Reader;

const WIDE: u8 = 196;
const GOTO_W: u8 = 200;
const JSR_W: u8 = 201;
const LDC_W: u8 = 19;
const LDC2_W: u8 = 20;

pub(crate) struct DecodedCode {
    pub(crate) max_stack: u16,
    pub(crate) max_locals: u16,
    pub(crate) instructions: InsnList,
    pub(crate) try_catch_blocks: Vec<TryCatchBlock>,
    pub(crate) local_variables: Vec<LocalVariableNode>,
}

/// An instruction whose branch targets are still bytecode offsets.
enum Raw {
    Done(Insn),
    Jump {
        opcode: u8,
        target: u32,
    },
    TableSwitch {
        min: i32,
        max: i32,
        default: u32,
        targets: Vec<u32>,
    },
    LookupSwitch {
        default: u32,
        keys: Vec<i32>,
        targets: Vec<u32>,
    },
}

enum RawValue {
    Known(FrameValue),
    Uninitialized(u32),
}

struct RawFrame {
    kind: FrameKind,
    locals: Vec<RawValue>,
    stack: Vec<RawValue>,
}

struct RawLocal {
    start: u32,
    end: u32,
    name: String,
    desc: String,
    index: u16,
}

struct RawHandler {
    start: u32,
    end: u32,
    handler: u32,
    catch_type: Option<String>,
}

pub(crate) fn decode_code(
    bytes: &[u8],
    cp: &ConstantPool,
    owner: &str,
    access: u16,
    name: &str,
    desc: &str,
) -> Result<DecodedCode> {
    let mut reader = Reader::new(bytes);
    let max_stack = reader.read_u2()?;
    let max_locals = reader.read_u2()?;
    let code_length = reader.read_u4()? as usize;
    let code = reader.read_bytes(code_length)?;
    let code_end = code_length as u32;

    let raw_insns = decode_instructions(code, cp)?;
    let boundaries: BTreeSet<u32> = raw_insns.iter().map(|(offset, _)| *offset).collect();

    let mut label_offsets = BTreeSet::new();
    for (offset, raw) in &raw_insns {
        let targets: Vec<u32> = match raw {
            Raw::Done(_) => Vec::new(),
            Raw::Jump { target, .. } => vec![*target],
            Raw::TableSwitch {
                default, targets, ..
            }
            | Raw::LookupSwitch {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
        };
        for target in targets {
            if !boundaries.contains(&target) {
                return Err(Error::InvalidBranchTarget {
                    offset: *offset,
                    target: target as i64,
                });
            }
            label_offsets.insert(target);
        }
    }

    let handler_count = reader.read_u2()? as usize;
    let mut handlers = Vec::with_capacity(handler_count);
    for _ in 0..handler_count {
        let start = reader.read_u2()? as u32;
        let end = reader.read_u2()? as u32;
        let handler = reader.read_u2()? as u32;
        let catch_idx = reader.read_u2()?;
        let catch_type = if catch_idx == 0 {
            None
        } else {
            Some(cp.get_class_name(catch_idx)?)
        };
        label_offsets.extend([start, end, handler]);
        handlers.push(RawHandler {
            start,
            end,
            handler,
            catch_type,
        });
    }

    let mut line_numbers: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    let mut raw_locals = Vec::new();
    let mut raw_frames: BTreeMap<u32, RawFrame> = BTreeMap::new();

    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let mut sub = Reader::new(info);
        match cp.get_utf8(name_index)? {
            "LineNumberTable" => {
                let count = sub.read_u2()? as usize;
                for _ in 0..count {
                    let start = sub.read_u2()? as u32;
                    let line = sub.read_u2()? as u32;
                    label_offsets.insert(start);
                    line_numbers.entry(start).or_default().push(line);
                }
                sub.ensure_empty("LineNumberTable")?;
            }
            "LocalVariableTable" => {
                let count = sub.read_u2()? as usize;
                for _ in 0..count {
                    let start = sub.read_u2()? as u32;
                    let length = sub.read_u2()? as u32;
                    let name = cp.get_utf8(sub.read_u2()?)?.to_string();
                    let desc = cp.get_utf8(sub.read_u2()?)?.to_string();
                    let index = sub.read_u2()?;
                    let end = start + length;
                    if end > code_end {
                        return Err(Error::MalformedAttribute("LocalVariableTable"));
                    }
                    label_offsets.extend([start, end]);
                    raw_locals.push(RawLocal {
                        start,
                        end,
                        name,
                        desc,
                        index,
                    });
                }
                sub.ensure_empty("LocalVariableTable")?;
            }
            "StackMapTable" => {
                raw_frames = decode_stack_map(&mut sub, cp)?;
                sub.ensure_empty("StackMapTable")?;
                for frame in raw_frames.values() {
                    for value in frame.locals.iter().chain(&frame.stack) {
                        if let RawValue::Uninitialized(offset) = value {
                            label_offsets.insert(*offset);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    reader.ensure_empty("Code")?;

    for offset in label_offsets.iter().chain(raw_frames.keys()) {
        if *offset != code_end && !boundaries.contains(offset) {
            return Err(Error::MalformedAttribute("Code"));
        }
    }

    let labels: BTreeMap<u32, LabelId> = label_offsets
        .iter()
        .enumerate()
        .map(|(idx, offset)| (*offset, LabelId::new(idx)))
        .collect();
    let label_at = |offset: u32| -> Result<LabelId> {
        labels
            .get(&offset)
            .copied()
            .ok_or(Error::MalformedAttribute("Code"))
    };

    // Stack-map locals are delta-encoded against the implicit entry frame.
    let mut current: Vec<FrameValue> = initial_locals(owner, access, name, desc)?;
    let mut frames: BTreeMap<u32, FrameNode> = BTreeMap::new();
    for (offset, raw) in raw_frames {
        let convert = |values: Vec<RawValue>| -> Result<Vec<FrameValue>> {
            values
                .into_iter()
                .map(|value| match value {
                    RawValue::Known(v) => Ok(v),
                    RawValue::Uninitialized(off) => Ok(FrameValue::Uninitialized(label_at(off)?)),
                })
                .collect()
        };
        let locals = convert(raw.locals)?;
        let stack = convert(raw.stack)?;
        match raw.kind {
            FrameKind::Same | FrameKind::Same1 | FrameKind::New => {}
            FrameKind::Append(_) => current.extend(locals),
            FrameKind::Chop(count) => {
                let keep = current
                    .len()
                    .checked_sub(count)
                    .ok_or(Error::MalformedAttribute("StackMapTable"))?;
                current.truncate(keep);
            }
            FrameKind::Full => current = locals,
        }
        frames.insert(offset, FrameNode::from_compressed(raw.kind, &current, stack));
    }

    let mut insns = Vec::with_capacity(raw_insns.len() * 2);
    let mut emit_pseudo = |insns: &mut Vec<Insn>, offset: u32| {
        if let Some(label) = labels.get(&offset) {
            insns.push(Insn::Label(*label));
            if let Some(lines) = line_numbers.get(&offset) {
                for line in lines {
                    insns.push(Insn::LineNumber {
                        line: *line,
                        start: *label,
                    });
                }
            }
        }
        if let Some(frame) = frames.remove(&offset) {
            insns.push(Insn::Frame(frame));
        }
    };

    for (offset, raw) in raw_insns {
        emit_pseudo(&mut insns, offset);
        insns.push(match raw {
            Raw::Done(insn) => insn,
            Raw::Jump { opcode, target } => Insn::Jump {
                opcode,
                label: label_at(target)?,
            },
            Raw::TableSwitch {
                min,
                max,
                default,
                targets,
            } => Insn::TableSwitch {
                min,
                max,
                default: label_at(default)?,
                labels: targets.into_iter().map(label_at).collect::<Result<_>>()?,
            },
            Raw::LookupSwitch {
                default,
                keys,
                targets,
            } => Insn::LookupSwitch {
                default: label_at(default)?,
                keys,
                labels: targets.into_iter().map(label_at).collect::<Result<_>>()?,
            },
        });
    }
    emit_pseudo(&mut insns, code_end);

    let try_catch_blocks = handlers
        .into_iter()
        .map(|h| {
            Ok(TryCatchBlock {
                start: label_at(h.start)?,
                end: label_at(h.end)?,
                handler: label_at(h.handler)?,
                catch_type: h.catch_type,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let local_variables = raw_locals
        .into_iter()
        .map(|l| {
            Ok(LocalVariableNode {
                name: l.name,
                desc: l.desc,
                start: label_at(l.start)?,
                end: label_at(l.end)?,
                index: l.index,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DecodedCode {
        max_stack,
        max_locals,
        instructions: InsnList::new(insns),
        try_catch_blocks,
        local_variables,
    })
}

fn decode_instructions(code: &[u8], cp: &ConstantPool) -> Result<Vec<(u32, Raw)>> {
    let mut reader = Reader::new(code);
    let mut out = Vec::new();
    while reader.remaining() > 0 {
        let offset = reader.position() as u32;
        let opcode = reader.read_u1()?;
        let branch = |delta: i64| -> Result<u32> {
            let target = offset as i64 + delta;
            if target < 0 || target >= code.len() as i64 {
                return Err(Error::InvalidBranchTarget { offset, target });
            }
            Ok(target as u32)
        };
        let raw = match opcode {
            NOP..=DCONST_1 => Raw::Done(Insn::Plain { opcode }),
            BIPUSH => Raw::Done(Insn::Int {
                opcode,
                operand: reader.read_i1()? as i32,
            }),
            SIPUSH => Raw::Done(Insn::Int {
                opcode,
                operand: reader.read_i2()? as i32,
            }),
            LDC => Raw::Done(Insn::Ldc(cp.get_constant(reader.read_u1()? as u16)?)),
            LDC_W | LDC2_W => Raw::Done(Insn::Ldc(cp.get_constant(reader.read_u2()?)?)),
            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Raw::Done(Insn::Var {
                opcode,
                var: reader.read_u1()? as u16,
            }),
            // iload_0 .. aload_3
            26..=45 => Raw::Done(Insn::Var {
                opcode: ILOAD + (opcode - 26) / 4,
                var: ((opcode - 26) % 4) as u16,
            }),
            // istore_0 .. astore_3
            59..=78 => Raw::Done(Insn::Var {
                opcode: ISTORE + (opcode - 59) / 4,
                var: ((opcode - 59) % 4) as u16,
            }),
            IALOAD..=SALOAD | IASTORE..=LXOR | I2L..=DCMPG => Raw::Done(Insn::Plain { opcode }),
            IINC => Raw::Done(Insn::Iinc {
                var: reader.read_u1()? as u16,
                incr: reader.read_i1()? as i16,
            }),
            IFEQ..=JSR | IFNULL | IFNONNULL => Raw::Jump {
                opcode,
                target: branch(reader.read_i2()? as i64)?,
            },
            GOTO_W | JSR_W => Raw::Jump {
                opcode: if opcode == GOTO_W { GOTO } else { JSR },
                target: branch(reader.read_i4()? as i64)?,
            },
            TABLESWITCH => {
                skip_padding(&mut reader)?;
                let default = branch(reader.read_i4()? as i64)?;
                let min = reader.read_i4()?;
                let max = reader.read_i4()?;
                if max < min {
                    return Err(Error::MalformedAttribute("Code"));
                }
                let count = (max as i64 - min as i64 + 1) as usize;
                let mut targets = Vec::with_capacity(count.min(code.len()));
                for _ in 0..count {
                    targets.push(branch(reader.read_i4()? as i64)?);
                }
                Raw::TableSwitch {
                    min,
                    max,
                    default,
                    targets,
                }
            }
            LOOKUPSWITCH => {
                skip_padding(&mut reader)?;
                let default = branch(reader.read_i4()? as i64)?;
                let pairs = reader.read_i4()?;
                if pairs < 0 {
                    return Err(Error::MalformedAttribute("Code"));
                }
                let mut keys = Vec::with_capacity((pairs as usize).min(code.len()));
                let mut targets = Vec::with_capacity(keys.capacity());
                for _ in 0..pairs {
                    keys.push(reader.read_i4()?);
                    targets.push(branch(reader.read_i4()? as i64)?);
                }
                Raw::LookupSwitch {
                    default,
                    keys,
                    targets,
                }
            }
            IRETURN..=RETURN | ARRAYLENGTH | ATHROW | MONITORENTER | MONITOREXIT => {
                Raw::Done(Insn::Plain { opcode })
            }
            GETSTATIC..=PUTFIELD => {
                let member = cp.get_member_ref(reader.read_u2()?)?;
                Raw::Done(Insn::Field {
                    opcode,
                    owner: member.owner,
                    name: member.name,
                    desc: member.descriptor,
                })
            }
            INVOKEVIRTUAL..=INVOKEINTERFACE => {
                let member = cp.get_member_ref(reader.read_u2()?)?;
                if opcode == INVOKEINTERFACE {
                    reader.read_u1()?;
                    reader.read_u1()?;
                }
                Raw::Done(Insn::Method {
                    opcode,
                    owner: member.owner,
                    name: member.name,
                    desc: member.descriptor,
                    interface: member.interface,
                })
            }
            INVOKEDYNAMIC => {
                let (name, desc, bootstrap, bootstrap_args) =
                    cp.get_invoke_dynamic(reader.read_u2()?)?;
                reader.read_u2()?;
                Raw::Done(Insn::InvokeDynamic {
                    name,
                    desc,
                    bootstrap,
                    bootstrap_args,
                })
            }
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Raw::Done(Insn::Type {
                opcode,
                desc: cp.get_class_name(reader.read_u2()?)?,
            }),
            NEWARRAY => Raw::Done(Insn::Int {
                opcode,
                operand: reader.read_u1()? as i32,
            }),
            WIDE => {
                let inner = reader.read_u1()?;
                let var = reader.read_u2()?;
                match inner {
                    IINC => Raw::Done(Insn::Iinc {
                        var,
                        incr: reader.read_i2()?,
                    }),
                    ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
                        Raw::Done(Insn::Var { opcode: inner, var })
                    }
                    _ => {
                        return Err(Error::InvalidOpcode {
                            opcode: inner,
                            offset,
                        })
                    }
                }
            }
            MULTIANEWARRAY => Raw::Done(Insn::MultiANewArray {
                desc: cp.get_class_name(reader.read_u2()?)?,
                dims: reader.read_u1()?,
            }),
            _ => return Err(Error::InvalidOpcode { opcode, offset }),
        };
        out.push((offset, raw));
    }
    Ok(out)
}

fn skip_padding(reader: &mut Reader<'_>) -> Result<()> {
    while reader.position() % 4 != 0 {
        reader.read_u1()?;
    }
    Ok(())
}

fn decode_stack_map(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<BTreeMap<u32, RawFrame>> {
    let count = reader.read_u2()? as usize;
    let mut frames = BTreeMap::new();
    let mut previous: Option<u32> = None;
    for _ in 0..count {
        let frame_type = reader.read_u1()?;
        let (delta, frame) = match frame_type {
            0..=63 => (
                frame_type as u32,
                RawFrame {
                    kind: FrameKind::Same,
                    locals: Vec::new(),
                    stack: Vec::new(),
                },
            ),
            64..=127 => (
                (frame_type - 64) as u32,
                RawFrame {
                    kind: FrameKind::Same1,
                    locals: Vec::new(),
                    stack: vec![read_verification(reader, cp)?],
                },
            ),
            247 => {
                let delta = reader.read_u2()? as u32;
                (
                    delta,
                    RawFrame {
                        kind: FrameKind::Same1,
                        locals: Vec::new(),
                        stack: vec![read_verification(reader, cp)?],
                    },
                )
            }
            248..=250 => (
                reader.read_u2()? as u32,
                RawFrame {
                    kind: FrameKind::Chop((251 - frame_type) as usize),
                    locals: Vec::new(),
                    stack: Vec::new(),
                },
            ),
            251 => (
                reader.read_u2()? as u32,
                RawFrame {
                    kind: FrameKind::Same,
                    locals: Vec::new(),
                    stack: Vec::new(),
                },
            ),
            252..=254 => {
                let delta = reader.read_u2()? as u32;
                let count = (frame_type - 251) as usize;
                let mut locals = Vec::with_capacity(count);
                for _ in 0..count {
                    locals.push(read_verification(reader, cp)?);
                }
                (
                    delta,
                    RawFrame {
                        kind: FrameKind::Append(count),
                        locals,
                        stack: Vec::new(),
                    },
                )
            }
            255 => {
                let delta = reader.read_u2()? as u32;
                let num_locals = reader.read_u2()? as usize;
                let mut locals = Vec::with_capacity(num_locals);
                for _ in 0..num_locals {
                    locals.push(read_verification(reader, cp)?);
                }
                let num_stack = reader.read_u2()? as usize;
                let mut stack = Vec::with_capacity(num_stack);
                for _ in 0..num_stack {
                    stack.push(read_verification(reader, cp)?);
                }
                (
                    delta,
                    RawFrame {
                        kind: FrameKind::Full,
                        locals,
                        stack,
                    },
                )
            }
            _ => return Err(Error::MalformedAttribute("StackMapTable")),
        };
        let offset = match previous {
            None => delta,
            Some(prev) => prev + delta + 1,
        };
        previous = Some(offset);
        frames.insert(offset, frame);
    }
    Ok(frames)
}

fn read_verification(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<RawValue> {
    Ok(match reader.read_u1()? {
        0 => RawValue::Known(FrameValue::Top),
        1 => RawValue::Known(FrameValue::Integer),
        2 => RawValue::Known(FrameValue::Float),
        3 => RawValue::Known(FrameValue::Double),
        4 => RawValue::Known(FrameValue::Long),
        5 => RawValue::Known(FrameValue::Null),
        6 => RawValue::Known(FrameValue::UninitializedThis),
        7 => RawValue::Known(FrameValue::Object(cp.get_class_name(reader.read_u2()?)?)),
        8 => RawValue::Uninitialized(reader.read_u2()? as u32),
        _ => return Err(Error::MalformedAttribute("StackMapTable")),
    })
}
