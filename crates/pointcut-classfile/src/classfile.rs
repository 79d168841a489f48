use std::sync::Arc;

use crate::code::{decode_code, DecodedCode};
use crate::constant_pool::{BootstrapMethod, ConstantPool};
use crate::error::{Error, Result};
use crate::insn::{InsnList, LabelId};
use crate::opcodes::{ACC_ABSTRACT, ACC_INTERFACE, ACC_NATIVE, ACC_STATIC, ACC_SYNTHETIC};
use crate::reader::Reader;

/// A parsed class: the compiled-unit view handed to the resolver.
#[derive(Debug, Clone)]
pub struct ClassNode {
    pub minor_version: u16,
    pub major_version: u16,
    pub access: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub source_file: Option<String>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<Arc<MethodNode>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNode {
    pub access: u16,
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: InsnList,
    pub try_catch_blocks: Vec<TryCatchBlock>,
    /// Declared `LocalVariableTable` entries, in attribute order.
    pub local_variables: Vec<LocalVariableNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlock {
    pub start: LabelId,
    pub end: LabelId,
    pub handler: LabelId,
    /// `None` for `finally` handlers.
    pub catch_type: Option<String>,
}

/// A declared local variable, valid over `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableNode {
    pub name: String,
    pub desc: String,
    pub start: LabelId,
    pub end: LabelId,
    pub index: u16,
}

impl MethodNode {
    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_synthetic(&self) -> bool {
        self.access & ACC_SYNTHETIC != 0
    }

    /// Abstract and native methods carry no instructions.
    pub fn has_code(&self) -> bool {
        self.access & (ACC_ABSTRACT | ACC_NATIVE) == 0 && !self.instructions.is_empty()
    }
}

impl ClassNode {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(Error::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let mut cp = ConstantPool::parse(&mut reader)?;

        let access = reader.read_u2()?;
        let name = cp.get_class_name(reader.read_u2()?)?;
        let super_class_idx = reader.read_u2()?;
        let super_name = if super_class_idx == 0 {
            None
        } else {
            Some(cp.get_class_name(super_class_idx)?)
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(cp.get_class_name(reader.read_u2()?)?);
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            let member = parse_member(&mut reader, &cp)?;
            fields.push(FieldNode {
                access: member.access,
                name: member.name,
                desc: member.desc,
            });
        }

        let methods_count = reader.read_u2()? as usize;
        let mut raw_methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            raw_methods.push(parse_member(&mut reader, &cp)?);
        }

        let class_attrs = parse_class_attributes(&mut reader, &cp)?;
        reader.ensure_empty("class file")?;

        // `invokedynamic` operands can only be resolved once the bootstrap
        // table is known, so code is decoded last.
        cp.set_bootstrap_methods(class_attrs.bootstrap_methods);

        let mut methods = Vec::with_capacity(raw_methods.len());
        for raw in raw_methods {
            let method = match raw.code {
                Some(code) => {
                    let DecodedCode {
                        max_stack,
                        max_locals,
                        instructions,
                        try_catch_blocks,
                        local_variables,
                    } = decode_code(code, &cp, &name, raw.access, &raw.name, &raw.desc)?;
                    MethodNode {
                        access: raw.access,
                        name: raw.name,
                        desc: raw.desc,
                        max_stack,
                        max_locals,
                        instructions,
                        try_catch_blocks,
                        local_variables,
                    }
                }
                None => MethodNode {
                    access: raw.access,
                    name: raw.name,
                    desc: raw.desc,
                    max_stack: 0,
                    max_locals: 0,
                    instructions: InsnList::default(),
                    try_catch_blocks: Vec::new(),
                    local_variables: Vec::new(),
                },
            };
            methods.push(Arc::new(method));
        }

        tracing::trace!(
            target: "pointcut.classfile",
            class = %name,
            methods = methods.len(),
            "parsed class"
        );

        Ok(Self {
            minor_version,
            major_version,
            access,
            name,
            super_name,
            interfaces,
            source_file: class_attrs.source_file,
            fields,
            methods,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access & ACC_INTERFACE != 0
    }

    /// Finds a method by name and, optionally, exact descriptor.
    pub fn find_method(&self, name: &str, desc: Option<&str>) -> Option<&Arc<MethodNode>> {
        self.methods
            .iter()
            .find(|m| m.name == name && desc.map_or(true, |d| m.desc == d))
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|f| f.name == name)
    }
}

struct RawMember<'a> {
    access: u16,
    name: String,
    desc: String,
    code: Option<&'a [u8]>,
}

fn parse_member<'a>(reader: &mut Reader<'a>, cp: &ConstantPool) -> Result<RawMember<'a>> {
    let access = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let desc = cp.get_utf8(reader.read_u2()?)?.to_string();

    let mut code = None;
    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        if cp.get_utf8(name_index)? == "Code" {
            code = Some(info);
        }
    }
    Ok(RawMember {
        access,
        name,
        desc,
        code,
    })
}

#[derive(Default)]
struct ClassAttributes {
    source_file: Option<String>,
    bootstrap_methods: Vec<BootstrapMethod>,
}

fn parse_class_attributes(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<ClassAttributes> {
    let attributes_count = reader.read_u2()? as usize;
    let mut parsed = ClassAttributes::default();
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let name = cp.get_utf8(name_index)?;

        let mut sub = Reader::new(info);
        match name {
            "SourceFile" => {
                parsed.source_file = Some(cp.get_utf8(sub.read_u2()?)?.to_string());
                sub.ensure_empty("SourceFile")?;
            }
            "BootstrapMethods" => {
                let num = sub.read_u2()? as usize;
                let mut methods = Vec::with_capacity(num);
                for _ in 0..num {
                    let handle = sub.read_u2()?;
                    let argc = sub.read_u2()? as usize;
                    let mut arguments = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        arguments.push(sub.read_u2()?);
                    }
                    methods.push(BootstrapMethod { handle, arguments });
                }
                parsed.bootstrap_methods = methods;
                sub.ensure_empty("BootstrapMethods")?;
            }
            _ => {
                // Unknown attribute: intentionally skipped.
            }
        }
    }
    Ok(parsed)
}
