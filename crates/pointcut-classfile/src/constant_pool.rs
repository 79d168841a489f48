use crate::error::{Error, Result};
use crate::insn::{Constant, Handle};
use crate::reader::Reader;

const MAX_DYNAMIC_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    /// Slot 0 and the second slot of `Long`/`Double` entries.
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Unusable => "unusable",
            Entry::Utf8(_) => "Utf8",
            Entry::Integer(_) => "Integer",
            Entry::Float(_) => "Float",
            Entry::Long(_) => "Long",
            Entry::Double(_) => "Double",
            Entry::Class(_) => "Class",
            Entry::String(_) => "String",
            Entry::FieldRef { .. } => "Fieldref",
            Entry::MethodRef { .. } => "Methodref",
            Entry::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Entry::NameAndType { .. } => "NameAndType",
            Entry::MethodHandle { .. } => "MethodHandle",
            Entry::MethodType(_) => "MethodType",
            Entry::Dynamic { .. } => "Dynamic",
            Entry::InvokeDynamic { .. } => "InvokeDynamic",
            Entry::Module(_) => "Module",
            Entry::Package(_) => "Package",
        }
    }
}

/// A resolved `Fieldref`/`Methodref`/`InterfaceMethodref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MemberRef {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) interface: bool,
}

/// A `BootstrapMethods` entry, kept as raw constant-pool indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BootstrapMethod {
    pub(crate) handle: u16,
    pub(crate) arguments: Vec<u16>,
}

#[derive(Debug, Clone)]
pub(crate) struct ConstantPool {
    entries: Vec<Entry>,
    bootstrap_methods: Vec<BootstrapMethod>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Entry::Unusable);
        while entries.len() < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let len = reader.read_u2()? as usize;
                    Entry::Utf8(decode_modified_utf8(reader.read_bytes(len)?)?)
                }
                3 => Entry::Integer(reader.read_i4()?),
                4 => Entry::Float(f32::from_bits(reader.read_u4()?)),
                5 => Entry::Long(reader.read_u8()? as i64),
                6 => Entry::Double(f64::from_bits(reader.read_u8()?)),
                7 => Entry::Class(reader.read_u2()?),
                8 => Entry::String(reader.read_u2()?),
                9 => Entry::FieldRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                10 => Entry::MethodRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                11 => Entry::InterfaceMethodRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                12 => Entry::NameAndType {
                    name: reader.read_u2()?,
                    descriptor: reader.read_u2()?,
                },
                15 => Entry::MethodHandle {
                    kind: reader.read_u1()?,
                    reference: reader.read_u2()?,
                },
                16 => Entry::MethodType(reader.read_u2()?),
                17 => Entry::Dynamic {
                    bootstrap: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                18 => Entry::InvokeDynamic {
                    bootstrap: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                19 => Entry::Module(reader.read_u2()?),
                20 => Entry::Package(reader.read_u2()?),
                other => return Err(Error::InvalidConstantPoolTag(other)),
            };
            let wide = matches!(entry, Entry::Long(_) | Entry::Double(_));
            entries.push(entry);
            if wide {
                entries.push(Entry::Unusable);
            }
        }
        if entries.len() != count {
            return Err(Error::MalformedAttribute("constant pool"));
        }
        Ok(Self {
            entries,
            bootstrap_methods: Vec::new(),
        })
    }

    pub(crate) fn set_bootstrap_methods(&mut self, methods: Vec<BootstrapMethod>) {
        self.bootstrap_methods = methods;
    }

    fn get(&self, index: u16) -> Result<&Entry> {
        match self.entries.get(index as usize) {
            None | Some(Entry::Unusable) => Err(Error::InvalidConstantPoolIndex(index)),
            Some(entry) => Ok(entry),
        }
    }

    fn mismatch(&self, index: u16, expected: &'static str) -> Error {
        let found = self
            .entries
            .get(index as usize)
            .map(Entry::kind)
            .unwrap_or("missing");
        Error::ConstantPoolTypeMismatch {
            index,
            expected,
            found,
        }
    }

    pub(crate) fn get_utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Entry::Utf8(s) => Ok(s),
            _ => Err(self.mismatch(index, "Utf8")),
        }
    }

    pub(crate) fn get_class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Entry::Class(name) => Ok(self.get_utf8(*name)?.to_string()),
            _ => Err(self.mismatch(index, "Class")),
        }
    }

    pub(crate) fn get_name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.get(index)? {
            Entry::NameAndType { name, descriptor } => Ok((
                self.get_utf8(*name)?.to_string(),
                self.get_utf8(*descriptor)?.to_string(),
            )),
            _ => Err(self.mismatch(index, "NameAndType")),
        }
    }

    pub(crate) fn get_member_ref(&self, index: u16) -> Result<MemberRef> {
        let (class, nat, interface) = match self.get(index)? {
            Entry::FieldRef {
                class,
                name_and_type,
            }
            | Entry::MethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            Entry::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            _ => return Err(self.mismatch(index, "member reference")),
        };
        let owner = self.get_class_name(class)?;
        let (name, descriptor) = self.get_name_and_type(nat)?;
        Ok(MemberRef {
            owner,
            name,
            descriptor,
            interface,
        })
    }

    pub(crate) fn get_handle(&self, index: u16) -> Result<Handle> {
        match self.get(index)? {
            Entry::MethodHandle { kind, reference } => {
                let member = self.get_member_ref(*reference)?;
                Ok(Handle {
                    kind: *kind,
                    owner: member.owner,
                    name: member.name,
                    desc: member.descriptor,
                    interface: member.interface,
                })
            }
            _ => Err(self.mismatch(index, "MethodHandle")),
        }
    }

    /// Resolves an `invokedynamic` call site into `(name, desc, bootstrap, args)`.
    pub(crate) fn get_invoke_dynamic(
        &self,
        index: u16,
    ) -> Result<(String, String, Handle, Vec<Constant>)> {
        match self.get(index)? {
            Entry::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                let (name, desc) = self.get_name_and_type(*name_and_type)?;
                let (handle, args) = self.bootstrap(*bootstrap, 0)?;
                Ok((name, desc, handle, args))
            }
            _ => Err(self.mismatch(index, "InvokeDynamic")),
        }
    }

    /// Loadable constant for `ldc`/`ldc_w`/`ldc2_w` and bootstrap arguments.
    pub(crate) fn get_constant(&self, index: u16) -> Result<Constant> {
        self.constant(index, 0)
    }

    fn constant(&self, index: u16, depth: usize) -> Result<Constant> {
        Ok(match self.get(index)? {
            Entry::Integer(v) => Constant::Int(*v),
            Entry::Float(v) => Constant::Float(*v),
            Entry::Long(v) => Constant::Long(*v),
            Entry::Double(v) => Constant::Double(*v),
            Entry::String(utf8) => Constant::String(self.get_utf8(*utf8)?.to_string()),
            Entry::Class(name) => Constant::Class(self.get_utf8(*name)?.to_string()),
            Entry::MethodType(desc) => Constant::MethodType(self.get_utf8(*desc)?.to_string()),
            Entry::MethodHandle { .. } => Constant::MethodHandle(self.get_handle(index)?),
            Entry::Dynamic {
                bootstrap,
                name_and_type,
            } => {
                if depth >= MAX_DYNAMIC_DEPTH {
                    return Err(Error::MalformedAttribute("BootstrapMethods"));
                }
                let (name, desc) = self.get_name_and_type(*name_and_type)?;
                let (bootstrap, args) = self.bootstrap(*bootstrap, depth + 1)?;
                Constant::Dynamic {
                    name,
                    desc,
                    bootstrap,
                    args,
                }
            }
            _ => return Err(self.mismatch(index, "loadable constant")),
        })
    }

    fn bootstrap(&self, index: u16, depth: usize) -> Result<(Handle, Vec<Constant>)> {
        let method = self
            .bootstrap_methods
            .get(index as usize)
            .ok_or(Error::MalformedAttribute("BootstrapMethods"))?;
        let handle = self.get_handle(method.handle)?;
        let args = method
            .arguments
            .iter()
            .map(|&arg| self.constant(arg, depth))
            .collect::<Result<Vec<_>>>()?;
        Ok((handle, args))
    }
}

/// Decodes the JVM's modified UTF-8 (`\0` as two bytes, supplementary
/// characters as surrogate pairs).
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let a = bytes[i] as u16;
        if a == 0 {
            return Err(Error::InvalidModifiedUtf8);
        }
        if a & 0x80 == 0 {
            units.push(a);
            i += 1;
        } else if a & 0xE0 == 0xC0 {
            let b = *bytes.get(i + 1).ok_or(Error::InvalidModifiedUtf8)? as u16;
            if b & 0xC0 != 0x80 {
                return Err(Error::InvalidModifiedUtf8);
            }
            units.push(((a & 0x1F) << 6) | (b & 0x3F));
            i += 2;
        } else if a & 0xF0 == 0xE0 {
            let b = *bytes.get(i + 1).ok_or(Error::InvalidModifiedUtf8)? as u16;
            let c = *bytes.get(i + 2).ok_or(Error::InvalidModifiedUtf8)? as u16;
            if b & 0xC0 != 0x80 || c & 0xC0 != 0x80 {
                return Err(Error::InvalidModifiedUtf8);
            }
            units.push(((a & 0x0F) << 12) | ((b & 0x3F) << 6) | (c & 0x3F));
            i += 3;
        } else {
            return Err(Error::InvalidModifiedUtf8);
        }
    }
    String::from_utf16(&units).map_err(|_| Error::InvalidModifiedUtf8)
}
