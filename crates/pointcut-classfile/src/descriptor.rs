use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    pub fn descriptor_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    /// Java keyword for the type, as used in source text.
    pub fn java_name(self) -> &'static str {
        match self {
            BaseType::Byte => "byte",
            BaseType::Char => "char",
            BaseType::Double => "double",
            BaseType::Float => "float",
            BaseType::Int => "int",
            BaseType::Long => "long",
            BaseType::Short => "short",
            BaseType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Base(BaseType),
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Number of local-variable / operand-stack slots a value of this type occupies.
    pub fn slot_size(&self) -> usize {
        match self {
            FieldType::Base(BaseType::Long | BaseType::Double) => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self, FieldType::Base(_))
    }

    pub fn descriptor(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base) => write!(f, "{}", base.descriptor_char()),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    Void,
    Type(FieldType),
}

impl ReturnType {
    pub fn slot_size(&self) -> usize {
        match self {
            ReturnType::Void => 0,
            ReturnType::Type(ty) => ty.slot_size(),
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Void => f.write_str("V"),
            ReturnType::Type(ty) => write!(f, "{ty}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub return_type: ReturnType,
}

impl MethodDescriptor {
    /// Total slots taken by the parameters, excluding `this`.
    pub fn argument_slots(&self) -> usize {
        self.params.iter().map(FieldType::slot_size).sum()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        write!(f, "){}", self.return_type)
    }
}

pub fn parse_field_descriptor(desc: &str) -> Result<FieldType> {
    let (ty, rest) = parse_field_type(desc)?;
    if !rest.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }
    Ok(ty)
}

pub fn parse_method_descriptor(desc: &str) -> Result<MethodDescriptor> {
    let Some(mut rest) = desc.strip_prefix('(') else {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    };

    let mut params = Vec::new();
    loop {
        if let Some(after) = rest.strip_prefix(')') {
            rest = after;
            break;
        }
        if rest.is_empty() {
            return Err(Error::InvalidDescriptor(desc.to_string()));
        }
        let (param, after) = parse_field_type(rest)
            .map_err(|_| Error::InvalidDescriptor(desc.to_string()))?;
        params.push(param);
        rest = after;
    }

    let (return_type, rest) = if let Some(rest) = rest.strip_prefix('V') {
        (ReturnType::Void, rest)
    } else {
        let (ty, rest) =
            parse_field_type(rest).map_err(|_| Error::InvalidDescriptor(desc.to_string()))?;
        (ReturnType::Type(ty), rest)
    };

    if !rest.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }

    Ok(MethodDescriptor {
        params,
        return_type,
    })
}

fn parse_field_type(input: &str) -> Result<(FieldType, &str)> {
    let Some(first) = input.chars().next() else {
        return Err(Error::InvalidDescriptor(input.to_string()));
    };
    let base = |b| Ok((FieldType::Base(b), &input[1..]));
    match first {
        'B' => base(BaseType::Byte),
        'C' => base(BaseType::Char),
        'D' => base(BaseType::Double),
        'F' => base(BaseType::Float),
        'I' => base(BaseType::Int),
        'J' => base(BaseType::Long),
        'S' => base(BaseType::Short),
        'Z' => base(BaseType::Boolean),
        'L' => match input.find(';') {
            Some(end) if end > 1 => Ok((
                FieldType::Object(input[1..end].to_string()),
                &input[end + 1..],
            )),
            _ => Err(Error::InvalidDescriptor(input.to_string())),
        },
        '[' => {
            let (component, rest) = parse_field_type(&input[1..])?;
            Ok((FieldType::Array(Box::new(component)), rest))
        }
        _ => Err(Error::InvalidDescriptor(input.to_string())),
    }
}

/// Descriptor for a `CONSTANT_Class` operand: array classes are already
/// descriptors, everything else is an internal name.
pub fn class_operand_descriptor(name: &str) -> String {
    if name.starts_with('[') {
        name.to_string()
    } else {
        format!("L{name};")
    }
}
