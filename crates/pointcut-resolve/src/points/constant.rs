use pointcut_classfile::opcodes::*;
use pointcut_classfile::{Constant, Insn};
use pointcut_core::dotted_to_internal;
use pointcut_hir::Literal;

use super::PointContext;
use crate::at::AtSpec;
use crate::collect::{Collector, ConstantValue, Element};
use crate::error::ResolveError;

const VALUE_KEYS: [&str; 7] = [
    "nullValue",
    "intValue",
    "floatValue",
    "longValue",
    "doubleValue",
    "stringValue",
    "classValue",
];

/// A comparison against zero that javac folds into a single-operand jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ZeroCondition {
    LessThanZero,
    LessThanOrEqualToZero,
    GreaterThanOrEqualToZero,
    GreaterThanZero,
}

impl ZeroCondition {
    fn parse(name: &str) -> Option<ZeroCondition> {
        Some(match name {
            "LESS_THAN_ZERO" => ZeroCondition::LessThanZero,
            "LESS_THAN_OR_EQUAL_TO_ZERO" => ZeroCondition::LessThanOrEqualToZero,
            "GREATER_THAN_OR_EQUAL_TO_ZERO" => ZeroCondition::GreaterThanOrEqualToZero,
            "GREATER_THAN_ZERO" => ZeroCondition::GreaterThanZero,
            _ => return None,
        })
    }

    /// Jumps a comparison may compile to. The compiler may emit the
    /// inverted jump, so each condition covers its complement as well.
    pub(crate) fn opcodes(self) -> [u8; 2] {
        match self {
            ZeroCondition::LessThanZero | ZeroCondition::GreaterThanOrEqualToZero => [IFLT, IFGE],
            ZeroCondition::LessThanOrEqualToZero | ZeroCondition::GreaterThanZero => [IFLE, IFGT],
        }
    }
}

/// The constant a `CONSTANT` injection point looks for.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ConstantQuery {
    /// `None` matches every constant.
    pub value: Option<ConstantValue>,
    pub expand: Vec<ZeroCondition>,
}

impl ConstantQuery {
    pub(crate) fn parse(at: &AtSpec) -> Result<ConstantQuery, ResolveError> {
        let mut given = VALUE_KEYS
            .iter()
            .filter_map(|key| at.arg(key).map(|value| (*key, value)));
        let first = given.next();
        if let Some((key, value)) = given.next() {
            return Err(ResolveError::invalid_argument(key, value));
        }

        let value = first
            .map(|(key, raw)| parse_value(key, raw).ok_or_else(|| ResolveError::invalid_argument(key, raw)))
            .transpose()?;

        let mut expand = Vec::new();
        if let Some(raw) = at.arg("expandZeroConditions") {
            if value != Some(ConstantValue::Int(0)) {
                return Err(ResolveError::invalid_argument("expandZeroConditions", raw));
            }
            for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
                let condition = ZeroCondition::parse(name)
                    .ok_or_else(|| ResolveError::invalid_argument("expandZeroConditions", name))?;
                expand.push(condition);
            }
        }
        Ok(ConstantQuery { value, expand })
    }

    pub(crate) fn accepts(&self, value: &ConstantValue) -> bool {
        self.value
            .as_ref()
            .map_or(true, |wanted| same_constant(wanted, value))
    }

    pub(crate) fn expands(&self, opcode: u8) -> bool {
        self.expand
            .iter()
            .any(|condition| condition.opcodes().contains(&opcode))
    }
}

fn parse_value(key: &str, raw: &str) -> Option<ConstantValue> {
    Some(match key {
        "nullValue" => match raw {
            "true" => ConstantValue::Null,
            _ => return None,
        },
        "intValue" => ConstantValue::Int(raw.parse().ok()?),
        "floatValue" => ConstantValue::Float(raw.trim_end_matches(['f', 'F']).parse().ok()?),
        "longValue" => ConstantValue::Long(raw.trim_end_matches(['l', 'L']).parse().ok()?),
        "doubleValue" => ConstantValue::Double(raw.trim_end_matches(['d', 'D']).parse().ok()?),
        "stringValue" => ConstantValue::String(raw.to_string()),
        "classValue" if !raw.is_empty() => ConstantValue::Class(dotted_to_internal(raw)),
        _ => return None,
    })
}

/// Floating point constants compare by bit pattern so that `NaN` and `-0.0`
/// select exactly what was written.
fn same_constant(a: &ConstantValue, b: &ConstantValue) -> bool {
    match (a, b) {
        (ConstantValue::Float(x), ConstantValue::Float(y)) => x.to_bits() == y.to_bits(),
        (ConstantValue::Double(x), ConstantValue::Double(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

/// The constant pushed by `insn`, if it is a constant instruction.
pub(crate) fn insn_constant(insn: &Insn) -> Option<ConstantValue> {
    Some(match insn {
        Insn::Plain { opcode } => match *opcode {
            ACONST_NULL => ConstantValue::Null,
            ICONST_M1..=ICONST_5 => ConstantValue::Int(i32::from(*opcode) - i32::from(ICONST_0)),
            LCONST_0 | LCONST_1 => ConstantValue::Long(i64::from(*opcode - LCONST_0)),
            FCONST_0..=FCONST_2 => ConstantValue::Float(f32::from(*opcode - FCONST_0)),
            DCONST_0 | DCONST_1 => ConstantValue::Double(f64::from(*opcode - DCONST_0)),
            _ => return None,
        },
        Insn::Int {
            opcode: BIPUSH | SIPUSH,
            operand,
        } => ConstantValue::Int(*operand),
        Insn::Ldc(constant) => match constant {
            Constant::Int(v) => ConstantValue::Int(*v),
            Constant::Float(v) => ConstantValue::Float(*v),
            Constant::Long(v) => ConstantValue::Long(*v),
            Constant::Double(v) => ConstantValue::Double(*v),
            Constant::String(v) => ConstantValue::String(v.clone()),
            Constant::Class(v) => ConstantValue::Class(v.clone()),
            _ => return None,
        },
        _ => return None,
    })
}

/// The constant a source literal compiles to.
///
/// Primitive class literals compile to a `TYPE` field read and have no
/// constant form.
pub(crate) fn literal_constant(literal: &Literal) -> Option<ConstantValue> {
    Some(match literal {
        Literal::Null => ConstantValue::Null,
        Literal::Bool(v) => ConstantValue::Int(i32::from(*v)),
        Literal::Char(v) => ConstantValue::Int(i32::from(*v)),
        Literal::Int(v) => ConstantValue::Int(*v),
        Literal::Long(v) => ConstantValue::Long(*v),
        Literal::Float(v) => ConstantValue::Float(*v),
        Literal::Double(v) => ConstantValue::Double(*v),
        Literal::String(v) => ConstantValue::String(v.clone()),
        Literal::Class(desc) => {
            if let Some(class) = desc.strip_prefix('L').and_then(|d| d.strip_suffix(';')) {
                ConstantValue::Class(class.to_string())
            } else if desc.starts_with('[') {
                ConstantValue::Class(desc.clone())
            } else {
                return None;
            }
        }
    })
}

pub(super) fn constant(ctx: &PointContext<'_>, collector: &mut Collector<'_>) -> Result<(), ResolveError> {
    let query = ConstantQuery::parse(ctx.at)?;
    for (id, insn) in ctx.method.instructions.iter() {
        ctx.checkpoint(id)?;
        let value = match insn_constant(insn) {
            Some(value) if query.accepts(&value) => value,
            Some(_) => continue,
            None if insn.opcode().is_some_and(|opcode| query.expands(opcode)) => ConstantValue::Int(0),
            None => continue,
        };
        if collector
            .add(id, Element::Constant(value), None, Vec::new())
            .is_break()
        {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn one_value_key_at_most() {
        let at = AtSpec::new("CONSTANT")
            .with_arg("intValue", "1")
            .with_arg("stringValue", "x");
        assert!(matches!(
            ConstantQuery::parse(&at),
            Err(ResolveError::InvalidArgument { .. })
        ));

        let any = ConstantQuery::parse(&AtSpec::new("CONSTANT")).unwrap();
        assert!(any.accepts(&ConstantValue::Null));
        assert!(any.accepts(&ConstantValue::String("s".into())));
    }

    #[test]
    fn values_parse_with_java_suffixes() {
        let at = AtSpec::new("CONSTANT").with_arg("floatValue", "1.5F");
        let query = ConstantQuery::parse(&at).unwrap();
        assert_eq!(query.value, Some(ConstantValue::Float(1.5)));

        let at = AtSpec::new("CONSTANT").with_arg("classValue", "java.lang.String");
        let query = ConstantQuery::parse(&at).unwrap();
        assert_eq!(query.value, Some(ConstantValue::Class("java/lang/String".into())));

        let at = AtSpec::new("CONSTANT").with_arg("intValue", "one");
        assert!(ConstantQuery::parse(&at).is_err());
    }

    #[test]
    fn zero_conditions_need_int_zero() {
        let at = AtSpec::new("CONSTANT")
            .with_arg("intValue", "0")
            .with_arg("expandZeroConditions", "LESS_THAN_ZERO, GREATER_THAN_ZERO");
        let query = ConstantQuery::parse(&at).unwrap();
        for opcode in [IFLT, IFGE, IFLE, IFGT] {
            assert!(query.expands(opcode));
        }
        assert!(!query.expands(IFEQ));

        let at = AtSpec::new("CONSTANT")
            .with_arg("intValue", "1")
            .with_arg("expandZeroConditions", "LESS_THAN_ZERO");
        assert!(ConstantQuery::parse(&at).is_err());
    }

    #[test]
    fn constant_instructions() {
        assert_eq!(
            insn_constant(&Insn::Plain { opcode: ICONST_M1 }),
            Some(ConstantValue::Int(-1))
        );
        assert_eq!(
            insn_constant(&Insn::Plain { opcode: FCONST_2 }),
            Some(ConstantValue::Float(2.0))
        );
        assert_eq!(
            insn_constant(&Insn::Int { opcode: SIPUSH, operand: 300 }),
            Some(ConstantValue::Int(300))
        );
        assert_eq!(
            insn_constant(&Insn::Int { opcode: NEWARRAY, operand: 10 }),
            None
        );
    }

    #[test]
    fn literals_map_to_their_compiled_constant() {
        assert_eq!(literal_constant(&Literal::Bool(true)), Some(ConstantValue::Int(1)));
        assert_eq!(
            literal_constant(&Literal::Class("Ljava/lang/String;".into())),
            Some(ConstantValue::Class("java/lang/String".into()))
        );
        assert_eq!(literal_constant(&Literal::Class("I".into())), None);
    }

    #[test]
    fn nan_matches_by_bits() {
        assert!(same_constant(&ConstantValue::Float(f32::NAN), &ConstantValue::Float(f32::NAN)));
        assert!(!same_constant(&ConstantValue::Double(0.0), &ConstantValue::Double(-0.0)));
    }
}
