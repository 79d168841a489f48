use pointcut_classfile::opcodes::{
    is_field, AALOAD, ARRAYLENGTH, BALOAD, CALOAD, DALOAD, FALOAD, GETFIELD, GETSTATIC, IALOAD,
    IASTORE, LALOAD, SALOAD,
};
use pointcut_classfile::{Insn, InsnId, InsnList};

use super::PointContext;
use crate::collect::{Collector, Decoration, Element};
use crate::error::ResolveError;

/// The `array=` argument of `FIELD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArrayAccess {
    Length,
    Get,
    Set,
}

impl ArrayAccess {
    pub(crate) fn parse(value: Option<&str>) -> Result<Option<ArrayAccess>, ResolveError> {
        match value {
            None => Ok(None),
            Some("length") => Ok(Some(ArrayAccess::Length)),
            Some("get") => Ok(Some(ArrayAccess::Get)),
            Some("set") => Ok(Some(ArrayAccess::Set)),
            Some(other) => Err(ResolveError::invalid_argument("array", other)),
        }
    }

    /// The array opcode that consumes a field of type `desc`, or `None` when
    /// `desc` is not an array.
    fn companion(self, desc: &str) -> Option<u8> {
        let element = desc.strip_prefix('[')?;
        let load = match element.chars().next()? {
            'I' => IALOAD,
            'J' => LALOAD,
            'F' => FALOAD,
            'D' => DALOAD,
            'L' | '[' => AALOAD,
            'Z' | 'B' => BALOAD,
            'C' => CALOAD,
            'S' => SALOAD,
            _ => return None,
        };
        Some(match self {
            ArrayAccess::Length => ARRAYLENGTH,
            ArrayAccess::Get => load,
            ArrayAccess::Set => load + (IASTORE - IALOAD),
        })
    }
}

pub(super) fn field(ctx: &PointContext<'_>, collector: &mut Collector<'_>) -> Result<(), ResolveError> {
    let wanted = ctx.at.opcode();
    if wanted.is_some_and(|opcode| !is_field(opcode)) {
        return Err(ResolveError::invalid_argument(
            "opcode",
            &ctx.at.opcode.to_string(),
        ));
    }
    let array = ArrayAccess::parse(ctx.at.arg("array"))?;
    let fuzz = fuzz(ctx)?;
    let insns = &ctx.method.instructions;

    for (id, insn) in insns.iter() {
        ctx.checkpoint(id)?;
        let Insn::Field {
            opcode,
            owner,
            name,
            desc,
        } = insn
        else {
            continue;
        };
        if !ctx.selects(owner, name, desc) || wanted.is_some_and(|wanted| wanted != *opcode) {
            continue;
        }

        let mut decorations = Vec::new();
        if let Some(access) = array {
            if !matches!(*opcode, GETFIELD | GETSTATIC) {
                continue;
            }
            let Some(array_opcode) = access.companion(desc) else {
                continue;
            };
            let Some(companion) = find_companion(insns, id, array_opcode, fuzz, owner, name) else {
                continue;
            };
            decorations.push(Decoration::ArrayInsn(companion));
        }

        let element = Element::Field {
            owner: owner.clone(),
            name: name.clone(),
            desc: desc.clone(),
        };
        if collector
            .add(id, element, Some(owner.clone()), decorations)
            .is_break()
        {
            break;
        }
    }
    Ok(())
}

/// The `fuzz` argument clamped to `1..=max_fuzz`.
fn fuzz(ctx: &PointContext<'_>) -> Result<usize, ResolveError> {
    let requested = ctx.at.arg_u32("fuzz")?.unwrap_or(ctx.options.default_fuzz);
    Ok(requested.clamp(1, ctx.options.max_fuzz.max(1)) as usize)
}

/// Searches up to `fuzz` real instructions after `from` for `wanted`.
/// A second read of the same field ends the search.
fn find_companion(
    insns: &InsnList,
    from: InsnId,
    wanted: u8,
    fuzz: usize,
    owner: &str,
    name: &str,
) -> Option<InsnId> {
    let mut at = from;
    for _ in 0..fuzz {
        at = insns.next_real(at)?;
        match &insns[at] {
            Insn::Field {
                opcode: GETFIELD | GETSTATIC,
                owner: other_owner,
                name: other_name,
                ..
            } if other_owner == owner && other_name == name => return None,
            insn if insn.opcode() == Some(wanted) => return Some(at),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointcut_classfile::opcodes::{AASTORE, BASTORE};

    #[test]
    fn companion_follows_the_element_type() {
        assert_eq!(ArrayAccess::Get.companion("[I"), Some(IALOAD));
        assert_eq!(ArrayAccess::Get.companion("[Ljava/lang/String;"), Some(AALOAD));
        assert_eq!(ArrayAccess::Get.companion("[[I"), Some(AALOAD));
        assert_eq!(ArrayAccess::Set.companion("[Z"), Some(BASTORE));
        assert_eq!(ArrayAccess::Set.companion("[Ljava/lang/Object;"), Some(AASTORE));
        assert_eq!(ArrayAccess::Length.companion("[J"), Some(ARRAYLENGTH));
        assert_eq!(ArrayAccess::Get.companion("I"), None);
    }
}
