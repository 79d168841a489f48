use pointcut_classfile::opcodes::is_local_store;
use pointcut_classfile::{Constant, Insn, InsnId, MethodNode};

use super::PointContext;
use crate::collect::{Collector, Decoration, Element};
use crate::error::ResolveError;
use crate::selector::MemberSelector;

const STRING_CONSUMER: &str = "(Ljava/lang/String;)V";

/// Method invocations the selector accepts. Constructor calls are left to
/// `NEW` and `CTOR_HEAD`.
fn invocations<'m>(
    method: &'m MethodNode,
    selector: Option<&'m MemberSelector>,
) -> impl Iterator<Item = (InsnId, &'m str, &'m str, &'m str)> + 'm {
    method
        .instructions
        .iter()
        .filter_map(move |(id, insn)| match insn {
            Insn::Method {
                owner, name, desc, ..
            } if name != "<init>"
                && selector.map_or(true, |selector| selector.matches(owner, name, desc)) =>
            {
                Some((id, owner.as_str(), name.as_str(), desc.as_str()))
            }
            _ => None,
        })
}

fn method_element(owner: &str, name: &str, desc: &str) -> Element {
    Element::Method {
        owner: owner.to_string(),
        name: name.to_string(),
        desc: desc.to_string(),
    }
}

pub(super) fn invoke(ctx: &PointContext<'_>, collector: &mut Collector<'_>) -> Result<(), ResolveError> {
    for (id, owner, name, desc) in invocations(ctx.method, ctx.selector) {
        ctx.check_cancelled()?;
        let element = method_element(owner, name, desc);
        if collector
            .add(id, element, Some(owner.to_string()), Vec::new())
            .is_break()
        {
            break;
        }
    }
    Ok(())
}

/// Positions just after a non-void invocation, or after the store that
/// immediately consumes its result.
pub(super) fn invoke_assign(
    ctx: &PointContext<'_>,
    collector: &mut Collector<'_>,
) -> Result<(), ResolveError> {
    let insns = &ctx.method.instructions;
    for (id, owner, name, desc) in invocations(ctx.method, ctx.selector) {
        ctx.check_cancelled()?;
        if desc.ends_with(")V") {
            continue;
        }
        let Some(mut after) = insns.next_real(id) else { continue };
        if insns[after].opcode().is_some_and(is_local_store) {
            match insns.next_real(after) {
                Some(next) => after = next,
                None => continue,
            }
        }
        let element = method_element(owner, name, desc);
        if collector
            .add(
                after,
                element,
                Some(owner.to_string()),
                vec![Decoration::Invoke(id)],
            )
            .is_break()
        {
            break;
        }
    }
    Ok(())
}

/// `(String)V` invocations whose argument is the `ldc` string, pushed by the
/// instruction right before the call.
pub(super) fn invoke_string(
    ctx: &PointContext<'_>,
    collector: &mut Collector<'_>,
) -> Result<(), ResolveError> {
    let insns = &ctx.method.instructions;
    let ldc = ctx.at.arg("ldc");
    for (id, owner, name, desc) in invocations(ctx.method, ctx.selector) {
        ctx.check_cancelled()?;
        if desc != STRING_CONSUMER {
            continue;
        }
        let pushed = insns.prev_real(id).map(|prev| &insns[prev]);
        let Some(Insn::Ldc(Constant::String(value))) = pushed else {
            continue;
        };
        if ldc.is_some_and(|ldc| ldc != value) {
            continue;
        }
        let element = method_element(owner, name, desc);
        if collector
            .add(id, element, Some(owner.to_string()), Vec::new())
            .is_break()
        {
            break;
        }
    }
    Ok(())
}
