use pointcut_classfile::opcodes::{is_jump, INVOKESPECIAL, NEW, PUTFIELD};
use pointcut_classfile::{Insn, InsnId, InsnList};

use super::PointContext;
use crate::collect::{Collector, Element};
use crate::error::ResolveError;

pub(super) fn head(ctx: &PointContext<'_>, collector: &mut Collector<'_>) -> Result<(), ResolveError> {
    if let Some(first) = ctx.method.instructions.first_real() {
        let _ = collector.add(first, Element::Insn, None, Vec::new());
    }
    Ok(())
}

pub(super) fn returns(
    ctx: &PointContext<'_>,
    collector: &mut Collector<'_>,
) -> Result<(), ResolveError> {
    for (id, insn) in ctx.method.instructions.iter() {
        ctx.checkpoint(id)?;
        if insn.is_return() && collector.add(id, Element::Insn, None, Vec::new()).is_break() {
            break;
        }
    }
    Ok(())
}

/// The last return, found walking backwards.
pub(super) fn tail(ctx: &PointContext<'_>, collector: &mut Collector<'_>) -> Result<(), ResolveError> {
    for (id, insn) in ctx.method.instructions.iter().rev() {
        ctx.checkpoint(id)?;
        if insn.is_return() {
            let _ = collector.add(id, Element::Insn, None, Vec::new());
            break;
        }
    }
    Ok(())
}

pub(super) fn jumps(ctx: &PointContext<'_>, collector: &mut Collector<'_>) -> Result<(), ResolveError> {
    let wanted = ctx.at.opcode();
    if let Some(opcode) = wanted {
        if !is_jump(opcode) {
            return Err(ResolveError::invalid_argument(
                "opcode",
                &ctx.at.opcode.to_string(),
            ));
        }
    }
    for (id, insn) in ctx.method.instructions.iter() {
        ctx.checkpoint(id)?;
        let Insn::Jump { opcode, .. } = insn else { continue };
        if wanted.map_or(true, |wanted| wanted == *opcode)
            && collector.add(id, Element::Insn, None, Vec::new()).is_break()
        {
            break;
        }
    }
    Ok(())
}

/// Where `CTOR_HEAD` lands inside a constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Enforce {
    /// After the field initializers when the constructor delegates to
    /// `super`, otherwise after the delegate call.
    #[default]
    Default,
    /// Immediately after the `super(...)` or `this(...)` call.
    PostDelegate,
    /// After the last store to a field of the constructed class.
    PostInit,
}

impl Enforce {
    pub(crate) fn parse(value: Option<&str>) -> Result<Enforce, ResolveError> {
        match value {
            None | Some("DEFAULT") => Ok(Enforce::Default),
            Some("POST_DELEGATE") => Ok(Enforce::PostDelegate),
            Some("POST_INIT") => Ok(Enforce::PostInit),
            Some(other) => Err(ResolveError::invalid_argument("enforce", other)),
        }
    }
}

pub(super) fn ctor_head(
    ctx: &PointContext<'_>,
    collector: &mut Collector<'_>,
) -> Result<(), ResolveError> {
    let enforce = Enforce::parse(ctx.at.arg("enforce"))?;
    if !ctx.method.is_constructor() {
        return head(ctx, collector);
    }
    let insns = &ctx.method.instructions;
    let Some((delegate, delegate_owner)) = delegate_call(insns) else {
        return head(ctx, collector);
    };

    let after_delegate = insns.next_real(delegate);
    let position = match enforce {
        Enforce::PostDelegate => after_delegate,
        Enforce::Default | Enforce::PostInit if delegate_owner == ctx.owner => after_delegate,
        Enforce::Default | Enforce::PostInit => last_field_store(insns, delegate, ctx.owner)
            .and_then(|store| insns.next_real(store))
            .or(after_delegate),
    };
    if let Some(position) = position {
        let _ = collector.add(position, Element::Insn, None, Vec::new());
    }
    Ok(())
}

/// The `super(...)`/`this(...)` call: the first `<init>` invocation not
/// paired with a `NEW`.
pub(crate) fn delegate_call(insns: &InsnList) -> Option<(InsnId, &str)> {
    let mut pending_news = 0usize;
    for (id, insn) in insns.iter() {
        match insn {
            Insn::Type { opcode: NEW, .. } => pending_news += 1,
            Insn::Method {
                opcode: INVOKESPECIAL,
                owner,
                name,
                ..
            } if name == "<init>" => {
                if pending_news == 0 {
                    return Some((id, owner.as_str()));
                }
                pending_news -= 1;
            }
            _ => {}
        }
    }
    None
}

/// The last `PUTFIELD` to `owner`, scanning backwards from the end down to
/// `delegate`. Repeated stores to the same field do not matter; the last one
/// wins.
fn last_field_store(insns: &InsnList, delegate: InsnId, owner: &str) -> Option<InsnId> {
    insns
        .iter()
        .rev()
        .take_while(|(id, _)| *id > delegate)
        .find(|(_, insn)| {
            matches!(insn, Insn::Field { opcode: PUTFIELD, owner: field_owner, .. } if field_owner == owner)
        })
        .map(|(id, _)| id)
}
