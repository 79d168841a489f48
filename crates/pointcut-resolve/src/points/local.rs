use pointcut_classfile::opcodes::{is_local_load, is_local_store, IINC};
use pointcut_classfile::{Insn, InsnId};
use pointcut_flow::{locals_at, LocalTable, LocalsError};

use super::PointContext;
use crate::collect::{Collector, Element};
use crate::error::ResolveError;
use crate::locals::Visible;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Load,
    Store,
}

impl Access {
    /// `IINC` both reads and writes its slot.
    fn accepts(self, opcode: u8) -> bool {
        opcode == IINC
            || match self {
                Access::Load => is_local_load(opcode),
                Access::Store => is_local_store(opcode),
            }
    }
}

pub(super) fn load(ctx: &PointContext<'_>, collector: &mut Collector<'_>) -> Result<(), ResolveError> {
    find_locals(ctx, collector, Access::Load)
}

pub(super) fn store(ctx: &PointContext<'_>, collector: &mut Collector<'_>) -> Result<(), ResolveError> {
    find_locals(ctx, collector, Access::Store)
}

fn find_locals(
    ctx: &PointContext<'_>,
    collector: &mut Collector<'_>,
    access: Access,
) -> Result<(), ResolveError> {
    let wanted = ctx.at.opcode();
    if wanted.is_some_and(|opcode| !access.accepts(opcode)) {
        return Err(ResolveError::invalid_argument(
            "opcode",
            &ctx.at.opcode.to_string(),
        ));
    }
    let discriminator = ctx.at.local.clone().unwrap_or_default();
    let args = ctx.argument_slots();
    let insns = &ctx.method.instructions;

    for (id, insn) in insns.iter() {
        ctx.checkpoint(id)?;
        let (opcode, slot) = match insn {
            Insn::Var { opcode, var } if access.accepts(*opcode) => (*opcode, *var),
            Insn::Iinc { var, .. } => (IINC, *var),
            _ => continue,
        };
        if wanted.is_some_and(|wanted| wanted != opcode) {
            continue;
        }

        // A stored variable only comes into scope after the store.
        let probe = match access {
            Access::Load => id,
            Access::Store => insns.next(id).unwrap_or(id),
        };
        let table = table_at(ctx, probe)?;
        let accepted = match &table {
            Some(table) => discriminator.matches(table, slot, args.clone()),
            None => {
                let subject = Visible {
                    name: "",
                    desc: "",
                    slot: Some(slot),
                    is_arg: args.contains(&slot),
                };
                discriminator.accepts(&subject, &[])
            }
        };
        if !accepted {
            continue;
        }

        let var = table
            .as_ref()
            .and_then(|table| table.get(usize::from(slot)))
            .cloned();
        if collector
            .add(id, Element::Local { slot, var }, None, Vec::new())
            .is_break()
        {
            break;
        }
    }
    Ok(())
}

/// Locals live at `at`, or `None` when the method's locals cannot be
/// reconstructed. Only the slot index is usable in that case.
fn table_at(ctx: &PointContext<'_>, at: InsnId) -> Result<Option<LocalTable>, ResolveError> {
    let Some(locals) = ctx.locals else {
        return Ok(None);
    };
    match locals_at(locals, at, ctx.cancel) {
        Ok(table) => Ok(Some(table)),
        Err(LocalsError::Unavailable(reason)) => {
            tracing::trace!(target: "pointcut.resolve", %at, %reason, "locals unavailable");
            Ok(None)
        }
        Err(LocalsError::Cancelled(cancelled)) => Err(cancelled.into()),
    }
}
