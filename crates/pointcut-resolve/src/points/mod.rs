//! Bytecode visitors, one per injection point kind.
//!
//! Each visitor walks the target method once and offers its candidates to a
//! [`Collector`] in instruction order (or reverse order for the kinds that
//! want the last match). A `Break` from the collector ends the walk.

mod constant;
mod field;
mod invoke;
mod local;
mod new;
mod simple;

use std::ops::Range;

use pointcut_classfile::{parse_method_descriptor, InsnId, MethodNode};
use pointcut_core::{CancellationToken, Cancelled};
use pointcut_flow::LocalsContext;

use crate::at::AtSpec;
use crate::collect::Collector;
use crate::error::ResolveError;
use crate::registry::InjectionPoint;
use crate::resolver::ResolverOptions;
use crate::selector::MemberSelector;

pub(crate) use constant::{literal_constant, ConstantQuery};
pub(crate) use field::ArrayAccess;
pub(crate) use new::NewTarget;
pub(crate) use simple::Enforce;

const CANCEL_CHECK_INTERVAL: usize = 64;

/// Everything a visitor may consult about the method it walks.
#[derive(Debug, Clone, Copy)]
pub struct PointContext<'a> {
    /// Internal name of the class declaring `method`.
    pub owner: &'a str,
    pub method: &'a MethodNode,
    pub at: &'a AtSpec,
    /// The parsed `target`, for kinds that take a member selector.
    pub selector: Option<&'a MemberSelector>,
    /// Local variable information; present for `LOAD` and `STORE`.
    pub locals: Option<&'a LocalsContext<'a>>,
    pub options: &'a ResolverOptions,
    pub cancel: &'a CancellationToken,
}

impl PointContext<'_> {
    /// Checks the cancellation token every few instructions.
    pub fn checkpoint(&self, at: InsnId) -> Result<(), Cancelled> {
        if at.index() % CANCEL_CHECK_INTERVAL == 0 {
            Cancelled::check(self.cancel)
        } else {
            Ok(())
        }
    }

    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        Cancelled::check(self.cancel)
    }

    pub(crate) fn selects(&self, owner: &str, name: &str, desc: &str) -> bool {
        self.selector
            .map_or(true, |selector| selector.matches(owner, name, desc))
    }

    /// Slots of the declared parameters, `this` excluded.
    pub(crate) fn argument_slots(&self) -> Range<u16> {
        let first = u16::from(!self.method.is_static());
        let size = parse_method_descriptor(&self.method.desc)
            .map(|desc| desc.argument_slots())
            .unwrap_or(0);
        first..first + size as u16
    }
}

pub(crate) fn find(
    point: &InjectionPoint,
    ctx: &PointContext<'_>,
    collector: &mut Collector<'_>,
) -> Result<(), ResolveError> {
    match point {
        InjectionPoint::Head => simple::head(ctx, collector),
        InjectionPoint::Return => simple::returns(ctx, collector),
        InjectionPoint::Tail => simple::tail(ctx, collector),
        InjectionPoint::Jump => simple::jumps(ctx, collector),
        InjectionPoint::CtorHead => simple::ctor_head(ctx, collector),
        InjectionPoint::Invoke => invoke::invoke(ctx, collector),
        InjectionPoint::InvokeAssign => invoke::invoke_assign(ctx, collector),
        InjectionPoint::InvokeString => invoke::invoke_string(ctx, collector),
        InjectionPoint::Field => field::field(ctx, collector),
        InjectionPoint::New => new::new(ctx, collector),
        InjectionPoint::Constant => constant::constant(ctx, collector),
        InjectionPoint::Load => local::load(ctx, collector),
        InjectionPoint::Store => local::store(ctx, collector),
        InjectionPoint::Custom(custom) => custom.find(ctx, collector),
    }
}
