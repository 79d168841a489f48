use std::sync::Arc;

use pointcut_classfile::opcodes::IRETURN;
use pointcut_classfile::Insn;
use pointcut_core::CancellationToken;
use pointcut_resolve::{
    AtSpec, Collector, CustomInjectionPoint, Element, InjectionPoint, Mode, PointContext,
    ResolveError,
};
use pretty_assertions::assert_eq;

use super::Env;

/// Every `IRETURN`, the way a host extension might add a code of its own.
struct IntReturns;

impl CustomInjectionPoint for IntReturns {
    fn find(
        &self,
        ctx: &PointContext<'_>,
        collector: &mut Collector<'_>,
    ) -> Result<(), ResolveError> {
        for (id, insn) in ctx.method.instructions.iter() {
            ctx.check_cancelled()?;
            if matches!(insn, Insn::Plain { opcode: IRETURN })
                && collector.add(id, Element::Insn, None, Vec::new()).is_break()
            {
                break;
            }
        }
        Ok(())
    }
}

fn with_custom() -> Env {
    let mut env = Env::new();
    let replaced = env
        .resolver
        .registry_mut()
        .register_custom("INT_RETURN", Arc::new(IntReturns));
    assert!(replaced.is_none());
    env
}

#[test]
fn custom_points_resolve_through_the_filters() {
    let env = with_custom();
    let at = AtSpec::new("INT_RETURN");
    assert_eq!(env.all(&at, "mixed").len(), 2);

    let last = env.all(&at.clone().with_ordinal(1), "mixed");
    let returns = env.all(&AtSpec::new("RETURN"), "mixed");
    assert_eq!(last[0].insn, returns[1].insn);

    assert_eq!(
        env.resolve_in(&at, "tail", Mode::All),
        Err(ResolveError::NoMatch {
            blamed_filter: None
        })
    );
}

#[test]
fn custom_points_have_no_navigation_targets() {
    let env = with_custom();
    let found = env
        .resolver
        .navigate(&AtSpec::new("INT_RETURN"), env.target("mixed"), &CancellationToken::new())
        .expect("resolves");
    assert!(found.is_empty());
}

#[test]
fn registering_over_a_builtin_replaces_it() {
    let mut env = Env::new();
    let replaced = env
        .resolver
        .registry_mut()
        .register_custom("RETURN", Arc::new(IntReturns));
    assert!(matches!(replaced, Some(InjectionPoint::Return)));
    assert!(env
        .resolve_in(&AtSpec::new("RETURN"), "tail", Mode::All)
        .is_err());
}

#[test]
fn unknown_codes_are_reported() {
    let env = Env::new();
    assert_eq!(
        env.resolve_in(&AtSpec::new("NOWHERE"), "mixed", Mode::All),
        Err(ResolveError::UnknownInjectionPoint("NOWHERE".into()))
    );
    let check = env
        .resolver
        .check(&AtSpec::new("NOWHERE"), env.target("mixed"), &CancellationToken::new())
        .expect("not cancelled");
    assert_eq!(check, None);
}
