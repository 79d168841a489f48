//! Injection point codes and the handlers behind them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::collect::Collector;
use crate::error::ResolveError;
use crate::points::PointContext;

/// A host-provided injection point.
pub trait CustomInjectionPoint: Send + Sync {
    /// Offers every candidate of the target method to `collector`, stopping
    /// when `add` returns `Break`.
    fn find(&self, ctx: &PointContext<'_>, collector: &mut Collector<'_>)
        -> Result<(), ResolveError>;

    /// Whether `target` is a member selector the resolver should parse.
    fn uses_selector(&self) -> bool {
        false
    }
}

/// The kinds of injection point the resolver understands.
#[derive(Clone)]
pub enum InjectionPoint {
    Head,
    Return,
    Tail,
    Invoke,
    InvokeAssign,
    InvokeString,
    Field,
    New,
    Constant,
    Load,
    Store,
    CtorHead,
    Jump,
    Custom(Arc<dyn CustomInjectionPoint>),
}

impl fmt::Debug for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionPoint::Custom(_) => f.write_str("Custom(..)"),
            builtin => f.write_str(builtin.builtin_code().unwrap_or("?")),
        }
    }
}

impl InjectionPoint {
    const BUILTIN: [InjectionPoint; 13] = [
        InjectionPoint::Head,
        InjectionPoint::Return,
        InjectionPoint::Tail,
        InjectionPoint::Invoke,
        InjectionPoint::InvokeAssign,
        InjectionPoint::InvokeString,
        InjectionPoint::Field,
        InjectionPoint::New,
        InjectionPoint::Constant,
        InjectionPoint::Load,
        InjectionPoint::Store,
        InjectionPoint::CtorHead,
        InjectionPoint::Jump,
    ];

    fn builtin_code(&self) -> Option<&'static str> {
        Some(match self {
            InjectionPoint::Head => "HEAD",
            InjectionPoint::Return => "RETURN",
            InjectionPoint::Tail => "TAIL",
            InjectionPoint::Invoke => "INVOKE",
            InjectionPoint::InvokeAssign => "INVOKE_ASSIGN",
            InjectionPoint::InvokeString => "INVOKE_STRING",
            InjectionPoint::Field => "FIELD",
            InjectionPoint::New => "NEW",
            InjectionPoint::Constant => "CONSTANT",
            InjectionPoint::Load => "LOAD",
            InjectionPoint::Store => "STORE",
            InjectionPoint::CtorHead => "CTOR_HEAD",
            InjectionPoint::Jump => "JUMP",
            InjectionPoint::Custom(_) => return None,
        })
    }

    /// Whether `target` holds a [`MemberSelector`](crate::MemberSelector).
    pub fn uses_selector(&self) -> bool {
        match self {
            InjectionPoint::Invoke
            | InjectionPoint::InvokeAssign
            | InjectionPoint::InvokeString
            | InjectionPoint::Field => true,
            InjectionPoint::Custom(custom) => custom.uses_selector(),
            _ => false,
        }
    }

    /// Whether resolution fails without a `target`.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            InjectionPoint::Invoke
                | InjectionPoint::InvokeAssign
                | InjectionPoint::InvokeString
                | InjectionPoint::Field
        )
    }

    /// Whether candidates are judged against the local variable table.
    pub fn needs_locals(&self) -> bool {
        matches!(self, InjectionPoint::Load | InjectionPoint::Store)
    }
}

/// Maps injection point codes to handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, InjectionPoint>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("codes", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in code.
    pub fn builtin() -> Self {
        let handlers = InjectionPoint::BUILTIN
            .into_iter()
            .filter_map(|point| Some((point.builtin_code()?.to_string(), point)))
            .collect();
        Self { handlers }
    }

    /// Registers `handler` under `code`, returning the handler it replaced.
    pub fn register_custom(
        &mut self,
        code: impl Into<String>,
        handler: Arc<dyn CustomInjectionPoint>,
    ) -> Option<InjectionPoint> {
        self.handlers
            .insert(code.into(), InjectionPoint::Custom(handler))
    }

    pub fn lookup(&self, code: &str) -> Option<&InjectionPoint> {
        self.handlers.get(code.trim())
    }

    /// Registered codes, sorted.
    pub fn codes(&self) -> impl Iterator<Item = &str> + '_ {
        self.handlers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl CustomInjectionPoint for Nothing {
        fn find(
            &self,
            _ctx: &PointContext<'_>,
            _collector: &mut Collector<'_>,
        ) -> Result<(), ResolveError> {
            Ok(())
        }
    }

    #[test]
    fn builtin_codes() {
        let registry = HandlerRegistry::builtin();
        assert_eq!(registry.codes().count(), 13);
        assert!(matches!(registry.lookup("HEAD"), Some(InjectionPoint::Head)));
        assert!(matches!(
            registry.lookup(" INVOKE_ASSIGN "),
            Some(InjectionPoint::InvokeAssign)
        ));
        assert!(registry.lookup("head").is_none());
    }

    #[test]
    fn custom_codes_can_shadow_builtins() {
        let mut registry = HandlerRegistry::builtin();
        assert!(registry.register_custom("MIXINEXTRAS:EXPRESSION", Arc::new(Nothing)).is_none());
        assert!(matches!(
            registry.register_custom("HEAD", Arc::new(Nothing)),
            Some(InjectionPoint::Head)
        ));
        assert!(matches!(
            registry.lookup("HEAD"),
            Some(InjectionPoint::Custom(_))
        ));
    }
}
