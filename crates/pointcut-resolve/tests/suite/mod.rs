mod completion;
mod custom;
mod filters;
mod javac;
mod navigation;
mod points;
mod selector_props;

use std::sync::Arc;

use pointcut_classfile::{ClassNode, Insn, InsnId, MethodNode};
use pointcut_core::CancellationToken;
use pointcut_resolve::{
    AtResolver, AtSpec, ClassIndex, MatchResult, MemoryIndex, Mode, ResolveError, TargetMethod,
};
use pointcut_test_utils::fixtures::target_fixture;

pub(crate) const FOO: &str = "Lcom/example/Target;foo()V";

/// A resolver over an index holding the fixture class in both forms.
pub(crate) struct Env {
    pub(crate) resolver: AtResolver,
    pub(crate) class: Arc<ClassNode>,
}

impl Env {
    pub(crate) fn new() -> Self {
        let fixture = target_fixture();
        let index = Arc::new(MemoryIndex::new());
        let class = index
            .add_class_bytes(&fixture.bytes)
            .expect("fixture bytes should parse");
        index.add_source(fixture.source);
        let index: Arc<dyn ClassIndex> = index;
        Self {
            resolver: AtResolver::new(index),
            class,
        }
    }

    pub(crate) fn target(&self, name: &str) -> TargetMethod<'_> {
        TargetMethod::find(&self.class, name, None)
            .unwrap_or_else(|| panic!("no method `{name}` in the fixture"))
    }

    pub(crate) fn method(&self, name: &str) -> &MethodNode {
        self.target(name).method
    }

    pub(crate) fn resolve_in(
        &self,
        at: &AtSpec,
        name: &str,
        mode: Mode,
    ) -> Result<Vec<MatchResult>, ResolveError> {
        self.resolver
            .resolve(at, self.target(name), mode, &CancellationToken::new())
    }

    pub(crate) fn all(&self, at: &AtSpec, name: &str) -> Vec<MatchResult> {
        self.resolve_in(at, name, Mode::All)
            .unwrap_or_else(|err| panic!("{} in {name}: {err}", at.value))
    }

    pub(crate) fn insn(&self, name: &str, id: InsnId) -> &Insn {
        &self.method(name).instructions[id]
    }
}

/// Position of the first call to `callee` in `method`.
pub(crate) fn call_site(method: &MethodNode, callee: &str) -> InsnId {
    method
        .instructions
        .iter()
        .find_map(|(id, insn)| match insn {
            Insn::Method { name, .. } if name == callee => Some(id),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no call to `{callee}` in {}", method.name))
}
