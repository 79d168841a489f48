//! Association of compiled lambda bodies (`lambda$run$0`) with the lambda
//! expressions they were compiled from.
//!
//! javac numbers lambda bodies per class, so the name alone says nothing
//! about where the lambda sits. The association goes through the call site
//! instead: the `invokedynamic` that captures the lambda lives in the
//! enclosing method, and its position among that method's capturing call
//! sites equals the position of the lambda expression among the lambdas
//! directly owned by the enclosing source body.

use std::collections::HashSet;

use pointcut_classfile::{ClassNode, Constant, Handle, Insn, MethodNode};
use pointcut_hir::{lambdas_in, Body, ExprId, SourceClass, SourceMethod, WalkRoot};

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";
const LAMBDA_PREFIX: &str = "lambda$";

/// Whether `name` is a compiler-generated lambda body.
pub fn is_lambda_method(name: &str) -> bool {
    name.starts_with(LAMBDA_PREFIX)
}

/// A lambda expression inside a source method.
#[derive(Debug, Clone, Copy)]
pub struct LambdaSource<'s> {
    /// The outermost named method the lambda is written in.
    pub method: &'s SourceMethod,
    pub lambda: ExprId,
}

impl<'s> LambdaSource<'s> {
    pub fn body(&self) -> Option<&'s Body> {
        self.method.body.as_ref()
    }

    /// Where a walk over the lambda's own body starts.
    pub fn root(&self) -> Option<WalkRoot> {
        WalkRoot::of_lambda(self.body()?, self.lambda)
    }
}

/// Finds the lambda expression compiled to `class.name::name desc`.
pub fn find_source_lambda<'s>(
    class: &ClassNode,
    source: &'s SourceClass,
    name: &str,
    desc: &str,
) -> Option<LambdaSource<'s>> {
    let mut visiting = HashSet::new();
    locate(class, source, name, desc, &mut visiting)
}

fn locate<'s>(
    class: &ClassNode,
    source: &'s SourceClass,
    name: &str,
    desc: &str,
    visiting: &mut HashSet<(String, String)>,
) -> Option<LambdaSource<'s>> {
    if !visiting.insert((name.to_string(), desc.to_string())) {
        return None;
    }

    let (enclosing, position) = class.methods.iter().find_map(|method| {
        capture_position(class, method, name, desc).map(|position| (method, position))
    })?;

    let (method, body, root) = if is_lambda_method(&enclosing.name) {
        let outer = locate(class, source, &enclosing.name, &enclosing.desc, visiting)?;
        (outer.method, outer.body()?, outer.root()?)
    } else {
        let method = source.find_method(&enclosing.name, &enclosing.desc)?;
        let body = method.body.as_ref()?;
        (method, body, WalkRoot::Stmt(body.root))
    };

    let lambda = *lambdas_in(body, root).get(position)?;
    tracing::trace!(
        target: "pointcut.resolve",
        lambda = name,
        enclosing = %enclosing.name,
        position,
        "lambda associated"
    );
    Some(LambdaSource { method, lambda })
}

/// Position of the call site capturing `name desc` among the capturing call
/// sites of `method`.
fn capture_position(class: &ClassNode, method: &MethodNode, name: &str, desc: &str) -> Option<usize> {
    method
        .instructions
        .iter()
        .filter_map(|(_, insn)| lambda_impl(insn))
        .filter(|handle| handle.owner == class.name && is_lambda_method(&handle.name))
        .position(|handle| handle.name == name && handle.desc == desc)
}

/// The implementation handle of a metafactory call site.
fn lambda_impl(insn: &Insn) -> Option<&Handle> {
    let Insn::InvokeDynamic {
        bootstrap,
        bootstrap_args,
        ..
    } = insn
    else {
        return None;
    };
    if bootstrap.owner != LAMBDA_METAFACTORY {
        return None;
    }
    match bootstrap_args.get(1)? {
        Constant::MethodHandle(handle) => Some(handle),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointcut_hir::Expr;
    use pointcut_test_utils::fixtures::target_fixture;

    #[test]
    fn lambda_body_maps_to_its_expression() {
        let fixture = target_fixture();
        let class = ClassNode::parse(&fixture.bytes).expect("fixture parses");

        let found = find_source_lambda(&class, &fixture.source, "lambda$run$0", "()V")
            .expect("lambda located");
        assert_eq!(found.method.name, "run");
        let body = found.body().expect("run has a body");
        assert!(matches!(body.exprs[found.lambda], Expr::Lambda { .. }));
        assert!(found.root().is_some());
    }

    #[test]
    fn unknown_lambdas_are_not_found() {
        let fixture = target_fixture();
        let class = ClassNode::parse(&fixture.bytes).expect("fixture parses");
        assert!(find_source_lambda(&class, &fixture.source, "lambda$run$9", "()V").is_none());
        assert!(is_lambda_method("lambda$run$0"));
        assert!(!is_lambda_method("run"));
    }
}
