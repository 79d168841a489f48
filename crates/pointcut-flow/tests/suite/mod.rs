mod generated;
mod locals;

use pointcut_classfile::{Insn, InsnId, MethodNode};

/// Position of the first call to `name`.
pub(crate) fn call_site(method: &MethodNode, name: &str) -> InsnId {
    method
        .instructions
        .iter()
        .find_map(|(id, insn)| match insn {
            Insn::Method { name: callee, .. } if callee == name => Some(id),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no call to `{name}` in {}", method.name))
}
