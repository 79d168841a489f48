use pointcut_classfile::opcodes::{INVOKESPECIAL, NEW};
use pointcut_classfile::{parse_method_descriptor, Insn, InsnId, InsnList};
use pointcut_core::dotted_to_internal;

use super::PointContext;
use crate::collect::{Collector, Decoration, Element};
use crate::error::ResolveError;
use crate::selector::MemberSelector;

/// The `target` of a `NEW`: a class, optionally narrowed to one constructor.
///
/// Accepted forms are `java.lang.Foo`, `java/lang/Foo`, `Ljava/lang/Foo;`,
/// `Ljava/lang/Foo;<init>(I)V` and the constructor shorthand `(I)Ljava/lang/Foo;`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct NewTarget {
    pub class: Option<String>,
    pub ctor_desc: Option<String>,
}

impl NewTarget {
    pub(crate) fn parse(target: Option<&str>) -> Result<NewTarget, ResolveError> {
        let Some(raw) = target else {
            return Ok(NewTarget::default());
        };
        let text: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let invalid = || ResolveError::InvalidSelector(raw.to_string());

        if text.starts_with('(') {
            let close = text.find(')').ok_or_else(invalid)?;
            let class = text[close + 1..]
                .strip_prefix('L')
                .and_then(|rest| rest.strip_suffix(';'))
                .filter(|class| is_class_name(class))
                .ok_or_else(invalid)?;
            let ctor_desc = format!("{}V", &text[..=close]);
            parse_method_descriptor(&ctor_desc).map_err(|_| invalid())?;
            return Ok(NewTarget {
                class: Some(class.to_string()),
                ctor_desc: Some(ctor_desc),
            });
        }

        if let Some(selector) = MemberSelector::parse(&text) {
            if selector.owner.is_some() && selector.name.as_deref() == Some("<init>") {
                return Ok(NewTarget {
                    class: selector.owner,
                    ctor_desc: selector.desc,
                });
            }
        }

        let class = text
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
            .unwrap_or(&text);
        let class = dotted_to_internal(class);
        if !is_class_name(&class) {
            return Err(invalid());
        }
        Ok(NewTarget {
            class: Some(class),
            ctor_desc: None,
        })
    }

    pub(crate) fn matches(&self, class: &str, ctor_desc: Option<&str>) -> bool {
        self.class.as_deref().map_or(true, |wanted| wanted == class)
            && self
                .ctor_desc
                .as_deref()
                .map_or(true, |wanted| ctor_desc == Some(wanted))
    }
}

fn is_class_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('/').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        })
}

pub(super) fn new(ctx: &PointContext<'_>, collector: &mut Collector<'_>) -> Result<(), ResolveError> {
    let target = NewTarget::parse(ctx.at.target.as_deref())?;
    let insns = &ctx.method.instructions;
    for (id, insn) in insns.iter() {
        ctx.checkpoint(id)?;
        let Insn::Type {
            opcode: NEW,
            desc: class,
        } = insn
        else {
            continue;
        };
        let ctor = paired_constructor(insns, id);
        if !target.matches(class, ctor.map(|(_, desc)| desc)) {
            continue;
        }
        let element = Element::New {
            class: class.clone(),
            ctor_desc: ctor.map(|(_, desc)| desc.to_string()),
        };
        let decorations = ctor
            .map(|(at, _)| Decoration::Constructor(at))
            .into_iter()
            .collect();
        if collector.add(id, element, None, decorations).is_break() {
            break;
        }
    }
    Ok(())
}

/// The `<init>` call that consumes the object allocated at `new_at`.
///
/// Allocations nested in the constructor arguments are balanced by a
/// counter: every `NEW` on the way opens one level, every `<init>` closes one.
pub(crate) fn paired_constructor(insns: &InsnList, new_at: InsnId) -> Option<(InsnId, &str)> {
    let mut nested = 0usize;
    for (id, insn) in insns.iter().skip(new_at.index() + 1) {
        match insn {
            Insn::Type { opcode: NEW, .. } => nested += 1,
            Insn::Method {
                opcode: INVOKESPECIAL,
                name,
                desc,
                ..
            } if name == "<init>" => {
                if nested == 0 {
                    return Some((id, desc.as_str()));
                }
                nested -= 1;
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointcut_classfile::opcodes::*;
    use pointcut_classfile::MethodBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn target_forms() {
        let plain = NewTarget::parse(Some("java.lang.StringBuilder")).unwrap();
        assert_eq!(plain.class.as_deref(), Some("java/lang/StringBuilder"));
        assert_eq!(plain.ctor_desc, None);

        let typed = NewTarget::parse(Some("Ljava/lang/StringBuilder;")).unwrap();
        assert_eq!(typed, plain);

        let shorthand = NewTarget::parse(Some("(Ljava/lang/String;)Ljava/lang/StringBuilder;")).unwrap();
        assert_eq!(shorthand.class.as_deref(), Some("java/lang/StringBuilder"));
        assert_eq!(shorthand.ctor_desc.as_deref(), Some("(Ljava/lang/String;)V"));

        let selector = NewTarget::parse(Some("Ljava/lang/StringBuilder;<init>(I)V")).unwrap();
        assert_eq!(selector.ctor_desc.as_deref(), Some("(I)V"));

        assert!(NewTarget::parse(Some("(I)I")).is_err());
        assert!(NewTarget::parse(Some("not a class!")).is_err());
    }

    #[test]
    fn nested_allocations_pair_with_their_own_constructor() {
        // new Outer(new Inner())
        let mut b = MethodBuilder::new("a/B", ACC_STATIC, "m", "()V").unwrap();
        b.type_insn(NEW, "Outer").insn(DUP);
        b.type_insn(NEW, "Inner").insn(DUP);
        b.method(INVOKESPECIAL, "Inner", "<init>", "()V");
        b.method(INVOKESPECIAL, "Outer", "<init>", "(LInner;)V");
        b.insn(POP).insn(RETURN);
        let method = b.build();
        let insns = &method.instructions;

        assert_eq!(
            paired_constructor(insns, InsnId::new(0)),
            Some((InsnId::new(5), "(LInner;)V"))
        );
        assert_eq!(
            paired_constructor(insns, InsnId::new(2)),
            Some((InsnId::new(4), "()V"))
        );
    }
}
