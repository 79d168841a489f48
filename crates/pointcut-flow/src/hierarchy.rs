use std::collections::HashSet;

use crate::value::OBJECT;

/// Class-hierarchy queries used when merging reference types.
///
/// Implementations answer `None` for classes they cannot find; merging then
/// degrades towards `java/lang/Object` instead of failing.
pub trait TypeHierarchy {
    /// Direct superclass of `internal_name`, or `None` for `java/lang/Object`
    /// and unknown classes.
    fn super_class(&self, internal_name: &str) -> Option<String>;

    fn is_interface(&self, internal_name: &str) -> bool;
}

/// A hierarchy that knows nothing; every merge of distinct classes yields
/// `java/lang/Object`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHierarchy;

impl TypeHierarchy for NoHierarchy {
    fn super_class(&self, _internal_name: &str) -> Option<String> {
        None
    }

    fn is_interface(&self, _internal_name: &str) -> bool {
        false
    }
}

const MAX_DEPTH: usize = 64;

fn super_chain(hierarchy: &dyn TypeHierarchy, name: &str) -> Vec<String> {
    let mut chain = vec![name.to_string()];
    let mut current = name.to_string();
    while chain.len() < MAX_DEPTH {
        match hierarchy.super_class(&current) {
            Some(parent) if !chain.contains(&parent) => {
                chain.push(parent.clone());
                current = parent;
            }
            _ => break,
        }
    }
    chain
}

/// Nearest common superclass of two internal class names.
pub fn common_super_class(hierarchy: &dyn TypeHierarchy, a: &str, b: &str) -> String {
    if a == b {
        return a.to_string();
    }
    if hierarchy.is_interface(a) || hierarchy.is_interface(b) {
        return OBJECT.to_string();
    }
    let ancestors: HashSet<String> = super_chain(hierarchy, a).into_iter().collect();
    super_chain(hierarchy, b)
        .into_iter()
        .find(|candidate| ancestors.contains(candidate))
        .unwrap_or_else(|| OBJECT.to_string())
}

/// Merges two reference descriptors: classes by common superclass, arrays
/// element-wise, anything mixed to `java/lang/Object`.
pub(crate) fn merge_reference_descriptors(
    hierarchy: &dyn TypeHierarchy,
    a: &str,
    b: &str,
) -> String {
    if a == b {
        return a.to_string();
    }
    match (a.strip_prefix('['), b.strip_prefix('[')) {
        (Some(ea), Some(eb)) => {
            let ref_a = ea.starts_with('L') || ea.starts_with('[');
            let ref_b = eb.starts_with('L') || eb.starts_with('[');
            if ref_a && ref_b {
                format!("[{}", merge_reference_descriptors(hierarchy, ea, eb))
            } else {
                format!("L{OBJECT};")
            }
        }
        (None, None) => {
            let (Some(name_a), Some(name_b)) = (class_name(a), class_name(b)) else {
                return format!("L{OBJECT};");
            };
            format!("L{};", common_super_class(hierarchy, name_a, name_b))
        }
        _ => format!("L{OBJECT};"),
    }
}

fn class_name(desc: &str) -> Option<&str> {
    desc.strip_prefix('L')?.strip_suffix(';')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Map(HashMap<&'static str, &'static str>);

    impl TypeHierarchy for Map {
        fn super_class(&self, name: &str) -> Option<String> {
            self.0.get(name).map(|s| s.to_string())
        }

        fn is_interface(&self, name: &str) -> bool {
            name == "a/Iface"
        }
    }

    fn hierarchy() -> Map {
        Map(HashMap::from([
            ("a/Cat", "a/Animal"),
            ("a/Dog", "a/Animal"),
            ("a/Animal", OBJECT),
            ("LexerSub", "Lexer"),
            ("LexerOther", "Lexer"),
            ("Lexer", OBJECT),
        ]))
    }

    #[test]
    fn finds_nearest_common_superclass() {
        let h = hierarchy();
        assert_eq!(common_super_class(&h, "a/Cat", "a/Dog"), "a/Animal");
        assert_eq!(common_super_class(&h, "a/Cat", "a/Animal"), "a/Animal");
        assert_eq!(common_super_class(&h, "a/Cat", "a/Iface"), OBJECT);
    }

    #[test]
    fn unknown_classes_degrade_to_object() {
        assert_eq!(common_super_class(&NoHierarchy, "x/A", "x/B"), OBJECT);
        assert_eq!(
            merge_reference_descriptors(&hierarchy(), "[La/Cat;", "[La/Dog;"),
            "[La/Animal;"
        );
        assert_eq!(
            merge_reference_descriptors(&hierarchy(), "[I", "[J"),
            "Ljava/lang/Object;"
        );
    }

    #[test]
    fn default_package_names_starting_with_l() {
        assert_eq!(
            merge_reference_descriptors(&hierarchy(), "LLexerSub;", "LLexerOther;"),
            "LLexer;"
        );
    }
}
