//! Symbolic member references: `Lowner;name(desc)`, `owner.name:desc`, `name*`.

use std::fmt;

use pointcut_classfile::{parse_field_descriptor, parse_method_descriptor};
use pointcut_core::{dotted_to_internal, internal_to_dotted};

/// A parsed member reference.
///
/// Owners are stored in internal form (`com/example/Foo`) whichever form the
/// text used. Field selectors keep the bare field descriptor in `desc`; method
/// selectors keep the full method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberSelector {
    pub owner: Option<String>,
    pub name: Option<String>,
    pub desc: Option<String>,
    /// `*`: any name.
    pub match_all_names: bool,
    /// `name*`: every overload of `name`.
    pub match_all_descs: bool,
}

impl MemberSelector {
    /// Matches every member. Used to enumerate candidates for completion.
    pub const ANY: MemberSelector = MemberSelector {
        owner: None,
        name: None,
        desc: None,
        match_all_names: true,
        match_all_descs: true,
    };

    /// Parses selector text, or `None` if the text has any other shape.
    ///
    /// Whitespace anywhere in the text is ignored.
    pub fn parse(text: &str) -> Option<MemberSelector> {
        let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if text.is_empty() {
            return None;
        }
        if text == "*" {
            return Some(MemberSelector::ANY);
        }

        let member_end = text.find(['(', ':']).unwrap_or(text.len());
        let (owner, rest) = split_owner(&text, member_end)?;

        let desc_start = rest.find(['(', ':']).unwrap_or(rest.len());
        let (name_part, desc_part) = rest.split_at(desc_start);

        let (name, match_all_names, match_all_descs) = if name_part == "*" {
            (None, true, false)
        } else if let Some(prefix) = name_part.strip_suffix('*') {
            (Some(prefix), false, true)
        } else {
            (Some(name_part), false, false)
        };
        if let Some(name) = name {
            if !is_member_name(name) {
                return None;
            }
        }

        let desc = if desc_part.is_empty() {
            None
        } else if let Some(field_desc) = desc_part.strip_prefix(':') {
            parse_field_descriptor(field_desc).ok()?;
            Some(field_desc.to_string())
        } else {
            parse_method_descriptor(desc_part).ok()?;
            Some(desc_part.to_string())
        };
        if match_all_descs && desc.is_some() {
            return None;
        }

        let match_all_descs = match_all_descs || (match_all_names && desc.is_none());
        Some(MemberSelector {
            owner,
            name: name.map(str::to_string),
            desc,
            match_all_names,
            match_all_descs,
        })
    }

    pub fn matches(&self, owner: &str, name: &str, desc: &str) -> bool {
        self.owner.as_deref().map_or(true, |expected| expected == owner)
            && (self.match_all_names || self.name.as_deref() == Some(name))
            && self.desc.as_deref().map_or(true, |expected| expected == desc)
    }

    /// The owner in dotted form (`com.example.Foo`).
    pub fn owner_dotted(&self) -> Option<String> {
        self.owner.as_deref().map(internal_to_dotted)
    }

    /// Whether the selector names a field (`name:desc`).
    pub fn is_field(&self) -> bool {
        self.desc.as_deref().is_some_and(|desc| !desc.starts_with('('))
    }
}

impl fmt::Display for MemberSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(owner) = &self.owner {
            write!(f, "L{owner};")?;
        }
        if self.match_all_names {
            f.write_str("*")?;
        } else if let Some(name) = &self.name {
            f.write_str(name)?;
            if self.match_all_descs {
                f.write_str("*")?;
            }
        }
        match &self.desc {
            Some(desc) if desc.starts_with('(') => f.write_str(desc),
            Some(desc) => write!(f, ":{desc}"),
            None => Ok(()),
        }
    }
}

/// Splits an `Lowner;` or dotted `owner.` prefix off the member part.
fn split_owner(text: &str, member_end: usize) -> Option<(Option<String>, &str)> {
    let head = &text[..member_end];
    if let Some(body) = head.strip_prefix('L') {
        if let Some(semi) = body.find(';') {
            let owner = dotted_to_internal(&body[..semi]);
            if !is_internal_name(&owner) {
                return None;
            }
            return Some((Some(owner), &text[semi + 2..]));
        }
    }
    match head.rfind('.') {
        Some(dot) => {
            let owner = dotted_to_internal(&head[..dot]);
            if !is_internal_name(&owner) {
                return None;
            }
            Some((Some(owner), &text[dot + 1..]))
        }
        None => Some((None, text)),
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_member_name(name: &str) -> bool {
    name == "<init>"
        || name == "<clinit>"
        || (!name.is_empty() && name.chars().all(is_identifier_char))
}

fn is_internal_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('/')
            .all(|part| !part.is_empty() && part.chars().all(is_identifier_char))
}
