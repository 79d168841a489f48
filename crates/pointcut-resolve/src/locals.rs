use std::ops::Range;

use pointcut_flow::LocalTable;
use serde::{Deserialize, Serialize};

/// Picks out one local variable among those live at an instruction.
///
/// Criteria are tried in order: `index`, then `names`, then `desc` with an
/// optional `ordinal` among the locals of that type. A type alone is only
/// accepted when exactly one live local has it. An empty discriminator
/// accepts every local.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalDiscriminator {
    /// Field descriptor of the local's declared type.
    pub desc: Option<String>,
    /// Slot index.
    pub index: Option<u16>,
    /// Position among the live locals of `desc`, in slot order.
    pub ordinal: Option<usize>,
    pub names: Vec<String>,
    /// Only consider method parameters (never `this`).
    pub args_only: bool,
}

impl LocalDiscriminator {
    pub fn named(name: &str) -> Self {
        Self {
            names: vec![name.to_string()],
            ..Self::default()
        }
    }

    pub fn typed(desc: &str) -> Self {
        Self {
            desc: Some(desc.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: u16) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn args_only(mut self) -> Self {
        self.args_only = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether the local in `slot` of `table` is the one described.
    ///
    /// `args` is the slot range of the declared parameters, `this` excluded.
    pub fn matches(&self, table: &LocalTable, slot: u16, args: Range<u16>) -> bool {
        let visible: Vec<Visible<'_>> = table
            .iter()
            .map(|var| Visible {
                name: &var.name,
                desc: &var.desc,
                slot: Some(var.index),
                is_arg: args.contains(&var.index),
            })
            .collect();
        let subject = visible
            .iter()
            .find(|var| var.slot == Some(slot))
            .copied()
            .unwrap_or(Visible {
                name: "",
                desc: "",
                slot: Some(slot),
                is_arg: args.contains(&slot),
            });
        self.accepts(&subject, &visible)
    }

    pub(crate) fn accepts(&self, subject: &Visible<'_>, visible: &[Visible<'_>]) -> bool {
        if self.args_only && !subject.is_arg {
            return false;
        }
        if let Some(desc) = &self.desc {
            if subject.desc != desc {
                return false;
            }
        }
        if let Some(index) = self.index {
            return subject.slot == Some(index);
        }
        if !self.names.is_empty() {
            return self.names.iter().any(|name| name == subject.name);
        }
        if self.desc.is_none() && self.ordinal.is_none() {
            return true;
        }

        let mut same_type = visible.iter().filter(|var| {
            self.desc.as_deref().map_or(true, |desc| var.desc == desc)
                && (!self.args_only || var.is_arg)
        });
        match self.ordinal {
            Some(ordinal) => same_type.nth(ordinal) == Some(subject),
            None => same_type.count() == 1,
        }
    }
}

/// A local as seen by a discriminator, from either the bytecode table or a
/// source body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Visible<'a> {
    pub name: &'a str,
    pub desc: &'a str,
    pub slot: Option<u16>,
    pub is_arg: bool,
}
