use pointcut_core::Span;
use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::locals::LocalDiscriminator;

/// The attributes of one `@At` annotation, as the host read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AtSpec {
    /// Injection point code (`HEAD`, `INVOKE`, ...).
    pub value: String,
    /// Selector text interpreted by the injection point.
    pub target: Option<String>,
    /// Zero-based candidate index, or -1 for every candidate.
    pub ordinal: i32,
    /// Opcode restriction, or -1 for none.
    pub opcode: i32,
    pub slice: Option<Box<SliceSpec>>,
    pub shift: Shift,
    /// Free-form `key=value` pairs.
    pub args: Vec<String>,
    /// Discriminator for `LOAD` and `STORE`.
    pub local: Option<LocalDiscriminator>,
    /// Where the annotation sits in the host document.
    #[serde(skip)]
    pub span: Option<Span>,
}

impl Default for AtSpec {
    fn default() -> Self {
        Self {
            value: String::new(),
            target: None,
            ordinal: -1,
            opcode: -1,
            slice: None,
            shift: Shift::None,
            args: Vec::new(),
            local: None,
            span: None,
        }
    }
}

impl AtSpec {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    #[must_use]
    pub fn with_opcode(mut self, opcode: u8) -> Self {
        self.opcode = i32::from(opcode);
        self
    }

    #[must_use]
    pub fn with_shift(mut self, shift: Shift) -> Self {
        self.shift = shift;
        self
    }

    #[must_use]
    pub fn with_arg(mut self, key: &str, value: &str) -> Self {
        self.args.push(format!("{key}={value}"));
        self
    }

    #[must_use]
    pub fn with_slice(mut self, slice: SliceSpec) -> Self {
        self.slice = Some(Box::new(slice));
        self
    }

    #[must_use]
    pub fn with_local(mut self, local: LocalDiscriminator) -> Self {
        self.local = Some(local);
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// The value of `key` in `args`. A bare `key` without `=` reads as `true`.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg.split_once('=') {
            Some((k, v)) if k.trim() == key => Some(v.trim()),
            None if arg.trim() == key => Some("true"),
            _ => None,
        })
    }

    pub fn has_arg(&self, key: &str) -> bool {
        self.arg(key).is_some()
    }

    pub(crate) fn arg_bool(&self, key: &str) -> Result<bool, ResolveError> {
        match self.arg(key) {
            None => Ok(false),
            Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
            Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
            Some(value) => Err(ResolveError::invalid_argument(key, value)),
        }
    }

    pub(crate) fn arg_u32(&self, key: &str) -> Result<Option<u32>, ResolveError> {
        self.arg(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ResolveError::invalid_argument(key, value))
            })
            .transpose()
    }

    /// The opcode restriction, if set.
    pub fn opcode(&self) -> Option<u8> {
        u8::try_from(self.opcode).ok()
    }

    /// The ordinal, if set.
    pub fn ordinal(&self) -> Option<usize> {
        usize::try_from(self.ordinal).ok()
    }
}

/// Post-match movement of the selected instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Shift {
    #[default]
    None,
    Before,
    After,
    By(i32),
}

impl Shift {
    /// Signed node distance.
    pub fn offset(self) -> i32 {
        match self {
            Shift::None => 0,
            Shift::Before => -1,
            Shift::After => 1,
            Shift::By(by) => by,
        }
    }
}

/// A sub-range of the target method bounded by two other injection points.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SliceSpec {
    pub id: String,
    /// Lower bound; the method start when absent.
    pub from: Option<AtSpec>,
    /// Upper bound; the method end when absent.
    pub to: Option<AtSpec>,
}
