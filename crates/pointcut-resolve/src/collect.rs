//! Candidate collection: shift, then the filter chain, then the mode's stop
//! rule.

use std::fmt;
use std::ops::ControlFlow;

use pointcut_classfile::{InsnId, MethodNode};
use pointcut_core::internal_to_dotted;
use pointcut_flow::LocalVariable;

/// How many results a walk should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Every matching instruction.
    All,
    /// Stop at the first result that survives the filters.
    First,
    /// Every structurally possible target, for completion. Shift and ordinal
    /// are not applied.
    Completion,
}

/// A constant operand, as loaded by a constant instruction or written as a
/// literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Null,
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    /// Internal name or array descriptor.
    Class(String),
}

impl ConstantValue {
    /// The `CONSTANT` argument that selects this value.
    pub fn arg(&self) -> String {
        match self {
            ConstantValue::Null => "nullValue=true".to_string(),
            ConstantValue::Int(v) => format!("intValue={v}"),
            ConstantValue::Float(v) => format!("floatValue={v}"),
            ConstantValue::Long(v) => format!("longValue={v}"),
            ConstantValue::Double(v) => format!("doubleValue={v}"),
            ConstantValue::String(v) => format!("stringValue={v}"),
            ConstantValue::Class(v) => format!("classValue={}", internal_to_dotted(v)),
        }
    }
}

/// What a candidate instruction refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// A position with no referenced member (`HEAD`, `RETURN`, jumps).
    Insn,
    Method {
        owner: String,
        name: String,
        desc: String,
    },
    Field {
        owner: String,
        name: String,
        desc: String,
    },
    /// A `NEW`; `ctor_desc` is the descriptor of the paired `<init>`.
    New {
        class: String,
        ctor_desc: Option<String>,
    },
    Constant(ConstantValue),
    /// A load or store; `var` is `None` when no table knows the slot.
    Local {
        slot: u16,
        var: Option<LocalVariable>,
    },
}

impl Element {
    /// Text a user would type into the annotation to select this element.
    pub fn completion_label(&self) -> Option<String> {
        match self {
            Element::Insn => None,
            Element::Method { owner, name, desc } => Some(format!("L{owner};{name}{desc}")),
            Element::Field { owner, name, desc } => Some(format!("L{owner};{name}:{desc}")),
            Element::New {
                class,
                ctor_desc: Some(desc),
            } => {
                let args = desc.strip_suffix('V').unwrap_or(desc);
                Some(format!("{args}L{class};"))
            }
            Element::New {
                class,
                ctor_desc: None,
            } => Some(format!("L{class};")),
            Element::Constant(value) => Some(value.arg()),
            Element::Local { var, .. } => var.as_ref().map(|var| var.name.clone()),
        }
    }
}

/// Extra instructions tied to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decoration {
    /// The companion `ARRAYLENGTH`, `xALOAD` or `xASTORE` of a field access.
    ArrayInsn(InsnId),
    /// The `<init>` call paired with a `NEW`.
    Constructor(InsnId),
    /// The invocation whose result an `INVOKE_ASSIGN` position follows.
    Invoke(InsnId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Position of the candidate in visitation order, before any filter.
    pub index: usize,
    /// The instruction the visitor matched.
    pub original: InsnId,
    /// `original` after applying the shift.
    pub insn: InsnId,
    pub element: Element,
    /// Owner the matched member was referenced through.
    pub qualifier: Option<String>,
    pub decorations: Vec<Decoration>,
}

/// A named predicate over candidates, applied after the shift.
pub trait ResultFilter {
    fn name(&self) -> &'static str;

    fn accept(&mut self, result: &MatchResult, method: &MethodNode) -> bool;
}

/// Keeps candidates whose original instruction lies within `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceFilter {
    bounds: Option<(InsnId, InsnId)>,
}

impl SliceFilter {
    pub fn new(from: InsnId, to: InsnId) -> Self {
        Self {
            bounds: Some((from, to)),
        }
    }

    /// A slice whose bounds could not be resolved; rejects everything.
    pub fn unresolved() -> Self {
        Self { bounds: None }
    }
}

impl ResultFilter for SliceFilter {
    fn name(&self) -> &'static str {
        "slice"
    }

    fn accept(&mut self, result: &MatchResult, _method: &MethodNode) -> bool {
        self.bounds
            .is_some_and(|(from, to)| from <= result.original && result.original <= to)
    }
}

/// Keeps only the `ordinal`-th candidate that reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdinalFilter {
    ordinal: usize,
    seen: usize,
}

impl OrdinalFilter {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal, seen: 0 }
    }
}

impl ResultFilter for OrdinalFilter {
    fn name(&self) -> &'static str {
        "ordinal"
    }

    fn accept(&mut self, _result: &MatchResult, _method: &MethodNode) -> bool {
        let current = self.seen;
        self.seen += 1;
        current == self.ordinal
    }
}

/// Receives candidates from an injection point's walk.
pub struct Collector<'a> {
    method: &'a MethodNode,
    mode: Mode,
    shift: i32,
    filters: Vec<Box<dyn ResultFilter + 'a>>,
    results: Vec<MatchResult>,
    candidates: usize,
    blamed: Option<&'static str>,
}

impl fmt::Debug for Collector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("method", &format_args!("{}{}", self.method.name, self.method.desc))
            .field("mode", &self.mode)
            .field("shift", &self.shift)
            .field(
                "filters",
                &self.filters.iter().map(|f| f.name()).collect::<Vec<_>>(),
            )
            .field("results", &self.results.len())
            .field("candidates", &self.candidates)
            .field("blamed", &self.blamed)
            .finish()
    }
}

impl<'a> Collector<'a> {
    pub fn new(method: &'a MethodNode, mode: Mode) -> Self {
        Self {
            method,
            mode,
            shift: 0,
            filters: Vec::new(),
            results: Vec::new(),
            candidates: 0,
            blamed: None,
        }
    }

    #[must_use]
    pub fn with_shift(mut self, shift: i32) -> Self {
        self.shift = shift;
        self
    }

    /// Appends a filter; filters run in the order they were added.
    #[must_use]
    pub fn with_filter(mut self, filter: impl ResultFilter + 'a) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn method(&self) -> &'a MethodNode {
        self.method
    }

    /// Offers a candidate. Returns `Break` once the walk should stop.
    pub fn add(
        &mut self,
        insn: InsnId,
        element: Element,
        qualifier: Option<String>,
        decorations: Vec<Decoration>,
    ) -> ControlFlow<()> {
        let index = self.candidates;
        self.candidates += 1;

        let shifted = if self.mode == Mode::Completion {
            Some(insn)
        } else {
            self.method.instructions.offset(insn, self.shift)
        };
        let Some(shifted) = shifted else {
            self.reject(index, "shift");
            return ControlFlow::Continue(());
        };

        let result = MatchResult {
            index,
            original: insn,
            insn: shifted,
            element,
            qualifier,
            decorations,
        };
        let method = self.method;
        let rejected = self
            .filters
            .iter_mut()
            .position(|filter| !filter.accept(&result, method));
        if let Some(position) = rejected {
            let name = self.filters[position].name();
            self.reject(index, name);
            return ControlFlow::Continue(());
        }

        tracing::trace!(target: "pointcut.resolve", index, insn = %shifted, "candidate accepted");
        self.results.push(result);
        if self.mode == Mode::First {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn reject(&mut self, index: usize, filter: &'static str) {
        tracing::trace!(target: "pointcut.resolve", index, filter, "candidate rejected");
        self.blamed.get_or_insert(filter);
    }

    /// Candidates offered so far, accepted or not.
    pub fn candidates(&self) -> usize {
        self.candidates
    }

    /// The first filter that rejected a candidate.
    pub fn blamed_filter(&self) -> Option<&'static str> {
        self.blamed
    }

    pub fn results(&self) -> &[MatchResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<MatchResult> {
        self.results
    }
}
