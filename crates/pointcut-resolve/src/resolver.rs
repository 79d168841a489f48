use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use pointcut_classfile::{ClassNode, InsnId, MethodNode};
use pointcut_core::{CancellationToken, Cancelled, CompletionItem, Diagnostic};
use pointcut_flow::{
    locals_at, AnalysisCache, LocalTable, LocalsContext, LocalsError, LocalsSettings,
    MethodAnalysis,
};
use pointcut_hir::{SourceClass, SourceMethod};
use serde::{Deserialize, Serialize};

use crate::at::{AtSpec, SliceSpec};
use crate::collect::{Collector, MatchResult, Mode, OrdinalFilter, SliceFilter};
use crate::error::{ResolveError, AT_UNRESOLVED};
use crate::index::{ClassIndex, IndexHierarchy};
use crate::lambda::{find_source_lambda, is_lambda_method};
use crate::mirror::{self, MirrorTarget, SourceMatch};
use crate::points::{self, PointContext};
use crate::registry::{HandlerRegistry, InjectionPoint};
use crate::selector::MemberSelector;

/// Tunables for resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverOptions {
    /// `FIELD` `array=` search distance when the `@At` gives no `fuzz`.
    pub default_fuzz: u32,
    /// Upper bound for any requested `fuzz`.
    pub max_fuzz: u32,
    pub locals: LocalsSettings,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            default_fuzz: 8,
            max_fuzz: 32,
            locals: LocalsSettings::default(),
        }
    }
}

/// A compiled method together with its declaring class.
#[derive(Debug, Clone, Copy)]
pub struct TargetMethod<'a> {
    pub class: &'a ClassNode,
    pub method: &'a MethodNode,
}

impl<'a> TargetMethod<'a> {
    pub fn new(class: &'a ClassNode, method: &'a MethodNode) -> Self {
        Self { class, method }
    }

    /// Looks a method up by name and, optionally, descriptor.
    pub fn find(class: &'a ClassNode, name: &str, desc: Option<&str>) -> Option<Self> {
        let method = class.find_method(name, desc)?;
        Some(Self {
            class,
            method: method.as_ref(),
        })
    }
}

impl fmt::Display for TargetMethod<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class.name, self.method.name, self.method.desc)
    }
}

/// What a walk produced, before the façade decides whether it failed.
struct Outcome {
    results: Vec<MatchResult>,
    blamed: Option<&'static str>,
}

/// Entry point for resolving, validating, navigating and completing `@At`s.
pub struct AtResolver {
    registry: HandlerRegistry,
    index: Arc<dyn ClassIndex>,
    cache: AnalysisCache,
    options: ResolverOptions,
}

impl fmt::Debug for AtResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtResolver")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl AtResolver {
    /// A resolver over `index` with the built-in injection points.
    pub fn new(index: Arc<dyn ClassIndex>) -> Self {
        Self {
            registry: HandlerRegistry::builtin(),
            index,
            cache: AnalysisCache::new(),
            options: ResolverOptions::default(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn index(&self) -> &dyn ClassIndex {
        self.index.as_ref()
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Finds the instructions `at` designates in `target`.
    ///
    /// An empty result is a [`ResolveError::NoMatch`] except in
    /// [`Mode::Completion`].
    pub fn resolve(
        &self,
        at: &AtSpec,
        target: TargetMethod<'_>,
        mode: Mode,
        cancel: &CancellationToken,
    ) -> Result<Vec<MatchResult>, ResolveError> {
        let _span = tracing::debug_span!(
            target: "pointcut.resolve",
            "resolve",
            at = %at.value,
            method = %target,
            ?mode
        )
        .entered();

        let outcome = self.run(at, target, mode, cancel)?;
        if outcome.results.is_empty() && mode != Mode::Completion {
            tracing::debug!(target: "pointcut.resolve", blamed = ?outcome.blamed, "no match");
            return Err(ResolveError::NoMatch {
                blamed_filter: outcome.blamed.map(str::to_string),
            });
        }
        Ok(outcome.results)
    }

    fn run(
        &self,
        at: &AtSpec,
        target: TargetMethod<'_>,
        mode: Mode,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ResolveError> {
        Cancelled::check(cancel)?;
        let point = self.lookup(at)?;
        let completion_spec;
        let at = if mode == Mode::Completion {
            completion_spec = completion_spec_of(at);
            &completion_spec
        } else {
            at
        };
        let selector = selector_for(point, at, mode)?;

        let locals = if point.needs_locals() {
            Some(self.locals_context(target, cancel)?)
        } else {
            None
        };

        let mut collector = Collector::new(target.method, mode);
        if mode != Mode::Completion {
            collector = collector.with_shift(at.shift.offset());
        }
        if let Some(slice) = &at.slice {
            collector = collector.with_filter(self.slice_filter(slice, target, cancel)?);
        }
        if mode != Mode::Completion {
            if let Some(ordinal) = at.ordinal() {
                collector = collector.with_filter(OrdinalFilter::new(ordinal));
            }
        }

        let ctx = PointContext {
            owner: &target.class.name,
            method: target.method,
            at,
            selector: selector.as_ref(),
            locals: locals.as_ref(),
            options: &self.options,
            cancel,
        };
        points::find(point, &ctx, &mut collector)?;

        tracing::debug!(
            target: "pointcut.resolve",
            candidates = collector.candidates(),
            results = collector.results().len(),
            "walk finished"
        );
        Ok(Outcome {
            blamed: collector.blamed_filter(),
            results: collector.into_results(),
        })
    }

    fn lookup(&self, at: &AtSpec) -> Result<&InjectionPoint, ResolveError> {
        self.registry
            .lookup(&at.value)
            .ok_or_else(|| ResolveError::UnknownInjectionPoint(at.value.clone()))
    }

    /// Bounds of a slice, each found by resolving its own `@At`.
    fn slice_filter(
        &self,
        slice: &SliceSpec,
        target: TargetMethod<'_>,
        cancel: &CancellationToken,
    ) -> Result<SliceFilter, ResolveError> {
        let insns = &target.method.instructions;
        let from = match &slice.from {
            None => insns.first(),
            Some(at) => self.bound(at, target, cancel)?.map(|(lowest, _)| lowest),
        };
        let to = match &slice.to {
            None => insns.last(),
            Some(at) => self.bound(at, target, cancel)?.map(|(_, highest)| highest),
        };
        match (from, to) {
            (Some(from), Some(to)) => Ok(SliceFilter::new(from, to)),
            _ => {
                tracing::debug!(target: "pointcut.resolve", slice = %slice.id, "slice bound unresolved");
                Ok(SliceFilter::unresolved())
            }
        }
    }

    /// The lowest and highest instruction a slice bound resolves to.
    fn bound(
        &self,
        at: &AtSpec,
        target: TargetMethod<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<(InsnId, InsnId)>, ResolveError> {
        let outcome = self.run(at, target, Mode::All, cancel)?;
        let lowest = outcome.results.iter().map(|result| result.insn).min();
        let highest = outcome.results.iter().map(|result| result.insn).max();
        Ok(lowest.zip(highest))
    }

    /// Validates `at` against `target`.
    ///
    /// Unknown codes belong to extensions this resolver does not know and are
    /// assumed to resolve. Local variable points are not reported when the
    /// method's locals cannot be reconstructed.
    pub fn check(
        &self,
        at: &AtSpec,
        target: TargetMethod<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<Diagnostic>, Cancelled> {
        let Some(point) = self.registry.lookup(&at.value) else {
            return Ok(None);
        };
        if point.needs_locals() && self.locals_context(target, cancel)?.table().is_empty() {
            tracing::debug!(target: "pointcut.resolve", method = %target, "locals unavailable; skipping check");
            return Ok(None);
        }
        match self.resolve(at, target, Mode::First, cancel) {
            Ok(_) => Ok(None),
            Err(ResolveError::Cancelled(cancelled)) => Err(cancelled),
            Err(err) => Ok(Some(Diagnostic::error(
                AT_UNRESOLVED,
                format!("cannot resolve @At(\"{}\") in {target}: {err}", at.value),
                at.span,
            ))),
        }
    }

    /// Source locations of everything `at` resolves to, for navigation.
    ///
    /// Bytecode matches are mapped onto the source mirror by candidate index;
    /// matches without a source counterpart are dropped.
    pub fn navigation_targets(
        &self,
        at: &AtSpec,
        target: TargetMethod<'_>,
        source: &SourceClass,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceMatch>, ResolveError> {
        let results = self.resolve(at, target, Mode::All, cancel)?;
        let Some(mirror_target) = mirror_target(target, source) else {
            tracing::debug!(target: "pointcut.resolve", method = %target, "no source body");
            return Ok(Vec::new());
        };
        let point = self.lookup(at)?;
        let selector = selector_for(point, at, Mode::All)?;
        let Some(mirrored) = mirror::source_matches(point, at, selector.as_ref(), &mirror_target)? else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        Ok(results
            .iter()
            .filter_map(|result| mirrored.get(result.index))
            .filter(|found| seen.insert(found.index))
            .cloned()
            .collect())
    }

    /// [`navigation_targets`](Self::navigation_targets) with the source
    /// class taken from the index.
    pub fn navigate(
        &self,
        at: &AtSpec,
        target: TargetMethod<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceMatch>, ResolveError> {
        match self.index.find_source_class(&target.class.name) {
            Some(source) => self.navigation_targets(at, target, &source, cancel),
            None => Ok(Vec::new()),
        }
    }

    /// Every distinct target `at`'s kind could select in `target`, with
    /// the instruction it would land on as detail.
    pub fn completion_variants(
        &self,
        at: &AtSpec,
        target: TargetMethod<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<CompletionItem>, ResolveError> {
        let results = self.resolve(at, target, Mode::Completion, cancel)?;
        let insns = &target.method.instructions;
        let mut seen = HashSet::new();
        Ok(results
            .into_iter()
            .filter_map(|result| {
                let label = result.element.completion_label()?;
                seen.insert(label.clone()).then(|| {
                    let detail = insns
                        .get(result.insn)
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    CompletionItem::new(label).with_detail(detail)
                })
            })
            .collect())
    }

    /// Completion from the source body alone, for methods whose compiled
    /// form is not available.
    pub fn source_completion_variants(
        &self,
        at: &AtSpec,
        source: &SourceClass,
        method: &SourceMethod,
    ) -> Result<Vec<CompletionItem>, ResolveError> {
        let point = self.lookup(at)?;
        let Some(target) = MirrorTarget::method(source, method) else {
            return Ok(Vec::new());
        };
        let at = completion_spec_of(at);
        let found = mirror::source_matches(point, &at, None, &target)?.unwrap_or_default();
        let mut seen = HashSet::new();
        Ok(found
            .into_iter()
            .filter_map(|found| found.label)
            .filter(|label| seen.insert(label.clone()))
            .map(CompletionItem::new)
            .collect())
    }

    /// Frames and the synthesized local table of `target`, from the cache.
    pub fn analysis(
        &self,
        target: TargetMethod<'_>,
        cancel: &CancellationToken,
    ) -> Result<Arc<MethodAnalysis>, Cancelled> {
        self.cache.analysis(
            &target.class.name,
            target.method,
            &IndexHierarchy(self.index.as_ref()),
            self.index.modification_stamp(),
            cancel,
        )
    }

    fn locals_context<'t>(
        &self,
        target: TargetMethod<'t>,
        cancel: &CancellationToken,
    ) -> Result<LocalsContext<'t>, Cancelled> {
        let analysis = self.analysis(target, cancel)?;
        Ok(LocalsContext::new(
            &target.class.name,
            target.method,
            analysis.generated.clone(),
            self.options.locals,
        ))
    }

    /// Locals live immediately before `insn`.
    pub fn locals_at(
        &self,
        target: TargetMethod<'_>,
        insn: InsnId,
        cancel: &CancellationToken,
    ) -> Result<LocalTable, LocalsError> {
        let ctx = self.locals_context(target, cancel)?;
        locals_at(&ctx, insn, cancel)
    }
}

/// The member selector for `point`, or `None` when every member matches.
fn selector_for(
    point: &InjectionPoint,
    at: &AtSpec,
    mode: Mode,
) -> Result<Option<MemberSelector>, ResolveError> {
    if mode == Mode::Completion || !point.uses_selector() {
        return Ok(None);
    }
    match at.target.as_deref() {
        None if point.requires_target() => Err(ResolveError::MissingTarget(at.value.clone())),
        None => Ok(None),
        Some(text) => MemberSelector::parse(text)
            .map(Some)
            .ok_or_else(|| ResolveError::InvalidSelector(text.to_string())),
    }
}

/// Completion ignores whatever the user has typed so far: the target and
/// the value arguments are dropped, the slice still narrows the method.
fn completion_spec_of(at: &AtSpec) -> AtSpec {
    AtSpec {
        value: at.value.clone(),
        opcode: at.opcode,
        slice: at.slice.clone(),
        span: at.span,
        ..AtSpec::default()
    }
}

fn mirror_target<'s>(target: TargetMethod<'_>, source: &'s SourceClass) -> Option<MirrorTarget<'s>> {
    let method = target.method;
    if is_lambda_method(&method.name) {
        let lambda = find_source_lambda(target.class, source, &method.name, &method.desc)?;
        return MirrorTarget::lambda(source, lambda);
    }
    MirrorTarget::method(source, source.find_method(&method.name, &method.desc)?)
}
