//! Resolution of `@At` injection points against compiled methods.
//!
//! An [`AtSpec`] names an injection point by its symbolic code (`INVOKE`,
//! `FIELD`, `RETURN`, ...) and refines it with a target selector, an ordinal,
//! a slice and a shift. [`AtResolver`] looks the code up in a
//! [`HandlerRegistry`], walks the target method's instructions with the
//! matching visitor and threads every candidate through the shift, slice and
//! ordinal filters. The same kinds can be replayed over a resolved source
//! body (see [`mirror`]) to map bytecode matches back to source for
//! navigation.

mod at;
mod collect;
mod error;
mod index;
mod lambda;
mod locals;
pub mod mirror;
mod points;
mod registry;
mod resolver;
mod selector;

pub use crate::at::{AtSpec, Shift, SliceSpec};
pub use crate::collect::{
    Collector, ConstantValue, Decoration, Element, MatchResult, Mode, OrdinalFilter,
    ResultFilter, SliceFilter,
};
pub use crate::error::{ResolveError, AT_UNRESOLVED};
pub use crate::index::{ClassIndex, IndexHierarchy, MemoryIndex};
pub use crate::lambda::{find_source_lambda, is_lambda_method, LambdaSource};
pub use crate::locals::LocalDiscriminator;
pub use crate::mirror::{source_matches, MirrorTarget, SourceElement, SourceMatch};
pub use crate::points::PointContext;
pub use crate::registry::{CustomInjectionPoint, HandlerRegistry, InjectionPoint};
pub use crate::resolver::{AtResolver, ResolverOptions, TargetMethod};
pub use crate::selector::MemberSelector;
