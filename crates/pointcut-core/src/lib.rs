//! Core shared types for pointcut.
//!
//! This crate is intentionally small: spans and diagnostics handed back to the
//! host, cooperative cancellation, and the modification stamps used to key
//! analysis caches.

mod cancel;
mod diagnostic;
mod names;
mod stamp;

pub use crate::cancel::{CancellationToken, Cancelled};
pub use crate::diagnostic::{CompletionItem, Diagnostic, Severity, Span};
pub use crate::names::{dotted_to_internal, internal_to_dotted, simple_name};
pub use crate::stamp::{ModificationStamp, Stamped};
