use pointcut_core::Cancelled;
use thiserror::Error;

/// Diagnostic code reported for an `@At` that does not resolve.
pub const AT_UNRESOLVED: &str = "AT_UNRESOLVED";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown injection point `{0}`")]
    UnknownInjectionPoint(String),
    #[error("injection point `{0}` requires a target")]
    MissingTarget(String),
    #[error("invalid target selector `{0}`")]
    InvalidSelector(String),
    #[error("invalid value `{value}` for `{key}`")]
    InvalidArgument { key: String, value: String },
    #[error("no matching instruction{}", blame_suffix(.blamed_filter))]
    NoMatch { blamed_filter: Option<String> },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl ResolveError {
    pub(crate) fn invalid_argument(key: &str, value: &str) -> Self {
        ResolveError::InvalidArgument {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

fn blame_suffix(blamed: &Option<String>) -> String {
    match blamed {
        Some(filter) => format!(" (all candidates rejected by the {filter} filter)"),
        None => String::new(),
    }
}
