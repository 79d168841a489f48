use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the host and a running query.
///
/// Cloning is cheap; all clones observe the same flag. Child tokens are
/// cancelled together with their parent but can also be cancelled on their
/// own.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.load(Ordering::SeqCst))
    }

    pub fn child_token(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }
}

/// Marker error for a query that observed its cancellation token.
///
/// Cancellation is never an analysis failure: every layer propagates it with
/// `?` instead of degrading to "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request cancelled")]
pub struct Cancelled;

impl Cancelled {
    #[inline]
    pub fn check(token: &CancellationToken) -> Result<(), Cancelled> {
        if token.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
