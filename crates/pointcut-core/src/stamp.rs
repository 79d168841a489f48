/// Monotonically increasing modification counter published by the host.
///
/// Whenever compiled bytes or source trees change, the host bumps the stamp;
/// cached analysis results recorded under an older stamp are never read again.
pub type ModificationStamp = u64;

/// A cached value together with the stamp it was computed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped<T> {
    pub value: T,
    pub stamp: ModificationStamp,
}

impl<T> Stamped<T> {
    pub fn new(value: T, stamp: ModificationStamp) -> Self {
        Self { value, stamp }
    }

    /// Returns the value only if it was computed under `stamp`.
    pub fn get(&self, stamp: ModificationStamp) -> Option<&T> {
        (self.stamp == stamp).then_some(&self.value)
    }

    pub fn is_current(&self, stamp: ModificationStamp) -> bool {
        self.stamp == stamp
    }
}
