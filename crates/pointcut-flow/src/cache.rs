use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use pointcut_classfile::MethodNode;
use pointcut_core::{CancellationToken, Cancelled, ModificationStamp, Stamped};

use crate::analyzer::{analyze, AnalyzeError, Frames};
use crate::hierarchy::TypeHierarchy;
use crate::locals::{generate_table, LocalVariable};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    class: String,
    name: String,
    desc: String,
}

/// Frames and the synthesized local table of one method.
///
/// Both are `None` when the analysis could not run; callers treat that as
/// "unknown" and skip type-dependent checks.
#[derive(Debug, Clone, Default)]
pub struct MethodAnalysis {
    pub frames: Option<Arc<Frames>>,
    pub generated: Option<Arc<[LocalVariable]>>,
}

impl MethodAnalysis {
    pub fn is_available(&self) -> bool {
        self.frames.is_some()
    }
}

/// Memoised per-method analyses, invalidated purely by stamp comparison.
#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: Mutex<HashMap<MethodKey, Stamped<Arc<MethodAnalysis>>>>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analysis(
        &self,
        owner: &str,
        method: &MethodNode,
        hierarchy: &dyn TypeHierarchy,
        stamp: ModificationStamp,
        cancel: &CancellationToken,
    ) -> Result<Arc<MethodAnalysis>, Cancelled> {
        let key = MethodKey {
            class: owner.to_string(),
            name: method.name.clone(),
            desc: method.desc.clone(),
        };
        if let Some(hit) = self
            .entries
            .lock()
            .get(&key)
            .and_then(|entry| entry.get(stamp))
        {
            return Ok(Arc::clone(hit));
        }

        // Computed outside the lock; a racing query may compute the same entry.
        let analysis = match analyze(owner, method, hierarchy, cancel) {
            Ok(frames) => {
                let generated: Arc<[LocalVariable]> = generate_table(method, &frames).into();
                MethodAnalysis {
                    frames: Some(Arc::new(frames)),
                    generated: Some(generated),
                }
            }
            Err(AnalyzeError::Cancelled(cancelled)) => return Err(cancelled),
            Err(err) => {
                tracing::debug!(
                    target: "pointcut.flow",
                    class = owner,
                    method = %format!("{}{}", method.name, method.desc),
                    error = %err,
                    "frame analysis unavailable"
                );
                MethodAnalysis::default()
            }
        };

        let analysis = Arc::new(analysis);
        self.entries
            .lock()
            .insert(key, Stamped::new(Arc::clone(&analysis), stamp));
        Ok(analysis)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
