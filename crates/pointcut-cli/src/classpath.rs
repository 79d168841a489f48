use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use pointcut_resolve::ClassIndex;

/// Classes looked up as `<root>/<internal name>.class` under each root, in
/// order. The inspected class is registered up front so hierarchy queries
/// about it never touch the disk.
#[derive(Debug, Default)]
pub struct ClasspathIndex {
    roots: Vec<PathBuf>,
    /// Bytes by internal name; `None` records a miss.
    loaded: RwLock<HashMap<String, Option<Arc<[u8]>>>>,
}

impl ClasspathIndex {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, internal_name: &str, bytes: Arc<[u8]>) {
        self.loaded
            .write()
            .insert(internal_name.to_string(), Some(bytes));
    }

    fn read(&self, internal_name: &str) -> Option<Arc<[u8]>> {
        let relative = format!("{internal_name}.class");
        self.roots.iter().find_map(|root| {
            let path = root.join(&relative);
            match std::fs::read(&path) {
                Ok(bytes) => {
                    tracing::debug!(target: "pointcut.cli", path = %path.display(), "loaded class");
                    Some(Arc::from(bytes))
                }
                Err(_) => None,
            }
        })
    }
}

impl ClassIndex for ClasspathIndex {
    fn find_compiled_bytes(&self, internal_name: &str) -> Option<Arc<[u8]>> {
        if let Some(known) = self.loaded.read().get(internal_name) {
            return known.clone();
        }
        let bytes = self.read(internal_name);
        self.loaded
            .write()
            .insert(internal_name.to_string(), bytes.clone());
        bytes
    }

    fn find_source_class(&self, _internal_name: &str) -> Option<Arc<pointcut_hir::SourceClass>> {
        None
    }

    fn modification_stamp(&self) -> u64 {
        0
    }
}
