use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use pointcut_classfile::ClassNode;
use pointcut_core::ModificationStamp;
use pointcut_flow::TypeHierarchy;
use pointcut_hir::SourceClass;

/// The host's view of the project: compiled classes, resolved source trees
/// and the stamp that changes whenever either does.
pub trait ClassIndex: Send + Sync {
    /// Raw class file bytes for an internal name.
    fn find_compiled_bytes(&self, internal_name: &str) -> Option<Arc<[u8]>>;

    /// The parsed class. Classes whose bytes fail to parse are reported as
    /// missing.
    fn find_class(&self, internal_name: &str) -> Option<Arc<ClassNode>> {
        let bytes = self.find_compiled_bytes(internal_name)?;
        match ClassNode::parse(&bytes) {
            Ok(class) => Some(Arc::new(class)),
            Err(err) => {
                tracing::debug!(target: "pointcut.index", class = internal_name, error = %err, "class file rejected");
                None
            }
        }
    }

    fn find_source_class(&self, internal_name: &str) -> Option<Arc<SourceClass>>;

    fn modification_stamp(&self) -> ModificationStamp;
}

/// Adapts a [`ClassIndex`] for type merging during frame analysis.
#[derive(Clone, Copy)]
pub struct IndexHierarchy<'a>(pub &'a dyn ClassIndex);

impl TypeHierarchy for IndexHierarchy<'_> {
    fn super_class(&self, internal_name: &str) -> Option<String> {
        self.0.find_class(internal_name)?.super_name.clone()
    }

    fn is_interface(&self, internal_name: &str) -> bool {
        self.0
            .find_class(internal_name)
            .is_some_and(|class| class.is_interface())
    }
}

/// An in-memory index. Every insertion bumps the modification stamp.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    bytes: RwLock<HashMap<String, Arc<[u8]>>>,
    classes: RwLock<HashMap<String, Arc<ClassNode>>>,
    sources: RwLock<HashMap<String, Arc<SourceClass>>>,
    stamp: AtomicU64,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and registers a class file under the name it declares.
    pub fn add_class_bytes(&self, bytes: &[u8]) -> pointcut_classfile::Result<Arc<ClassNode>> {
        let class = Arc::new(ClassNode::parse(bytes)?);
        self.bytes
            .write()
            .insert(class.name.clone(), Arc::from(bytes));
        self.classes
            .write()
            .insert(class.name.clone(), Arc::clone(&class));
        self.bump();
        Ok(class)
    }

    /// Registers an already parsed class. It has no bytes.
    pub fn add_class(&self, class: ClassNode) -> Arc<ClassNode> {
        let class = Arc::new(class);
        self.bytes.write().remove(&class.name);
        self.classes
            .write()
            .insert(class.name.clone(), Arc::clone(&class));
        self.bump();
        class
    }

    pub fn add_source(&self, source: SourceClass) -> Arc<SourceClass> {
        let source = Arc::new(source);
        self.sources
            .write()
            .insert(source.name.clone(), Arc::clone(&source));
        self.bump();
        source
    }

    fn bump(&self) {
        self.stamp.fetch_add(1, Ordering::AcqRel);
    }
}

impl ClassIndex for MemoryIndex {
    fn find_compiled_bytes(&self, internal_name: &str) -> Option<Arc<[u8]>> {
        self.bytes.read().get(internal_name).cloned()
    }

    fn find_class(&self, internal_name: &str) -> Option<Arc<ClassNode>> {
        self.classes.read().get(internal_name).cloned()
    }

    fn find_source_class(&self, internal_name: &str) -> Option<Arc<SourceClass>> {
        self.sources.read().get(internal_name).cloned()
    }

    fn modification_stamp(&self) -> ModificationStamp {
        self.stamp.load(Ordering::Acquire)
    }
}
