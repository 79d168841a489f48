use pointcut_core::Span;

use crate::body::Body;

const ACC_STATIC: u16 = 0x0008;
const ACC_SYNTHETIC: u16 = 0x1000;

/// The source-side view of a class, as the host's front end resolved it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceClass {
    /// Internal name (`com/example/Foo`).
    pub name: String,
    pub super_name: Option<String>,
    pub fields: Vec<SourceField>,
    pub methods: Vec<SourceMethod>,
    pub span: Span,
}

impl SourceClass {
    pub fn new(name: impl Into<String>) -> Self {
        SourceClass {
            name: name.into(),
            super_name: Some("java/lang/Object".to_string()),
            fields: Vec::new(),
            methods: Vec::new(),
            span: Span::default(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: SourceField) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: SourceMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn find_method(&self, name: &str, desc: &str) -> Option<&SourceMethod> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.desc == desc)
    }

    /// Instance fields whose declarations carry an initializer, in
    /// declaration order. The compiler inlines these into every constructor
    /// that delegates to `super`.
    pub fn initialized_instance_fields(&self) -> impl Iterator<Item = &SourceField> {
        self.fields
            .iter()
            .filter(|field| field.has_initializer && !field.is_static)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceField {
    pub name: String,
    pub desc: String,
    pub is_static: bool,
    pub has_initializer: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceMethod {
    pub name: String,
    pub desc: String,
    pub access: u16,
    /// `None` for abstract and native methods.
    pub body: Option<Body>,
    pub span: Span,
}

impl SourceMethod {
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.access & ACC_SYNTHETIC != 0
    }
}
