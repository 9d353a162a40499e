use serde::{Deserialize, Serialize};

use crate::registry::TypeKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedSource {
    pub module_path: String,
    pub types: Vec<RustType>,
    pub impls: Vec<RustImpl>,
    pub imports: Vec<RustImport>,
    /// Tree-sitter recovered from at least one syntax error.
    pub has_errors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RustType {
    pub name: String,
    pub qualified_name: String,
    pub module_path: String,
    pub kind: TypeKind,
    pub visibility: String,
    pub attributes: Vec<Attribute>,
    /// Methods declared in a trait body. Empty for structs and enums.
    pub methods: Vec<RustFunction>,
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub is_test: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RustImpl {
    /// Self type path without generic arguments, e.g. `Foo` or `crate::a::Foo`.
    pub self_type: String,
    pub trait_name: Option<String>,
    pub module_path: String,
    pub methods: Vec<RustFunction>,
    pub file_path: String,
    pub line_start: usize,
    pub is_test: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RustFunction {
    pub name: String,
    pub visibility: String,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub attributes: Vec<Attribute>,
    pub has_body: bool,
    pub line_start: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: String,
}

/// An outer attribute such as `#[controller(path = "/hello")]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Source text with whitespace runs collapsed.
    pub text: String,
    /// Attribute path, e.g. `controller` or `stereotype::service`.
    pub path: String,
}

impl Attribute {
    /// Last path segment, which is what role markers are matched against.
    pub fn name(&self) -> &str {
        self.path.rsplit("::").next().unwrap_or(&self.path)
    }
}

/// One name brought into scope by a `use` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RustImport {
    /// Name visible in the importing module (the alias when renamed).
    pub local_name: String,
    /// Path as written, possibly starting with `crate`, `self` or `super`.
    pub path: String,
    pub module_path: String,
}

impl ParsedSource {
    pub fn new(module_path: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            ..Self::default()
        }
    }
}
