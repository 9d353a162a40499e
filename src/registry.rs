use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{ExtractError, Result};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(r#)?[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Architectural category a type declares through an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleMarker {
    Service,
    Component,
    Repository,
    RequestHandler,
}

impl RoleMarker {
    pub const ALL: [RoleMarker; 4] = [
        RoleMarker::Service,
        RoleMarker::Component,
        RoleMarker::Repository,
        RoleMarker::RequestHandler,
    ];

    /// Attribute name used when rendering a descriptor built in code.
    pub fn attribute_name(&self) -> &'static str {
        match self {
            RoleMarker::Service => "service",
            RoleMarker::Component => "component",
            RoleMarker::Repository => "repository",
            RoleMarker::RequestHandler => "controller",
        }
    }
}

impl fmt::Display for RoleMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoleMarker::Service => "service",
            RoleMarker::Component => "component",
            RoleMarker::Repository => "repository",
            RoleMarker::RequestHandler => "request_handler",
        };
        f.write_str(label)
    }
}

/// A module path prefix such as `com::example::demo`.
///
/// Both `::` and `.` are accepted as separators when parsing, so
/// `com.example.demo` names the same namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    segments: Vec<String>,
}

impl Namespace {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ExtractError::namespace(raw, "namespace is empty"));
        }

        let segments: Vec<String> = if trimmed.contains("::") {
            trimmed.split("::").map(|s| s.trim().to_string()).collect()
        } else {
            trimmed.split('.').map(|s| s.trim().to_string()).collect()
        };

        for segment in &segments {
            if segment.is_empty() {
                return Err(ExtractError::namespace(raw, "namespace contains an empty segment"));
            }
            if !IDENTIFIER.is_match(segment) || segment == "_" {
                return Err(ExtractError::namespace(
                    raw,
                    format!("'{}' is not a valid module name", segment),
                ));
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Segment-wise prefix test: `demo` contains `demo::web::Api` but not `demo2::Api`.
    pub fn contains(&self, qualified_name: &str) -> bool {
        let mut parts = qualified_name.split("::");
        self.segments
            .iter()
            .all(|segment| parts.next() == Some(segment.as_str()))
    }
}

impl FromStr for Namespace {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("::"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Struct,
    Enum,
    Trait,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file_path: String,
    pub line: usize,
}

/// Everything known about one discoverable type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub qualified_name: String,
    pub kind: TypeKind,
    pub markers: BTreeSet<RoleMarker>,
    /// Rendered attributes in source order, e.g. `#[derive(Debug)]`.
    pub attributes: Vec<String>,
    pub operations: Vec<OperationDescriptor>,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: String,
    pub return_type: String,
    pub parameter_types: Vec<String>,
    pub attributes: Vec<String>,
}

impl TypeDescriptor {
    pub fn new(qualified_name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            kind,
            markers: BTreeSet::new(),
            attributes: Vec::new(),
            operations: Vec::new(),
            location: None,
        }
    }

    /// Adds the marker together with its rendered attribute.
    pub fn with_marker(mut self, marker: RoleMarker) -> Self {
        self.markers.insert(marker);
        self.attributes.push(format!("#[{}]", marker.attribute_name()));
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn with_operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn name(&self) -> &str {
        self.qualified_name
            .rsplit("::")
            .next()
            .unwrap_or(&self.qualified_name)
    }
}

impl OperationDescriptor {
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            parameter_types: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter_type: impl Into<String>) -> Self {
        self.parameter_types.push(parameter_type.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }
}

/// Implemented by types that register themselves explicitly instead of
/// being found by the source scanner.
pub trait Discoverable {
    fn descriptor() -> TypeDescriptor;
}

/// Discoverable types keyed by qualified name and indexed by role marker.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    types: BTreeMap<String, TypeDescriptor>,
    by_marker: BTreeMap<RoleMarker, BTreeSet<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor. Registering the same qualified name twice
    /// merges markers, attributes and operations into the first entry.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        for marker in &descriptor.markers {
            self.by_marker
                .entry(*marker)
                .or_default()
                .insert(descriptor.qualified_name.clone());
        }

        match self.types.get_mut(&descriptor.qualified_name) {
            Some(existing) => {
                tracing::debug!(
                    "Merging duplicate registration of {}",
                    descriptor.qualified_name
                );
                existing.markers.extend(descriptor.markers);
                for attribute in descriptor.attributes {
                    if !existing.attributes.contains(&attribute) {
                        existing.attributes.push(attribute);
                    }
                }
                for operation in descriptor.operations {
                    if !existing.operations.contains(&operation) {
                        existing.operations.push(operation);
                    }
                }
                if existing.location.is_none() {
                    existing.location = descriptor.location;
                }
            }
            None => {
                self.types
                    .insert(descriptor.qualified_name.clone(), descriptor);
            }
        }
    }

    pub fn register_type<T: Discoverable>(&mut self) {
        self.register(T::descriptor());
    }

    pub fn get(&self, qualified_name: &str) -> Option<&TypeDescriptor> {
        self.types.get(qualified_name)
    }

    /// Descriptors carrying `marker` under `namespace`, ordered by qualified name.
    pub fn types_annotated_with(
        &self,
        marker: RoleMarker,
        namespace: &Namespace,
    ) -> Vec<&TypeDescriptor> {
        self.by_marker
            .get(&marker)
            .into_iter()
            .flatten()
            .filter(|name| namespace.contains(name))
            .filter_map(|name| self.types.get(name))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
