use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{MarkerConfig, ScanConfig};
use crate::error::{ExtractError, Result};
use crate::parser::rust_parser::{RustParser, is_test_file};
use crate::parser::symbols::{ParsedSource, RustFunction, RustImport, RustType};
use crate::registry::{OperationDescriptor, Registry, RoleMarker, SourceLocation, TypeDescriptor};

/// Result of scanning one crate's sources.
#[derive(Debug)]
pub struct ScanOutcome {
    pub crate_name: String,
    pub files_scanned: usize,
    pub registry: Registry,
}

/// Populates a [`Registry`] from Rust sources by parsing them with tree-sitter.
pub struct SourceScanner {
    parser: RustParser,
    markers: MarkerConfig,
    scan: ScanConfig,
}

impl SourceScanner {
    pub fn new(markers: MarkerConfig, scan: ScanConfig) -> Result<Self> {
        Ok(Self {
            parser: RustParser::new()?,
            markers,
            scan,
        })
    }

    pub fn scan(&mut self, root: &Path) -> Result<ScanOutcome> {
        let mut registry = Registry::new();
        let (crate_name, files_scanned) = self.scan_into(root, &mut registry)?;
        Ok(ScanOutcome {
            crate_name,
            files_scanned,
            registry,
        })
    }

    /// Scans the crate at `root` and registers its role-marked types.
    /// Returns the crate name and the number of files parsed.
    pub fn scan_into(&mut self, root: &Path, registry: &mut Registry) -> Result<(String, usize)> {
        if !root.is_dir() {
            return Err(ExtractError::namespace(
                root.display().to_string(),
                "source root is not a directory",
            ));
        }

        let crate_name = resolve_crate_name(root)?;
        let parsed_files = self.parse_crate(root, &crate_name)?;
        let files_scanned = parsed_files.len();

        let sources: Vec<&ParsedSource> = parsed_files.iter().collect();
        let descriptors = CrateIndex::build(&sources).describe_marked(&self.markers);
        info!(
            "Scanned {} files in crate {}: {} role-marked types",
            files_scanned,
            crate_name,
            descriptors.len()
        );
        for descriptor in descriptors {
            registry.register(descriptor);
        }

        Ok((crate_name, files_scanned))
    }

    fn parse_crate(&mut self, root: &Path, crate_name: &str) -> Result<Vec<ParsedSource>> {
        let src_dir = root.join("src");
        let walk_root = if src_dir.is_dir() { src_dir } else { root.to_path_buf() };

        let exclude_dirs = &self.scan.exclude_dirs;
        let walker = WalkDir::new(&walk_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !name.starts_with('.') && !exclude_dirs.iter().any(|d| d.as_str() == name)
            });

        let mut parsed_files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| walk_root.clone());
                match e.into_io_error() {
                    Some(io) => ExtractError::io(path, io),
                    None => ExtractError::namespace(
                        root.display().to_string(),
                        "filesystem loop while walking sources",
                    ),
                }
            })?;

            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "rs") {
                continue;
            }

            let relative = path.strip_prefix(root).unwrap_or(path);
            if !self.scan.include_tests && is_test_file(relative) {
                debug!("Skipping test file {}", relative.display());
                continue;
            }

            let source = std::fs::read_to_string(path).map_err(|e| ExtractError::io(path, e))?;
            let mut parsed = self.parser.parse_source(&source, relative, crate_name)?;
            if parsed.has_errors {
                warn!(
                    "Syntax errors in {}; extracting from the recovered tree",
                    relative.display()
                );
            }

            if !self.scan.include_tests {
                parsed.types.retain(|t| !t.is_test);
                parsed.impls.retain(|i| !i.is_test);
            }
            parsed_files.push(parsed);
        }

        Ok(parsed_files)
    }
}

/// Crate name from `[package].name` in `Cargo.toml`, falling back to the
/// directory name. Dashes become underscores as in `use` paths.
pub fn resolve_crate_name(root: &Path) -> Result<String> {
    let manifest_path = root.join("Cargo.toml");
    if manifest_path.is_file() {
        let content = std::fs::read_to_string(&manifest_path)
            .map_err(|e| ExtractError::io(&manifest_path, e))?;
        let manifest: toml::Value = toml::from_str(&content).map_err(|e| ExtractError::Config {
            path: manifest_path.clone(),
            reason: e.to_string(),
        })?;
        if let Some(name) = manifest
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
        {
            return Ok(name.replace('-', "_"));
        }
    }

    let canonical: PathBuf = root
        .canonicalize()
        .map_err(|e| ExtractError::io(root, e))?;
    canonical
        .file_name()
        .map(|n| n.to_string_lossy().replace('-', "_"))
        .ok_or_else(|| {
            ExtractError::namespace(root.display().to_string(), "cannot derive a crate name")
        })
}

/// Cross-file view of a crate used to attach impl methods to their types
/// and to qualify type names.
struct CrateIndex<'a> {
    sources: &'a [&'a ParsedSource],
    known_types: HashSet<&'a str>,
    by_simple_name: HashMap<&'a str, Vec<&'a str>>,
    /// Imports grouped by the module they are declared in.
    imports: HashMap<&'a str, Vec<&'a RustImport>>,
}

impl<'a> CrateIndex<'a> {
    fn build(sources: &'a [&'a ParsedSource]) -> Self {
        let mut known_types = HashSet::new();
        let mut by_simple_name: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut imports: HashMap<&str, Vec<&RustImport>> = HashMap::new();

        for source in sources {
            for rust_type in &source.types {
                if known_types.insert(rust_type.qualified_name.as_str()) {
                    by_simple_name
                        .entry(rust_type.name.as_str())
                        .or_default()
                        .push(rust_type.qualified_name.as_str());
                }
            }
            for import in &source.imports {
                imports
                    .entry(import.module_path.as_str())
                    .or_default()
                    .push(import);
            }
        }

        Self {
            sources,
            known_types,
            by_simple_name,
            imports,
        }
    }

    fn describe_marked(&self, markers: &MarkerConfig) -> Vec<TypeDescriptor> {
        let mut descriptors: Vec<TypeDescriptor> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for source in self.sources {
            for rust_type in &source.types {
                let roles: BTreeSet<RoleMarker> = rust_type
                    .attributes
                    .iter()
                    .filter_map(|attr| markers.marker_for(attr.name()))
                    .collect();
                if roles.is_empty() {
                    continue;
                }

                debug!("Found {} with markers {:?}", rust_type.qualified_name, roles);
                positions.insert(rust_type.qualified_name.as_str(), descriptors.len());
                descriptors.push(self.type_descriptor(rust_type, roles));
            }
        }

        // impl blocks are visited in file order, then source order
        for source in self.sources {
            for rust_impl in &source.impls {
                let Some(target) = self.resolve_self_type(&rust_impl.self_type, &rust_impl.module_path)
                else {
                    debug!(
                        "Unresolved impl self type {} in {}",
                        rust_impl.self_type, rust_impl.module_path
                    );
                    continue;
                };
                let Some(&index) = positions.get(target) else {
                    continue;
                };

                let self_type = descriptors[index].qualified_name.clone();
                for method in &rust_impl.methods {
                    let operation =
                        self.operation_descriptor(method, &rust_impl.module_path, Some(&self_type));
                    descriptors[index].operations.push(operation);
                }
            }
        }

        descriptors
    }

    fn type_descriptor(&self, rust_type: &RustType, markers: BTreeSet<RoleMarker>) -> TypeDescriptor {
        let self_type = rust_type.qualified_name.as_str();
        let operations = rust_type
            .methods
            .iter()
            .map(|method| self.operation_descriptor(method, &rust_type.module_path, Some(self_type)))
            .collect();

        TypeDescriptor {
            qualified_name: rust_type.qualified_name.clone(),
            kind: rust_type.kind,
            markers,
            attributes: rust_type.attributes.iter().map(|a| a.text.clone()).collect(),
            operations,
            location: Some(SourceLocation {
                file_path: rust_type.file_path.clone(),
                line: rust_type.line_start,
            }),
        }
    }

    fn operation_descriptor(
        &self,
        function: &RustFunction,
        module_path: &str,
        self_type: Option<&str>,
    ) -> OperationDescriptor {
        let return_type = match &function.return_type {
            Some(ty) => self.qualify(ty, module_path, self_type),
            None => "()".to_string(),
        };

        OperationDescriptor {
            name: function.name.clone(),
            return_type,
            parameter_types: function
                .parameters
                .iter()
                .map(|p| self.qualify(&p.param_type, module_path, self_type))
                .collect(),
            attributes: function.attributes.iter().map(|a| a.text.clone()).collect(),
        }
    }

    fn resolve_self_type(&self, path: &str, module_path: &str) -> Option<&'a str> {
        let candidate = self.resolve_path(path, module_path);
        if let Some(known) = self.known_types.get(candidate.as_str()) {
            return Some(*known);
        }

        // Only a bare, unimported name may stand for a type from another
        // module of this crate (glob imports, re-exports).
        if path.contains("::") || self.import_for(path, module_path).is_some() {
            return None;
        }
        match self.by_simple_name.get(path).map(Vec::as_slice) {
            Some([only]) => Some(*only),
            _ => None,
        }
    }

    fn import_for(&self, local_name: &str, module_path: &str) -> Option<&'a RustImport> {
        self.imports
            .get(module_path)
            .and_then(|imports| imports.iter().find(|i| i.local_name == local_name))
            .copied()
    }

    /// Crate-qualified path of an import. Besides `crate`, `self` and `super`
    /// paths, a path starting with a child module of the importing module
    /// (`use model::Order;` in the crate root) is joined onto it.
    fn resolve_import(&self, import: &RustImport) -> String {
        let head = import.path.split("::").next().unwrap_or(&import.path);
        match head {
            "crate" | "self" | "super" => resolve_relative(&import.path, &import.module_path),
            _ if self.is_module(&format!("{}::{}", import.module_path, head)) => {
                format!("{}::{}", import.module_path, import.path)
            }
            _ => import.path.clone(),
        }
    }

    /// Qualifies plain paths; other type expressions are returned unchanged.
    fn qualify(&self, ty: &str, module_path: &str, self_type: Option<&str>) -> String {
        if !is_plain_path(ty) {
            return ty.to_string();
        }
        if ty == "Self" {
            return self_type.unwrap_or(ty).to_string();
        }

        let resolved = self.resolve_path(ty, module_path);
        if resolved != ty || self.known_types.contains(resolved.as_str()) {
            resolved
        } else {
            ty.to_string()
        }
    }

    /// Resolves a path as written in `module_path` to a crate-qualified path
    /// where possible.
    fn resolve_path(&self, path: &str, module_path: &str) -> String {
        let (head, rest) = match path.split_once("::") {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        match head {
            "crate" | "self" | "super" => resolve_relative(path, module_path),
            _ => {
                let base = match self.import_for(head, module_path) {
                    Some(import) => self.resolve_import(import),
                    None => {
                        let local = format!("{}::{}", module_path, head);
                        if self.known_types.contains(local.as_str())
                            || (rest.is_some() && self.is_module(&local))
                        {
                            local
                        } else {
                            return path.to_string();
                        }
                    }
                };
                match rest {
                    Some(rest) => format!("{}::{}", base, rest),
                    None => base,
                }
            }
        }
    }

    fn is_module(&self, path: &str) -> bool {
        self.sources.iter().any(|s| s.module_path == path)
            || self.known_types.iter().any(|t| {
                t.strip_prefix(path)
                    .is_some_and(|rest| rest.starts_with("::"))
            })
    }
}

/// Expands leading `crate`, `self` and `super` segments against `module_path`.
fn resolve_relative(path: &str, module_path: &str) -> String {
    let crate_name = module_path.split("::").next().unwrap_or(module_path);
    let mut base: Vec<&str> = module_path.split("::").collect();
    let mut segments = path.split("::").peekable();

    match segments.peek() {
        Some(&"crate") => {
            segments.next();
            base = vec![crate_name];
        }
        Some(&"self") => {
            segments.next();
        }
        Some(&"super") => {
            while segments.peek() == Some(&"super") {
                segments.next();
                if base.len() > 1 {
                    base.pop();
                }
            }
        }
        _ => return path.to_string(),
    }

    base.extend(segments);
    base.join("::")
}

fn is_plain_path(ty: &str) -> bool {
    !ty.is_empty()
        && ty.split("::").all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
                && chars.all(|c| c.is_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn scanner() -> SourceScanner {
        SourceScanner::new(MarkerConfig::default(), ScanConfig::default()).unwrap()
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_relative("crate::model::Order", "shop::web::api"), "shop::model::Order");
        assert_eq!(resolve_relative("self::Dto", "shop::web"), "shop::web::Dto");
        assert_eq!(resolve_relative("super::Order", "shop::web::api"), "shop::web::Order");
        assert_eq!(resolve_relative("super::super::Order", "shop::web::api"), "shop::Order");
        assert_eq!(resolve_relative("serde_json::Value", "shop"), "serde_json::Value");
    }

    #[test]
    fn test_is_plain_path() {
        assert!(is_plain_path("String"));
        assert!(is_plain_path("crate::model::Order"));
        assert!(!is_plain_path("&str"));
        assert!(!is_plain_path("Vec<Order>"));
        assert!(!is_plain_path("(u8, u8)"));
    }

    #[test]
    fn test_crate_name_from_manifest() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "Cargo.toml",
            "[package]\nname = \"order-service\"\nversion = \"0.1.0\"\n",
        );
        assert_eq!(resolve_crate_name(temp_dir.path()).unwrap(), "order_service");
    }

    #[test]
    fn test_crate_name_falls_back_to_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("billing-core");
        fs::create_dir_all(&root).unwrap();
        assert_eq!(resolve_crate_name(&root).unwrap(), "billing_core");
    }

    #[test]
    fn test_missing_root_is_resolution_failure() {
        let temp_dir = TempDir::new().unwrap();
        let err = scanner().scan(&temp_dir.path().join("absent")).unwrap_err();
        assert!(err.is_namespace_resolution());
    }

    #[test]
    fn test_scan_attaches_methods_across_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "Cargo.toml", "[package]\nname = \"shop\"\nversion = \"0.1.0\"\n");
        write(root, "src/lib.rs", "pub mod model;\npub mod store;\npub mod store_ext;\n");
        write(root, "src/model.rs", "pub struct Order { pub id: u64 }\n");
        write(
            root,
            "src/store.rs",
            r#"
use crate::model::Order;

#[repository]
#[derive(Default)]
pub struct OrderStore {
    orders: Vec<Order>,
}

impl OrderStore {
    pub fn find(&self, id: u64) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    fn insert(&mut self, order: Order) -> Self {
        self.orders.push(order);
        Self::default()
    }
}
"#,
        );
        write(
            root,
            "src/store_ext.rs",
            r#"
use crate::store::OrderStore;

impl OrderStore {
    pub fn count(&self) -> usize {
        0
    }
}
"#,
        );

        let outcome = scanner().scan(root).unwrap();
        assert_eq!(outcome.crate_name, "shop");
        assert_eq!(outcome.files_scanned, 4);

        let store = outcome.registry.get("shop::store::OrderStore").unwrap();
        assert_eq!(store.attributes, vec!["#[repository]", "#[derive(Default)]"]);
        let names: Vec<_> = store.operations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["find", "insert", "count"]);

        let insert = &store.operations[1];
        assert_eq!(insert.parameter_types, vec!["shop::model::Order"]);
        assert_eq!(insert.return_type, "shop::store::OrderStore");
        assert_eq!(store.operations[0].return_type, "Option<&Order>");
        assert_eq!(store.operations[2].return_type, "usize");
        assert!(outcome.registry.get("shop::model::Order").is_none());
    }

    #[test]
    fn test_scan_skips_test_code_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "Cargo.toml", "[package]\nname = \"shop\"\nversion = \"0.1.0\"\n");
        write(
            root,
            "src/lib.rs",
            r#"
#[service]
pub struct Pricing;

#[cfg(test)]
mod tests {
    #[service]
    struct FakePricing;
}
"#,
        );
        write(root, "tests/it.rs", "#[service]\npub struct IntegrationOnly;\n");

        let outcome = scanner().scan(root).unwrap();
        let names: Vec<_> = outcome.registry.iter().map(|t| t.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["shop::Pricing"]);

        let mut including = SourceScanner::new(
            MarkerConfig::default(),
            ScanConfig {
                include_tests: true,
                ..ScanConfig::default()
            },
        )
        .unwrap();
        let outcome = including.scan(root).unwrap();
        assert!(outcome.registry.get("shop::tests::FakePricing").is_some());
    }

    #[test]
    fn test_trait_impl_methods_without_inherited_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "Cargo.toml", "[package]\nname = \"shop\"\nversion = \"0.1.0\"\n");
        write(
            root,
            "src/lib.rs",
            r#"
use std::fmt;

pub trait Audited {
    fn audit(&self) -> String {
        String::new()
    }
    fn label(&self) -> &str;
}

#[component]
pub struct Ledger;

impl Audited for Ledger {
    fn label(&self) -> &str {
        "ledger"
    }
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ledger")
    }
}

impl Ledger {
    fn reset(&mut self) {}
}
"#,
        );

        let outcome = scanner().scan(root).unwrap();
        let ledger = outcome.registry.get("shop::Ledger").unwrap();
        let names: Vec<_> = ledger.operations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["label", "fmt", "reset"]);
        assert_eq!(ledger.operations[2].return_type, "()");
        assert!(ledger.operations[2].parameter_types.is_empty());
        assert!(outcome.registry.get("shop::Audited").is_none());
    }

    #[test]
    fn test_foreign_type_with_local_name_is_not_attached() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "Cargo.toml", "[package]\nname = \"shop\"\nversion = \"0.1.0\"\n");
        write(root, "src/lib.rs", "pub mod api;\npub mod ext;\n");
        write(
            root,
            "src/api.rs",
            r#"
#[service]
pub struct Client;

impl Client {
    pub fn call(&self) {}
}
"#,
        );
        write(
            root,
            "src/ext.rs",
            r#"
use reqwest::Client;

pub trait Ext {
    fn retry(&self);
}

impl Ext for Client {
    fn retry(&self) {}
}
"#,
        );

        let outcome = scanner().scan(root).unwrap();
        let client = outcome.registry.get("shop::api::Client").unwrap();
        let names: Vec<_> = client.operations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["call"]);
    }

    #[test]
    fn test_child_module_import_in_crate_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "Cargo.toml", "[package]\nname = \"shop\"\nversion = \"0.1.0\"\n");
        write(
            root,
            "src/lib.rs",
            r#"
pub mod model;
use model::Order;

#[service]
pub struct Checkout;

impl Checkout {
    pub fn place(&self, order: Order) -> Order {
        order
    }
}

impl Order {
    pub fn total(&self) -> u64 {
        0
    }
}
"#,
        );
        write(root, "src/model.rs", "#[component]\npub struct Order;\n");

        let outcome = scanner().scan(root).unwrap();
        let checkout = outcome.registry.get("shop::Checkout").unwrap();
        assert_eq!(checkout.operations[0].parameter_types, vec!["shop::model::Order"]);
        assert_eq!(checkout.operations[0].return_type, "shop::model::Order");

        let order = outcome.registry.get("shop::model::Order").unwrap();
        let names: Vec<_> = order.operations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["total"]);
    }
}
