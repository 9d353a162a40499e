use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, Tree};

use crate::error::{ExtractError, Result};
use crate::parser::symbols::*;
use crate::registry::TypeKind;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

pub struct RustParser {
    parser: Parser,
    queries: QuerySet,
}

struct QuerySet {
    type_query: Query,
    impl_query: Query,
    use_query: Query,
}

impl RustParser {
    pub fn new() -> Result<Self> {
        let language = tree_sitter_rust::language();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ExtractError::parse("<grammar>", format!("Failed to set language: {}", e)))?;

        let queries = QuerySet::new(&language)?;

        Ok(Self { parser, queries })
    }

    pub fn parse_file(&mut self, file_path: &Path, crate_name: &str) -> Result<ParsedSource> {
        let source =
            std::fs::read_to_string(file_path).map_err(|e| ExtractError::io(file_path, e))?;

        self.parse_source(&source, file_path, crate_name)
    }

    /// Parses one file. `file_path` is used for the module path, so pass it
    /// relative to the crate root (`src/web/mod.rs`) when possible.
    pub fn parse_source(
        &mut self,
        source: &str,
        file_path: &Path,
        crate_name: &str,
    ) -> Result<ParsedSource> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ExtractError::parse(file_path, "tree-sitter produced no syntax tree"))?;

        let module_path = infer_module_path(file_path, crate_name);
        let is_test = is_test_file(file_path);
        let source_bytes = source.as_bytes();

        let mut parsed = ParsedSource::new(module_path.clone());
        parsed.has_errors = tree.root_node().has_error();
        parsed.types =
            self.extract_types(&tree, source_bytes, file_path, &module_path, is_test)?;
        parsed.impls =
            self.extract_impls(&tree, source_bytes, file_path, &module_path, is_test)?;
        parsed.imports = self.extract_imports(&tree, source_bytes, &module_path)?;

        Ok(parsed)
    }

    fn extract_types(
        &self,
        tree: &Tree,
        source: &[u8],
        file_path: &Path,
        file_module: &str,
        is_test_file: bool,
    ) -> Result<Vec<RustType>> {
        let mut types = Vec::new();
        let mut cursor = QueryCursor::new();
        let capture_names = self.queries.type_query.capture_names();

        for query_match in cursor.matches(&self.queries.type_query, tree.root_node(), source) {
            let mut captures: HashMap<&str, Node> = HashMap::new();
            for capture in query_match.captures {
                captures.insert(capture_names[capture.index as usize], capture.node);
            }

            let (item, kind) = if let Some(node) = captures.get("struct") {
                (*node, TypeKind::Struct)
            } else if let Some(node) = captures.get("enum") {
                (*node, TypeKind::Enum)
            } else if let Some(node) = captures.get("trait") {
                (*node, TypeKind::Trait)
            } else {
                continue;
            };
            let Some(name_node) = captures.get("name") else {
                continue;
            };

            if has_ancestor(item, "function_item") {
                continue;
            }

            let name = name_node.utf8_text(source)?.to_string();
            let module_path = module_path_of(item, source, file_module)?;
            let methods = if kind == TypeKind::Trait {
                self.extract_body_functions(item, source)?
            } else {
                Vec::new()
            };

            types.push(RustType {
                qualified_name: format!("{}::{}", module_path, name),
                name,
                module_path,
                kind,
                visibility: visibility_of(item, source)?,
                attributes: outer_attributes(item, source)?,
                methods,
                file_path: file_path.to_string_lossy().to_string(),
                line_start: item.start_position().row + 1,
                line_end: item.end_position().row + 1,
                is_test: is_test_file || in_test_module(item, source)?,
            });
        }

        Ok(types)
    }

    fn extract_impls(
        &self,
        tree: &Tree,
        source: &[u8],
        file_path: &Path,
        file_module: &str,
        is_test_file: bool,
    ) -> Result<Vec<RustImpl>> {
        let mut impls = Vec::new();
        let mut cursor = QueryCursor::new();
        let capture_names = self.queries.impl_query.capture_names();

        for query_match in cursor.matches(&self.queries.impl_query, tree.root_node(), source) {
            let mut captures: HashMap<&str, Node> = HashMap::new();
            for capture in query_match.captures {
                captures.insert(capture_names[capture.index as usize], capture.node);
            }

            let (Some(impl_node), Some(type_node)) = (captures.get("impl"), captures.get("self_type"))
            else {
                continue;
            };
            if has_ancestor(*impl_node, "function_item") {
                continue;
            }

            // `impl Trait for &Foo` and friends have no nameable self type
            let Some(self_type) = base_type_path(*type_node, source)? else {
                tracing::trace!(
                    "Skipping impl with unsupported self type at {}:{}",
                    file_path.display(),
                    impl_node.start_position().row + 1
                );
                continue;
            };

            let trait_name = match impl_node.child_by_field_name("trait") {
                Some(node) => Some(normalize(node.utf8_text(source)?)),
                None => None,
            };

            impls.push(RustImpl {
                self_type,
                trait_name,
                module_path: module_path_of(*impl_node, source, file_module)?,
                methods: self.extract_body_functions(*impl_node, source)?,
                file_path: file_path.to_string_lossy().to_string(),
                line_start: impl_node.start_position().row + 1,
                is_test: is_test_file || in_test_module(*impl_node, source)?,
            });
        }

        Ok(impls)
    }

    fn extract_imports(
        &self,
        tree: &Tree,
        source: &[u8],
        file_module: &str,
    ) -> Result<Vec<RustImport>> {
        let mut imports = Vec::new();
        let mut cursor = QueryCursor::new();
        let capture_names = self.queries.use_query.capture_names();

        for query_match in cursor.matches(&self.queries.use_query, tree.root_node(), source) {
            let mut declaration = None;
            let mut argument = None;
            for capture in query_match.captures {
                match capture_names[capture.index as usize] {
                    "use" => declaration = Some(capture.node),
                    "argument" => argument = Some(capture.node),
                    _ => {}
                }
            }

            let (Some(declaration), Some(argument)) = (declaration, argument) else {
                continue;
            };
            if has_ancestor(declaration, "function_item") {
                continue;
            }

            let module_path = module_path_of(declaration, source, file_module)?;
            flatten_use_tree(argument, source, "", &module_path, &mut imports)?;
        }

        Ok(imports)
    }

    /// Functions declared directly in the `body` of an impl or trait item.
    fn extract_body_functions(&self, item: Node, source: &[u8]) -> Result<Vec<RustFunction>> {
        let mut functions = Vec::new();
        let Some(body) = item.child_by_field_name("body") else {
            return Ok(functions);
        };

        let mut walker = body.walk();
        for child in body.named_children(&mut walker) {
            if matches!(child.kind(), "function_item" | "function_signature_item") {
                if let Some(function) = parse_function_node(child, source)? {
                    functions.push(function);
                }
            }
        }

        Ok(functions)
    }
}

fn parse_function_node(function_node: Node, source: &[u8]) -> Result<Option<RustFunction>> {
    let Some(name_node) = function_node.child_by_field_name("name") else {
        return Ok(None);
    };

    let mut parameters = Vec::new();
    if let Some(params_node) = function_node.child_by_field_name("parameters") {
        let mut walker = params_node.walk();
        for child in params_node.named_children(&mut walker) {
            // self_parameter is the receiver, not an operation parameter
            if child.kind() != "parameter" {
                continue;
            }
            let Some(type_node) = child.child_by_field_name("type") else {
                continue;
            };
            let name = match child.child_by_field_name("pattern") {
                Some(pattern) => normalize(pattern.utf8_text(source)?),
                None => String::new(),
            };
            // `self: Box<Self>` parses as a regular parameter
            if name == "self" || name == "mut self" {
                continue;
            }
            parameters.push(Parameter {
                name,
                param_type: normalize(type_node.utf8_text(source)?),
            });
        }
    }

    let return_type = match function_node.child_by_field_name("return_type") {
        Some(node) => Some(normalize(node.utf8_text(source)?)),
        None => None,
    };

    Ok(Some(RustFunction {
        name: name_node.utf8_text(source)?.to_string(),
        visibility: visibility_of(function_node, source)?,
        parameters,
        return_type,
        attributes: outer_attributes(function_node, source)?,
        has_body: function_node.child_by_field_name("body").is_some(),
        line_start: function_node.start_position().row + 1,
    }))
}

/// Attribute items directly preceding `node`, in source order. Comments
/// between attributes are skipped.
fn outer_attributes(node: Node, source: &[u8]) -> Result<Vec<Attribute>> {
    let mut attributes = Vec::new();
    let mut current = node.prev_sibling();

    while let Some(sibling) = current {
        match sibling.kind() {
            "attribute_item" => attributes.push(parse_attribute(sibling, source)?),
            "line_comment" | "block_comment" => {}
            _ => break,
        }
        current = sibling.prev_sibling();
    }

    attributes.reverse();
    Ok(attributes)
}

fn parse_attribute(node: Node, source: &[u8]) -> Result<Attribute> {
    let text = normalize(node.utf8_text(source)?);

    let mut walker = node.walk();
    let path = node
        .named_children(&mut walker)
        .find(|child| child.kind() == "attribute")
        .and_then(|attribute| attribute.named_child(0))
        .map(|path_node| path_node.utf8_text(source))
        .transpose()?
        .map(strip_whitespace)
        .unwrap_or_else(|| {
            text.trim_start_matches("#[")
                .trim_end_matches(']')
                .split(['(', '=', ' '])
                .next()
                .unwrap_or_default()
                .to_string()
        });

    Ok(Attribute { text, path })
}

fn visibility_of(node: Node, source: &[u8]) -> Result<String> {
    let mut walker = node.walk();
    let visibility = node
        .children(&mut walker)
        .find(|child| child.kind() == "visibility_modifier");
    match visibility {
        Some(vis) => Ok(normalize(vis.utf8_text(source)?)),
        None => Ok("private".to_string()),
    }
}

/// Path of the self type without generic arguments. `None` for references,
/// tuples, arrays and other types that cannot own declared operations.
fn base_type_path(node: Node, source: &[u8]) -> Result<Option<String>> {
    match node.kind() {
        "type_identifier" | "scoped_type_identifier" => {
            Ok(Some(strip_whitespace(node.utf8_text(source)?)))
        }
        "generic_type" => match node.child_by_field_name("type") {
            Some(inner) => base_type_path(inner, source),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

fn has_ancestor(node: Node, kind: &str) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.kind() == kind {
            return true;
        }
        current = parent.parent();
    }
    false
}

/// File module path extended by the inline `mod` blocks enclosing `node`.
fn module_path_of(node: Node, source: &[u8], file_module: &str) -> Result<String> {
    let mut inline_modules = Vec::new();
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.kind() == "mod_item" {
            if let Some(name) = parent.child_by_field_name("name") {
                inline_modules.push(name.utf8_text(source)?);
            }
        }
        current = parent.parent();
    }

    let mut module_path = file_module.to_string();
    for name in inline_modules.iter().rev() {
        module_path.push_str("::");
        module_path.push_str(name);
    }
    Ok(module_path)
}

fn in_test_module(node: Node, source: &[u8]) -> Result<bool> {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.kind() == "mod_item" {
            let attributes = outer_attributes(parent, source)?;
            if attributes
                .iter()
                .any(|attr| strip_whitespace(&attr.text) == "#[cfg(test)]")
            {
                return Ok(true);
            }
        }
        current = parent.parent();
    }
    Ok(false)
}

fn flatten_use_tree(
    node: Node,
    source: &[u8],
    prefix: &str,
    module_path: &str,
    imports: &mut Vec<RustImport>,
) -> Result<()> {
    match node.kind() {
        "identifier" | "scoped_identifier" | "self" | "crate" | "super" => {
            let text = strip_whitespace(node.utf8_text(source)?);
            let (path, local_name) = if text == "self" {
                // `use a::b::{self}` imports `b`
                let local = prefix.rsplit("::").next().unwrap_or(prefix).to_string();
                (prefix.to_string(), local)
            } else {
                let path = join_path(prefix, &text);
                let local = text.rsplit("::").next().unwrap_or(&text).to_string();
                (path, local)
            };
            if !local_name.is_empty() && local_name != "crate" && local_name != "super" {
                imports.push(RustImport {
                    local_name,
                    path,
                    module_path: module_path.to_string(),
                });
            }
        }
        "use_as_clause" => {
            let (Some(path_node), Some(alias_node)) = (
                node.child_by_field_name("path"),
                node.child_by_field_name("alias"),
            ) else {
                return Ok(());
            };
            let alias = alias_node.utf8_text(source)?;
            if alias != "_" {
                imports.push(RustImport {
                    local_name: alias.to_string(),
                    path: join_path(prefix, &strip_whitespace(path_node.utf8_text(source)?)),
                    module_path: module_path.to_string(),
                });
            }
        }
        "scoped_use_list" => {
            let nested_prefix = match node.child_by_field_name("path") {
                Some(path_node) => join_path(prefix, &strip_whitespace(path_node.utf8_text(source)?)),
                None => prefix.to_string(),
            };
            if let Some(list) = node.child_by_field_name("list") {
                flatten_use_tree(list, source, &nested_prefix, module_path, imports)?;
            }
        }
        "use_list" => {
            let mut walker = node.walk();
            for child in node.named_children(&mut walker) {
                flatten_use_tree(child, source, prefix, module_path, imports)?;
            }
        }
        // globs cannot be resolved without the target module
        _ => {}
    }
    Ok(())
}

fn join_path(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}::{}", prefix, path)
    }
}

fn normalize(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Module path of a file, e.g. `src/web/mod.rs` in crate `demo` is `demo::web`.
pub fn infer_module_path(file_path: &Path, crate_name: &str) -> String {
    let normalized_crate = crate_name.replace('-', "_");
    let path_str = file_path.to_string_lossy().replace('\\', "/");

    let relative = if let Some(rest) = path_str.strip_prefix("src/") {
        rest.to_string()
    } else if let Some(pos) = path_str.rfind("/src/") {
        path_str[pos + "/src/".len()..].to_string()
    } else if file_path.is_absolute() {
        file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    } else {
        path_str.trim_start_matches("./").to_string()
    };

    let without_ext = relative.trim_end_matches(".rs");
    let mut segments: Vec<&str> = without_ext
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if segments.last() == Some(&"mod") {
        segments.pop();
    }
    if segments.len() == 1 && (segments[0] == "lib" || segments[0] == "main") {
        segments.clear();
    }

    if segments.is_empty() {
        normalized_crate
    } else {
        format!("{}::{}", normalized_crate, segments.join("::"))
    }
}

pub fn is_test_file(file_path: &Path) -> bool {
    if file_path
        .components()
        .any(|c| matches!(c.as_os_str().to_str(), Some("tests" | "examples" | "benches")))
    {
        return true;
    }

    if let Some(file_name) = file_path.file_name() {
        let name = file_name.to_string_lossy();
        if name.ends_with("_test.rs")
            || name.ends_with("_tests.rs")
            || name == "test.rs"
            || name == "tests.rs"
        {
            return true;
        }
    }

    false
}

impl QuerySet {
    fn new(language: &Language) -> Result<Self> {
        let compile = |pattern: &str| {
            Query::new(language, pattern)
                .map_err(|e| ExtractError::parse("<query>", format!("Invalid query: {}", e)))
        };

        let type_query = compile(
            r#"
            [
              (struct_item name: (type_identifier) @name) @struct
              (enum_item name: (type_identifier) @name) @enum
              (trait_item name: (type_identifier) @name) @trait
            ]
            "#,
        )?;

        let impl_query = compile(
            r#"
            (impl_item
              type: (_) @self_type
            ) @impl
            "#,
        )?;

        let use_query = compile(
            r#"
            (use_declaration
              argument: (_) @argument
            ) @use
            "#,
        )?;

        Ok(Self {
            type_query,
            impl_query,
            use_query,
        })
    }
}
