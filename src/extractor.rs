use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ExtractError, Result};
use crate::model::{ExportDocument, ExportStyle, OperationRecord, TypeRecord};
use crate::parser::SourceScanner;
use crate::registry::{Namespace, Registry, RoleMarker, TypeDescriptor};

/// Discovers role-marked types in a [`Registry`] and turns them into records.
pub struct MetadataExtractor {
    registry: Registry,
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub namespace: Namespace,
    pub output: PathBuf,
    pub types: usize,
    pub operations: usize,
}

impl MetadataExtractor {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Union of the types carrying any role marker under `namespace`,
    /// deduplicated and ordered by qualified name.
    pub fn discover(&self, namespace: &Namespace) -> Vec<&TypeDescriptor> {
        let mut seen = BTreeSet::new();
        let mut discovered = Vec::new();

        for marker in RoleMarker::ALL {
            let annotated = self.registry.types_annotated_with(marker, namespace);
            debug!("{} types marked {} under {}", annotated.len(), marker, namespace);
            for descriptor in annotated {
                if seen.insert(descriptor.qualified_name.as_str()) {
                    discovered.push(descriptor);
                }
            }
        }

        discovered.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        if discovered.is_empty() {
            warn!("No role-marked types found under namespace {}", namespace);
        }
        discovered
    }

    pub fn describe(&self, descriptor: &TypeDescriptor) -> TypeRecord {
        TypeRecord {
            qualified_name: descriptor.qualified_name.clone(),
            role_markers: descriptor.attributes.clone(),
            operations: descriptor
                .operations
                .iter()
                .map(|op| OperationRecord {
                    name: op.name.clone(),
                    return_type: op.return_type.clone(),
                    parameter_types: op.parameter_types.clone(),
                    role_markers: op.attributes.clone(),
                })
                .collect(),
        }
    }

    /// discover followed by describe for every discovered type.
    pub fn extract(&self, namespace: &Namespace) -> ExportDocument {
        let records = self
            .discover(namespace)
            .into_iter()
            .map(|descriptor| self.describe(descriptor))
            .collect::<Vec<_>>();
        ExportDocument::new(records)
    }
}

/// Writes the document to `path`, replacing any previous content, and prints
/// a completion line. The document is written to a sibling temporary file
/// first and renamed into place, so a failed export never leaves a partial
/// sink behind.
pub fn export(document: &ExportDocument, path: &Path, style: ExportStyle) -> Result<()> {
    let json = document.to_json(style)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| {
            ExtractError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "output path has no file name"),
            )
        })?
        .to_string_lossy();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let write_result = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(ExtractError::io(path, e));
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(ExtractError::io(path, e));
    }

    info!(
        "Exported {} types ({} operations) to {}",
        document.len(),
        document.operation_count(),
        path.display()
    );
    println!("Metadata exported to {}", path.display());
    Ok(())
}

/// Scans the current directory and exports to `internal_metadata.json`.
pub fn run() -> Result<ExportSummary> {
    run_with_config(&Config::default())
}

pub fn run_with_config(config: &Config) -> Result<ExportSummary> {
    run_with(Registry::new(), config)
}

/// Runs the pipeline over `registry` extended with the scanned sources, so
/// types registered through [`crate::registry::Discoverable`] are exported
/// alongside the ones found on disk.
pub fn run_with(registry: Registry, config: &Config) -> Result<ExportSummary> {
    let (extractor, namespace) = prepare_with(registry, config)?;
    let document = extractor.extract(&namespace);
    export(&document, &config.export.output, config.export.style)?;

    Ok(ExportSummary {
        namespace,
        output: config.export.output.clone(),
        types: document.len(),
        operations: document.operation_count(),
    })
}

/// Scans the configured source root and resolves the namespace to search.
pub fn prepare(config: &Config) -> Result<(MetadataExtractor, Namespace)> {
    prepare_with(Registry::new(), config)
}

pub fn prepare_with(
    mut registry: Registry,
    config: &Config,
) -> Result<(MetadataExtractor, Namespace)> {
    let mut scanner = SourceScanner::new(config.markers.clone(), config.scan.clone())?;
    let (crate_name, files_scanned) = scanner.scan_into(&config.source.root, &mut registry)?;
    let namespace = Namespace::parse(config.namespace_or(&crate_name))?;
    info!(
        "Searching namespace {} in {} ({} files, {} registered types)",
        namespace,
        config.source.root.display(),
        files_scanned,
        registry.len()
    );

    Ok((MetadataExtractor::new(registry), namespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{OperationDescriptor, TypeKind};
    use tempfile::TempDir;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            TypeDescriptor::new("app::billing::Invoices", TypeKind::Struct)
                .with_marker(RoleMarker::Service)
                .with_marker(RoleMarker::Repository)
                .with_operation(
                    OperationDescriptor::new("issue", "app::billing::Invoice")
                        .with_parameter("u64")
                        .with_attribute("#[transactional]"),
                ),
        );
        registry.register(
            TypeDescriptor::new("app::api::Gateway", TypeKind::Struct)
                .with_marker(RoleMarker::RequestHandler),
        );
        registry.register(
            TypeDescriptor::new("other::Clock", TypeKind::Struct).with_marker(RoleMarker::Component),
        );
        registry
    }

    #[test]
    fn test_discover_deduplicates_and_sorts() {
        let extractor = MetadataExtractor::new(registry());
        let ns = Namespace::parse("app").unwrap();

        let names: Vec<_> = extractor
            .discover(&ns)
            .iter()
            .map(|d| d.qualified_name.as_str())
            .collect();
        assert_eq!(names, vec!["app::api::Gateway", "app::billing::Invoices"]);
    }

    #[test]
    fn test_discover_unknown_namespace_is_empty() {
        let extractor = MetadataExtractor::new(registry());
        let ns = Namespace::parse("nowhere").unwrap();
        assert!(extractor.discover(&ns).is_empty());
        assert!(extractor.extract(&ns).is_empty());
    }

    #[test]
    fn test_describe_is_stable() {
        let extractor = MetadataExtractor::new(registry());
        let invoices = extractor.registry().get("app::billing::Invoices").unwrap();

        let first = extractor.describe(invoices);
        let second = extractor.describe(invoices);
        assert_eq!(first, second);
        assert_eq!(first.role_markers, vec!["#[service]", "#[repository]"]);
        assert_eq!(first.operations[0].return_type, "app::billing::Invoice");
        assert_eq!(first.operations[0].parameter_types, vec!["u64"]);
        assert_eq!(first.operations[0].role_markers, vec!["#[transactional]"]);
    }

    #[test]
    fn test_export_replaces_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("internal_metadata.json");
        fs::write(&path, "stale content").unwrap();

        let extractor = MetadataExtractor::new(registry());
        let document = extractor.extract(&Namespace::parse("app").unwrap());
        export(&document, &path, ExportStyle::Structured).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let parsed = ExportDocument::from_json(&written).unwrap();
        assert_eq!(parsed, document);
        assert!(!temp_dir.path().join(".internal_metadata.json.tmp").exists());
    }

    #[test]
    fn test_export_empty_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.json");
        export(&ExportDocument::default(), &path, ExportStyle::Flattened).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "[]");
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("out.json");

        let err = export(&ExportDocument::default(), &path, ExportStyle::Structured).unwrap_err();
        assert!(err.is_io());
        assert!(!path.exists());
    }
}
