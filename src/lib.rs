pub mod config;
pub mod error;
pub mod extractor;
pub mod model;
pub mod parser;
pub mod registry;

pub use config::Config;
pub use error::{ExtractError, Result};
pub use extractor::{
    ExportSummary, MetadataExtractor, export, prepare, prepare_with, run, run_with, run_with_config,
};
pub use model::{ExportDocument, ExportStyle, OperationRecord, TypeRecord};
pub use parser::{RustParser, SourceScanner};
pub use registry::{
    Discoverable, Namespace, OperationDescriptor, Registry, RoleMarker, TypeDescriptor, TypeKind,
};
