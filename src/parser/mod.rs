pub mod rust_parser;
pub mod scanner;
pub mod symbols;

#[cfg(test)]
mod tests;

pub use rust_parser::RustParser;
pub use scanner::{ScanOutcome, SourceScanner};
pub use symbols::*;
