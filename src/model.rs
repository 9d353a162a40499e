use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

use crate::error::Result;

/// Exported description of one discovered type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRecord {
    #[serde(rename = "className")]
    pub qualified_name: String,
    #[serde(rename = "annotations", deserialize_with = "string_list")]
    pub role_markers: Vec<String>,
    #[serde(rename = "methods")]
    pub operations: Vec<OperationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub name: String,
    pub return_type: String,
    #[serde(deserialize_with = "string_list")]
    pub parameter_types: Vec<String>,
    #[serde(rename = "annotations", deserialize_with = "string_list")]
    pub role_markers: Vec<String>,
}

/// How list-valued fields are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportStyle {
    /// JSON arrays of strings.
    #[default]
    Structured,
    /// One string per list, rendered as `[a, b]`.
    Flattened,
}

/// The full collection written to the sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportDocument {
    records: Vec<TypeRecord>,
}

impl ExportDocument {
    pub fn new(records: Vec<TypeRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TypeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.records.iter().map(|r| r.operations.len()).sum()
    }

    /// `(className, operation name)` pairs, the identity a round trip must preserve.
    pub fn operation_pairs(&self) -> BTreeSet<(String, String)> {
        self.records
            .iter()
            .flat_map(|record| {
                record
                    .operations
                    .iter()
                    .map(|op| (record.qualified_name.clone(), op.name.clone()))
            })
            .collect()
    }

    pub fn to_json(&self, style: ExportStyle) -> Result<String> {
        let json = match style {
            ExportStyle::Structured => serde_json::to_string_pretty(&self.records)?,
            ExportStyle::Flattened => {
                let flat: Vec<FlatTypeRecord<'_>> =
                    self.records.iter().map(FlatTypeRecord::from).collect();
                serde_json::to_string_pretty(&flat)?
            }
        };
        Ok(json)
    }

    /// Reads a document written in either style.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<TypeRecord> = serde_json::from_str(json)?;
        Ok(Self { records })
    }
}

impl From<Vec<TypeRecord>> for ExportDocument {
    fn from(records: Vec<TypeRecord>) -> Self {
        Self::new(records)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FlatTypeRecord<'a> {
    class_name: &'a str,
    annotations: String,
    methods: Vec<FlatOperationRecord<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FlatOperationRecord<'a> {
    name: &'a str,
    return_type: &'a str,
    parameter_types: String,
    annotations: String,
}

impl<'a> From<&'a TypeRecord> for FlatTypeRecord<'a> {
    fn from(record: &'a TypeRecord) -> Self {
        Self {
            class_name: &record.qualified_name,
            annotations: render_list(&record.role_markers),
            methods: record
                .operations
                .iter()
                .map(|op| FlatOperationRecord {
                    name: &op.name,
                    return_type: &op.return_type,
                    parameter_types: render_list(&op.parameter_types),
                    annotations: render_list(&op.role_markers),
                })
                .collect(),
        }
    }
}

pub fn render_list(items: &[String]) -> String {
    format!("[{}]", items.join(", "))
}

/// Splits a `[a, b]` rendering back into its items. Commas nested inside
/// brackets, parentheses, generics or string literals do not split.
pub fn split_list(rendered: &str) -> Vec<String> {
    let trimmed = rendered.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    if inner.trim().is_empty() {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut prev = '\0';

    for c in inner.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            prev = c;
            continue;
        }

        match c {
            '"' => in_string = true,
            '(' | '[' | '{' | '<' => depth += 1,
            // `->` in fn types is not a closing bracket
            '>' if prev == '-' => {}
            ')' | ']' | '}' | '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(current.trim().to_string());
                current.clear();
                prev = c;
                continue;
            }
            _ => {}
        }
        current.push(c);
        prev = c;
    }
    items.push(current.trim().to_string());
    items
}

fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        List(Vec<String>),
        Flat(String),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::List(items) => items,
        Repr::Flat(rendered) => split_list(&rendered),
    })
}
