use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ExtractError, Result};
use crate::model::ExportStyle;
use crate::registry::RoleMarker;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub markers: MarkerConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Defaults to the crate name found at `root`.
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub style: ExportStyle,
}

/// Attribute names (last path segment) recognised for each role marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    #[serde(default = "default_service_markers")]
    pub service: Vec<String>,
    #[serde(default = "default_component_markers")]
    pub component: Vec<String>,
    #[serde(default = "default_repository_markers")]
    pub repository: Vec<String>,
    #[serde(default = "default_request_handler_markers")]
    pub request_handler: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub include_tests: bool,
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output() -> PathBuf {
    PathBuf::from("internal_metadata.json")
}

fn default_service_markers() -> Vec<String> {
    vec!["service".to_string()]
}

fn default_component_markers() -> Vec<String> {
    vec!["component".to_string()]
}

fn default_repository_markers() -> Vec<String> {
    vec!["repository".to_string()]
}

fn default_request_handler_markers() -> Vec<String> {
    vec![
        "controller".to_string(),
        "rest_controller".to_string(),
        "request_handler".to_string(),
    ]
}

fn default_exclude_dirs() -> Vec<String> {
    vec!["target".to_string()]
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            namespace: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            style: ExportStyle::default(),
        }
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            service: default_service_markers(),
            component: default_component_markers(),
            repository: default_repository_markers(),
            request_handler: default_request_handler_markers(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_tests: false,
            exclude_dirs: default_exclude_dirs(),
        }
    }
}

impl MarkerConfig {
    pub fn aliases(&self, marker: RoleMarker) -> &[String] {
        match marker {
            RoleMarker::Service => &self.service,
            RoleMarker::Component => &self.component,
            RoleMarker::Repository => &self.repository,
            RoleMarker::RequestHandler => &self.request_handler,
        }
    }

    /// Maps an attribute name such as `rest_controller` to its role marker.
    pub fn marker_for(&self, attribute_name: &str) -> Option<RoleMarker> {
        RoleMarker::ALL
            .into_iter()
            .find(|marker| self.aliases(*marker).iter().any(|a| a == attribute_name))
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ExtractError::io(path, e))?;

        toml::from_str(&content).map_err(|e| ExtractError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn from_source_root<P: AsRef<Path>>(root: P) -> Self {
        let mut config = Self::default();
        config.source.root = root.as_ref().to_path_buf();
        config
    }

    /// Configured namespace, or the crate name when none is set.
    pub fn namespace_or<'a>(&'a self, crate_name: &'a str) -> &'a str {
        self.source.namespace.as_deref().unwrap_or(crate_name)
    }
}
