//! Package metadata served at a package's HTTPS URL

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Checksums;

/// Metadata document fetched from `https://authority/path@version`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub name: String,

    pub package_uri: String,

    pub version: String,

    /// Download URL of the package archive
    pub package_zip_url: String,

    /// Declared checksums of the archive
    #[serde(default)]
    pub package_zip_checksums: Option<Checksums>,

    /// Dependencies of this package, keyed by dependency name
    #[serde(default)]
    pub dependencies: HashMap<String, PackageDependency>,

    #[serde(default)]
    pub source_code: Option<String>,

    #[serde(default)]
    pub documentation: Option<String>,

    #[serde(default)]
    pub license: Option<String>,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// Dependency reference inside package metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDependency {
    pub uri: String,

    #[serde(default)]
    pub checksums: Option<Checksums>,
}

impl PackageMetadata {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
