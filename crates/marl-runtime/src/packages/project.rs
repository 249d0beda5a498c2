//! Project descriptors and dependency graph resolution
//!
//! A project is described by `MarlProject.json` (direct dependencies plus
//! evaluator settings) and pins its resolved dependency graph in
//! `MarlProject.deps.json`. Both are discovered by walking up from a
//! working directory.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};

use super::{CanonicalPackageUri, Checksums, PackageResolver, PackageUri};

const DEPS_SCHEMA_VERSION: u32 = 1;

pub const PROJECT_FILE: &str = "MarlProject.json";
pub const DEPS_FILE: &str = "MarlProject.deps.json";

/// Project descriptor loaded from MarlProject.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Direct dependencies, keyed by the name modules import them under
    #[serde(default)]
    pub dependencies: BTreeMap<String, ProjectDependency>,

    /// Evaluator settings applied when evaluating inside this project
    #[serde(default)]
    pub evaluator_settings: EvaluatorSettings,
}

/// One direct dependency of a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectDependency {
    /// A published package, optionally with declared checksums
    Remote {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksums: Option<Checksums>,
    },
    /// Another project on disk
    Local { path: String },
}

/// Evaluator settings carried by a project descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatorSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_modules: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_resources: Option<Vec<String>>,

    /// Environment map injected into `read("env:...")`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// External properties injected into `read("prop:...")`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_properties: BTreeMap<String, String>,

    /// Evaluation timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Project {
    pub fn from_json(json: &str) -> EvalResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| EvalError::configuration(format!("bad {}: {}", PROJECT_FILE, e)))
    }

    pub fn load(path: &Path) -> EvalResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EvalError::io(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    /// Walk up from `start_dir` looking for MarlProject.json
    pub fn find_and_load(start_dir: &Path) -> EvalResult<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();
        loop {
            let candidate = current.join(PROJECT_FILE);
            if candidate.is_file() {
                let project = Self::load(&candidate)?;
                return Ok(Some((project, candidate)));
            }
            if !current.pop() {
                return Ok(None);
            }
        }
    }
}

/// Resolved dependency graph pinned in MarlProject.deps.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDeps {
    pub schema_version: u32,

    /// Canonical package URI -> resolved entry
    pub resolved_dependencies: BTreeMap<String, ResolvedDependency>,
}

/// A pinned entry of the resolved graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResolvedDependency {
    #[serde(rename = "remote")]
    Remote { uri: String, checksums: Checksums },

    #[serde(rename = "local")]
    Local { uri: String, path: String },
}

impl ResolvedDependency {
    pub fn uri(&self) -> &str {
        match self {
            ResolvedDependency::Remote { uri, .. } => uri,
            ResolvedDependency::Local { uri, .. } => uri,
        }
    }

    pub fn checksums(&self) -> Option<&Checksums> {
        match self {
            ResolvedDependency::Remote { checksums, .. } => Some(checksums),
            ResolvedDependency::Local { .. } => None,
        }
    }
}

impl ProjectDeps {
    pub fn new(resolved: BTreeMap<String, ResolvedDependency>) -> Self {
        Self {
            schema_version: DEPS_SCHEMA_VERSION,
            resolved_dependencies: resolved,
        }
    }

    pub fn from_json(json: &str) -> EvalResult<Self> {
        let deps: ProjectDeps = serde_json::from_str(json)
            .map_err(|e| EvalError::configuration(format!("bad {}: {}", DEPS_FILE, e)))?;
        if deps.schema_version != DEPS_SCHEMA_VERSION {
            return Err(EvalError::configuration(format!(
                "unsupported {} schema version {} (expected {})",
                DEPS_FILE, deps.schema_version, DEPS_SCHEMA_VERSION
            )));
        }
        Ok(deps)
    }

    pub fn load(path: &Path) -> EvalResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EvalError::io(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn find_and_load(start_dir: &Path) -> EvalResult<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();
        loop {
            let candidate = current.join(DEPS_FILE);
            if candidate.is_file() {
                let deps = Self::load(&candidate)?;
                return Ok(Some((deps, candidate)));
            }
            if !current.pop() {
                return Ok(None);
            }
        }
    }

    /// Look up the pinned entry for a canonical package URI
    pub fn resolve(&self, canonical: &str) -> Option<&ResolvedDependency> {
        self.resolved_dependencies.get(canonical)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Resolves a project's dependency graph to a pinned [`ProjectDeps`]
///
/// One concrete version per canonical package across the whole graph: the
/// highest requested version wins within a major line. Transitive
/// dependencies come from each package's metadata; a dependency cycle fails
/// resolution.
pub struct ProjectResolver<'a> {
    resolver: &'a dyn PackageResolver,
}

impl<'a> ProjectResolver<'a> {
    pub fn new(resolver: &'a dyn PackageResolver) -> Self {
        Self { resolver }
    }

    pub fn resolve(&self, project: &Project) -> EvalResult<ProjectDeps> {
        let mut picked: HashMap<CanonicalPackageUri, PackageUri> = HashMap::new();
        let mut in_progress: HashSet<String> = HashSet::new();

        for dep in project.dependencies.values() {
            match dep {
                ProjectDependency::Remote { uri, checksums } => {
                    let mut parsed = PackageUri::parse(uri)?;
                    if parsed.checksums.is_none() {
                        parsed.checksums = checksums.clone();
                    }
                    self.walk(parsed, &mut picked, &mut in_progress)?;
                }
                ProjectDependency::Local { path } => {
                    return Err(EvalError::configuration(format!(
                        "local dependency `{}` cannot be resolved remotely; pin it in {}",
                        path, DEPS_FILE
                    )));
                }
            }
        }

        let mut resolved = BTreeMap::new();
        for (canonical, uri) in picked {
            let metadata = self.resolver.get_metadata(&uri)?;
            let checksums = uri
                .checksums
                .clone()
                .or(metadata.package_zip_checksums)
                .ok_or_else(|| {
                    EvalError::configuration(format!("no checksums available for `{}`", uri))
                })?;
            resolved.insert(
                canonical.to_string(),
                ResolvedDependency::Remote {
                    uri: uri.as_project_package().to_string(),
                    checksums,
                },
            );
        }
        Ok(ProjectDeps::new(resolved))
    }

    fn walk(
        &self,
        uri: PackageUri,
        picked: &mut HashMap<CanonicalPackageUri, PackageUri>,
        in_progress: &mut HashSet<String>,
    ) -> EvalResult<()> {
        let canonical = uri.canonical();

        if let Some(existing) = picked.get(&canonical) {
            // Within a major line the highest requested version wins
            if !uri.version_is_newer_than(existing) {
                return Ok(());
            }
        }

        let key = uri.to_string();
        if !in_progress.insert(key.clone()) {
            return Err(EvalError::configuration(format!(
                "dependency cycle through `{}`",
                uri
            )));
        }

        tracing::debug!(package = %uri, "resolving dependency");
        let metadata = self.resolver.get_metadata(&uri)?;
        picked.insert(canonical, uri);

        for dep in metadata.dependencies.values() {
            let mut parsed = PackageUri::parse(&dep.uri)?;
            if parsed.checksums.is_none() {
                parsed.checksums = dep.checksums.clone();
            }
            self.walk(parsed, picked, in_progress)?;
        }

        in_progress.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_project_descriptor() {
        let json = r#"{
            "dependencies": {
                "net": {
                    "uri": "package://pkg.example.com/tools/net@2.1.0",
                    "checksums": { "sha256": "abc" }
                },
                "shared": { "path": "../shared" }
            },
            "evaluatorSettings": {
                "allowedModules": ["file:", "marl:"],
                "env": { "HOME": "/home/app" },
                "timeoutSeconds": 30
            }
        }"#;
        let project = Project::from_json(json).unwrap();
        assert_eq!(project.dependencies.len(), 2);
        assert!(matches!(
            project.dependencies["net"],
            ProjectDependency::Remote { .. }
        ));
        assert!(matches!(
            project.dependencies["shared"],
            ProjectDependency::Local { .. }
        ));
        let settings = &project.evaluator_settings;
        assert_eq!(settings.allowed_modules.as_ref().unwrap().len(), 2);
        assert_eq!(settings.env["HOME"], "/home/app");
        assert_eq!(settings.timeout_seconds, Some(30));
    }

    #[test]
    fn parses_resolved_deps() {
        let json = r#"{
            "schemaVersion": 1,
            "resolvedDependencies": {
                "package://pkg.example.com/tools/net@2": {
                    "type": "remote",
                    "uri": "projectpackage://pkg.example.com/tools/net@2.1.0",
                    "checksums": { "sha256": "abc" }
                },
                "package://example.com/shared@1": {
                    "type": "local",
                    "uri": "projectpackage://example.com/shared@1.0.0",
                    "path": "../shared"
                }
            }
        }"#;
        let deps = ProjectDeps::from_json(json).unwrap();
        let remote = deps.resolve("package://pkg.example.com/tools/net@2").unwrap();
        assert!(matches!(remote, ResolvedDependency::Remote { .. }));
        assert!(remote.checksums().is_some());
        let local = deps.resolve("package://example.com/shared@1").unwrap();
        assert!(local.checksums().is_none());
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let json = r#"{ "schemaVersion": 2, "resolvedDependencies": {} }"#;
        assert!(ProjectDeps::from_json(json).is_err());
    }

    #[test]
    fn descriptor_discovery_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(PROJECT_FILE), "{}").unwrap();
        let (_, path) = Project::find_and_load(&nested).unwrap().unwrap();
        assert_eq!(path, dir.path().join(PROJECT_FILE));
    }
}
