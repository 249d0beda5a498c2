//! Module loading
//!
//! The loader turns module URIs into parsed ASTs: it resolves relative
//! references against the importing module, enforces the security policy,
//! reads source text through the reader registry (or the package resolver
//! for package URIs), and parses through a host-supplied parser. Hosts
//! without a parser can register pre-built ASTs directly.

use std::path::Path;
use std::sync::Arc;

use crate::cache::ModuleCache;
use crate::error::{EvalError, EvalResult};
use crate::packages::{
    DiskCachedPackageResolver, PackageAssetUri, PackageResolver, PackageUri, ProjectDeps,
};
use crate::reader::{self, ReaderRegistry};
use crate::security::{SecurityManager, SecurityManagerRef};

/// Parses module source text into an AST. Hosts plug their front end in
/// here; the error string is surfaced as a parse error for the URI.
pub type ParseFn = dyn Fn(&str, &str) -> Result<marl_ast::Module, String>;

/// The default module file inside a package archive
const PACKAGE_ROOT_MODULE: &str = "/main.marl";

pub struct ModuleLoader {
    registry: ReaderRegistry,
    security: SecurityManagerRef,
    cache: ModuleCache,
    parser: Option<Arc<ParseFn>>,
    package_resolver: Option<DiskCachedPackageResolver>,
    project_deps: Option<Arc<ProjectDeps>>,
}

impl ModuleLoader {
    pub fn new(registry: ReaderRegistry, security: SecurityManagerRef, cache: ModuleCache) -> Self {
        Self {
            registry,
            security,
            cache,
            parser: None,
            package_resolver: None,
            project_deps: None,
        }
    }

    /// Loader with the default readers, policy, and a fresh cache
    pub fn with_defaults() -> Self {
        let mut registry = ReaderRegistry::new();
        registry.register_module_reader(Arc::new(reader::FileReader));
        registry.register_resource_reader(Arc::new(reader::FileReader));
        Self::new(
            registry,
            Arc::new(SecurityManager::default()),
            ModuleCache::new(),
        )
    }

    pub fn set_parser(&mut self, parser: Arc<ParseFn>) {
        self.parser = Some(parser);
    }

    pub fn registry_mut(&mut self) -> &mut ReaderRegistry {
        &mut self.registry
    }

    pub fn security(&self) -> &SecurityManagerRef {
        &self.security
    }

    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Register a pre-built AST under a resolved URI
    pub fn insert_ast(&self, uri: impl Into<String>, module: marl_ast::Module) {
        self.cache.insert(uri, Arc::new(module));
    }

    /// Load MarlProject.deps.json by walking up from `start_dir`
    pub fn load_project_deps(&mut self, start_dir: &Path) -> EvalResult<bool> {
        match ProjectDeps::find_and_load(start_dir)? {
            Some((deps, path)) => {
                tracing::debug!(path = %path.display(), "loaded project dependencies");
                self.project_deps = Some(Arc::new(deps));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_project_deps(&mut self, deps: ProjectDeps) {
        self.project_deps = Some(Arc::new(deps));
    }

    fn package_resolver(&mut self) -> EvalResult<&DiskCachedPackageResolver> {
        if self.package_resolver.is_none() {
            let mut resolver = DiskCachedPackageResolver::new()?;
            if let Some(deps) = &self.project_deps {
                resolver = resolver.with_project_deps(Arc::clone(deps));
            }
            self.package_resolver = Some(resolver);
        }
        Ok(self.package_resolver.as_ref().unwrap())
    }

    pub fn is_package_uri(uri: &str) -> bool {
        uri.starts_with("package://") || uri.starts_with("projectpackage://")
    }

    /// Resolve a URI reference against the importing module's URI.
    /// Absolute references pass through; relative ones are joined and
    /// `.`/`..` segments are collapsed.
    pub fn resolve_reference(importing: &str, reference: &str) -> String {
        if has_scheme(reference) || reference.starts_with('/') {
            return normalize_uri(reference);
        }
        if Self::is_package_uri(importing) {
            // Relative imports inside a package resolve against the asset path
            if let Ok(asset) = PackageAssetUri::parse(importing) {
                let base = parent_of(&asset.asset_path);
                return normalize_uri(&format!("{}#{}{}", asset.package, base, reference));
            }
        }
        let base = parent_of(importing);
        normalize_uri(&format!("{}{}", base, reference))
    }

    /// Load and parse the module at `uri`, imported from `importing`.
    ///
    /// The security policy and import trust are checked before any read.
    pub fn load_module(&mut self, uri: &str, importing: &str) -> EvalResult<Arc<marl_ast::Module>> {
        let resolved = Self::resolve_reference(importing, uri);
        self.security.check_module(&resolved)?;
        self.security.check_import_trust(importing, &resolved)?;

        if let Some(cached) = self.cache.get(&resolved) {
            return Ok(cached);
        }

        tracing::debug!(uri = %resolved, "loading module");
        let source = self.read_module_source(&resolved)?;
        let module = self.parse(&resolved, &source)?;
        let arc = Arc::new(module);
        self.cache.insert(resolved, Arc::clone(&arc));
        Ok(arc)
    }

    /// Read a resource for `read(...)`, subject to the resource allow-list
    pub fn read_resource(&mut self, uri: &str, importing: &str) -> EvalResult<String> {
        let resolved = Self::resolve_reference(importing, uri);
        self.security.check_resource(&resolved)?;

        if Self::is_package_uri(&resolved) {
            let (package, asset) = split_package_uri(&resolved)?;
            let resolver = self.package_resolver()?;
            return resolver.get_text(&package, &asset);
        }
        let reader = self.registry.resource_reader(&resolved)?;
        Arc::clone(reader).read(&resolved)
    }

    /// Expand a module glob pattern to concrete URIs, each one
    /// independently checked against the module allow-list.
    pub fn expand_module_glob(&mut self, pattern: &str, importing: &str) -> EvalResult<Vec<String>> {
        let resolved = Self::resolve_reference(importing, pattern);
        let expanded = self.expand_glob(&resolved)?;
        for uri in &expanded {
            self.security.check_module(uri)?;
            self.security.check_import_trust(importing, uri)?;
        }
        Ok(expanded)
    }

    /// Expand a resource glob pattern, each match checked against the
    /// resource allow-list.
    pub fn expand_resource_glob(
        &mut self,
        pattern: &str,
        importing: &str,
    ) -> EvalResult<Vec<String>> {
        let resolved = Self::resolve_reference(importing, pattern);
        let expanded = self.expand_glob(&resolved)?;
        for uri in &expanded {
            self.security.check_resource(uri)?;
        }
        Ok(expanded)
    }

    fn expand_glob(&mut self, pattern: &str) -> EvalResult<Vec<String>> {
        if Self::is_package_uri(pattern) {
            let (package, asset_pattern) = split_package_uri(pattern)?;
            let resolver = self.package_resolver()?;
            let files = resolver.list_files(&package, "/")?;
            let mut matches: Vec<String> = files
                .into_iter()
                .filter(|f| reader::glob_matches(&asset_pattern, f))
                .map(|f| format!("{}#{}", package, f))
                .collect();
            matches.sort();
            return Ok(matches);
        }
        if reader::uri_scheme(pattern) == "file" {
            return reader::expand_file_glob(pattern);
        }
        Err(EvalError::resolution(
            pattern,
            "glob expansion is not supported for this scheme",
        ))
    }

    fn read_module_source(&mut self, resolved: &str) -> EvalResult<String> {
        if Self::is_package_uri(resolved) {
            let (package, asset) = split_package_uri(resolved)?;
            let resolver = self.package_resolver()?;
            return resolver.get_text(&package, &asset);
        }
        let reader = self.registry.module_reader(resolved)?;
        Arc::clone(reader).read(resolved)
    }

    fn parse(&self, uri: &str, source: &str) -> EvalResult<marl_ast::Module> {
        let parser = self.parser.as_ref().ok_or_else(|| {
            EvalError::configuration(format!(
                "no parser configured; cannot parse `{}` (register the AST directly instead)",
                uri
            ))
        })?;
        parser(uri, source)
            .map_err(|msg| crate::error::ErrorKind::Parse(format!("{}: {}", uri, msg)).into())
    }
}

fn has_scheme(uri: &str) -> bool {
    uri.find(':')
        .is_some_and(|idx| idx > 1 && uri[..idx].chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Everything up to and including the last `/` of a URI or path
fn parent_of(uri: &str) -> String {
    match uri.rfind('/') {
        Some(idx) => uri[..idx + 1].to_string(),
        None => String::new(),
    }
}

/// Collapse `.` and `..` segments in the path part of a URI
fn normalize_uri(uri: &str) -> String {
    // Keep scheme and authority untouched
    let (prefix, path) = match uri.find("://") {
        Some(idx) => {
            let after = &uri[idx + 3..];
            match after.find('/') {
                Some(slash) => (&uri[..idx + 3 + slash], &uri[idx + 3 + slash..]),
                None => return uri.to_string(),
            }
        }
        None => match uri.find(':') {
            Some(idx) if idx > 1 => (&uri[..idx + 1], &uri[idx + 1..]),
            _ => ("", uri),
        },
    };

    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() && !absolute {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    let mut result = String::from(prefix);
    if absolute {
        result.push('/');
    }
    result.push_str(&segments.join("/"));
    if path.ends_with('/') && !result.ends_with('/') {
        result.push('/');
    }
    result
}

/// Split a package URI into the package and the asset path, defaulting to
/// the package's root module when no fragment is given.
fn split_package_uri(uri: &str) -> EvalResult<(PackageUri, String)> {
    if PackageAssetUri::is_package_asset_uri(uri) {
        let asset = PackageAssetUri::parse(uri)?;
        Ok((asset.package, asset.asset_path))
    } else {
        let package = PackageUri::parse(uri)?;
        Ok((package, PACKAGE_ROOT_MODULE.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn relative_references_resolve_against_importer() {
        assert_eq!(
            ModuleLoader::resolve_reference("file:///app/config/main.marl", "db.marl"),
            "file:///app/config/db.marl"
        );
        assert_eq!(
            ModuleLoader::resolve_reference("file:///app/config/main.marl", "../common/db.marl"),
            "file:///app/common/db.marl"
        );
        assert_eq!(
            ModuleLoader::resolve_reference("file:///app/a.marl", "marl:base"),
            "marl:base"
        );
    }

    #[test]
    fn package_relative_references_stay_in_package() {
        assert_eq!(
            ModuleLoader::resolve_reference(
                "package://e.com/p@1.0.0#/lib/main.marl",
                "util.marl"
            ),
            "package://e.com/p@1.0.0#/lib/util.marl"
        );
    }

    #[test]
    fn normalization_collapses_dot_segments() {
        assert_eq!(
            normalize_uri("file:///a/b/./c/../d.marl"),
            "file:///a/b/d.marl"
        );
        assert_eq!(normalize_uri("marl:base"), "marl:base");
    }

    #[test]
    fn denied_module_is_never_read() {
        // A loader with a deny-all policy and no readers: if the policy is
        // checked first, the missing reader is never consulted.
        let mut loader = ModuleLoader::new(
            ReaderRegistry::new(),
            Arc::new(SecurityManager::deny_all()),
            ModuleCache::new(),
        );
        let err = loader
            .load_module("file:///etc/app.marl", "repl:input")
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::AccessDenied { .. }));
    }

    #[test]
    fn registered_ast_loads_without_parser() {
        let mut loader = ModuleLoader::with_defaults();
        loader.insert_ast("repl:input", marl_ast::builder::module(vec![]));
        let module = loader.load_module("repl:input", "repl:input").unwrap();
        assert!(module.members.is_empty());
    }

    #[test]
    fn missing_parser_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.marl");
        std::fs::write(&path, "x = 1").unwrap();
        let mut loader = ModuleLoader::with_defaults();
        let uri = format!("file://{}", path.display());
        let err = loader.load_module(&uri, "repl:input").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Configuration(_)));
    }
}
