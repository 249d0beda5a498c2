//! Security policy for module imports and resource reads
//!
//! A [`SecurityManager`] is an immutable policy checked before any reader is
//! asked for a single byte. It combines ordered URI prefix allow-lists, an
//! optional filesystem root, and per-scheme trust levels. First matching
//! prefix wins and no match means denied.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ErrorKind, EvalResult};

/// Default module allow-list: local and well-known schemes
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "repl:",
    "file:",
    "marl:",
    "modulepath:",
    "https:",
    "package:",
    "projectpackage:",
];

/// Default resource allow-list
pub const DEFAULT_ALLOWED_RESOURCES: &[&str] = &[
    "env:",
    "prop:",
    "file:",
    "modulepath:",
    "https:",
    "package:",
    "projectpackage:",
];

/// Immutable security policy shared by an evaluator and its loader
#[derive(Debug, Clone)]
pub struct SecurityManager {
    /// Ordered module URI prefixes; first match wins
    allowed_modules: Vec<String>,
    /// Ordered resource URI prefixes; first match wins
    allowed_resources: Vec<String>,
    /// If set, file: modules and resources must live under this root
    root_dir: Option<PathBuf>,
}

pub type SecurityManagerRef = Arc<SecurityManager>;

impl Default for SecurityManager {
    fn default() -> Self {
        Self {
            allowed_modules: DEFAULT_ALLOWED_MODULES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_resources: DEFAULT_ALLOWED_RESOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            root_dir: None,
        }
    }
}

impl SecurityManager {
    pub fn new(
        allowed_modules: Vec<String>,
        allowed_resources: Vec<String>,
        root_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            allowed_modules,
            allowed_resources,
            root_dir,
        }
    }

    /// Policy that denies every module and resource
    pub fn deny_all() -> Self {
        Self {
            allowed_modules: Vec::new(),
            allowed_resources: Vec::new(),
            root_dir: None,
        }
    }

    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    /// Check that `uri` may be imported as a module
    pub fn check_module(&self, uri: &str) -> EvalResult<()> {
        if !matches_any(&self.allowed_modules, uri) {
            tracing::debug!(uri, "module import denied");
            return Err(ErrorKind::AccessDenied {
                what: "module",
                uri: uri.to_string(),
            }
            .into());
        }
        self.check_root(uri, "module")
    }

    /// Check that `uri` may be read as a resource
    pub fn check_resource(&self, uri: &str) -> EvalResult<()> {
        if !matches_any(&self.allowed_resources, uri) {
            tracing::debug!(uri, "resource read denied");
            return Err(ErrorKind::AccessDenied {
                what: "resource",
                uri: uri.to_string(),
            }
            .into());
        }
        self.check_root(uri, "resource")
    }

    /// Check that `importing` may import `imported` given scheme trust.
    /// A module may only import modules at the same or lower trust level,
    /// so untrusted code never pulls in more trusted code's authority.
    pub fn check_import_trust(&self, importing: &str, imported: &str) -> EvalResult<()> {
        if trust_level(importing) < trust_level(imported) {
            return Err(ErrorKind::TrustViolation {
                importer: importing.to_string(),
                imported: imported.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_root(&self, uri: &str, what: &'static str) -> EvalResult<()> {
        let Some(root) = &self.root_dir else {
            return Ok(());
        };
        let Some(path) = file_uri_path(uri) else {
            return Ok(());
        };
        let canonical = path.canonicalize().unwrap_or(path);
        if !canonical.starts_with(root) {
            return Err(ErrorKind::AccessDenied {
                what,
                uri: uri.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// First-match semantics over the configured pattern order
fn matches_any(patterns: &[String], uri: &str) -> bool {
    patterns.iter().any(|p| uri.starts_with(p.as_str()))
}

/// Scheme trust level: higher values are more trusted as importers.
/// The standard library can be imported by everyone but imports nothing
/// outside itself.
fn trust_level(uri: &str) -> u8 {
    if uri.starts_with("repl:") {
        40
    } else if uri.starts_with("file:") {
        30
    } else if uri.starts_with("modulepath:") {
        20
    } else if uri.starts_with("marl:") {
        0
    } else {
        10
    }
}

fn file_uri_path(uri: &str) -> Option<PathBuf> {
    uri.strip_prefix("file://")
        .map(PathBuf::from)
        .or_else(|| {
            // Bare paths count as file scheme
            if !uri.contains(':') {
                Some(PathBuf::from(uri))
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_allows_common_schemes() {
        let sm = SecurityManager::default();
        assert!(sm.check_module("file:///etc/app.marl").is_ok());
        assert!(sm.check_module("marl:base").is_ok());
        assert!(sm.check_resource("env:HOME").is_ok());
    }

    #[test]
    fn unlisted_scheme_is_denied() {
        let sm = SecurityManager::default();
        let err = sm.check_module("ftp://example.com/a.marl").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::AccessDenied { what: "module", .. }));
    }

    #[test]
    fn deny_all_denies_everything() {
        let sm = SecurityManager::deny_all();
        assert!(sm.check_module("file:///x").is_err());
        assert!(sm.check_resource("env:X").is_err());
    }

    #[test]
    fn stdlib_cannot_import_file_modules() {
        let sm = SecurityManager::default();
        assert!(sm
            .check_import_trust("marl:base", "file:///etc/x.marl")
            .is_err());
        assert!(sm
            .check_import_trust("file:///etc/x.marl", "marl:base")
            .is_ok());
        assert!(sm
            .check_import_trust("repl:input", "file:///etc/x.marl")
            .is_ok());
    }

    #[test]
    fn root_dir_confines_file_modules() {
        let sm = SecurityManager::new(
            vec!["file:".to_string()],
            vec![],
            Some(PathBuf::from("/workspace")),
        );
        assert!(sm.check_module("file:///workspace/app.marl").is_ok());
        assert!(sm.check_module("file:///etc/passwd").is_err());
    }
}
