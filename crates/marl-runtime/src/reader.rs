//! Module and resource readers
//!
//! Every URI scheme the engine can load is backed by a reader registered for
//! that scheme. The security policy is consulted before a reader runs, so a
//! reader never sees a denied URI. Unregistered schemes are a configuration
//! error rather than a silent miss.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{EvalError, EvalResult};

/// Reads module source text for one URI scheme
pub trait ModuleReader {
    /// Scheme handled by this reader, without the trailing colon
    fn scheme(&self) -> &str;

    /// Read the module source at `uri`
    fn read(&self, uri: &str) -> EvalResult<String>;

    /// List candidate URIs under `base` for glob expansion.
    /// Readers that cannot enumerate return a resolution error.
    fn list(&self, base: &str) -> EvalResult<Vec<String>> {
        Err(EvalError::resolution(
            base,
            format!("scheme `{}:` does not support glob expansion", self.scheme()),
        ))
    }

    fn supports_globbing(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for dyn ModuleReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ModuleReader({}:)", self.scheme())
    }
}

/// Reads resource bytes for one URI scheme
pub trait ResourceReader {
    fn scheme(&self) -> &str;

    fn read(&self, uri: &str) -> EvalResult<String>;

    fn list(&self, base: &str) -> EvalResult<Vec<String>> {
        Err(EvalError::resolution(
            base,
            format!("scheme `{}:` does not support glob expansion", self.scheme()),
        ))
    }

    fn supports_globbing(&self) -> bool {
        false
    }
}

/// Scheme-indexed reader registry
#[derive(Default)]
pub struct ReaderRegistry {
    modules: HashMap<String, Arc<dyn ModuleReader>>,
    resources: HashMap<String, Arc<dyn ResourceReader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_module_reader(&mut self, reader: Arc<dyn ModuleReader>) {
        self.modules.insert(reader.scheme().to_string(), reader);
    }

    pub fn register_resource_reader(&mut self, reader: Arc<dyn ResourceReader>) {
        self.resources.insert(reader.scheme().to_string(), reader);
    }

    pub fn module_reader(&self, uri: &str) -> EvalResult<&Arc<dyn ModuleReader>> {
        let scheme = uri_scheme(uri);
        self.modules.get(scheme).ok_or_else(|| {
            EvalError::configuration(format!("no module reader registered for `{}:`", scheme))
        })
    }

    pub fn resource_reader(&self, uri: &str) -> EvalResult<&Arc<dyn ResourceReader>> {
        let scheme = uri_scheme(uri);
        self.resources.get(scheme).ok_or_else(|| {
            EvalError::configuration(format!("no resource reader registered for `{}:`", scheme))
        })
    }
}

/// Scheme of a URI; bare paths count as `file`
pub fn uri_scheme(uri: &str) -> &str {
    match uri.find(':') {
        // A Windows drive letter is not a scheme, but neither is a
        // one-letter scheme in practice
        Some(idx) if idx > 1 => &uri[..idx],
        _ => "file",
    }
}

// --- file --------------------------------------------------------------------

/// Reads `file:` URIs and bare paths from the local filesystem
pub struct FileReader;

impl FileReader {
    fn to_path(uri: &str) -> PathBuf {
        if let Some(rest) = uri.strip_prefix("file://") {
            PathBuf::from(rest)
        } else {
            PathBuf::from(uri)
        }
    }

    fn read_path(uri: &str) -> EvalResult<String> {
        let path = Self::to_path(uri);
        std::fs::read_to_string(&path)
            .map_err(|e| EvalError::io(format!("failed to read `{}`: {}", path.display(), e)))
    }

    fn list_dir(base: &str) -> EvalResult<Vec<String>> {
        let dir = Self::to_path(base);
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| EvalError::io(format!("failed to list `{}`: {}", dir.display(), e)))?;
        let mut uris = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EvalError::io(e.to_string()))?;
            uris.push(format!("file://{}", entry.path().display()));
        }
        Ok(uris)
    }
}

impl ModuleReader for FileReader {
    fn scheme(&self) -> &str {
        "file"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        Self::read_path(uri)
    }

    fn list(&self, base: &str) -> EvalResult<Vec<String>> {
        Self::list_dir(base)
    }

    fn supports_globbing(&self) -> bool {
        true
    }
}

impl ResourceReader for FileReader {
    fn scheme(&self) -> &str {
        "file"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        Self::read_path(uri)
    }

    fn list(&self, base: &str) -> EvalResult<Vec<String>> {
        Self::list_dir(base)
    }

    fn supports_globbing(&self) -> bool {
        true
    }
}

// --- repl --------------------------------------------------------------------

/// In-memory module texts, addressed as `repl:<name>`
#[derive(Default)]
pub struct ReplReader {
    sources: HashMap<String, String>,
}

impl ReplReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }
}

impl ModuleReader for ReplReader {
    fn scheme(&self) -> &str {
        "repl"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        let name = uri.strip_prefix("repl:").unwrap_or(uri);
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::resolution(uri, "no such repl module"))
    }
}

// --- marl (stdlib) -----------------------------------------------------------

/// Embedded standard library sources, addressed as `marl:<name>`
pub struct StdlibReader {
    sources: HashMap<&'static str, &'static str>,
}

impl StdlibReader {
    pub fn new(sources: HashMap<&'static str, &'static str>) -> Self {
        Self { sources }
    }
}

impl ModuleReader for StdlibReader {
    fn scheme(&self) -> &str {
        "marl"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        let name = uri.strip_prefix("marl:").unwrap_or(uri);
        self.sources
            .get(name)
            .map(|s| s.to_string())
            .ok_or_else(|| EvalError::resolution(uri, "no such standard library module"))
    }
}

// --- modulepath --------------------------------------------------------------

/// Resolves `modulepath:/some/file.marl` against an ordered search path
pub struct ModulePathReader {
    search_path: Vec<PathBuf>,
}

impl ModulePathReader {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    fn locate(&self, uri: &str) -> EvalResult<PathBuf> {
        let rel = uri
            .strip_prefix("modulepath:")
            .unwrap_or(uri)
            .trim_start_matches('/');
        for root in &self.search_path {
            let candidate = root.join(rel);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(EvalError::resolution(uri, "not found on the module path"))
    }
}

impl ModuleReader for ModulePathReader {
    fn scheme(&self) -> &str {
        "modulepath"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        let path = self.locate(uri)?;
        std::fs::read_to_string(&path)
            .map_err(|e| EvalError::io(format!("failed to read `{}`: {}", path.display(), e)))
    }
}

impl ResourceReader for ModulePathReader {
    fn scheme(&self) -> &str {
        "modulepath"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        ModuleReader::read(self, uri)
    }
}

// --- https -------------------------------------------------------------------

/// Fetches module and resource text over HTTPS
pub struct HttpsReader {
    client: reqwest::blocking::Client,
}

impl HttpsReader {
    pub fn new() -> EvalResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| EvalError::io(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn fetch(&self, uri: &str) -> EvalResult<String> {
        tracing::debug!(uri, "fetching over https");
        let response = self
            .client
            .get(uri)
            .send()
            .map_err(|e| EvalError::io(format!("request to `{}` failed: {}", uri, e)))?;
        if !response.status().is_success() {
            return Err(EvalError::resolution(
                uri,
                format!("HTTP status {}", response.status()),
            ));
        }
        response
            .text()
            .map_err(|e| EvalError::io(format!("failed to read body of `{}`: {}", uri, e)))
    }
}

impl ModuleReader for HttpsReader {
    fn scheme(&self) -> &str {
        "https"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        self.fetch(uri)
    }
}

impl ResourceReader for HttpsReader {
    fn scheme(&self) -> &str {
        "https"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        self.fetch(uri)
    }
}

// --- env / prop --------------------------------------------------------------

/// Reads `env:NAME` out of the evaluator's injected environment map.
/// Never consults the ambient process environment.
pub struct EnvReader {
    env: Arc<HashMap<String, String>>,
}

impl EnvReader {
    pub fn new(env: Arc<HashMap<String, String>>) -> Self {
        Self { env }
    }
}

impl ResourceReader for EnvReader {
    fn scheme(&self) -> &str {
        "env"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        let name = uri.strip_prefix("env:").unwrap_or(uri);
        self.env
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::resolution(uri, "environment variable not set"))
    }
}

/// Reads `prop:NAME` out of the evaluator's injected external properties
pub struct PropReader {
    props: Arc<HashMap<String, String>>,
}

impl PropReader {
    pub fn new(props: Arc<HashMap<String, String>>) -> Self {
        Self { props }
    }
}

impl ResourceReader for PropReader {
    fn scheme(&self) -> &str {
        "prop"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        let name = uri.strip_prefix("prop:").unwrap_or(uri);
        self.props
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::resolution(uri, "external property not set"))
    }
}

// --- glob expansion ----------------------------------------------------------

/// Whether a URI contains glob metacharacters
pub fn is_glob_pattern(uri: &str) -> bool {
    uri.contains('*') || uri.contains('?') || uri.contains('[')
}

/// Match a glob pattern against a candidate path.
///
/// `*` matches within a segment, `**` crosses segment boundaries, `?`
/// matches one non-separator character, `[abc]` matches a character class.
pub fn glob_matches(pattern: &str, candidate: &str) -> bool {
    glob_match_inner(
        &pattern.chars().collect::<Vec<_>>(),
        &candidate.chars().collect::<Vec<_>>(),
        0,
        0,
    )
}

fn glob_match_inner(pattern: &[char], text: &[char], mut p: usize, mut t: usize) -> bool {
    while p < pattern.len() {
        match pattern[p] {
            '*' => {
                let double = p + 1 < pattern.len() && pattern[p + 1] == '*';
                let next = if double { p + 2 } else { p + 1 };
                // Try every split point
                let mut k = t;
                loop {
                    if glob_match_inner(pattern, text, next, k) {
                        return true;
                    }
                    if k >= text.len() {
                        return false;
                    }
                    if !double && text[k] == '/' {
                        return false;
                    }
                    k += 1;
                }
            }
            '?' => {
                if t >= text.len() || text[t] == '/' {
                    return false;
                }
                p += 1;
                t += 1;
            }
            '[' => {
                let close = pattern[p..].iter().position(|&c| c == ']');
                let Some(close) = close else { return false };
                if t >= text.len() {
                    return false;
                }
                let class = &pattern[p + 1..p + close];
                let (negated, class) = match class.first() {
                    Some('!') | Some('^') => (true, &class[1..]),
                    _ => (false, class),
                };
                if class.contains(&text[t]) == negated {
                    return false;
                }
                p += close + 1;
                t += 1;
            }
            c => {
                if t >= text.len() || text[t] != c {
                    return false;
                }
                p += 1;
                t += 1;
            }
        }
    }
    t == text.len()
}

/// Expand a file-scheme glob pattern to a sorted list of matching URIs.
///
/// Expansion is deterministic: candidates are collected by walking the
/// longest literal prefix directory and sorted lexicographically.
pub fn expand_file_glob(pattern: &str) -> EvalResult<Vec<String>> {
    let path_pattern = pattern
        .strip_prefix("file://")
        .unwrap_or(pattern)
        .to_string();

    // Longest literal directory prefix
    let first_meta = path_pattern
        .find(|c| matches!(c, '*' | '?' | '['))
        .unwrap_or(path_pattern.len());
    let literal = &path_pattern[..first_meta];
    let base_dir = match literal.rfind('/') {
        Some(idx) => &literal[..idx + 1],
        None => "./",
    };

    let mut matches = Vec::new();
    collect_glob_matches(Path::new(base_dir), &path_pattern, &mut matches)?;
    matches.sort();
    Ok(matches
        .into_iter()
        .map(|p| {
            if pattern.starts_with("file://") {
                format!("file://{}", p)
            } else {
                p
            }
        })
        .collect())
}

fn collect_glob_matches(dir: &Path, pattern: &str, out: &mut Vec<String>) -> EvalResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        // Missing prefix directory means an empty expansion, not an error
        Err(_) => return Ok(()),
    };
    for entry in entries {
        let entry = entry.map_err(|e| EvalError::io(e.to_string()))?;
        let path = entry.path();
        let path_str = path.to_string_lossy().to_string();
        if path.is_dir() {
            collect_glob_matches(&path, pattern, out)?;
        } else if glob_matches(pattern, &path_str) {
            out.push(path_str);
        }
    }
    Ok(())
}
