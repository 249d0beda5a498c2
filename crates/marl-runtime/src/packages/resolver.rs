//! Package download and on-disk caching

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use zip::ZipArchive;

use crate::error::{ErrorKind, EvalError, EvalResult};

use super::http::HttpClient;
use super::{Checksums, PackageMetadata, PackageUri, ProjectDeps};

/// Read access to resolved packages
pub trait PackageResolver {
    /// Bytes of one file inside a package archive
    fn get_bytes(&self, package: &PackageUri, path: &str) -> EvalResult<Vec<u8>>;

    fn get_text(&self, package: &PackageUri, path: &str) -> EvalResult<String> {
        let bytes = self.get_bytes(package, path)?;
        String::from_utf8(bytes)
            .map_err(|e| EvalError::io(format!("invalid UTF-8 in {}#{}: {}", package, path, e)))
    }

    fn get_metadata(&self, package: &PackageUri) -> EvalResult<PackageMetadata>;

    fn has_file(&self, package: &PackageUri, path: &str) -> EvalResult<bool>;

    /// Archive paths under `dir`, sorted for deterministic glob expansion
    fn list_files(&self, package: &PackageUri, dir: &str) -> EvalResult<Vec<String>>;
}

/// Resolver that downloads packages once and serves them from a shared
/// on-disk cache.
///
/// Cache entries are written atomically (temp file + rename) under a
/// per-package lock file, so concurrent resolvers in separate processes
/// serialize their downloads instead of corrupting an entry. A checksum
/// mismatch aborts before anything lands in the cache.
pub struct DiskCachedPackageResolver {
    cache_dir: PathBuf,
    http: HttpClient,
    project_deps: Option<Arc<ProjectDeps>>,
    // Arc<[u8]> so a Cursor over the shared bytes implements Read + Seek
    archive_cache: RefCell<HashMap<String, Arc<[u8]>>>,
    metadata_cache: RefCell<HashMap<String, PackageMetadata>>,
}

const METADATA_FILE: &str = "metadata.json";
const ARCHIVE_FILE: &str = "archive.zip";
const LOCK_FILE: &str = ".lock";

/// Lock acquisition gives up after this many 100ms polls
const LOCK_MAX_POLLS: u32 = 600;

/// A lock file older than this is considered abandoned and removed
const LOCK_STALE_AFTER: Duration = Duration::from_secs(600);

impl DiskCachedPackageResolver {
    pub fn new() -> EvalResult<Self> {
        Self::with_cache_dir(default_cache_dir()?)
    }

    pub fn with_cache_dir(cache_dir: PathBuf) -> EvalResult<Self> {
        fs::create_dir_all(&cache_dir).map_err(|e| {
            EvalError::io(format!(
                "failed to create cache directory {}: {}",
                cache_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            cache_dir,
            http: HttpClient::new()?,
            project_deps: None,
            archive_cache: RefCell::new(HashMap::new()),
            metadata_cache: RefCell::new(HashMap::new()),
        })
    }

    /// Attach the resolved graph used to pin projectpackage:// URIs
    pub fn with_project_deps(mut self, deps: Arc<ProjectDeps>) -> Self {
        self.project_deps = Some(deps);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Map a projectpackage:// URI through the project's pinned graph.
    /// Plain package:// URIs pass through unchanged.
    pub fn pin(&self, package: &PackageUri) -> EvalResult<PackageUri> {
        if package.scheme != super::PackageScheme::ProjectPackage {
            return Ok(package.clone());
        }
        let deps = self.project_deps.as_ref().ok_or_else(|| {
            EvalError::configuration(format!(
                "`{}` requires a project dependency file ({})",
                package,
                super::project::DEPS_FILE
            ))
        })?;
        let canonical = package.canonical().to_string();
        let entry = deps.resolve(&canonical).ok_or_else(|| {
            EvalError::resolution(
                package.to_string(),
                format!("no entry for `{}` in the resolved dependency graph", canonical),
            )
        })?;
        let mut pinned = PackageUri::parse(entry.uri())?;
        if pinned.checksums.is_none() {
            pinned.checksums = entry.checksums().cloned();
        }
        Ok(pinned)
    }

    /// Download and verify a package unless it is already cached
    fn ensure_cached(&self, package: &PackageUri) -> EvalResult<PathBuf> {
        let entry_dir = package.cache_dir(&self.cache_dir);
        let archive_path = entry_dir.join(ARCHIVE_FILE);
        let metadata_path = entry_dir.join(METADATA_FILE);

        if archive_path.is_file() && metadata_path.is_file() {
            return Ok(entry_dir);
        }

        fs::create_dir_all(&entry_dir).map_err(|e| {
            EvalError::io(format!(
                "failed to create {}: {}",
                entry_dir.display(),
                e
            ))
        })?;

        let _lock = CacheLock::acquire(entry_dir.join(LOCK_FILE))?;

        // Another process may have finished while we waited for the lock
        if archive_path.is_file() && metadata_path.is_file() {
            return Ok(entry_dir);
        }

        tracing::debug!(package = %package, "downloading package");

        let metadata_url = package.metadata_url();
        let metadata_json = self.http.fetch_text(&metadata_url)?;
        if let Some(expected) = &package.checksums {
            expected.verify(&package.to_string(), metadata_json.as_bytes())?;
        }
        let metadata = PackageMetadata::from_json(&metadata_json).map_err(|e| {
            EvalError::io(format!("bad package metadata from {}: {}", metadata_url, e))
        })?;

        let archive_bytes = self.http.fetch_bytes(&metadata.package_zip_url)?;
        if let Some(expected) = &metadata.package_zip_checksums {
            expected.verify(&metadata.package_zip_url, &archive_bytes)?;
        }

        write_atomic(&metadata_path, metadata_json.as_bytes())?;
        write_atomic(&archive_path, &archive_bytes)?;
        Ok(entry_dir)
    }

    fn archive_bytes(&self, package: &PackageUri) -> EvalResult<Arc<[u8]>> {
        let key = package.cache_key();
        if let Some(bytes) = self.archive_cache.borrow().get(&key) {
            return Ok(Arc::clone(bytes));
        }

        let entry_dir = self.ensure_cached(package)?;
        let archive_path = entry_dir.join(ARCHIVE_FILE);
        let bytes = fs::read(&archive_path).map_err(|e| {
            EvalError::io(format!("failed to read {}: {}", archive_path.display(), e))
        })?;

        // Cached entries are re-verified on first open, so a tampered cache
        // surfaces as an integrity error
        if let Some(expected) = self.declared_archive_checksums(package)? {
            expected.verify(&package.to_string(), &bytes)?;
        }

        let arc: Arc<[u8]> = bytes.into();
        self.archive_cache.borrow_mut().insert(key, Arc::clone(&arc));
        Ok(arc)
    }

    fn declared_archive_checksums(&self, package: &PackageUri) -> EvalResult<Option<Checksums>> {
        Ok(self.get_metadata(package)?.package_zip_checksums)
    }

    fn open_archive(&self, package: &PackageUri) -> EvalResult<ZipArchive<std::io::Cursor<Arc<[u8]>>>> {
        let bytes = self.archive_bytes(package)?;
        ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| EvalError::io(format!("failed to open archive of {}: {}", package, e)))
    }
}

impl PackageResolver for DiskCachedPackageResolver {
    fn get_bytes(&self, package: &PackageUri, path: &str) -> EvalResult<Vec<u8>> {
        let package = self.pin(package)?;
        let mut archive = self.open_archive(&package)?;
        let name = path.strip_prefix('/').unwrap_or(path);
        let mut file = archive.by_name(name).map_err(|_| {
            EvalError::resolution(
                format!("{}#{}", package, path),
                "no such file in package archive",
            )
        })?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| EvalError::io(format!("failed to read {}#{}: {}", package, path, e)))?;
        Ok(contents)
    }

    fn get_metadata(&self, package: &PackageUri) -> EvalResult<PackageMetadata> {
        let package = self.pin(package)?;
        let key = package.cache_key();
        if let Some(metadata) = self.metadata_cache.borrow().get(&key) {
            return Ok(metadata.clone());
        }

        let entry_dir = self.ensure_cached(&package)?;
        let metadata_path = entry_dir.join(METADATA_FILE);
        let json = fs::read_to_string(&metadata_path).map_err(|e| {
            EvalError::io(format!("failed to read {}: {}", metadata_path.display(), e))
        })?;
        if let Some(expected) = &package.checksums {
            expected.verify(&package.to_string(), json.as_bytes())?;
        }
        let metadata = PackageMetadata::from_json(&json)
            .map_err(|e| EvalError::io(format!("bad cached metadata for {}: {}", package, e)))?;

        self.metadata_cache
            .borrow_mut()
            .insert(key, metadata.clone());
        Ok(metadata)
    }

    fn has_file(&self, package: &PackageUri, path: &str) -> EvalResult<bool> {
        let package = self.pin(package)?;
        let archive = self.open_archive(&package)?;
        let name = path.strip_prefix('/').unwrap_or(path);
        let found = archive.file_names().any(|n| n == name);
        Ok(found)
    }

    fn list_files(&self, package: &PackageUri, dir: &str) -> EvalResult<Vec<String>> {
        let package = self.pin(package)?;
        let archive = self.open_archive(&package)?;
        let normalized = dir.strip_prefix('/').unwrap_or(dir);
        let prefix = if normalized.is_empty() || normalized.ends_with('/') {
            normalized.to_string()
        } else {
            format!("{}/", normalized)
        };
        let mut files: Vec<String> = archive
            .file_names()
            .filter(|name| name.starts_with(&prefix) && !name.ends_with('/'))
            .map(|name| format!("/{}", name))
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Exclusive per-entry lock held while a cache entry is populated.
///
/// Implemented with `create_new` on a lock file since that is atomic on
/// every platform the cache runs on. Released on drop.
struct CacheLock {
    path: PathBuf,
}

impl CacheLock {
    fn acquire(path: PathBuf) -> EvalResult<Self> {
        for _ in 0..LOCK_MAX_POLLS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    remove_if_stale(&path);
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return Err(EvalError::io(format!(
                        "failed to create lock file {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Err(EvalError::io(format!(
            "timed out waiting for package cache lock {}",
            path.display()
        )))
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn remove_if_stale(path: &Path) {
    let stale = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER);
    if stale {
        tracing::warn!(path = %path.display(), "removing stale package cache lock");
        let _ = fs::remove_file(path);
    }
}

/// Write a cache file via a sibling temp file and an atomic rename
fn write_atomic(target: &Path, data: &[u8]) -> EvalResult<()> {
    let tmp = target.with_extension(format!("tmp.{}", std::process::id()));
    let mut file = File::create(&tmp)
        .map_err(|e| EvalError::io(format!("failed to create {}: {}", tmp.display(), e)))?;
    file.write_all(data)
        .map_err(|e| EvalError::io(format!("failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, target).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        EvalError::io(format!("failed to move {} into place: {}", target.display(), e))
    })
}

fn default_cache_dir() -> EvalResult<PathBuf> {
    let cache = dirs::cache_dir()
        .ok_or_else(|| EvalError::io("could not determine a cache directory"))?;
    Ok(cache.join("marl").join("packages"))
}
