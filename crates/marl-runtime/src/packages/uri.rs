//! Package URI parsing
//!
//! Format: `package://authority/path@version[::sha256:...][#/asset/path]`.
//! The `projectpackage://` scheme marks a version pinned through a project's
//! resolved dependency file.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, EvalError, EvalResult};

use super::Checksums;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageScheme {
    Package,
    /// Pinned through MarlProject.deps.json
    ProjectPackage,
}

impl fmt::Display for PackageScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageScheme::Package => write!(f, "package"),
            PackageScheme::ProjectPackage => write!(f, "projectpackage"),
        }
    }
}

/// A versioned package address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageUri {
    pub scheme: PackageScheme,
    /// Host and optional port
    pub authority: String,
    /// Package path, always starting with `/`, without the version
    pub path: String,
    pub version: String,
    /// Declared checksums, if the URI carries a `::sha256:` suffix
    pub checksums: Option<Checksums>,
}

impl PackageUri {
    pub fn parse(uri: &str) -> EvalResult<Self> {
        let (scheme, rest) = if let Some(rest) = uri.strip_prefix("package://") {
            (PackageScheme::Package, rest)
        } else if let Some(rest) = uri.strip_prefix("projectpackage://") {
            (PackageScheme::ProjectPackage, rest)
        } else {
            return Err(invalid(uri, "expected package:// or projectpackage://"));
        };

        let (rest, checksums) = match rest.split_once("::") {
            Some((main, suffix)) => (main, Some(Checksums::parse(suffix)?)),
            None => (rest, None),
        };

        let slash = rest
            .find('/')
            .ok_or_else(|| invalid(uri, "missing package path"))?;
        let authority = &rest[..slash];
        let path_with_version = &rest[slash..];

        let at = path_with_version
            .rfind('@')
            .ok_or_else(|| invalid(uri, "missing @version"))?;
        let path = &path_with_version[..at];
        let version = &path_with_version[at + 1..];

        if authority.is_empty() {
            return Err(invalid(uri, "empty authority"));
        }
        if path.is_empty() {
            return Err(invalid(uri, "empty package path"));
        }
        if version.is_empty() {
            return Err(invalid(uri, "empty version"));
        }

        Ok(Self {
            scheme,
            authority: authority.to_string(),
            path: path.to_string(),
            version: version.to_string(),
            checksums,
        })
    }

    pub fn path_with_version(&self) -> String {
        format!("{}@{}", self.path, self.version)
    }

    /// HTTPS URL serving this package's metadata document
    pub fn metadata_url(&self) -> String {
        format!("https://{}{}", self.authority, self.path_with_version())
    }

    /// Canonical form, grouping all versions within a major line
    pub fn canonical(&self) -> CanonicalPackageUri {
        let major = self
            .version
            .split('.')
            .next()
            .unwrap_or(&self.version)
            .to_string();
        CanonicalPackageUri {
            authority: self.authority.clone(),
            path: self.path.clone(),
            major_version: major,
        }
    }

    pub fn as_project_package(&self) -> Self {
        Self {
            scheme: PackageScheme::ProjectPackage,
            ..self.clone()
        }
    }

    /// Cache key without scheme or checksums; both URI schemes share one
    /// cache entry per package version.
    pub fn cache_key(&self) -> String {
        format!("{}{}", self.authority, self.path_with_version())
    }

    /// On-disk cache directory for this package
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        root.join("package-1")
            .join(sanitize(&self.authority))
            .join(sanitize(&self.path_with_version()))
    }

    /// Simple version ordering: numeric dotted components, missing
    /// components count as zero.
    pub fn version_is_newer_than(&self, other: &PackageUri) -> bool {
        let parse = |v: &str| -> Vec<u64> {
            v.split(['.', '-', '+'])
                .map(|part| part.parse::<u64>().unwrap_or(0))
                .collect()
        };
        let a = parse(&self.version);
        let b = parse(&other.version);
        for i in 0..a.len().max(b.len()) {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            if x != y {
                return x > y;
            }
        }
        false
    }
}

impl fmt::Display for PackageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            self.scheme,
            self.authority,
            self.path_with_version()
        )?;
        if let Some(checksums) = &self.checksums {
            write!(f, "::{}", checksums)?;
        }
        Ok(())
    }
}

/// Canonical (major-version) package identity used as the key of resolved
/// dependency maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPackageUri {
    pub authority: String,
    pub path: String,
    pub major_version: String,
}

impl fmt::Display for CanonicalPackageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "package://{}{}@{}",
            self.authority, self.path, self.major_version
        )
    }
}

/// Package URI addressing a file inside the package via a fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageAssetUri {
    pub package: PackageUri,
    /// Asset path inside the archive, starting with `/`
    pub asset_path: String,
}

impl PackageAssetUri {
    pub fn parse(uri: &str) -> EvalResult<Self> {
        let Some((package_part, asset_path)) = uri.split_once('#') else {
            return Err(invalid(uri, "missing #/asset/path fragment"));
        };
        if asset_path.is_empty() {
            return Err(invalid(uri, "empty asset path"));
        }
        Ok(Self {
            package: PackageUri::parse(package_part)?,
            asset_path: asset_path.to_string(),
        })
    }

    pub fn is_package_asset_uri(uri: &str) -> bool {
        (uri.starts_with("package://") || uri.starts_with("projectpackage://"))
            && uri.contains('#')
    }
}

impl fmt::Display for PackageAssetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.package, self.asset_path)
    }
}

fn invalid(uri: &str, reason: &str) -> EvalError {
    ErrorKind::InvalidPackageUri(format!("{} ({})", uri, reason)).into()
}

/// Make a URI component safe to use as a directory name
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | '@') {
                c
            } else {
                '~'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri() {
        let uri = PackageUri::parse("package://pkg.example.com/tools/net@2.1.0").unwrap();
        assert_eq!(uri.scheme, PackageScheme::Package);
        assert_eq!(uri.authority, "pkg.example.com");
        assert_eq!(uri.path, "/tools/net");
        assert_eq!(uri.version, "2.1.0");
        assert!(uri.checksums.is_none());
        assert_eq!(uri.metadata_url(), "https://pkg.example.com/tools/net@2.1.0");
    }

    #[test]
    fn parses_checksum_suffix() {
        let uri =
            PackageUri::parse("package://pkg.example.com/tools/net@2.1.0::sha256:abcd").unwrap();
        assert_eq!(uri.checksums.unwrap().sha256, "abcd");
    }

    #[test]
    fn rejects_malformed_uris() {
        assert!(PackageUri::parse("https://example.com/x@1.0.0").is_err());
        assert!(PackageUri::parse("package://example.com/x").is_err());
        assert!(PackageUri::parse("package://example.com/@1.0.0").is_err());
        assert!(PackageUri::parse("package:///x@1.0.0").is_err());
    }

    #[test]
    fn canonical_keeps_major_only() {
        let uri = PackageUri::parse("package://example.com/pkg@1.4.2").unwrap();
        assert_eq!(uri.canonical().to_string(), "package://example.com/pkg@1");
    }

    #[test]
    fn asset_uri_round_trip() {
        let uri =
            PackageAssetUri::parse("package://example.com/pkg@1.0.0#/lib/util.marl").unwrap();
        assert_eq!(uri.asset_path, "/lib/util.marl");
        assert_eq!(
            uri.to_string(),
            "package://example.com/pkg@1.0.0#/lib/util.marl"
        );
    }

    #[test]
    fn version_ordering() {
        let a = PackageUri::parse("package://e.com/p@1.10.0").unwrap();
        let b = PackageUri::parse("package://e.com/p@1.9.3").unwrap();
        assert!(a.version_is_newer_than(&b));
        assert!(!b.version_is_newer_than(&a));
    }
}
