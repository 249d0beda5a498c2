//! Package resolution for Marl
//!
//! Handles `package://` and `projectpackage://` URIs: parsing, checksum
//! verification, download and on-disk caching, and project dependency
//! graphs pinned in MarlProject.deps.json.

mod checksums;
mod http;
mod metadata;
mod project;
mod resolver;
mod uri;

pub use checksums::Checksums;
pub use http::HttpClient;
pub use metadata::{PackageDependency, PackageMetadata};
pub use project::{
    Project, ProjectDeps, ProjectDependency, ProjectResolver, ResolvedDependency,
};
pub use resolver::{DiskCachedPackageResolver, PackageResolver};
pub use uri::{CanonicalPackageUri, PackageAssetUri, PackageScheme, PackageUri};
