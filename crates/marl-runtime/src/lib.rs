//! Marl Runtime
//!
//! Lazy evaluation engine for the Marl configuration language: memoized
//! object graphs with amendment inheritance, force-time type checking,
//! security-checked module and resource loading, and checksum-verified
//! package resolution.

// Allow Arc with non-Send/Sync types - each evaluator is single-threaded
// and uses Arc for shared ownership, not for cross-thread sharing.
#![allow(clippy::arc_with_non_send_sync)]

pub mod cache;
pub mod class;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod object;
pub mod packages;
pub mod reader;
pub mod scope;
pub mod security;
pub mod value;

pub use cache::ModuleCache;
pub use class::{ClassInfo, ClassRegistry};
pub use error::{ErrorKind, EvalError, EvalResult, StackFrame};
pub use evaluator::{Evaluator, EvaluatorOptions};
pub use loader::{ModuleLoader, ParseFn};
pub use object::{Member, MemberMetadata, Object, ObjectKind};
pub use packages::{
    Checksums, DiskCachedPackageResolver, PackageResolver, PackageUri, Project, ProjectDeps,
    ProjectResolver,
};
pub use reader::{ModuleReader, ReaderRegistry, ResourceReader};
pub use scope::{Scope, ScopeRef};
pub use security::{SecurityManager, SecurityManagerRef};
pub use value::{Closure, Value};
