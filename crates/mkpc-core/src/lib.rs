//! Core library for mkpc.
//!
//! Rewrites the dependent-library load commands of Mach-O shared libraries
//! declared through pkg-config metadata, so that a Python package's native
//! libraries find each other either at their build-machine location
//! (editable installs) or relative to `site-packages` (wheels).

pub mod cache;
pub mod config;
pub mod dist;
pub mod error;
pub mod inspector;
pub mod package;
pub mod paths;
pub mod pkgconf;
pub mod relinker;
pub mod system;

pub use cache::PackageCache;
pub use dist::DistRoots;
pub use error::RelinkError;
pub use inspector::{BinaryInspector, InspectError, MachOInspector};
pub use package::{Library, Package};
pub use pkgconf::{PackageResolver, PkgConfResolver, ResolveError};
pub use relinker::{RelinkMode, Relinker, Rewrite};
pub use system::{SystemLibraryFilter, SystemPrefixes};

/// Loader-relative token understood by dyld.
pub const LOADER_PATH: &str = "@loader_path";
