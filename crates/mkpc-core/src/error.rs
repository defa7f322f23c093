//! Errors raised while relinking a set of packages.

use std::path::PathBuf;

use thiserror::Error;

use crate::inspector::InspectError;
use crate::pkgconf::ResolveError;

/// Every failure aborts the whole relink call; binaries already rewritten are
/// left as they are.
#[derive(Error, Debug)]
pub enum RelinkError {
    /// Two packages passed to the relinker share a name.
    #[error("package '{name}' was registered more than once")]
    DuplicateName {
        /// The repeated package name.
        name: String,
    },

    /// A required package could not be resolved.
    #[error("could not resolve required package '{name}': {source}")]
    UnresolvedPackage {
        /// The required package name.
        name: String,
        /// Why the resolver gave up.
        #[source]
        source: ResolveError,
    },

    /// Two required libraries share a file name but live at different paths.
    #[error(
        "ambiguous dependency '{name}': provided by both {} and {}",
        .first.display(),
        .second.display()
    )]
    ConflictingLibrary {
        /// The shared file name.
        name: String,
        /// The path registered first.
        first: PathBuf,
        /// The path that disagreed with it.
        second: PathBuf,
    },

    /// A binary references a non-system library no required package provides.
    #[error(
        "{}: unresolved library {install_name}: maybe a dependency is missing?",
        .file.display()
    )]
    UnresolvedDependency {
        /// The binary holding the record.
        file: PathBuf,
        /// The unresolved load-path record.
        install_name: String,
    },

    /// A required library is not located under any distribution root.
    #[error(
        "pkg-config package {package} is not installed in a distribution root (found at {})",
        .file.display()
    )]
    NotInstalled {
        /// The package owning the library.
        package: String,
        /// Where the library was found.
        file: PathBuf,
    },

    /// A library being relinked for distribution has no distribution path.
    #[error("{} has no distribution path", .file.display())]
    MissingDistPath {
        /// The library lacking a distribution path.
        file: PathBuf,
    },

    /// Reading or writing a binary's load commands failed.
    #[error("IO error: {0}")]
    Io(#[from] InspectError),
}
