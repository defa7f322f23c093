//! Packages and the shared libraries they own.

use std::cell::OnceCell;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// A compiled shared library.
#[derive(Debug, Clone)]
pub struct Library {
    file_path: PathBuf,
    dist_path: OnceCell<PathBuf>,
}

impl Library {
    /// A library whose installed location is not known yet.
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            dist_path: OnceCell::new(),
        }
    }

    /// A library with a known path relative to the installation root.
    pub fn with_dist_path(file_path: impl Into<PathBuf>, dist_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            dist_path: OnceCell::from(dist_path.into()),
        }
    }

    /// Absolute location on the build machine.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Location relative to the installation root, once known.
    pub fn dist_path(&self) -> Option<&Path> {
        self.dist_path.get().map(PathBuf::as_path)
    }

    /// Record the installed location.
    ///
    /// # Errors
    ///
    /// Returns the rejected path if one was already recorded.
    pub fn set_dist_path(&self, dist_path: PathBuf) -> Result<(), PathBuf> {
        self.dist_path.set(dist_path)
    }

    /// File name used to match load-path records against this library.
    ///
    /// Falls back to the whole path when it has no file name component.
    pub fn basename(&self) -> &OsStr {
        self.file_path
            .file_name()
            .unwrap_or(self.file_path.as_os_str())
    }
}

/// A named set of shared libraries plus the package names it requires.
#[derive(Debug, Clone)]
pub struct Package {
    /// pkg-config name of the package.
    pub name: String,
    /// Shared libraries owned by the package.
    pub shared_libs: Vec<Library>,
    /// Other pkg-config packages these libraries link against.
    pub requires: Vec<String>,
}

impl Package {
    /// Create a package.
    pub fn new(name: impl Into<String>, shared_libs: Vec<Library>, requires: Vec<String>) -> Self {
        Self {
            name: name.into(),
            shared_libs,
            requires,
        }
    }

    /// A package with no requirements, as returned by the resolver.
    pub fn leaf(name: impl Into<String>, shared_libs: Vec<Library>) -> Self {
        Self::new(name, shared_libs, Vec::new())
    }
}
