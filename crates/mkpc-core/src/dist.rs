//! Distribution roots: where installed packages are laid out.
//!
//! A wheel is unpacked into `site-packages`, so a library's path relative to
//! the `site-packages` directory holding it is also its path inside the
//! wheel being built.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use crate::error::RelinkError;
use crate::package::Package;

const SITE_PACKAGES_SCRIPT: &str = "import json, site; print(json.dumps(site.getsitepackages()))";

/// Ordered set of distribution root directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistRoots(Vec<PathBuf>);

impl DistRoots {
    /// Roots in priority order.
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self(roots.into_iter().collect())
    }

    /// The `site-packages` directories of a Python interpreter.
    ///
    /// `python` defaults to `python3` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interpreter cannot be found or run, or prints
    /// something other than a JSON list of paths.
    pub fn from_python(python: Option<&Path>) -> std::io::Result<Self> {
        let python = match python {
            Some(p) => p.to_path_buf(),
            None => which::which("python3")
                .or_else(|_| which::which("python"))
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e))?,
        };

        let output = Command::new(&python)
            .args(["-c", SITE_PACKAGES_SCRIPT])
            .output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "{} failed: {}",
                python.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let roots = parse_site_packages(&String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!("site-packages of {}: {roots:?}", python.display());
        Ok(roots)
    }

    /// Path of `file` relative to the first root that contains it.
    pub fn locate(&self, file: &Path) -> Option<PathBuf> {
        self.0.iter().find_map(|root| {
            file.strip_prefix(root)
                .ok()
                .filter(|rest| !rest.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
    }

    /// Fill in every missing distribution path of the given packages.
    ///
    /// Paths that are already known are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`RelinkError::NotInstalled`] for a library outside every root,
    /// e.g. a dependency installed in editable mode.
    pub fn ensure_dist_paths(&self, packages: &[Rc<Package>]) -> Result<(), RelinkError> {
        for pkg in packages {
            for lib in &pkg.shared_libs {
                if lib.dist_path().is_some() {
                    continue;
                }

                let dist_path = self
                    .locate(lib.file_path())
                    .ok_or_else(|| RelinkError::NotInstalled {
                        package: pkg.name.clone(),
                        file: lib.file_path().to_path_buf(),
                    })?;

                tracing::debug!(
                    "{}: distribution path {}",
                    lib.file_path().display(),
                    dist_path.display()
                );
                // Cannot be occupied: we just checked it was empty.
                let _ = lib.set_dist_path(dist_path);
            }
        }
        Ok(())
    }

    /// The configured roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.0
    }

    /// True if no root is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_site_packages(stdout: &str) -> std::io::Result<DistRoots> {
    let roots: Vec<PathBuf> = serde_json::from_str(stdout.trim())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(DistRoots::new(roots))
}
