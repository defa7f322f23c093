//! Mach-O dependency relinking.
//!
//! The macOS loader does not look at libraries already loaded into the
//! process: every dylib must locate its dependencies itself, through the
//! load commands recorded in the binary. Two layouts are supported:
//!
//! - **Development** (editable installs): everything already sits where it
//!   will be at runtime, so dependencies are referenced by absolute path.
//! - **Distribution** (wheels): libraries are unpacked into `site-packages`
//!   next to the packages they depend on, so each reference becomes
//!   `@loader_path/<relative path inside site-packages>`.
//!
//! The distribution layout is only valid for the environment the wheel was
//! built in: build wheels in a clean environment whose dependencies are all
//! installed normally into a single `site-packages`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::LOADER_PATH;
use crate::cache::PackageCache;
use crate::dist::DistRoots;
use crate::error::RelinkError;
use crate::inspector::BinaryInspector;
use crate::package::{Library, Package};
use crate::paths::{install_name_basename, relative_path, to_posix};
use crate::pkgconf::PackageResolver;
use crate::system::SystemLibraryFilter;

/// Which layout the rewritten load commands should resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelinkMode {
    /// Reference dependencies by their absolute build-machine path.
    Development,
    /// Reference dependencies relative to the loading library, assuming
    /// everything is installed under one of these roots.
    Distribution(DistRoots),
}

impl RelinkMode {
    /// Mode for an editable (`true`) or regular wheel build.
    ///
    /// `roots` is only called for a regular build.
    ///
    /// # Errors
    ///
    /// Returns whatever `roots` fails with.
    pub fn for_build<E>(
        editable: bool,
        roots: impl FnOnce() -> Result<DistRoots, E>,
    ) -> Result<Self, E> {
        if editable {
            Ok(Self::Development)
        } else {
            roots().map(Self::Distribution)
        }
    }
}

/// One load command rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// The patched binary.
    pub file: PathBuf,
    /// The record before the rewrite.
    pub old: String,
    /// The record after the rewrite.
    pub new: String,
}

impl fmt::Display for Rewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.file.display(), self.old, self.new)
    }
}

/// Rewrites the load commands of packages' shared libraries.
pub struct Relinker<'a> {
    inspector: &'a dyn BinaryInspector,
    resolver: &'a dyn PackageResolver,
    system: &'a dyn SystemLibraryFilter,
    dry_run: bool,
}

impl fmt::Debug for Relinker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relinker")
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

/// Basename of a required library to the library providing it.
type Remap<'p> = HashMap<&'p OsStr, &'p Library>;

impl<'a> Relinker<'a> {
    /// Relinker using the given collaborators.
    pub fn new(
        inspector: &'a dyn BinaryInspector,
        resolver: &'a dyn PackageResolver,
        system: &'a dyn SystemLibraryFilter,
    ) -> Self {
        Self {
            inspector,
            resolver,
            system,
            dry_run: false,
        }
    }

    /// Plan and report rewrites without touching any binary.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Fix the shared libraries of every package.
    ///
    /// All packages are registered before any is processed, so packages may
    /// require each other. Returns the rewrites performed.
    ///
    /// # Errors
    ///
    /// Fails on the first error; binaries already rewritten stay rewritten.
    pub fn relink(
        &self,
        packages: Vec<Package>,
        mode: &RelinkMode,
    ) -> Result<Vec<Rewrite>, RelinkError> {
        let mut cache = PackageCache::new(self.resolver);
        let packages = packages
            .into_iter()
            .map(|pkg| cache.add(pkg))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rewrites = Vec::new();
        for pkg in &packages {
            rewrites.extend(self.relink_one(pkg, mode, &mut cache)?);
        }
        tracing::debug!(
            "relinked {} package(s), {} known",
            packages.len(),
            cache.len()
        );
        Ok(rewrites)
    }

    /// Fix the shared libraries of a single package.
    ///
    /// Every record of every owned library is classified before the first
    /// write, so a conflicting or unresolved dependency leaves the package's
    /// binaries untouched.
    ///
    /// # Errors
    ///
    /// See [`RelinkError`].
    pub fn relink_one(
        &self,
        pkg: &Package,
        mode: &RelinkMode,
        cache: &mut PackageCache<'_>,
    ) -> Result<Vec<Rewrite>, RelinkError> {
        if pkg.requires.is_empty() {
            return Ok(Vec::new());
        }

        let reqs = pkg
            .requires
            .iter()
            .map(|name| cache.get_or_resolve(name))
            .collect::<Result<Vec<_>, _>>()?;

        let plan = match mode {
            RelinkMode::Development => self.plan_development(pkg, &reqs)?,
            RelinkMode::Distribution(roots) => self.plan_distribution(pkg, &reqs, roots)?,
        };

        self.apply(plan)
    }

    fn plan_development(
        &self,
        pkg: &Package,
        reqs: &[Rc<Package>],
    ) -> Result<Vec<Rewrite>, RelinkError> {
        let remap = build_remap(reqs)?;

        let mut plan = Vec::new();
        for lib in &pkg.shared_libs {
            self.plan_library(lib.file_path(), &remap, &mut plan, |resolved| {
                Ok(resolved.file_path().to_string_lossy().into_owned())
            })?;
        }
        Ok(plan)
    }

    fn plan_distribution(
        &self,
        pkg: &Package,
        reqs: &[Rc<Package>],
        roots: &DistRoots,
    ) -> Result<Vec<Rewrite>, RelinkError> {
        roots.ensure_dist_paths(reqs)?;
        let remap = build_remap(reqs)?;

        let mut plan = Vec::new();
        for lib in &pkg.shared_libs {
            let owner_dir = lib
                .dist_path()
                .ok_or_else(|| RelinkError::MissingDistPath {
                    file: lib.file_path().to_path_buf(),
                })?
                .parent()
                .unwrap_or(Path::new(""));

            self.plan_library(lib.file_path(), &remap, &mut plan, |resolved| {
                let dep = resolved
                    .dist_path()
                    .ok_or_else(|| RelinkError::MissingDistPath {
                        file: resolved.file_path().to_path_buf(),
                    })?;
                Ok(format!(
                    "{LOADER_PATH}/{}",
                    to_posix(&relative_path(owner_dir, dep))
                ))
            })?;
        }
        Ok(plan)
    }

    /// Classify every record of one binary, queueing the changed ones.
    fn plan_library<F>(
        &self,
        file: &Path,
        remap: &Remap<'_>,
        plan: &mut Vec<Rewrite>,
        target: F,
    ) -> Result<(), RelinkError>
    where
        F: Fn(&Library) -> Result<String, RelinkError>,
    {
        for install_name in self.inspector.read_load_paths(file)? {
            let basename = OsStr::new(install_name_basename(&install_name));
            let Some(&resolved) = remap.get(basename) else {
                if self.system.is_known_system_path(&install_name) {
                    tracing::debug!("{}: system library {install_name}", file.display());
                    continue;
                }
                return Err(RelinkError::UnresolvedDependency {
                    file: file.to_path_buf(),
                    install_name,
                });
            };

            let new = target(resolved)?;
            if new != install_name {
                plan.push(Rewrite {
                    file: file.to_path_buf(),
                    old: install_name,
                    new,
                });
            }
        }
        Ok(())
    }

    fn apply(&self, plan: Vec<Rewrite>) -> Result<Vec<Rewrite>, RelinkError> {
        for rewrite in &plan {
            if self.dry_run {
                tracing::info!("Would relink: {rewrite}");
                continue;
            }
            self.inspector
                .write_load_path(&rewrite.file, &rewrite.old, &rewrite.new)?;
            tracing::info!("Relink: {rewrite}");
        }
        Ok(plan)
    }
}

/// Index required libraries by file name.
///
/// Two libraries with the same file name must be the same file, whatever
/// order the requirements are listed in.
fn build_remap(reqs: &[Rc<Package>]) -> Result<Remap<'_>, RelinkError> {
    let mut remap = Remap::new();
    for req in reqs {
        for lib in &req.shared_libs {
            match remap.entry(lib.basename()) {
                Entry::Occupied(existing) => {
                    if existing.get().file_path() != lib.file_path() {
                        return Err(RelinkError::ConflictingLibrary {
                            name: lib.basename().to_string_lossy().into_owned(),
                            first: existing.get().file_path().to_path_buf(),
                            second: lib.file_path().to_path_buf(),
                        });
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(lib);
                }
            }
        }
    }
    Ok(remap)
}
