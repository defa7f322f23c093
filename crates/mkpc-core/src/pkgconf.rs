//! Resolving package names to shared libraries through pkg-config.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::package::{Library, Package};
use crate::paths::shared_library_filename;

/// Errors returned while querying pkg-config.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// pkg-config does not know the package.
    #[error("Could not find pkg-config package '{name}': {stderr}")]
    NotFound {
        /// The requested package.
        name: String,
        /// Diagnostics printed by pkg-config.
        stderr: String,
    },

    /// No pkg-config implementation is installed.
    #[error("neither pkgconf nor pkg-config was found on PATH (set PKG_CONFIG to override)")]
    ToolNotFound,

    /// pkg-config could not be started.
    #[error("failed to spawn {}: {source}", .program.display())]
    Spawn {
        /// The program that failed to start.
        program: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// pkg-config printed something other than the requested flag kind.
    #[error("{name}: unexpected flag '{flag}' (expected {expected}...)")]
    UnexpectedFlag {
        /// The package being resolved.
        name: String,
        /// The offending token.
        flag: String,
        /// The flag prefix that was requested.
        expected: &'static str,
    },

    /// The output could not be split into shell words.
    #[error("{name}: could not parse pkg-config output: {output}")]
    BadQuoting {
        /// The package being resolved.
        name: String,
        /// The raw output.
        output: String,
    },

    /// A `-l` library was not found in any `-L` directory.
    #[error("{name}: can't locate lib '{lib}'")]
    MissingLibrary {
        /// The package being resolved.
        name: String,
        /// The library name from the `-l` flag.
        lib: String,
    },
}

/// Maps a package name to its compiled artifacts.
pub trait PackageResolver {
    /// Look up `name` in the external package-metadata system.
    ///
    /// # Errors
    ///
    /// Returns an error if the package is unknown or its libraries are missing.
    fn resolve(&self, name: &str) -> Result<Package, ResolveError>;
}

/// [`PackageResolver`] that shells out to `pkgconf` / `pkg-config`.
#[derive(Debug, Clone)]
pub struct PkgConfResolver {
    // None when no implementation was found; reported on first resolve
    program: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl PkgConfResolver {
    /// Resolver using an explicit pkg-config binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
            search_paths: Vec::new(),
        }
    }

    /// Find a pkg-config implementation: `$PKG_CONFIG`, then `pkgconf`, then
    /// `pkg-config` on `PATH`.
    ///
    /// A missing tool is not an error until a package has to be resolved,
    /// where it fails with [`ResolveError::ToolNotFound`].
    pub fn locate() -> Self {
        if let Some(program) = std::env::var_os("PKG_CONFIG").filter(|p| !p.is_empty()) {
            return Self::new(program);
        }
        let program = ["pkgconf", "pkg-config"]
            .iter()
            .find_map(|tool| which::which(tool).ok());
        if program.is_none() {
            tracing::debug!("no pkg-config implementation on PATH");
        }
        Self {
            program,
            search_paths: Vec::new(),
        }
    }

    /// Directories searched for `.pc` files before `PKG_CONFIG_PATH`.
    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths.extend(paths);
        self
    }

    /// The pkg-config binary in use, if one was found.
    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    fn query(&self, name: &str, flag: &str) -> Result<String, ResolveError> {
        let program = self.program.as_deref().ok_or(ResolveError::ToolNotFound)?;
        let mut cmd = Command::new(program);
        cmd.args([flag, "--static", name]);
        if let Some(path) = self.pkg_config_path() {
            cmd.env("PKG_CONFIG_PATH", path);
        }

        tracing::debug!("{} {flag} --static {name}", program.display());
        let output = cmd.output().map_err(|source| ResolveError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

        if !output.status.success() {
            return Err(ResolveError::NotFound {
                name: name.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn pkg_config_path(&self) -> Option<OsString> {
        if self.search_paths.is_empty() {
            return None;
        }
        let existing = std::env::var_os("PKG_CONFIG_PATH");
        let inherited = existing
            .iter()
            .flat_map(std::env::split_paths)
            .collect::<Vec<_>>();
        std::env::join_paths(self.search_paths.iter().cloned().chain(inherited)).ok()
    }
}

impl PackageResolver for PkgConfResolver {
    fn resolve(&self, name: &str) -> Result<Package, ResolveError> {
        let lib_dirs: Vec<PathBuf> = parse_flags(name, &self.query(name, "--libs-only-L")?, "-L")?
            .into_iter()
            .map(PathBuf::from)
            .collect();
        let lib_names = parse_flags(name, &self.query(name, "--libs-only-l")?, "-l")?;

        let libs = locate_libraries(name, &lib_names, &lib_dirs)?;

        // --static already flattened the transitive requirements
        Ok(Package::leaf(name, libs))
    }
}

/// Split pkg-config output into the values of `prefix` flags.
///
/// # Errors
///
/// Returns an error if the output is badly quoted or holds another flag kind.
pub fn parse_flags(
    name: &str,
    output: &str,
    prefix: &'static str,
) -> Result<Vec<String>, ResolveError> {
    let tokens = shlex::split(output).ok_or_else(|| ResolveError::BadQuoting {
        name: name.to_string(),
        output: output.to_string(),
    })?;

    tokens
        .into_iter()
        .map(|token| match token.strip_prefix(prefix) {
            Some(value) => Ok(value.to_string()),
            None => Err(ResolveError::UnexpectedFlag {
                name: name.to_string(),
                flag: token,
                expected: prefix,
            }),
        })
        .collect()
}

/// Map every `-l` name to the first library directory holding its shared
/// library.
///
/// # Errors
///
/// Returns [`ResolveError::MissingLibrary`] for a name found in no directory.
pub fn locate_libraries(
    name: &str,
    lib_names: &[String],
    lib_dirs: &[PathBuf],
) -> Result<Vec<Library>, ResolveError> {
    lib_names
        .iter()
        .map(|lib| {
            let filename = shared_library_filename(lib);
            lib_dirs
                .iter()
                .map(|dir| dir.join(&filename))
                .find(|candidate| candidate.exists())
                .map(Library::new)
                .ok_or_else(|| ResolveError::MissingLibrary {
                    name: name.to_string(),
                    lib: lib.clone(),
                })
        })
        .collect()
}
