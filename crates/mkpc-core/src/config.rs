//! `pyproject.toml` configuration.
//!
//! Reads the `[[tool.hatch.build.hooks.mkpkgconf.pcfile]]` entries and the
//! wheel target's `sources` option, and turns them into the packages to
//! relink.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::dist::DistRoots;
use crate::package::{Library, Package};
use crate::paths::{shared_library_filename, to_posix};
use crate::system::SystemPrefixes;

/// Name of the project file read from the project root.
pub const PYPROJECT: &str = "pyproject.toml";

/// Errors that can occur when loading the project configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The project file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be deserialized.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A path option that must be relative to the project root is not.
    #[error("{field} must be relative to the project root, got '{value}'")]
    NotRelative {
        /// The offending option.
        field: &'static str,
        /// Its value.
        value: String,
    },
}

/// One `[[tool.hatch.build.hooks.mkpkgconf.pcfile]]` entry.
///
/// Keys only relevant to generating the `.pc` file itself (`description`,
/// `version`, `includedir`, ...) are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct PcFileConfig {
    /// Name of the `.pc` file and of the pkg-config package.
    pub name: String,
    /// Directory the `.pc` file is written to, relative to the project root.
    pub outpath: String,
    /// Where the shared libraries live; defaults to `outpath`.
    #[serde(default)]
    pub libdir: Option<String>,
    /// Shared library names without prefix or extension.
    #[serde(default)]
    pub shared_libraries: Option<Vec<String>>,
    /// pkg-config packages these libraries require.
    #[serde(default)]
    pub requires: Option<Vec<String>>,
    /// Private pkg-config packages these libraries require.
    #[serde(default)]
    pub requires_private: Option<Vec<String>>,
}

impl PcFileConfig {
    /// `outpath` as a validated relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if `outpath` is absolute or escapes the project root.
    pub fn out_path(&self) -> Result<PathBuf, ConfigError> {
        parse_relative_path(&self.outpath, "outpath")
    }

    /// Directory holding the shared libraries, relative to the project root.
    ///
    /// # Errors
    ///
    /// Returns an error if `libdir` or `outpath` is not a relative path.
    pub fn lib_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.libdir {
            Some(libdir) => parse_relative_path(libdir, "libdir"),
            None => self.out_path(),
        }
    }

    /// Public and private requirements, in that order.
    pub fn all_requires(&self) -> Vec<String> {
        self.requires
            .iter()
            .chain(self.requires_private.iter())
            .flatten()
            .cloned()
            .collect()
    }
}

/// The `[tool.hatch.build.hooks.mkpkgconf]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookConfig {
    /// `.pc` file entries.
    #[serde(default)]
    pub pcfile: Vec<PcFileConfig>,
    /// Distribution roots to use instead of the interpreter's site-packages.
    #[serde(default)]
    pub dist_roots: Vec<PathBuf>,
    /// Load-path prefixes treated as system libraries, on top of the defaults.
    #[serde(default)]
    pub system_prefixes: Vec<String>,
}

/// The wheel target's `sources` option: a list of prefixes to strip, or a
/// table of prefix rewrites.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawSources {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

#[derive(Debug, Default, Deserialize)]
struct PyProject {
    #[serde(default)]
    tool: Tool,
}

#[derive(Debug, Default, Deserialize)]
struct Tool {
    #[serde(default)]
    hatch: Hatch,
}

#[derive(Debug, Default, Deserialize)]
struct Hatch {
    #[serde(default)]
    build: HatchBuild,
}

// `sources` and `packages` may be set per target or for every target.
#[derive(Debug, Default, Deserialize)]
struct HatchBuild {
    #[serde(default)]
    hooks: Hooks,
    #[serde(default)]
    targets: Targets,
    #[serde(default)]
    sources: Option<RawSources>,
    #[serde(default)]
    packages: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct Hooks {
    #[serde(default)]
    mkpkgconf: HookConfig,
}

#[derive(Debug, Default, Deserialize)]
struct Targets {
    #[serde(default)]
    wheel: WheelTarget,
}

#[derive(Debug, Default, Deserialize)]
struct WheelTarget {
    #[serde(default)]
    sources: Option<RawSources>,
    #[serde(default)]
    packages: Option<Vec<String>>,
}

/// Maps a project-relative path to its location inside the wheel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WheelSources {
    // (source prefix, replacement), longest prefix first
    rewrites: Vec<(String, String)>,
}

impl WheelSources {
    /// Build the mapping from a `sources` option and the `packages` list.
    ///
    /// Every package directory is installed at the top level of the wheel,
    /// so its parent directory is stripped unless `sources` already maps it.
    fn from_raw(raw: Option<RawSources>, packages: &[String]) -> Self {
        let mut rewrites: Vec<(String, String)> = match raw {
            None => Vec::new(),
            Some(RawSources::List(sources)) => sources
                .iter()
                .map(|source| (normalize_directory(source), String::new()))
                .collect(),
            Some(RawSources::Map(sources)) => sources
                .iter()
                .map(|(source, path)| (normalize_directory(source), normalize_directory(path)))
                .collect(),
        };
        for package in packages {
            let package = package.trim_end_matches(['/', '\\']);
            let Some((parent, _)) = package.rsplit_once(['/', '\\']) else {
                continue;
            };
            let source = normalize_directory(parent);
            if !source.is_empty() && !rewrites.iter().any(|(known, _)| *known == source) {
                rewrites.push((source, String::new()));
            }
        }
        rewrites.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { rewrites }
    }

    /// Location of `relative` (a `/`-separated project path) in the wheel.
    pub fn distribution_path(&self, relative: &str) -> String {
        for (source, replacement) in &self.rewrites {
            if source.is_empty() {
                return format!("{replacement}{relative}");
            }
            if let Some(rest) = relative.strip_prefix(source.as_str()) {
                return format!("{replacement}{rest}");
            }
        }
        relative.to_string()
    }
}

// "src/" for "src", "/src/" or "src/"; "" for the project root.
fn normalize_directory(path: &str) -> String {
    let stripped = path.trim_matches(|c| c == '/' || c == '\\');
    if stripped.is_empty() {
        String::new()
    } else {
        format!("{stripped}/")
    }
}

fn parse_relative_path(raw: &str, field: &'static str) -> Result<PathBuf, ConfigError> {
    let candidate = Path::new(raw);
    let escapes = raw.starts_with('/')
        || candidate.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
    if escapes {
        return Err(ConfigError::NotRelative {
            field,
            value: raw.to_string(),
        });
    }
    Ok(candidate.to_path_buf())
}

/// A project root and its relink configuration.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    hook: HookConfig,
    sources: WheelSources,
}

impl Project {
    /// Read `pyproject.toml` from `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(PYPROJECT);
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(root, &contents)
    }

    /// Parse `pyproject.toml` contents for a project at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or does not match the schema.
    pub fn parse(root: &Path, contents: &str) -> Result<Self, ConfigError> {
        let pyproject: PyProject = toml::from_str(contents)?;
        let build = pyproject.tool.hatch.build;
        let wheel = build.targets.wheel;
        let packages = wheel.packages.or(build.packages).unwrap_or_default();
        Ok(Self {
            root: root.to_path_buf(),
            hook: build.hooks.mkpkgconf,
            sources: WheelSources::from_raw(wheel.sources.or(build.sources), &packages),
        })
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configured `.pc` file entries.
    pub fn pcfiles(&self) -> &[PcFileConfig] {
        &self.hook.pcfile
    }

    /// The wheel path mapping.
    pub fn sources(&self) -> &WheelSources {
        &self.sources
    }

    /// Explicitly configured distribution roots, relative ones resolved
    /// against the project root.
    pub fn dist_roots(&self) -> Option<DistRoots> {
        if self.hook.dist_roots.is_empty() {
            return None;
        }
        Some(DistRoots::new(
            self.hook.dist_roots.iter().map(|root| self.root.join(root)),
        ))
    }

    /// System library filter: the defaults plus configured prefixes.
    pub fn system_filter(&self) -> SystemPrefixes {
        SystemPrefixes::default().extend(self.hook.system_prefixes.iter().cloned())
    }

    /// The packages to relink: one per entry that declares shared libraries.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry's `outpath` or `libdir` is not relative.
    pub fn packages(&self) -> Result<Vec<Package>, ConfigError> {
        let mut packages = Vec::new();
        for pcfile in &self.hook.pcfile {
            let Some(shared_libraries) = &pcfile.shared_libraries else {
                continue;
            };

            let lib_dir = pcfile.lib_dir()?;
            let shared_libs = shared_libraries
                .iter()
                .map(|lib| {
                    let relative = lib_dir.join(shared_library_filename(lib));
                    let dist_path = self.sources.distribution_path(&to_posix(&relative));
                    Library::with_dist_path(self.root.join(&relative), dist_path)
                })
                .collect();

            packages.push(Package::new(
                pcfile.name.clone(),
                shared_libs,
                pcfile.all_requires(),
            ));
        }
        Ok(packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYPROJECT_TOML: &str = r#"
[project]
name = "robotpy-wpiutil"

[tool.hatch.build.targets.wheel]
packages = ["src/wpiutil"]

[tool.hatch.build.targets.wheel.sources]
"src" = ""

[[tool.hatch.build.hooks.mkpkgconf.pcfile]]
name = "wpiutil"
description = "Headers only"
outpath = "src/wpiutil"
includedir = "src/wpiutil/include"

[[tool.hatch.build.hooks.mkpkgconf.pcfile]]
name = "wpimath"
description = "Math library"
outpath = "src/wpimath"
libdir = "src/wpimath/lib"
shared_libraries = ["wpimath", "wpimath_extra"]
requires = ["wpiutil"]
requires_private = ["eigen"]
"#;

    #[test]
    fn test_packages_from_pyproject() {
        let project = Project::parse(Path::new("/work/proj"), PYPROJECT_TOML).unwrap();
        assert_eq!(project.pcfiles().len(), 2);

        let packages = project.packages().unwrap();
        assert_eq!(packages.len(), 1);

        let pkg = &packages[0];
        assert_eq!(pkg.name, "wpimath");
        assert_eq!(pkg.requires, vec!["wpiutil", "eigen"]);
        assert_eq!(pkg.shared_libs.len(), 2);

        let filename = shared_library_filename("wpimath");
        let lib = &pkg.shared_libs[0];
        assert_eq!(
            lib.file_path(),
            Path::new("/work/proj/src/wpimath/lib").join(&filename)
        );
        assert_eq!(
            lib.dist_path(),
            Some(Path::new(&format!("wpimath/lib/{filename}")))
        );
    }

    #[test]
    fn test_libdir_defaults_to_outpath() {
        let toml = r#"
[[tool.hatch.build.hooks.mkpkgconf.pcfile]]
name = "foo"
outpath = "foo"
shared_libraries = ["foo"]
"#;
        let project = Project::parse(Path::new("/p"), toml).unwrap();
        let packages = project.packages().unwrap();
        let lib = &packages[0].shared_libs[0];
        assert_eq!(
            lib.file_path(),
            Path::new("/p/foo").join(shared_library_filename("foo"))
        );
        assert!(packages[0].requires.is_empty());
    }

    #[test]
    fn test_absolute_outpath_rejected() {
        let toml = r#"
[[tool.hatch.build.hooks.mkpkgconf.pcfile]]
name = "foo"
outpath = "/usr/lib/foo"
shared_libraries = ["foo"]
"#;
        let project = Project::parse(Path::new("/p"), toml).unwrap();
        let err = project.packages().unwrap_err();
        assert!(matches!(err, ConfigError::NotRelative { field: "outpath", .. }));
    }

    #[test]
    fn test_parent_traversal_rejected() {
        let toml = r#"
[[tool.hatch.build.hooks.mkpkgconf.pcfile]]
name = "foo"
outpath = "foo"
libdir = "../elsewhere"
shared_libraries = ["foo"]
"#;
        let project = Project::parse(Path::new("/p"), toml).unwrap();
        assert!(project.packages().is_err());
    }

    #[test]
    fn test_missing_hook_section_is_empty() {
        let project = Project::parse(Path::new("/p"), "[project]\nname = \"x\"\n").unwrap();
        assert!(project.pcfiles().is_empty());
        assert!(project.packages().unwrap().is_empty());
        assert!(project.dist_roots().is_none());
    }

    #[test]
    fn test_sources_list_strips_prefix() {
        let sources = WheelSources::from_raw(Some(RawSources::List(vec!["src".into()])), &[]);
        assert_eq!(sources.distribution_path("src/foo/libfoo.dylib"), "foo/libfoo.dylib");
        assert_eq!(sources.distribution_path("other/libx.dylib"), "other/libx.dylib");
    }

    #[test]
    fn test_sources_map_longest_prefix_wins() {
        let mut map = BTreeMap::new();
        map.insert("src".to_string(), "pkg".to_string());
        map.insert("src/vendor".to_string(), "pkg/_vendor/".to_string());
        let sources = WheelSources::from_raw(Some(RawSources::Map(map)), &[]);

        assert_eq!(
            sources.distribution_path("src/vendor/libv.dylib"),
            "pkg/_vendor/libv.dylib"
        );
        assert_eq!(sources.distribution_path("src/libs.dylib"), "pkg/libs.dylib");
    }

    #[test]
    fn test_sources_root_mapping() {
        let mut map = BTreeMap::new();
        map.insert(String::new(), "prefix".to_string());
        let sources = WheelSources::from_raw(Some(RawSources::Map(map)), &[]);
        assert_eq!(sources.distribution_path("a/liba.dylib"), "prefix/a/liba.dylib");
    }

    #[test]
    fn test_wheel_packages_strip_parent_directory() {
        let toml = r#"
[tool.hatch.build.targets.wheel]
packages = ["src/foo"]

[[tool.hatch.build.hooks.mkpkgconf.pcfile]]
name = "foo"
outpath = "src/foo"
shared_libraries = ["foo"]
"#;
        let project = Project::parse(Path::new("/p"), toml).unwrap();
        let packages = project.packages().unwrap();
        let filename = shared_library_filename("foo");
        assert_eq!(
            packages[0].shared_libs[0].dist_path(),
            Some(Path::new(&format!("foo/{filename}")))
        );
    }

    #[test]
    fn test_build_level_sources_fallback() {
        let toml = r#"
[tool.hatch.build]
sources = ["src"]

[[tool.hatch.build.hooks.mkpkgconf.pcfile]]
name = "foo"
outpath = "src/foo"
shared_libraries = ["foo"]
"#;
        let project = Project::parse(Path::new("/p"), toml).unwrap();
        assert_eq!(
            project.sources().distribution_path("src/foo/libfoo.so"),
            "foo/libfoo.so"
        );
    }

    #[test]
    fn test_wheel_sources_override_build_sources() {
        let toml = r#"
[tool.hatch.build]
sources = ["src"]

[tool.hatch.build.targets.wheel.sources]
"src" = "renamed"
"#;
        let project = Project::parse(Path::new("/p"), toml).unwrap();
        assert_eq!(
            project.sources().distribution_path("src/foo/libfoo.so"),
            "renamed/foo/libfoo.so"
        );
    }

    #[test]
    fn test_explicit_source_wins_over_package_parent() {
        let mut map = BTreeMap::new();
        map.insert("src".to_string(), "pkg".to_string());
        let sources = WheelSources::from_raw(
            Some(RawSources::Map(map)),
            &["src/foo".to_string(), "top".to_string(), "lib/bar/".to_string()],
        );
        assert_eq!(sources.distribution_path("src/foo/libfoo.so"), "pkg/foo/libfoo.so");
        assert_eq!(sources.distribution_path("lib/bar/libbar.so"), "bar/libbar.so");
        assert_eq!(sources.distribution_path("top/libtop.so"), "top/libtop.so");
    }

    #[test]
    fn test_hook_extensions() {
        let toml = r#"
[tool.hatch.build.hooks.mkpkgconf]
dist_roots = ["build/site", "/opt/site-packages"]
system_prefixes = ["/opt/homebrew/lib/"]
"#;
        let project = Project::parse(Path::new("/p"), toml).unwrap();
        let roots = project.dist_roots().unwrap();
        assert_eq!(
            roots.roots(),
            [
                PathBuf::from("/p/build/site"),
                PathBuf::from("/opt/site-packages")
            ]
        );
        assert!(
            project
                .system_filter()
                .prefixes()
                .contains(&"/opt/homebrew/lib/".to_string())
        );
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Project::load(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(PYPROJECT), PYPROJECT_TOML).unwrap();
        let project = Project::load(tmp.path()).unwrap();
        assert_eq!(project.root(), tmp.path());
        assert_eq!(project.packages().unwrap().len(), 1);
    }
}
