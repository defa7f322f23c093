//! Mach-O load command inspection and patching.
//!
//! Reads dependent-library records with `otool` and rewrites them with
//! `install_name_tool`, re-signing the binary afterwards.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Failures at the binary inspection boundary.
#[derive(Error, Debug)]
pub enum InspectError {
    /// A required command line tool is not installed.
    #[error("'{tool}' not found. Please install Xcode Command Line Tools: xcode-select --install")]
    ToolNotFound {
        /// The missing tool.
        tool: String,
    },

    /// The tool exists but could not be started.
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        /// The tool that failed to start.
        tool: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and reported failure.
    #[error("{tool} failed on {}: {stderr}", .path.display())]
    ToolFailed {
        /// The failing tool.
        tool: String,
        /// The binary being processed.
        path: PathBuf,
        /// What the tool printed on stderr.
        stderr: String,
    },

    /// The record to be replaced is not present in the binary.
    #[error("{}: no load command references {install_name}", .path.display())]
    MissingLoadPath {
        /// The binary being patched.
        path: PathBuf,
        /// The record that was expected.
        install_name: String,
    },
}

/// Reads and writes the load-path records of a compiled shared object.
pub trait BinaryInspector {
    /// Dependent-library records of `path`, excluding its own install id.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary cannot be read.
    fn read_load_paths(&self, path: &Path) -> Result<Vec<String>, InspectError>;

    /// Replace the record `old` with `new` in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary cannot be rewritten or `old` is not one
    /// of its records.
    fn write_load_path(&self, path: &Path, old: &str, new: &str) -> Result<(), InspectError>;
}

/// [`BinaryInspector`] backed by the Xcode command line tools.
#[derive(Debug, Clone)]
pub struct MachOInspector {
    otool: PathBuf,
    install_name_tool: PathBuf,
    resign: bool,
}

impl Default for MachOInspector {
    fn default() -> Self {
        Self {
            otool: PathBuf::from("otool"),
            install_name_tool: PathBuf::from("install_name_tool"),
            resign: true,
        }
    }
}

impl MachOInspector {
    /// Inspector using the tools found on `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip ad-hoc re-signing after a rewrite.
    pub fn without_resign(mut self) -> Self {
        self.resign = false;
        self
    }

    /// Install id recorded in a dylib (`LC_ID_DYLIB`), if any.
    ///
    /// # Errors
    ///
    /// Returns an error if `otool` cannot be run on the file.
    pub fn install_id(&self, path: &Path) -> Result<Option<String>, InspectError> {
        let stdout = run_tool(&self.otool, &[OsStr::new("-D"), path.as_os_str()], path)?;
        Ok(parse_otool_install_id(&stdout))
    }

    /// Re-applies ad-hoc code signing to a patched Mach-O binary.
    ///
    /// Patching invalidates the existing signature, and arm64 macOS refuses
    /// to load unsigned code. Failure is logged, not fatal.
    fn resign(path: &Path) {
        let status = Command::new("codesign")
            .args([
                "-s",
                "-",
                "--force",
                "--preserve-metadata=entitlements,requirements,flags,runtime",
            ])
            .arg(path)
            .output();

        match status {
            Ok(output) if output.status.success() => {}
            Ok(output) => tracing::warn!(
                "codesign failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => tracing::warn!("could not run codesign on {}: {e}", path.display()),
        }
    }
}

impl BinaryInspector for MachOInspector {
    fn read_load_paths(&self, path: &Path) -> Result<Vec<String>, InspectError> {
        let stdout = run_tool(&self.otool, &[OsStr::new("-L"), path.as_os_str()], path)?;
        let mut names = parse_otool_load_paths(&stdout);

        if let Some(id) = self.install_id(path)? {
            names.retain(|name| *name != id);
        }
        Ok(names)
    }

    fn write_load_path(&self, path: &Path, old: &str, new: &str) -> Result<(), InspectError> {
        if !self.read_load_paths(path)?.iter().any(|name| name == old) {
            return Err(InspectError::MissingLoadPath {
                path: path.to_path_buf(),
                install_name: old.to_string(),
            });
        }

        run_tool(
            &self.install_name_tool,
            &[
                OsStr::new("-change"),
                OsStr::new(old),
                OsStr::new(new),
                path.as_os_str(),
            ],
            path,
        )?;

        if self.resign {
            Self::resign(path);
        }
        Ok(())
    }
}

/// Executes a tool and returns its stdout.
fn run_tool(program: &Path, args: &[&OsStr], path: &Path) -> Result<String, InspectError> {
    let tool = program.display().to_string();
    let output = match Command::new(program).args(args).output() {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(InspectError::ToolNotFound { tool });
        }
        Err(source) => return Err(InspectError::Spawn { tool, source }),
    };

    if !output.status.success() {
        return Err(InspectError::ToolFailed {
            tool,
            path: path.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse the output of `otool -L`.
///
/// Header lines (`file:` or `file (architecture arm64):`) start at column
/// zero; each record is indented and followed by its version information.
/// Universal binaries list the same records once per slice, so duplicates
/// are dropped.
pub fn parse_otool_load_paths(stdout: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in stdout.lines() {
        if !line.starts_with(char::is_whitespace) {
            continue;
        }
        let line = line.trim();
        let name = line
            .find(" (compatibility version")
            .map_or(line, |idx| &line[..idx])
            .trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Parse the output of `otool -D`.
///
/// Executables have no install id and only print the header line.
pub fn parse_otool_install_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .map(str::to_string)
        .next()
}

/// Checks if a file is a Mach-O binary (magic bytes).
pub fn is_macho(path: &Path) -> bool {
    use std::io::Read;
    let Ok(mut f) = std::fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_err() {
        return false;
    }
    // feedface, feedfacf, cafebabe (universal) - and their LE/BE variants
    matches!(
        magic,
        [0xfe, 0xed, 0xfa, 0xce]
            | [0xfe, 0xed, 0xfa, 0xcf]
            | [0xcf, 0xfa, 0xed, 0xfe]
            | [0xce, 0xfa, 0xed, 0xfe]
            | [0xca, 0xfe, 0xba, 0xbe]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const OTOOL_L_DYLIB: &str = "\
/tmp/build/libapp.dylib:
\t/tmp/build/libapp.dylib (compatibility version 0.0.0, current version 0.0.0)
\t/build/tmp/libfoo.dylib (compatibility version 0.0.0, current version 0.0.0)
\t/usr/lib/libc++.1.dylib (compatibility version 1.0.0, current version 1700.255.0)
\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1345.100.2)
";

    const OTOOL_L_UNIVERSAL: &str = "\
/tmp/libuni.dylib (architecture x86_64):
\t@rpath/libuni.dylib (compatibility version 0.0.0, current version 0.0.0)
\t@rpath/libdep.dylib (compatibility version 0.0.0, current version 0.0.0, weak)
/tmp/libuni.dylib (architecture arm64):
\t@rpath/libuni.dylib (compatibility version 0.0.0, current version 0.0.0)
\t@rpath/libdep.dylib (compatibility version 0.0.0, current version 0.0.0, weak)
";

    #[test]
    fn test_parse_load_paths() {
        let names = parse_otool_load_paths(OTOOL_L_DYLIB);
        assert_eq!(
            names,
            vec![
                "/tmp/build/libapp.dylib",
                "/build/tmp/libfoo.dylib",
                "/usr/lib/libc++.1.dylib",
                "/usr/lib/libSystem.B.dylib",
            ]
        );
    }

    #[test]
    fn test_parse_load_paths_universal_dedup() {
        let names = parse_otool_load_paths(OTOOL_L_UNIVERSAL);
        assert_eq!(names, vec!["@rpath/libuni.dylib", "@rpath/libdep.dylib"]);
    }

    #[test]
    fn test_parse_install_id() {
        let out = "/tmp/build/libapp.dylib:\n/tmp/build/libapp.dylib\n";
        assert_eq!(
            parse_otool_install_id(out).as_deref(),
            Some("/tmp/build/libapp.dylib")
        );
    }

    #[test]
    fn test_parse_install_id_executable() {
        assert_eq!(parse_otool_install_id("/usr/bin/true:\n"), None);
    }

    #[test]
    fn test_is_macho() {
        let dir = tempfile::tempdir().unwrap();
        let macho = dir.path().join("libfoo.dylib");
        let text = dir.path().join("README");
        std::fs::write(&macho, [0xcf, 0xfa, 0xed, 0xfe, 0x07, 0x00]).unwrap();
        std::fs::write(&text, "not a binary").unwrap();

        assert!(is_macho(&macho));
        assert!(!is_macho(&text));
        assert!(!is_macho(&dir.path().join("missing")));
    }
}
