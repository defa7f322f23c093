//! Inspect command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mkpc_core::inspector::is_macho;
use mkpc_core::{BinaryInspector, MachOInspector};

/// Print the install id and load-path records of Mach-O files.
///
/// Directories are walked recursively; non Mach-O files inside them are
/// skipped.
pub fn inspect(paths: &[PathBuf]) -> Result<()> {
    let inspector = MachOInspector::new();

    for path in paths {
        for file in macho_files(path)? {
            print_file(&inspector, &file)?;
        }
    }
    Ok(())
}

fn macho_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        if entry.file_type().is_file() && is_macho(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn print_file(inspector: &MachOInspector, file: &Path) -> Result<()> {
    let records = inspector
        .read_load_paths(file)
        .with_context(|| format!("Failed to inspect {}", file.display()))?;

    println!("{}", file.display());
    if let Some(id) = inspector.install_id(file)? {
        println!("  id   {id}");
    }
    for record in records {
        println!("  load {record}");
    }
    Ok(())
}
