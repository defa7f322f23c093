//! Packages command

use std::path::Path;

use anyhow::{Context, Result};
use mkpc_core::config::Project;

/// List the packages the project declares, with each library's build path
/// and distribution path.
pub fn packages(root: &Path) -> Result<()> {
    let project = Project::load(root)
        .with_context(|| format!("Failed to load project at {}", root.display()))?;
    let packages = project.packages()?;

    if packages.is_empty() {
        println!("No shared libraries declared in {}", root.display());
        return Ok(());
    }

    for pkg in &packages {
        println!("{}", pkg.name);
        if !pkg.requires.is_empty() {
            println!("  requires {}", pkg.requires.join(", "));
        }
        for lib in &pkg.shared_libs {
            let dist = lib
                .dist_path()
                .map_or_else(|| "?".to_string(), |p| p.display().to_string());
            println!("  {} -> {dist}", lib.file_path().display());
        }
    }
    Ok(())
}
