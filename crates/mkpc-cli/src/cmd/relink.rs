//! Relink command

use std::path::PathBuf;

use anyhow::{Context, Result};
use mkpc_core::config::Project;
use mkpc_core::{DistRoots, MachOInspector, PkgConfResolver, RelinkMode, Relinker};

/// Options of `mkpc relink`.
#[derive(Debug, Clone)]
pub struct RelinkArgs {
    /// Project root containing `pyproject.toml`.
    pub root: PathBuf,
    /// Link against absolute build paths.
    pub editable: bool,
    /// Distribution roots given on the command line.
    pub dist_roots: Vec<PathBuf>,
    /// Interpreter used to discover `site-packages`.
    pub python: Option<PathBuf>,
    /// Extra system library prefixes.
    pub system_prefixes: Vec<String>,
    /// Extra `.pc` search directories.
    pub pc_paths: Vec<PathBuf>,
    /// Report rewrites without applying them.
    pub dry_run: bool,
}

/// Relink every shared library declared in the project.
pub fn relink(args: &RelinkArgs) -> Result<()> {
    let project = Project::load(&args.root)
        .with_context(|| format!("Failed to load project at {}", args.root.display()))?;
    let packages = project.packages()?;

    if packages.is_empty() {
        println!("No shared libraries declared in {}", args.root.display());
        return Ok(());
    }

    if !cfg!(target_os = "macos") {
        tracing::warn!("load command relinking only applies to macOS, skipping");
        return Ok(());
    }

    let mode = RelinkMode::for_build(args.editable, || dist_roots(args, &project))?;

    // Only queried for required packages not declared in this project.
    let resolver = PkgConfResolver::locate().with_search_paths(args.pc_paths.iter().cloned());
    if let Some(program) = resolver.program() {
        tracing::debug!("pkg-config: {}", program.display());
    }

    let inspector = MachOInspector::new();
    let system = project
        .system_filter()
        .extend(args.system_prefixes.iter().cloned());

    let rewrites = Relinker::new(&inspector, &resolver, &system)
        .dry_run(args.dry_run)
        .relink(packages, &mode)
        .context("Relinking failed")?;

    let verb = if args.dry_run { "Would rewrite" } else { "Rewrote" };
    println!("{verb} {} load command(s)", rewrites.len());
    Ok(())
}

/// Command line roots win over configured ones, which win over the
/// interpreter's `site-packages`. Relative roots are taken from the project
/// root.
fn dist_roots(args: &RelinkArgs, project: &Project) -> Result<DistRoots> {
    if !args.dist_roots.is_empty() {
        return Ok(DistRoots::new(
            args.dist_roots.iter().map(|root| args.root.join(root)),
        ));
    }
    if let Some(roots) = project.dist_roots() {
        return Ok(roots);
    }
    DistRoots::from_python(args.python.as_deref())
        .context("Failed to discover site-packages; pass --dist-root")
}
