//! mkpc - relink the shared libraries of pkg-config packages.
#![allow(clippy::missing_errors_doc)]
//!
//! Reads the `[[tool.hatch.build.hooks.mkpkgconf.pcfile]]` entries of a
//! project's `pyproject.toml` and rewrites the Mach-O load commands of the
//! shared libraries they declare, so that each one finds the libraries of
//! the pkg-config packages it requires.

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "mkpc")]
#[command(author, version, about = "mkpc - pkg-config driven dylib relinking")]
pub struct Cli {
    /// Show what would happen without making changes
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Relink the shared libraries declared in pyproject.toml
    Relink {
        /// Project root containing pyproject.toml
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Link against absolute build paths (editable install)
        #[arg(long)]
        editable: bool,
        /// Distribution root (repeatable); defaults to the interpreter's site-packages
        #[arg(long = "dist-root")]
        dist_roots: Vec<PathBuf>,
        /// Python interpreter used to discover site-packages
        #[arg(long, env = "PYTHON")]
        python: Option<PathBuf>,
        /// Extra load-path prefix treated as a system library (repeatable)
        #[arg(long = "system-prefix")]
        system_prefixes: Vec<String>,
        /// Extra directory searched for .pc files (repeatable)
        #[arg(long = "pc-path")]
        pc_paths: Vec<PathBuf>,
    },
    /// Print the load-path records of Mach-O files
    Inspect {
        /// Files or directories to inspect
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List the packages and libraries declared in pyproject.toml
    Packages {
        /// Project root containing pyproject.toml
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}
