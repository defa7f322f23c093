//! Subcommand implementations.

pub mod inspect;
pub mod packages;
pub mod relink;
