//! Subcommand implementations

pub mod capture;
pub mod graph;
pub mod list;
