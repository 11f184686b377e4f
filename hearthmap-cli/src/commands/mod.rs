//! CLI subcommand implementations.

pub mod import;
pub mod inspect;
pub mod usage;
