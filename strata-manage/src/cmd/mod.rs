//! CLI subcommands and the interactive wizard.

pub mod create;
pub mod join;
pub mod menu;
