//! CLI subcommand implementations.

pub mod roast;
