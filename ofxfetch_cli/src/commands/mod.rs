//! CLI subcommand implementations.

pub mod fetch;
pub mod quotes;
pub mod scrub;
pub mod validate;
