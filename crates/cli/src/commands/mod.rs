//! CLI command implementations

pub mod roles;
pub mod simulate;
