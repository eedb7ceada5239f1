//! Command line interface module
//!
//! Argument parsing and the runner that turns arguments into a promotion run.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;
