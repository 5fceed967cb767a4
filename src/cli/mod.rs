//! Command-line interface: argument parsing and command execution

pub mod args;
pub mod runner;

pub use args::{Args, Command, Target};
pub use runner::Runner;
