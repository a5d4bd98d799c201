//! Command-line glue for the loadwatch profiler.

pub mod cli;
pub mod config;
pub mod engine;
pub mod formatter;
pub mod logging;
