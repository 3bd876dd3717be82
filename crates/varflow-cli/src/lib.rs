//! Library components of the `varflow` inspection tool.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod summary;
