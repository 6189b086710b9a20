//! Command-line front end for cmdrelay.

#![deny(unsafe_code)]

pub mod commands;
pub mod parser;

pub use commands::{BackendArgs, Commands, GatewayArgs};
pub use parser::Cli;
