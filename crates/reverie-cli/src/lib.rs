#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

//! Command-line front end for the reverie soundscape engine.
//!
//! `main.rs` is the composition root; everything it wires is built in
//! [`bootstrap`], and each subcommand lives in [`handlers`].

// Silence unused dev-dependency warnings for test infrastructure
#[cfg(test)]
use tokio_test as _;

// Used only by the binary target
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

// Re-export primary types for convenient access
pub use bootstrap::{SessionContext, bootstrap};
pub use commands::{Commands, RenderArgs};
pub use error::CliError;
pub use parser::{BackendArgs, Cli, ResponseModeArg};
