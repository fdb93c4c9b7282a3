//! Command handlers.
//!
//! Handlers are thin: validate CLI input, call into the engine, format output
//! for the terminal.

pub mod config;
pub mod moods;
pub mod render;
