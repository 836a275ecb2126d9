//! # hubflow-cli
//!
//! Command handlers and the interactive reviewer behind the `hubflow`
//! binary.

pub mod commands;
pub mod console;

pub use commands::{ConfigOverrides, ReviewerKind};
pub use console::ConsoleReviewer;
