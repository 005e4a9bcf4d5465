//! Core types and utilities for the grain classification pipeline.
//!
//! This crate provides the error taxonomy, configuration, shared types,
//! metrics and CLI helpers used across the workspace.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use backend::*;
pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use metrics::*;
pub use types::*;
