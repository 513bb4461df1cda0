//! # qless-bridge-config
//!
//! Configuration management for the qless bridge.
//! Supports layered configuration from files, environment variables,
//! and runtime reload.

mod app_config;
mod error;
mod loader;
mod validation;

pub use app_config::*;
pub use error::*;
pub use loader::*;
pub use validation::*;
