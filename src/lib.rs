//! Optimarr library root.

/// Crate version as published in Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub type Result<T> = error::OptimarrResult<T>;

pub mod facade;
pub mod services;
