//! Common utilities shared across all crates.
//!
//! This crate provides:
//! - Unified error handling (storage, domain and HTTP mapping)
//! - Configuration structures for storage backend selection

pub mod config;
pub mod error;

pub use config::*;
pub use error::{AppError, AppResult, StoreError};
