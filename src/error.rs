//! Error types for TideKV.
//!
//! The store's primary API reports failures as `bool`/count results, the same
//! way the underlying map does. This module backs the `Result` flavoured
//! variants (`try_insert`, `try_update`) and configuration validation.

use thiserror::Error;

/// Convenience `Result` alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key is not present in the table.
    #[error("key not found")]
    KeyNotFound,

    /// The key is already present; inserts never overwrite.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
