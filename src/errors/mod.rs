//! Error handling module
//!
//! Provides the hierarchical error system used throughout the engine.

pub mod types;

pub use types::{AppError, ProbeError, StoreError, UpstreamError};

/// Convenient result alias for application operations
pub type AppResult<T> = Result<T, AppError>;
