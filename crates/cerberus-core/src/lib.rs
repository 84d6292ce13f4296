//! Cerberus Core
//!
//! Error types and result handling shared across Cerberus components.

pub mod error;

pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
}
