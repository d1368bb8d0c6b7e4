//! Shared domain types for CampusGate: configuration and the common
//! error type used across all crates.

pub mod config;
pub mod error;

pub use error::{Error, Result};
