//! # calsync Domain
//!
//! Data types shared by the calendar sync pipeline.
//!
//! This crate contains:
//! - Provider resources and classified change events
//! - Record store rows, sync cursors, and webhook channel records
//! - Vector index propagation payloads
//! - Domain error types and Result definitions
//! - Configuration structures and constants
//!
//! ## Architecture
//! - No dependencies on other calsync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
