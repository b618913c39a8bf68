//! Error conversion boundary for infrastructure adapters

pub mod conversions;

pub use conversions::{map_join_error, status_error, InfraError};
